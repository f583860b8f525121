use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::operations::progress::{
    self, LearningStatus, WordProgress,
};
use crate::db::operations::sessions::{self, StudySession};
use crate::db::operations::{stats, words};
use crate::db::DatabaseProxy;
use crate::services::StudyError;

/// Self-assessed recall quality submitted for one card. `easy` and `hard`
/// both count as recalled; `forgot` is a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Hard,
    Forgot,
}

impl Difficulty {
    pub fn is_recalled(self) -> bool {
        !matches!(self, Self::Forgot)
    }
}

const GROWTH_FACTOR: f64 = 2.0;
const MIN_REVIEW_INTERVAL_DAYS: f64 = 1.0;
const MAX_REVIEW_INTERVAL_DAYS: f64 = 180.0;
const HARD_INTERVAL_DAYS: f64 = 1.0;
// A lapse comes back within the same sitting.
const LAPSE_INTERVAL_DAYS: f64 = 10.0 / (24.0 * 60.0);

const MAX_TRANSITION_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub status: LearningStatus,
    pub interval_days: f64,
    pub consecutive_easy: i32,
    pub became_learned: bool,
    pub became_mastered: bool,
}

/// Advances the learning-status state machine by one rating and computes the
/// next review interval. Promotion from Learned to Mastered happens on the
/// first `easy` rating; demotion back to Learning happens on `forgot`
/// everywhere, and on `hard` from Learned.
pub fn apply_rating(
    status: LearningStatus,
    consecutive_easy: i32,
    interval_days: f64,
    rating: Difficulty,
) -> Transition {
    let next_status = match (status, rating) {
        (LearningStatus::New, Difficulty::Easy) => LearningStatus::Learned,
        (LearningStatus::New, _) => LearningStatus::Learning,
        (LearningStatus::Learning, Difficulty::Easy) => LearningStatus::Learned,
        (LearningStatus::Learning, _) => LearningStatus::Learning,
        (LearningStatus::Learned, Difficulty::Easy) => LearningStatus::Mastered,
        (LearningStatus::Learned, _) => LearningStatus::Learning,
        (LearningStatus::Mastered, Difficulty::Forgot) => LearningStatus::Learning,
        (LearningStatus::Mastered, _) => LearningStatus::Mastered,
    };

    let next_interval = match rating {
        Difficulty::Forgot => LAPSE_INTERVAL_DAYS,
        Difficulty::Hard => match status {
            // Interval keeps lengthening once a word is mastered.
            LearningStatus::Mastered => grow_interval(interval_days),
            _ => HARD_INTERVAL_DAYS,
        },
        Difficulty::Easy => grow_interval(interval_days),
    };

    let next_consecutive = if rating == Difficulty::Easy {
        consecutive_easy + 1
    } else {
        0
    };

    let was_learned = matches!(status, LearningStatus::Learned | LearningStatus::Mastered);
    let is_learned = matches!(
        next_status,
        LearningStatus::Learned | LearningStatus::Mastered
    );

    Transition {
        status: next_status,
        interval_days: next_interval,
        consecutive_easy: next_consecutive,
        became_learned: is_learned && !was_learned,
        became_mastered: next_status == LearningStatus::Mastered
            && status != LearningStatus::Mastered,
    }
}

fn grow_interval(interval_days: f64) -> f64 {
    (interval_days.max(MIN_REVIEW_INTERVAL_DAYS / GROWTH_FACTOR) * GROWTH_FACTOR)
        .clamp(MIN_REVIEW_INTERVAL_DAYS, MAX_REVIEW_INTERVAL_DAYS)
}

fn interval_to_duration(interval_days: f64) -> Duration {
    Duration::milliseconds((interval_days * 86_400_000.0) as i64)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub progress: WordProgress,
    pub session: StudySession,
}

/// Records one rating: transitions the word's progress, reschedules it, and
/// feeds the owning session's running counters plus the cumulative per-user
/// totals. The progress write is a compare-and-swap on the row version;
/// losing a race re-reads and retries a bounded number of times.
pub async fn submit_response(
    proxy: &DatabaseProxy,
    user_id: &str,
    session_id: &str,
    word_id: &str,
    rating: Difficulty,
) -> Result<ReviewOutcome, StudyError> {
    if session_id.trim().is_empty() {
        return Err(StudyError::Validation("sessionId is required".to_string()));
    }
    if word_id.trim().is_empty() {
        return Err(StudyError::Validation("wordId is required".to_string()));
    }

    let pool = proxy.pool();

    let session = sessions::get_session(pool, session_id)
        .await?
        .ok_or_else(|| StudyError::NotFound(format!("session not found: {session_id}")))?;
    if session.user_id != user_id {
        return Err(StudyError::Forbidden(
            "session belongs to another user".to_string(),
        ));
    }
    if !session.is_open() {
        return Err(StudyError::Validation(format!(
            "session already ended: {session_id}"
        )));
    }

    if words::get_word(pool, word_id).await?.is_none() {
        return Err(StudyError::NotFound(format!("word not found: {word_id}")));
    }

    let now = Utc::now();
    let mut applied: Option<(Option<WordProgress>, WordProgress, Transition)> = None;

    for _ in 0..MAX_TRANSITION_RETRIES {
        let existing = progress::get_progress(pool, user_id, word_id).await?;

        match existing {
            None => {
                let transition =
                    apply_rating(LearningStatus::New, 0, 0.0, rating);
                let fresh = WordProgress {
                    id: Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    word_id: word_id.to_string(),
                    status: transition.status,
                    attempts: 1,
                    correct_attempts: if rating.is_recalled() { 1 } else { 0 },
                    consecutive_easy: transition.consecutive_easy,
                    interval_days: transition.interval_days,
                    last_studied_at: Some(now),
                    next_review_at: Some(now + interval_to_duration(transition.interval_days)),
                    version: 1,
                };

                if progress::insert_progress_if_absent(pool, &fresh).await? {
                    applied = Some((None, fresh, transition));
                    break;
                }
                // Another writer created the row first; retry via the update path.
            }
            Some(current) => {
                let transition = apply_rating(
                    current.status,
                    current.consecutive_easy,
                    current.interval_days,
                    rating,
                );
                let mut updated = current.clone();
                updated.status = transition.status;
                updated.attempts = current.attempts + 1;
                updated.correct_attempts =
                    current.correct_attempts + if rating.is_recalled() { 1 } else { 0 };
                updated.consecutive_easy = transition.consecutive_easy;
                updated.interval_days = transition.interval_days;
                updated.last_studied_at = Some(now);
                updated.next_review_at =
                    Some(now + interval_to_duration(transition.interval_days));

                if progress::update_progress_versioned(pool, &updated, current.version).await? {
                    updated.version = current.version + 1;
                    applied = Some((Some(current), updated, transition));
                    break;
                }

                tracing::debug!(
                    user_id,
                    word_id,
                    version = current.version,
                    "progress update lost a version race, retrying"
                );
            }
        }
    }

    let Some((previous, updated, transition)) = applied else {
        return Err(StudyError::Conflict(format!(
            "concurrent updates on word {word_id}, please retry"
        )));
    };

    // First rating of this word within the session bumps wordsStudied.
    let first_in_session = previous
        .as_ref()
        .and_then(|p| p.last_studied_at)
        .map(|t| t < session.started_at)
        .unwrap_or(true);

    sessions::add_session_counters(
        pool,
        session_id,
        if first_in_session { 1 } else { 0 },
        if transition.became_learned { 1 } else { 0 },
        if rating.is_recalled() { 1 } else { 0 },
        1,
    )
    .await?;

    stats::bump_progress_counters(
        pool,
        user_id,
        rating.is_recalled(),
        transition.became_learned,
        transition.became_mastered,
    )
    .await?;

    let session = sessions::get_session(pool, session_id).await?.unwrap_or(session);

    Ok(ReviewOutcome {
        progress: updated,
        session,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_word_rated_easy_fast_tracks_to_learned() {
        let t = apply_rating(LearningStatus::New, 0, 0.0, Difficulty::Easy);
        assert_eq!(t.status, LearningStatus::Learned);
        assert!(t.became_learned);
        assert!(!t.became_mastered);
        assert_eq!(t.consecutive_easy, 1);
        assert!((t.interval_days - 1.0).abs() < 1e-9);
    }

    #[test]
    fn new_word_rated_hard_or_forgot_enters_learning() {
        let hard = apply_rating(LearningStatus::New, 0, 0.0, Difficulty::Hard);
        assert_eq!(hard.status, LearningStatus::Learning);
        assert!(!hard.became_learned);

        let forgot = apply_rating(LearningStatus::New, 0, 0.0, Difficulty::Forgot);
        assert_eq!(forgot.status, LearningStatus::Learning);
        assert!(forgot.interval_days < hard.interval_days);
    }

    #[test]
    fn two_easy_ratings_reach_mastered() {
        let first = apply_rating(LearningStatus::New, 0, 0.0, Difficulty::Easy);
        assert_eq!(first.status, LearningStatus::Learned);

        let second = apply_rating(
            first.status,
            first.consecutive_easy,
            first.interval_days,
            Difficulty::Easy,
        );
        assert_eq!(second.status, LearningStatus::Mastered);
        assert!(second.became_mastered);
        assert!(second.interval_days > first.interval_days);
    }

    #[test]
    fn learned_word_demotes_on_hard_and_forgot() {
        let hard = apply_rating(LearningStatus::Learned, 2, 4.0, Difficulty::Hard);
        assert_eq!(hard.status, LearningStatus::Learning);
        assert_eq!(hard.consecutive_easy, 0);

        let forgot = apply_rating(LearningStatus::Learned, 2, 4.0, Difficulty::Forgot);
        assert_eq!(forgot.status, LearningStatus::Learning);
        assert!((forgot.interval_days - LAPSE_INTERVAL_DAYS).abs() < 1e-9);
    }

    #[test]
    fn mastered_survives_hard_but_not_forgot() {
        let hard = apply_rating(LearningStatus::Mastered, 3, 16.0, Difficulty::Hard);
        assert_eq!(hard.status, LearningStatus::Mastered);
        assert!(hard.interval_days > 16.0);

        let forgot = apply_rating(LearningStatus::Mastered, 3, 16.0, Difficulty::Forgot);
        assert_eq!(forgot.status, LearningStatus::Learning);
        assert!(!forgot.became_mastered);
    }

    #[test]
    fn easy_doubles_interval_up_to_the_cap() {
        let mut interval = 1.0;
        for _ in 0..12 {
            let t = apply_rating(LearningStatus::Mastered, 1, interval, Difficulty::Easy);
            assert!(t.interval_days <= MAX_REVIEW_INTERVAL_DAYS);
            assert!(t.interval_days >= interval);
            interval = t.interval_days;
        }
        assert!((interval - MAX_REVIEW_INTERVAL_DAYS).abs() < 1e-9);
    }

    #[test]
    fn forgot_resets_the_interval_to_the_shortest_value() {
        let t = apply_rating(LearningStatus::Mastered, 5, 128.0, Difficulty::Forgot);
        assert!((t.interval_days - LAPSE_INTERVAL_DAYS).abs() < 1e-9);
        assert_eq!(t.consecutive_easy, 0);
    }

    #[test]
    fn relearning_after_a_lapse_counts_as_learned_again() {
        // Mastered -> forgot -> Learning -> easy -> Learned (a fresh learn event).
        let lapse = apply_rating(LearningStatus::Mastered, 4, 64.0, Difficulty::Forgot);
        let relearn = apply_rating(lapse.status, 0, lapse.interval_days, Difficulty::Easy);
        assert_eq!(relearn.status, LearningStatus::Learned);
        assert!(relearn.became_learned);
    }
}
