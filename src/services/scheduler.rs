use chrono::Utc;
use serde::Deserialize;

use crate::db::operations::progress::{self, StudyCard};
use crate::db::DatabaseProxy;
use crate::services::StudyError;

pub const DEFAULT_BATCH_SIZE: i64 = 20;
pub const MAX_BATCH_SIZE: i64 = 100;

/// Knobs for one batch request. A pure-review mode sets `include_new` to
/// false; a new-words-only warmup sets `include_review` to false.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConstraints {
    pub max_words: i64,
    pub include_new: bool,
    pub include_review: bool,
}

impl Default for BatchConstraints {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_BATCH_SIZE,
            include_new: true,
            include_review: true,
        }
    }
}

/// Picks the next batch of cards for a user. Overdue reviews always surface
/// before new words; an empty result means "nothing to study", not an error.
/// Each call re-reads current state, so a fresh call after some ratings may
/// return a different batch.
pub async fn select_study_batch(
    proxy: &DatabaseProxy,
    user_id: &str,
    category_id: Option<&str>,
    constraints: BatchConstraints,
) -> Result<Vec<StudyCard>, StudyError> {
    if constraints.max_words < 1 || constraints.max_words > MAX_BATCH_SIZE {
        return Err(StudyError::Validation(format!(
            "maxWords must be between 1 and {MAX_BATCH_SIZE}"
        )));
    }

    let pool = proxy.pool();
    let now = Utc::now();

    let due = if constraints.include_review {
        progress::select_due_cards(pool, user_id, category_id, now, constraints.max_words).await?
    } else {
        Vec::new()
    };

    let fresh = if constraints.include_new && (due.len() as i64) < constraints.max_words {
        progress::select_new_cards(pool, user_id, category_id, constraints.max_words).await?
    } else {
        Vec::new()
    };

    Ok(assemble_batch(due, fresh, constraints.max_words as usize))
}

/// Ordering policy, kept separate from the store reads: due-for-review
/// first (oldest due leading), then new words by ascending frequency rank
/// (unranked last) and difficulty, everything tie-broken by word id so the
/// result is deterministic.
pub fn assemble_batch(
    mut due: Vec<StudyCard>,
    mut fresh: Vec<StudyCard>,
    max_words: usize,
) -> Vec<StudyCard> {
    due.sort_by(|a, b| {
        let a_due = a.progress.as_ref().and_then(|p| p.next_review_at);
        let b_due = b.progress.as_ref().and_then(|p| p.next_review_at);
        a_due.cmp(&b_due).then_with(|| a.word.id.cmp(&b.word.id))
    });

    fresh.sort_by(|a, b| {
        new_word_key(a).cmp(&new_word_key(b))
    });

    due.into_iter()
        .chain(fresh)
        .take(max_words)
        .collect()
}

fn new_word_key(card: &StudyCard) -> (bool, i32, i32, String) {
    (
        card.word.frequency_rank.is_none(),
        card.word.frequency_rank.unwrap_or(i32::MAX),
        card.word.difficulty_level,
        card.word.id.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::operations::progress::{LearningStatus, WordProgress};
    use crate::db::operations::words::Word;
    use chrono::{Duration, Utc};

    fn word(id: &str, rank: Option<i32>, difficulty: i32) -> Word {
        Word {
            id: id.to_string(),
            category_id: "cat-1".to_string(),
            script: "言葉".to_string(),
            romaji: "kotoba".to_string(),
            translation: "word".to_string(),
            difficulty_level: difficulty,
            frequency_rank: rank,
            is_active: true,
        }
    }

    fn due_card(id: &str, due_days_ago: i64) -> StudyCard {
        let now = Utc::now();
        StudyCard {
            word: word(id, None, 1),
            progress: Some(WordProgress {
                id: format!("p-{id}"),
                user_id: "u-1".to_string(),
                word_id: id.to_string(),
                status: LearningStatus::Learning,
                attempts: 3,
                correct_attempts: 2,
                consecutive_easy: 0,
                interval_days: 1.0,
                last_studied_at: Some(now - Duration::days(due_days_ago + 1)),
                next_review_at: Some(now - Duration::days(due_days_ago)),
                version: 1,
            }),
        }
    }

    fn new_card(id: &str, rank: Option<i32>, difficulty: i32) -> StudyCard {
        StudyCard {
            word: word(id, rank, difficulty),
            progress: None,
        }
    }

    #[test]
    fn review_items_come_before_new_items_oldest_due_first() {
        let due = vec![due_card("w2", 0), due_card("w1", 2)];
        let fresh = vec![new_card("w4", Some(5), 1), new_card("w3", Some(1), 1)];

        let batch = assemble_batch(due, fresh, 3);
        let ids: Vec<&str> = batch.iter().map(|c| c.word.id.as_str()).collect();
        assert_eq!(ids, vec!["w1", "w2", "w3"]);
    }

    #[test]
    fn unranked_new_words_sort_after_ranked_ones() {
        let fresh = vec![
            new_card("w-none", None, 1),
            new_card("w-high", Some(50), 1),
            new_card("w-low", Some(2), 1),
        ];

        let batch = assemble_batch(Vec::new(), fresh, 10);
        let ids: Vec<&str> = batch.iter().map(|c| c.word.id.as_str()).collect();
        assert_eq!(ids, vec!["w-low", "w-high", "w-none"]);
    }

    #[test]
    fn equal_rank_falls_back_to_difficulty_then_id() {
        let fresh = vec![
            new_card("w-b", Some(1), 2),
            new_card("w-c", Some(1), 1),
            new_card("w-a", Some(1), 2),
        ];

        let batch = assemble_batch(Vec::new(), fresh, 10);
        let ids: Vec<&str> = batch.iter().map(|c| c.word.id.as_str()).collect();
        assert_eq!(ids, vec!["w-c", "w-a", "w-b"]);
    }

    #[test]
    fn batch_is_capped_at_max_words() {
        let due = vec![due_card("w1", 3), due_card("w2", 2), due_card("w3", 1)];
        let batch = assemble_batch(due, vec![new_card("w4", Some(1), 1)], 2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].word.id, "w1");
    }

    #[test]
    fn empty_pools_yield_an_empty_batch() {
        let batch = assemble_batch(Vec::new(), Vec::new(), 20);
        assert!(batch.is_empty());
    }
}
