use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::operations::sessions::{self, SessionCounters, StudySession};
use crate::db::DatabaseProxy;
use crate::services::{statistics, StudyError};

/// Opens a study session with zeroed counters. At most one session may be
/// open per user; the partial unique index backs the pre-check, so a racing
/// second start surfaces as `Conflict` either way.
pub async fn start_session(
    proxy: &DatabaseProxy,
    user_id: &str,
    category_id: Option<&str>,
    mode: Option<&str>,
) -> Result<StudySession, StudyError> {
    let mode = normalize_mode(mode)?;
    let pool = proxy.pool();

    if let Some(open) = sessions::get_open_session(pool, user_id).await? {
        return Err(StudyError::Conflict(format!(
            "an open session already exists: {}",
            open.id
        )));
    }

    let session_id = Uuid::new_v4().to_string();
    sessions::insert_session(pool, &session_id, user_id, category_id, &mode)
        .await
        .map_err(|err| match unique_violation(&err) {
            true => StudyError::Conflict("an open session already exists".to_string()),
            false => StudyError::Sql(err),
        })?;

    sessions::get_session(pool, &session_id)
        .await?
        .ok_or_else(|| StudyError::NotFound(format!("session not found: {session_id}")))
}

/// Closes a session exactly once, freezing the caller-supplied authoritative
/// tally and feeding the statistics aggregator. Ending an already-closed
/// session returns the stored record unchanged and aggregates nothing.
pub async fn end_session(
    proxy: &DatabaseProxy,
    user_id: &str,
    session_id: &str,
    counters: SessionCounters,
) -> Result<StudySession, StudyError> {
    validate_counters(&counters)?;

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
        return Ok(session);
    }

    let ended_at = Utc::now();
    let duration = duration_minutes(session.started_at, ended_at);
    let closed_now =
        sessions::close_session(pool, session_id, &counters, ended_at, duration).await?;

    let closed = sessions::get_session(pool, session_id)
        .await?
        .ok_or_else(|| StudyError::NotFound(format!("session not found: {session_id}")))?;

    // A concurrent close won the race; it also ran the aggregation.
    if closed_now {
        statistics::record_session_completion(proxy, user_id, &closed).await?;
    }

    Ok(closed)
}

pub fn duration_minutes(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> i32 {
    let elapsed_ms = (ended_at - started_at).num_milliseconds().max(0);
    (elapsed_ms as f64 / 60_000.0).round() as i32
}

fn normalize_mode(raw: Option<&str>) -> Result<String, StudyError> {
    let mode = raw.unwrap_or("STUDY").trim().to_uppercase();
    if !matches!(mode.as_str(), "STUDY" | "REVIEW") {
        return Err(StudyError::Validation(format!(
            "invalid session mode: {mode}"
        )));
    }
    Ok(mode)
}

fn validate_counters(counters: &SessionCounters) -> Result<(), StudyError> {
    if counters.words_studied < 0
        || counters.words_learned < 0
        || counters.correct_answers < 0
        || counters.total_answers < 0
    {
        return Err(StudyError::Validation(
            "session counters must be non-negative".to_string(),
        ));
    }
    if counters.correct_answers > counters.total_answers {
        return Err(StudyError::Validation(
            "correctAnswers cannot exceed totalAnswers".to_string(),
        ));
    }
    Ok(())
}

fn unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().map(|db| db.kind()),
        Some(sqlx::error::ErrorKind::UniqueViolation)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn duration_rounds_to_nearest_minute() {
        let start = Utc::now();
        assert_eq!(duration_minutes(start, start + Duration::seconds(29)), 0);
        assert_eq!(duration_minutes(start, start + Duration::seconds(31)), 1);
        assert_eq!(duration_minutes(start, start + Duration::seconds(95)), 2);
        assert_eq!(duration_minutes(start, start + Duration::minutes(25)), 25);
    }

    #[test]
    fn duration_never_goes_negative() {
        let start = Utc::now();
        assert_eq!(duration_minutes(start, start - Duration::minutes(5)), 0);
    }

    #[test]
    fn mode_defaults_to_study_and_is_case_insensitive() {
        assert_eq!(normalize_mode(None).unwrap(), "STUDY");
        assert_eq!(normalize_mode(Some("review")).unwrap(), "REVIEW");
        assert!(normalize_mode(Some("cram")).is_err());
    }

    #[test]
    fn counters_are_validated_before_any_write() {
        let bad = SessionCounters {
            words_studied: 5,
            words_learned: 1,
            correct_answers: 7,
            total_answers: 5,
        };
        assert!(validate_counters(&bad).is_err());

        let negative = SessionCounters {
            words_studied: -1,
            ..Default::default()
        };
        assert!(validate_counters(&negative).is_err());

        let ok = SessionCounters {
            words_studied: 5,
            words_learned: 2,
            correct_answers: 4,
            total_answers: 5,
        };
        assert!(validate_counters(&ok).is_ok());
    }
}
