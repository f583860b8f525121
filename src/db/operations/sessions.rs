use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub user_id: String,
    pub category_id: Option<String>,
    pub mode: String,
    pub words_studied: i32,
    pub words_learned: i32,
    pub correct_answers: i32,
    pub total_answers: i32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
}

impl StudySession {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Authoritative final tally supplied by the caller at close time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounters {
    pub words_studied: i32,
    pub words_learned: i32,
    pub correct_answers: i32,
    pub total_answers: i32,
}

pub async fn insert_session(
    pool: &PgPool,
    session_id: &str,
    user_id: &str,
    category_id: Option<&str>,
    mode: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "study_sessions"
            ("id", "userId", "categoryId", "mode", "startedAt", "createdAt", "updatedAt")
        VALUES ($1, $2, $3, $4, NOW(), NOW(), NOW())
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .bind(category_id)
    .bind(mode)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_session(
    pool: &PgPool,
    session_id: &str,
) -> Result<Option<StudySession>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "userId", "categoryId", "mode", "wordsStudied", "wordsLearned",
               "correctAnswers", "totalAnswers", "startedAt", "endedAt", "durationMinutes"
        FROM "study_sessions"
        WHERE "id" = $1
        LIMIT 1
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_session(&r)))
}

pub async fn get_open_session(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<StudySession>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "userId", "categoryId", "mode", "wordsStudied", "wordsLearned",
               "correctAnswers", "totalAnswers", "startedAt", "endedAt", "durationMinutes"
        FROM "study_sessions"
        WHERE "userId" = $1 AND "endedAt" IS NULL
        ORDER BY "startedAt" DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_session(&r)))
}

/// Increments the running counters of an open session. Closed sessions are
/// frozen, so the WHERE clause makes the call a no-op for them.
pub async fn add_session_counters(
    pool: &PgPool,
    session_id: &str,
    studied: i32,
    learned: i32,
    correct: i32,
    total: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "study_sessions" SET
            "wordsStudied" = "wordsStudied" + $1,
            "wordsLearned" = "wordsLearned" + $2,
            "correctAnswers" = "correctAnswers" + $3,
            "totalAnswers" = "totalAnswers" + $4,
            "updatedAt" = NOW()
        WHERE "id" = $5 AND "endedAt" IS NULL
        "#,
    )
    .bind(studied)
    .bind(learned)
    .bind(correct)
    .bind(total)
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Closes the session exactly once. Returns false when it was already
/// closed, which the caller treats as the idempotent success path.
pub async fn close_session(
    pool: &PgPool,
    session_id: &str,
    counters: &SessionCounters,
    ended_at: DateTime<Utc>,
    duration_minutes: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "study_sessions" SET
            "wordsStudied" = $1,
            "wordsLearned" = $2,
            "correctAnswers" = $3,
            "totalAnswers" = $4,
            "endedAt" = $5,
            "durationMinutes" = $6,
            "updatedAt" = NOW()
        WHERE "id" = $7 AND "endedAt" IS NULL
        "#,
    )
    .bind(counters.words_studied)
    .bind(counters.words_learned)
    .bind(counters.correct_answers)
    .bind(counters.total_answers)
    .bind(ended_at)
    .bind(duration_minutes)
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Sessions still open past the staleness cutoff, oldest first. The reaper
/// worker feeds these back through the normal close path.
pub async fn select_stale_open_sessions(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<StudySession>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "userId", "categoryId", "mode", "wordsStudied", "wordsLearned",
               "correctAnswers", "totalAnswers", "startedAt", "endedAt", "durationMinutes"
        FROM "study_sessions"
        WHERE "endedAt" IS NULL AND "startedAt" < $1
        ORDER BY "startedAt" ASC
        LIMIT $2
        "#,
    )
    .bind(cutoff)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(map_session).collect())
}

fn map_session(row: &sqlx::postgres::PgRow) -> StudySession {
    StudySession {
        id: row.try_get("id").unwrap_or_default(),
        user_id: row.try_get("userId").unwrap_or_default(),
        category_id: row.try_get::<Option<String>, _>("categoryId").ok().flatten(),
        mode: row.try_get("mode").unwrap_or_else(|_| "STUDY".to_string()),
        words_studied: row.try_get("wordsStudied").unwrap_or(0),
        words_learned: row.try_get("wordsLearned").unwrap_or(0),
        correct_answers: row.try_get("correctAnswers").unwrap_or(0),
        total_answers: row.try_get("totalAnswers").unwrap_or(0),
        started_at: row
            .try_get::<DateTime<Utc>, _>("startedAt")
            .unwrap_or_else(|_| Utc::now()),
        ended_at: row
            .try_get::<Option<DateTime<Utc>>, _>("endedAt")
            .ok()
            .flatten(),
        duration_minutes: row
            .try_get::<Option<i32>, _>("durationMinutes")
            .ok()
            .flatten(),
    }
}
