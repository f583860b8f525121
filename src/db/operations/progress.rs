use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use crate::db::operations::words::{map_word, Word};

/// Lifecycle stage of a word for one user. Stored as SCREAMING_SNAKE text;
/// `parse` folds the legacy values still present in older rows
/// ("STUDIED" -> Learned, "VIEWED" -> New).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningStatus {
    New,
    Learning,
    Learned,
    Mastered,
}

impl Default for LearningStatus {
    fn default() -> Self {
        Self::New
    }
}

impl LearningStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "LEARNING" => Self::Learning,
            "LEARNED" | "STUDIED" => Self::Learned,
            "MASTERED" => Self::Mastered,
            _ => Self::New,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Learning => "LEARNING",
            Self::Learned => "LEARNED",
            Self::Mastered => "MASTERED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordProgress {
    pub id: String,
    pub user_id: String,
    pub word_id: String,
    pub status: LearningStatus,
    pub attempts: i32,
    pub correct_attempts: i32,
    pub consecutive_easy: i32,
    pub interval_days: f64,
    pub last_studied_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub version: i32,
}

/// Catalog entry joined with the requesting user's progress, as handed to
/// the scheduler and returned in a study batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyCard {
    pub word: Word,
    pub progress: Option<WordProgress>,
}

pub async fn get_progress(
    pool: &PgPool,
    user_id: &str,
    word_id: &str,
) -> Result<Option<WordProgress>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "userId", "wordId", "status", "attempts", "correctAttempts",
               "consecutiveEasy", "intervalDays", "lastStudiedAt", "nextReviewAt", "version"
        FROM "word_progress"
        WHERE "userId" = $1 AND "wordId" = $2
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(word_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_progress(&r)))
}

/// Lazily creates the per-(user, word) record. Returns false when another
/// writer created the row first; the caller re-reads and goes through the
/// versioned update path instead.
pub async fn insert_progress_if_absent(
    pool: &PgPool,
    progress: &WordProgress,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO "word_progress"
            ("id", "userId", "wordId", "status", "attempts", "correctAttempts",
             "consecutiveEasy", "intervalDays", "lastStudiedAt", "nextReviewAt",
             "version", "createdAt", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
        ON CONFLICT ("userId", "wordId") DO NOTHING
        "#,
    )
    .bind(&progress.id)
    .bind(&progress.user_id)
    .bind(&progress.word_id)
    .bind(progress.status.as_str())
    .bind(progress.attempts)
    .bind(progress.correct_attempts)
    .bind(progress.consecutive_easy)
    .bind(progress.interval_days)
    .bind(progress.last_studied_at)
    .bind(progress.next_review_at)
    .bind(progress.version)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Single-statement compare-and-swap on the row version. Returns false when
/// the expected version lost a race, leaving the row untouched.
pub async fn update_progress_versioned(
    pool: &PgPool,
    progress: &WordProgress,
    expected_version: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "word_progress" SET
            "status" = $1,
            "attempts" = $2,
            "correctAttempts" = $3,
            "consecutiveEasy" = $4,
            "intervalDays" = $5,
            "lastStudiedAt" = $6,
            "nextReviewAt" = $7,
            "version" = $8 + 1,
            "updatedAt" = NOW()
        WHERE "userId" = $9 AND "wordId" = $10 AND "version" = $8
        "#,
    )
    .bind(progress.status.as_str())
    .bind(progress.attempts)
    .bind(progress.correct_attempts)
    .bind(progress.consecutive_easy)
    .bind(progress.interval_days)
    .bind(progress.last_studied_at)
    .bind(progress.next_review_at)
    .bind(expected_version)
    .bind(&progress.user_id)
    .bind(&progress.word_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Words with a review scheduled at or before `now`, oldest due first.
pub async fn select_due_cards(
    pool: &PgPool,
    user_id: &str,
    category_id: Option<&str>,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<StudyCard>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT w."id", w."categoryId", w."script", w."romaji", w."translation",
               w."difficultyLevel", w."frequencyRank", w."isActive",
               p."id" AS "pId", p."userId" AS "pUserId", p."status" AS "pStatus",
               p."attempts" AS "pAttempts", p."correctAttempts" AS "pCorrectAttempts",
               p."consecutiveEasy" AS "pConsecutiveEasy", p."intervalDays" AS "pIntervalDays",
               p."lastStudiedAt" AS "pLastStudiedAt", p."nextReviewAt" AS "pNextReviewAt",
               p."version" AS "pVersion"
        FROM "word_progress" p
        JOIN "words" w ON w."id" = p."wordId"
        WHERE p."userId" = $1
          AND w."isActive" = TRUE
          AND ($2::text IS NULL OR w."categoryId" = $2)
          AND p."nextReviewAt" IS NOT NULL AND p."nextReviewAt" <= $3
          AND p."status" IN ('LEARNING', 'LEARNED')
        ORDER BY p."nextReviewAt" ASC, w."id" ASC
        LIMIT $4
        "#,
    )
    .bind(user_id)
    .bind(category_id)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(map_joined_card).collect())
}

/// Active words the user has not meaningfully touched yet: no progress row,
/// or one still at NEW. Ordered easiest/most common first.
pub async fn select_new_cards(
    pool: &PgPool,
    user_id: &str,
    category_id: Option<&str>,
    limit: i64,
) -> Result<Vec<StudyCard>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT w."id", w."categoryId", w."script", w."romaji", w."translation",
               w."difficultyLevel", w."frequencyRank", w."isActive",
               p."id" AS "pId", p."userId" AS "pUserId", p."status" AS "pStatus",
               p."attempts" AS "pAttempts", p."correctAttempts" AS "pCorrectAttempts",
               p."consecutiveEasy" AS "pConsecutiveEasy", p."intervalDays" AS "pIntervalDays",
               p."lastStudiedAt" AS "pLastStudiedAt", p."nextReviewAt" AS "pNextReviewAt",
               p."version" AS "pVersion"
        FROM "words" w
        LEFT JOIN "word_progress" p ON p."wordId" = w."id" AND p."userId" = $1
        WHERE w."isActive" = TRUE
          AND ($2::text IS NULL OR w."categoryId" = $2)
          AND (p."id" IS NULL OR p."status" = 'NEW')
        ORDER BY w."frequencyRank" ASC NULLS LAST, w."difficultyLevel" ASC, w."id" ASC
        LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(category_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(map_joined_card).collect())
}

fn map_progress(row: &sqlx::postgres::PgRow) -> WordProgress {
    WordProgress {
        id: row.try_get("id").unwrap_or_default(),
        user_id: row.try_get("userId").unwrap_or_default(),
        word_id: row.try_get("wordId").unwrap_or_default(),
        status: LearningStatus::parse(
            row.try_get::<String, _>("status").unwrap_or_default().as_str(),
        ),
        attempts: row.try_get("attempts").unwrap_or(0),
        correct_attempts: row.try_get("correctAttempts").unwrap_or(0),
        consecutive_easy: row.try_get("consecutiveEasy").unwrap_or(0),
        interval_days: row.try_get("intervalDays").unwrap_or(0.0),
        last_studied_at: row
            .try_get::<Option<DateTime<Utc>>, _>("lastStudiedAt")
            .ok()
            .flatten(),
        next_review_at: row
            .try_get::<Option<DateTime<Utc>>, _>("nextReviewAt")
            .ok()
            .flatten(),
        version: row.try_get("version").unwrap_or(1),
    }
}

fn map_joined_card(row: &sqlx::postgres::PgRow) -> StudyCard {
    let word = map_word(row);
    let progress_id: Option<String> = row.try_get::<Option<String>, _>("pId").ok().flatten();

    let progress = progress_id.map(|id| WordProgress {
        id,
        user_id: row.try_get("pUserId").unwrap_or_default(),
        word_id: word.id.clone(),
        status: LearningStatus::parse(
            row.try_get::<String, _>("pStatus").unwrap_or_default().as_str(),
        ),
        attempts: row.try_get("pAttempts").unwrap_or(0),
        correct_attempts: row.try_get("pCorrectAttempts").unwrap_or(0),
        consecutive_easy: row.try_get("pConsecutiveEasy").unwrap_or(0),
        interval_days: row.try_get("pIntervalDays").unwrap_or(0.0),
        last_studied_at: row
            .try_get::<Option<DateTime<Utc>>, _>("pLastStudiedAt")
            .ok()
            .flatten(),
        next_review_at: row
            .try_get::<Option<DateTime<Utc>>, _>("pNextReviewAt")
            .ok()
            .flatten(),
        version: row.try_get("pVersion").unwrap_or(1),
    });

    StudyCard { word, progress }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            LearningStatus::New,
            LearningStatus::Learning,
            LearningStatus::Learned,
            LearningStatus::Mastered,
        ] {
            assert_eq!(LearningStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn legacy_status_values_are_folded() {
        assert_eq!(LearningStatus::parse("STUDIED"), LearningStatus::Learned);
        assert_eq!(LearningStatus::parse("VIEWED"), LearningStatus::New);
        assert_eq!(LearningStatus::parse("studied"), LearningStatus::Learned);
        assert_eq!(LearningStatus::parse(""), LearningStatus::New);
    }
}
