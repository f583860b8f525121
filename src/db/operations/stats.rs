use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Row, Transaction};

/// Per-user aggregate row, created lazily with all-zero defaults. Mutated
/// only by the statistics aggregator (streak transaction) and the cumulative
/// counter bumps from the response processor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub user_id: String,
    pub total_words_learned: i32,
    pub total_words_mastered: i32,
    pub total_study_minutes: i32,
    pub total_sessions: i32,
    pub total_active_days: i32,
    pub current_streak_days: i32,
    pub longest_streak_days: i32,
    pub words_learned_today: i32,
    pub minutes_studied_today: i32,
    pub total_attempts: i32,
    pub total_correct_attempts: i32,
    pub last_activity_date: Option<NaiveDate>,
}

impl UserStatistics {
    pub fn zeroed(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_words_learned: 0,
            total_words_mastered: 0,
            total_study_minutes: 0,
            total_sessions: 0,
            total_active_days: 0,
            current_streak_days: 0,
            longest_streak_days: 0,
            words_learned_today: 0,
            minutes_studied_today: 0,
            total_attempts: 0,
            total_correct_attempts: 0,
            last_activity_date: None,
        }
    }

    pub fn overall_accuracy(&self) -> f64 {
        if self.total_attempts <= 0 {
            return 0.0;
        }
        self.total_correct_attempts as f64 / self.total_attempts as f64 * 100.0
    }
}

/// Lightweight per-user view tally with its own day rollover.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub user_id: String,
    pub words_viewed_today: i32,
    pub total_words_viewed: i32,
    pub last_view_date: Option<NaiveDate>,
}

impl UserActivity {
    pub fn zeroed(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            words_viewed_today: 0,
            total_words_viewed: 0,
            last_view_date: None,
        }
    }
}

pub async fn get_statistics(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<UserStatistics>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "userId", "totalWordsLearned", "totalWordsMastered", "totalStudyMinutes",
               "totalSessions", "totalActiveDays", "currentStreakDays", "longestStreakDays",
               "wordsLearnedToday", "minutesStudiedToday", "totalAttempts",
               "totalCorrectAttempts", "lastActivityDate"
        FROM "user_statistics"
        WHERE "userId" = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_statistics(&r)))
}

/// Locks the user's aggregate row for the duration of the streak
/// transaction so two session completions cannot interleave.
pub async fn select_statistics_for_update(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
) -> Result<Option<UserStatistics>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "userId", "totalWordsLearned", "totalWordsMastered", "totalStudyMinutes",
               "totalSessions", "totalActiveDays", "currentStreakDays", "longestStreakDays",
               "wordsLearnedToday", "minutesStudiedToday", "totalAttempts",
               "totalCorrectAttempts", "lastActivityDate"
        FROM "user_statistics"
        WHERE "userId" = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|r| map_statistics(&r)))
}

/// Writes the aggregator-owned columns. The cumulative attempt and
/// learned/mastered counters are owned by `bump_progress_counters` and left
/// alone here so racing ratings never lose increments.
pub async fn upsert_statistics(
    tx: &mut Transaction<'_, Postgres>,
    stats: &UserStatistics,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "user_statistics"
            ("userId", "totalStudyMinutes", "totalSessions", "totalActiveDays",
             "currentStreakDays", "longestStreakDays", "wordsLearnedToday",
             "minutesStudiedToday", "lastActivityDate", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
        ON CONFLICT ("userId") DO UPDATE SET
            "totalStudyMinutes" = EXCLUDED."totalStudyMinutes",
            "totalSessions" = EXCLUDED."totalSessions",
            "totalActiveDays" = EXCLUDED."totalActiveDays",
            "currentStreakDays" = EXCLUDED."currentStreakDays",
            "longestStreakDays" = EXCLUDED."longestStreakDays",
            "wordsLearnedToday" = EXCLUDED."wordsLearnedToday",
            "minutesStudiedToday" = EXCLUDED."minutesStudiedToday",
            "lastActivityDate" = EXCLUDED."lastActivityDate",
            "updatedAt" = NOW()
        "#,
    )
    .bind(&stats.user_id)
    .bind(stats.total_study_minutes)
    .bind(stats.total_sessions)
    .bind(stats.total_active_days)
    .bind(stats.current_streak_days)
    .bind(stats.longest_streak_days)
    .bind(stats.words_learned_today)
    .bind(stats.minutes_studied_today)
    .bind(stats.last_activity_date)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Commutative cumulative bumps from the response processor. A single
/// upsert so racing ratings never lose increments; the attempt counters are
/// deliberately not overwritten by the streak transaction above.
pub async fn bump_progress_counters(
    pool: &PgPool,
    user_id: &str,
    correct: bool,
    became_learned: bool,
    became_mastered: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "user_statistics"
            ("userId", "totalAttempts", "totalCorrectAttempts",
             "totalWordsLearned", "totalWordsMastered", "updatedAt")
        VALUES ($1, 1, $2, $3, $4, NOW())
        ON CONFLICT ("userId") DO UPDATE SET
            "totalAttempts" = "user_statistics"."totalAttempts" + 1,
            "totalCorrectAttempts" = "user_statistics"."totalCorrectAttempts" + $2,
            "totalWordsLearned" = "user_statistics"."totalWordsLearned" + $3,
            "totalWordsMastered" = "user_statistics"."totalWordsMastered" + $4,
            "updatedAt" = NOW()
        "#,
    )
    .bind(user_id)
    .bind(if correct { 1 } else { 0 })
    .bind(if became_learned { 1 } else { 0 })
    .bind(if became_mastered { 1 } else { 0 })
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_activity(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<UserActivity>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "userId", "wordsViewedToday", "totalWordsViewed", "lastViewDate"
        FROM "user_activity"
        WHERE "userId" = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_activity(&r)))
}

pub async fn select_activity_for_update(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
) -> Result<Option<UserActivity>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "userId", "wordsViewedToday", "totalWordsViewed", "lastViewDate"
        FROM "user_activity"
        WHERE "userId" = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|r| map_activity(&r)))
}

pub async fn upsert_activity(
    tx: &mut Transaction<'_, Postgres>,
    activity: &UserActivity,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "user_activity"
            ("userId", "wordsViewedToday", "totalWordsViewed", "lastViewDate", "updatedAt")
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT ("userId") DO UPDATE SET
            "wordsViewedToday" = EXCLUDED."wordsViewedToday",
            "totalWordsViewed" = EXCLUDED."totalWordsViewed",
            "lastViewDate" = EXCLUDED."lastViewDate",
            "updatedAt" = NOW()
        "#,
    )
    .bind(&activity.user_id)
    .bind(activity.words_viewed_today)
    .bind(activity.total_words_viewed)
    .bind(activity.last_view_date)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn map_statistics(row: &sqlx::postgres::PgRow) -> UserStatistics {
    UserStatistics {
        user_id: row.try_get("userId").unwrap_or_default(),
        total_words_learned: row.try_get("totalWordsLearned").unwrap_or(0),
        total_words_mastered: row.try_get("totalWordsMastered").unwrap_or(0),
        total_study_minutes: row.try_get("totalStudyMinutes").unwrap_or(0),
        total_sessions: row.try_get("totalSessions").unwrap_or(0),
        total_active_days: row.try_get("totalActiveDays").unwrap_or(0),
        current_streak_days: row.try_get("currentStreakDays").unwrap_or(0),
        longest_streak_days: row.try_get("longestStreakDays").unwrap_or(0),
        words_learned_today: row.try_get("wordsLearnedToday").unwrap_or(0),
        minutes_studied_today: row.try_get("minutesStudiedToday").unwrap_or(0),
        total_attempts: row.try_get("totalAttempts").unwrap_or(0),
        total_correct_attempts: row.try_get("totalCorrectAttempts").unwrap_or(0),
        last_activity_date: row
            .try_get::<Option<NaiveDate>, _>("lastActivityDate")
            .ok()
            .flatten(),
    }
}

fn map_activity(row: &sqlx::postgres::PgRow) -> UserActivity {
    UserActivity {
        user_id: row.try_get("userId").unwrap_or_default(),
        words_viewed_today: row.try_get("wordsViewedToday").unwrap_or(0),
        total_words_viewed: row.try_get("totalWordsViewed").unwrap_or(0),
        last_view_date: row
            .try_get::<Option<NaiveDate>, _>("lastViewDate")
            .ok()
            .flatten(),
    }
}
