use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::db::operations::sessions::StudySession;
use crate::db::operations::stats::{self, UserActivity, UserStatistics};
use crate::db::DatabaseProxy;
use crate::services::StudyError;

/// Streak and day rollover, UTC calendar dates. Runs against the locked row
/// inside the aggregation transaction; kept pure so the date arithmetic is
/// testable on its own.
pub fn roll_daily_stats(stats: &mut UserStatistics, today: NaiveDate) {
    let same_day = stats.last_activity_date == Some(today);

    if !same_day {
        let yesterday = today - Duration::days(1);
        if stats.last_activity_date == Some(yesterday) {
            stats.current_streak_days += 1;
        } else {
            stats.current_streak_days = 1;
        }
        stats.total_active_days += 1;
        stats.words_learned_today = 0;
        stats.minutes_studied_today = 0;
    }

    stats.longest_streak_days = stats.longest_streak_days.max(stats.current_streak_days);
    stats.last_activity_date = Some(today);
}

/// Folds a closed session into the user's aggregates. The row is locked
/// (`SELECT ... FOR UPDATE`) for the whole read-modify-write, so two
/// completions landing together cannot double-increment the streak.
pub async fn record_session_completion(
    proxy: &DatabaseProxy,
    user_id: &str,
    session: &StudySession,
) -> Result<UserStatistics, StudyError> {
    let mut tx = proxy.pool().begin().await?;

    let mut user_stats = stats::select_statistics_for_update(&mut tx, user_id)
        .await?
        .unwrap_or_else(|| UserStatistics::zeroed(user_id));

    roll_daily_stats(&mut user_stats, Utc::now().date_naive());

    let duration = session.duration_minutes.unwrap_or(0).max(0);
    user_stats.total_sessions += 1;
    user_stats.total_study_minutes += duration;
    user_stats.minutes_studied_today += duration;
    user_stats.words_learned_today += session.words_learned;

    stats::upsert_statistics(&mut tx, &user_stats).await?;
    tx.commit().await?;

    tracing::debug!(
        user_id,
        session_id = %session.id,
        streak = user_stats.current_streak_days,
        "session folded into user statistics"
    );

    Ok(user_stats)
}

/// Lightweight tally behind the "words viewed today" dashboard number.
pub async fn record_word_view(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<UserActivity, StudyError> {
    let mut tx = proxy.pool().begin().await?;

    let mut activity = stats::select_activity_for_update(&mut tx, user_id)
        .await?
        .unwrap_or_else(|| UserActivity::zeroed(user_id));

    let today = Utc::now().date_naive();
    if activity.last_view_date != Some(today) {
        activity.words_viewed_today = 0;
    }
    activity.words_viewed_today += 1;
    activity.total_words_viewed += 1;
    activity.last_view_date = Some(today);

    stats::upsert_activity(&mut tx, &activity).await?;
    tx.commit().await?;

    Ok(activity)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(flatten)]
    pub statistics: UserStatistics,
    pub overall_accuracy: f64,
    pub words_viewed_today: i32,
}

/// Read-only snapshot for the dashboard; absent rows read as all zeros.
pub async fn dashboard_snapshot(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<DashboardStats, StudyError> {
    let pool = proxy.pool();
    let today = Utc::now().date_naive();

    let mut statistics = stats::get_statistics(pool, user_id)
        .await?
        .unwrap_or_else(|| UserStatistics::zeroed(user_id));
    let activity = stats::get_activity(pool, user_id)
        .await?
        .unwrap_or_else(|| UserActivity::zeroed(user_id));

    // Today counters from an earlier date have not rolled over yet; the
    // rollover itself only runs on the next qualifying event.
    if statistics.last_activity_date != Some(today) {
        statistics.words_learned_today = 0;
        statistics.minutes_studied_today = 0;
    }
    let words_viewed_today = if activity.last_view_date == Some(today) {
        activity.words_viewed_today
    } else {
        0
    };

    Ok(DashboardStats {
        overall_accuracy: statistics.overall_accuracy(),
        words_viewed_today,
        statistics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn consecutive_day_extends_the_streak() {
        let mut stats = UserStatistics::zeroed("u-1");
        stats.current_streak_days = 4;
        stats.longest_streak_days = 4;
        stats.last_activity_date = Some(date(2024, 3, 9));

        roll_daily_stats(&mut stats, date(2024, 3, 10));
        assert_eq!(stats.current_streak_days, 5);
        assert_eq!(stats.longest_streak_days, 5);
        assert_eq!(stats.last_activity_date, Some(date(2024, 3, 10)));
    }

    #[test]
    fn second_session_on_the_same_day_does_not_double_increment() {
        let mut stats = UserStatistics::zeroed("u-1");
        stats.current_streak_days = 5;
        stats.longest_streak_days = 5;
        stats.last_activity_date = Some(date(2024, 3, 10));
        stats.minutes_studied_today = 12;

        roll_daily_stats(&mut stats, date(2024, 3, 10));
        assert_eq!(stats.current_streak_days, 5);
        // Same-day counters accumulate instead of resetting.
        assert_eq!(stats.minutes_studied_today, 12);
    }

    #[test]
    fn a_gap_resets_the_streak_but_keeps_the_record() {
        let mut stats = UserStatistics::zeroed("u-1");
        stats.current_streak_days = 10;
        stats.longest_streak_days = 10;
        stats.last_activity_date = Some(date(2024, 3, 5));

        roll_daily_stats(&mut stats, date(2024, 3, 10));
        assert_eq!(stats.current_streak_days, 1);
        assert_eq!(stats.longest_streak_days, 10);
    }

    #[test]
    fn first_ever_activity_starts_a_streak_of_one() {
        let mut stats = UserStatistics::zeroed("u-1");
        roll_daily_stats(&mut stats, date(2024, 3, 10));
        assert_eq!(stats.current_streak_days, 1);
        assert_eq!(stats.longest_streak_days, 1);
        assert_eq!(stats.total_active_days, 1);
    }

    #[test]
    fn day_change_resets_today_counters() {
        let mut stats = UserStatistics::zeroed("u-1");
        stats.last_activity_date = Some(date(2024, 3, 9));
        stats.words_learned_today = 7;
        stats.minutes_studied_today = 40;
        stats.current_streak_days = 1;
        stats.longest_streak_days = 3;

        roll_daily_stats(&mut stats, date(2024, 3, 10));
        assert_eq!(stats.words_learned_today, 0);
        assert_eq!(stats.minutes_studied_today, 0);
        assert_eq!(stats.total_active_days, 1);
    }

    #[test]
    fn streak_never_exceeds_longest() {
        let mut stats = UserStatistics::zeroed("u-1");
        let mut day = date(2024, 1, 1);
        for _ in 0..30 {
            roll_daily_stats(&mut stats, day);
            assert!(stats.current_streak_days <= stats.longest_streak_days);
            day += Duration::days(1);
        }
        assert_eq!(stats.current_streak_days, 30);
    }

    #[test]
    fn accuracy_is_derived_from_cumulative_counters() {
        let mut stats = UserStatistics::zeroed("u-1");
        assert_eq!(stats.overall_accuracy(), 0.0);

        stats.total_attempts = 8;
        stats.total_correct_attempts = 6;
        assert!((stats.overall_accuracy() - 75.0).abs() < 1e-9);
    }
}
