//! Property-Based Tests for the learning-state and streak invariants
//!
//! Tests the following invariants:
//! - Attempt counters: 0 <= correct_attempts <= attempts after any rating sequence
//! - Interval bounds: every transition schedules a positive, capped interval
//! - Forgot always demotes out of Learned/Mastered
//! - Streaks: current_streak_days <= longest_streak_days after any day sequence

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use kotoba_backend_rust::db::operations::progress::LearningStatus;
use kotoba_backend_rust::db::operations::stats::UserStatistics;
use kotoba_backend_rust::services::review::{apply_rating, Difficulty};
use kotoba_backend_rust::services::statistics::roll_daily_stats;

fn arb_rating() -> impl Strategy<Value = Difficulty> {
    prop_oneof![
        Just(Difficulty::Easy),
        Just(Difficulty::Hard),
        Just(Difficulty::Forgot),
    ]
}

proptest! {
    #[test]
    fn attempts_dominate_correct_attempts(
        ratings in prop::collection::vec(arb_rating(), 1..60)
    ) {
        let mut status = LearningStatus::New;
        let mut consecutive_easy = 0;
        let mut interval_days = 0.0;
        let mut attempts = 0i32;
        let mut correct_attempts = 0i32;

        for rating in ratings {
            let transition = apply_rating(status, consecutive_easy, interval_days, rating);

            attempts += 1;
            if rating.is_recalled() {
                correct_attempts += 1;
            }

            prop_assert!(correct_attempts >= 0);
            prop_assert!(correct_attempts <= attempts);
            prop_assert!(transition.interval_days > 0.0);
            prop_assert!(transition.interval_days <= 180.0);

            status = transition.status;
            consecutive_easy = transition.consecutive_easy;
            interval_days = transition.interval_days;
        }
    }

    #[test]
    fn forgot_always_lands_in_learning(
        ratings in prop::collection::vec(arb_rating(), 0..40)
    ) {
        let mut status = LearningStatus::New;
        let mut consecutive_easy = 0;
        let mut interval_days = 0.0;

        for rating in ratings {
            let transition = apply_rating(status, consecutive_easy, interval_days, rating);
            if rating == Difficulty::Forgot {
                prop_assert_eq!(transition.status, LearningStatus::Learning);
                prop_assert_eq!(transition.consecutive_easy, 0);
            }
            status = transition.status;
            consecutive_easy = transition.consecutive_easy;
            interval_days = transition.interval_days;
        }
    }

    #[test]
    fn mastery_requires_at_least_two_ratings(
        ratings in prop::collection::vec(arb_rating(), 1..10)
    ) {
        let mut status = LearningStatus::New;
        let mut consecutive_easy = 0;
        let mut interval_days = 0.0;

        for (index, rating) in ratings.into_iter().enumerate() {
            let transition = apply_rating(status, consecutive_easy, interval_days, rating);
            if index == 0 {
                // The first rating can fast-track to Learned but never further.
                prop_assert_ne!(transition.status, LearningStatus::Mastered);
            }
            status = transition.status;
            consecutive_easy = transition.consecutive_easy;
            interval_days = transition.interval_days;
        }
    }

    #[test]
    fn current_streak_never_exceeds_longest(
        day_steps in prop::collection::vec(0i64..6, 1..50)
    ) {
        let mut stats = UserStatistics::zeroed("prop-user");
        let mut day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        for step in day_steps {
            day += Duration::days(step);
            roll_daily_stats(&mut stats, day);

            prop_assert!(stats.current_streak_days >= 1);
            prop_assert!(stats.current_streak_days <= stats.longest_streak_days);
            prop_assert_eq!(stats.last_activity_date, Some(day));
        }
    }
}
