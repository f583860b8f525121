use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::db::operations::sessions::{self, SessionCounters};
use crate::db::DatabaseProxy;
use crate::services::session;

const DEFAULT_STALE_AFTER_MINUTES: i64 = 120;
const SWEEP_BATCH_SIZE: i64 = 100;

/// Closes sessions abandoned by crashed or navigated-away clients through
/// the normal idempotent close path, so they still feed the statistics
/// aggregator. The running counters on the row become the final tally.
pub async fn close_stale_sessions(db: Arc<DatabaseProxy>) -> Result<(), super::WorkerError> {
    let start = Instant::now();
    debug!("Starting stale session sweep");

    let stale_after = std::env::var("SESSION_STALE_AFTER_MINUTES")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_STALE_AFTER_MINUTES);

    let cutoff = Utc::now() - Duration::minutes(stale_after);
    let stale =
        sessions::select_stale_open_sessions(db.pool(), cutoff, SWEEP_BATCH_SIZE).await?;

    let mut closed = 0i64;
    for open in stale {
        let counters = SessionCounters {
            words_studied: open.words_studied,
            words_learned: open.words_learned,
            correct_answers: open.correct_answers,
            total_answers: open.total_answers,
        };

        match session::end_session(db.as_ref(), &open.user_id, &open.id, counters).await {
            Ok(_) => closed += 1,
            Err(err) => {
                warn!(session_id = %open.id, error = %err, "Failed to close stale session");
            }
        }
    }

    info!(
        closed_sessions = closed,
        duration_secs = format!("{:.2}", start.elapsed().as_secs_f64()),
        "Stale session sweep completed"
    );

    Ok(())
}
