use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::auth::{AttemptLedger, TokenStore};
use crate::AppState;

/// Start the background housekeeping task: sweeps expired tokens, drops
/// attempt records past the retention window and forgets closed rate-limit
/// windows.
pub fn start_housekeeping(state: Arc<AppState>) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config.housekeeping.cleanup_interval_seconds);
    let retention = chrono::Duration::days(state.config.housekeeping.attempt_retention_days);

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            run_housekeeping(state.tokens.clone(), state.ledger.clone(), retention).await;

            let windows =
                state.pin_limiter.purge_expired().await + state.chat_limiter.purge_expired().await;
            if windows > 0 {
                debug!(windows_cleaned = windows, "Closed rate-limit windows cleaned");
            }
        }
    })
}

pub(crate) async fn run_housekeeping(
    tokens: TokenStore,
    ledger: AttemptLedger,
    retention: chrono::Duration,
) {
    debug!("Running housekeeping");

    let result = tokio::task::spawn_blocking(move || {
        let tokens = tokens.purge_expired();
        let attempts = ledger.purge_older_than(retention);
        (tokens, attempts)
    })
    .await;

    let (token_result, attempt_result) = match result {
        Ok(results) => results,
        Err(e) => {
            error!(error = %e, "Housekeeping task panicked");
            return;
        }
    };

    match token_result {
        Ok(count) if count > 0 => debug!(tokens_cleaned = count, "Expired tokens cleaned"),
        Err(e) => error!(error = %e, "Failed to clean up expired tokens"),
        _ => {}
    }

    match attempt_result {
        Ok(count) if count > 0 => debug!(attempts_cleaned = count, "Old PIN attempts cleaned"),
        Err(e) => error!(error = %e, "Failed to clean up old PIN attempts"),
        _ => {}
    }
}
