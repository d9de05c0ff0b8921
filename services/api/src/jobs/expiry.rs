//! services/api/src/jobs/expiry.rs
//!
//! The subscription expiry sweeper: one bulk active -> expired transition for
//! every ledger row whose expiry date has passed.

use chrono::{DateTime, Utc};
use sigmora_core::ports::{PortResult, SubscriptionLedger};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs a single sweep and returns how many subscriptions were expired.
pub async fn run_expiry_sweep(
    ledger: &dyn SubscriptionLedger,
    now: DateTime<Utc>,
) -> PortResult<u64> {
    let expired = ledger.expire_overdue(now).await?;
    if expired > 0 {
        info!(expired, "expired overdue subscriptions");
    }
    Ok(expired)
}

/// Sweeps once immediately, then every `interval` until `cancel` fires.
pub fn spawn_expiry_sweeper(
    ledger: Arc<dyn SubscriptionLedger>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = run_expiry_sweep(ledger.as_ref(), Utc::now()).await {
                        warn!(error = %e, "subscription expiry sweep failed");
                    }
                }
            }
        }
        info!("subscription expiry sweeper stopped");
    })
}
