//! services/api/src/jobs/session_purge.rs
//!
//! Storage retention for the session registry: rows past their expiry are
//! deleted whatever their active flag. Request handling never depends on this
//! job, since the auth gate already rejects expired sessions.

use chrono::{DateTime, Utc};
use sigmora_core::ports::{PortResult, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub async fn run_session_purge(
    sessions: &dyn SessionRegistry,
    now: DateTime<Utc>,
) -> PortResult<u64> {
    let purged = sessions.purge_expired_sessions(now).await?;
    debug!(purged, "purged expired sessions");
    Ok(purged)
}

pub fn spawn_session_purge(
    sessions: Arc<dyn SessionRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await; // skip first immediate tick
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = run_session_purge(sessions.as_ref(), Utc::now()).await {
                        warn!(error = %e, "session purge failed");
                    }
                }
            }
        }
        info!("session purge stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use chrono::Duration as ChronoDuration;
    use sigmora_core::domain::{NewSession, SessionMetadata};
    use uuid::Uuid;

    #[tokio::test]
    async fn purge_keeps_live_sessions() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        for (token, hours) in [("stale", -1), ("live", 1)] {
            store
                .create_session(NewSession {
                    user_id,
                    token: token.to_string(),
                    expires_at: now + ChronoDuration::hours(hours),
                    metadata: SessionMetadata::default(),
                })
                .await
                .unwrap();
        }

        assert_eq!(run_session_purge(&store, now).await.unwrap(), 1);
        assert!(store.find_active_session("live", user_id).await.unwrap().is_some());
        assert!(store.find_active_session("stale", user_id).await.unwrap().is_none());
    }
}
