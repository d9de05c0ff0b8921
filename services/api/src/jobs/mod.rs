//! services/api/src/jobs/mod.rs
//!
//! Recurring background work. Every job runs on its own tokio task, logs its
//! failures and retries on the next tick, and stops when the shared
//! `CancellationToken` is cancelled at shutdown.

pub mod expiry;
pub mod session_purge;

pub use expiry::{run_expiry_sweep, spawn_expiry_sweeper};
pub use session_purge::{run_session_purge, spawn_session_purge};
