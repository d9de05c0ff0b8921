pub mod academy;
pub mod assets;
pub mod auth;
pub mod middleware;
pub mod packages;
pub mod payments;
pub mod rest;
pub mod router;
pub mod state;
pub mod subscriptions;
pub mod trades;
pub mod validation;

// Re-export the router builder so the binary and the tests share one surface.
pub use router::build_router;
