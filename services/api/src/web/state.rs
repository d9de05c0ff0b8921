//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::token::TokenService;
use sigmora_core::ports::{
    CatalogStore, CredentialStore, PaymentProvider, SessionRegistry, SubscriptionLedger,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionRegistry>,
    pub ledger: Arc<dyn SubscriptionLedger>,
    pub catalog: Arc<dyn CatalogStore>,
    pub payments: Arc<dyn PaymentProvider>,
    pub tokens: Arc<TokenService>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires every storage port to one store and signs tokens with the
    /// configured secret.
    pub fn new<S>(store: Arc<S>, payments: Arc<dyn PaymentProvider>, config: Arc<Config>) -> Self
    where
        S: CredentialStore + SessionRegistry + SubscriptionLedger + CatalogStore + 'static,
    {
        Self {
            users: store.clone(),
            sessions: store.clone(),
            ledger: store.clone(),
            catalog: store,
            payments,
            tokens: Arc::new(TokenService::new(&config.jwt_secret)),
            config,
        }
    }
}
