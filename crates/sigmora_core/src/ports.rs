//! crates/sigmora_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the marketplace core.
//! These traits form the boundary of the hexagonal architecture: the core depends
//! only on them, and the `api` service provides the Postgres, in-memory and
//! payment-provider implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::domain::{
    Activation, Asset, AssetDraft, AuthSession, CloseReason, NewSession, NewSubscription, NewUser,
    Package, PackageDraft, PaymentConfirmation, PaymentRequest, Subscription, Trade, TradeDraft,
    TradeStatus, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The storage-level uniqueness constraints a write can trip over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    Email,
    AcademyCode,
    SessionToken,
    PaymentReference,
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UniqueKey::Email => "email",
            UniqueKey::AcademyCode => "academy code",
            UniqueKey::SessionToken => "session token",
            UniqueKey::PaymentReference => "payment reference",
        };
        f.write_str(name)
    }
}

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Duplicate {0}")]
    Duplicate(UniqueKey),
    /// A write named a row that does not exist.
    #[error("Missing referenced {0}")]
    MissingReference(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports
//=========================================================================================

/// Users, roles and password hashes.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `Duplicate(Email)` or `Duplicate(AcademyCode)` when the
    /// corresponding unique index rejects the row.
    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    /// `email` must already be normalized.
    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn find_creator_by_academy_code(&self, code: &str) -> PortResult<User>;
}

/// One record per issued token.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn create_session(&self, session: NewSession) -> PortResult<AuthSession>;

    /// Returns the session only while its active flag is set. The caller still
    /// has to compare `expires_at` with the wall clock.
    async fn find_active_session(&self, token: &str, user_id: Uuid)
        -> PortResult<Option<AuthSession>>;

    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> PortResult<()>;

    /// Returns whether a session was actually flipped.
    async fn invalidate_session(&self, token: &str, user_id: Uuid) -> PortResult<bool>;

    /// Returns how many sessions were flipped.
    async fn invalidate_all_sessions(&self, user_id: Uuid) -> PortResult<u64>;

    /// Physically removes every session whose expiry is before `now`,
    /// whatever its active flag.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> PortResult<u64>;
}

/// The subscription ledger, authoritative for access rights.
#[async_trait]
pub trait SubscriptionLedger: Send + Sync {
    /// Idempotent on `payment_reference`: a second call with the same reference
    /// returns the stored row with `created == false`.
    async fn activate(&self, entry: NewSubscription, now: DateTime<Utc>) -> PortResult<Activation>;

    /// Newest first.
    async fn list_for_subscriber(&self, subscriber_id: Uuid) -> PortResult<Vec<Subscription>>;

    /// Newest first.
    async fn list_for_creator(&self, creator_id: Uuid) -> PortResult<Vec<Subscription>>;

    /// Moves every active row with `expiry_date < now` to expired and returns
    /// how many rows changed.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> PortResult<u64>;
}

/// Packages, assets and trades owned by creators.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // --- Packages ---
    async fn create_package(&self, creator_id: Uuid, draft: PackageDraft) -> PortResult<Package>;
    async fn get_package(&self, package_id: Uuid) -> PortResult<Package>;
    /// Newest first.
    async fn list_packages_by_creator(&self, creator_id: Uuid) -> PortResult<Vec<Package>>;
    async fn update_package(&self, package_id: Uuid, draft: PackageDraft) -> PortResult<Package>;
    async fn delete_package(&self, package_id: Uuid) -> PortResult<()>;

    // --- Assets ---
    async fn create_asset(&self, creator_id: Uuid, draft: AssetDraft) -> PortResult<Asset>;
    async fn get_asset(&self, asset_id: Uuid) -> PortResult<Asset>;
    /// Newest first.
    async fn list_assets_by_creator(&self, creator_id: Uuid) -> PortResult<Vec<Asset>>;
    async fn update_asset(&self, asset_id: Uuid, draft: AssetDraft) -> PortResult<Asset>;
    async fn delete_asset(&self, asset_id: Uuid) -> PortResult<()>;

    // --- Trades ---
    async fn create_trade(&self, creator_id: Uuid, draft: TradeDraft) -> PortResult<Trade>;
    async fn get_trade(&self, trade_id: Uuid) -> PortResult<Trade>;
    /// Active trades newest first, closed trades most recently closed first.
    async fn list_trades_by_creator(
        &self,
        creator_id: Uuid,
        status: TradeStatus,
    ) -> PortResult<Vec<Trade>>;
    /// Trades with the given status scoped to at least one of `package_ids`,
    /// ordered as in `list_trades_by_creator`.
    async fn list_trades_for_packages(
        &self,
        package_ids: &[Uuid],
        status: TradeStatus,
    ) -> PortResult<Vec<Trade>>;
    async fn close_trade(
        &self,
        trade_id: Uuid,
        reason: CloseReason,
        at: DateTime<Utc>,
    ) -> PortResult<Trade>;
}

//=========================================================================================
// External Service Ports
//=========================================================================================

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a hosted checkout and returns the link the subscriber is sent to.
    async fn initialize_payment(&self, request: &PaymentRequest) -> PortResult<String>;

    /// Asks the provider for the authoritative state of a transaction.
    async fn verify_transaction(&self, transaction_id: &str) -> PortResult<PaymentConfirmation>;
}
