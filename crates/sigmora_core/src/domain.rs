//! crates/sigmora_core/src/domain.rs
//!
//! Defines the pure, core data structures for the marketplace.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How long an issued token (and the session backing it) stays valid.
pub const SESSION_TTL_HOURS: i64 = 5;

/// How long a paid subscription lasts from the moment it is activated.
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

/// Returned by the `FromStr` impls below when a stored value is not a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Lower-cases and trims an email so that lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Creator,
    Subscriber,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Creator => "creator",
            Role::Subscriber => "subscriber",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creator" => Ok(Role::Creator),
            "subscriber" => Ok(Role::Subscriber),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

/// A registered account. Never carries the password hash.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Present only for creators.
    pub academy_code: Option<String>,
    /// Display name of the academy, e.g. "HappyFX". Creators only.
    pub creator_name: Option<String>,
    /// The creator a subscriber joined at registration. Never changes.
    pub subscribed_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_creator(&self) -> bool {
        self.role == Role::Creator
    }
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Everything needed to insert a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub academy_code: Option<String>,
    pub creator_name: Option<String>,
    pub subscribed_to: Option<Uuid>,
}

impl NewUser {
    pub fn creator(
        name: &str,
        email: &str,
        password_hash: String,
        creator_name: Option<&str>,
        academy_code: String,
    ) -> Self {
        let creator_name = creator_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(name.trim());
        Self {
            name: name.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            role: Role::Creator,
            academy_code: Some(academy_code),
            creator_name: Some(creator_name.to_string()),
            subscribed_to: None,
        }
    }

    /// Subscribers get the local part of their email as a default name.
    pub fn subscriber(email: &str, password_hash: String, creator_id: Uuid) -> Self {
        let email = normalize_email(email);
        let name = email.split('@').next().unwrap_or_default().to_string();
        Self {
            name,
            email,
            password_hash,
            role: Role::Subscriber,
            academy_code: None,
            creator_name: None,
            subscribed_to: Some(creator_id),
        }
    }
}

//=========================================================================================
// Sessions
//=========================================================================================

/// Client details recorded alongside a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A server-side record backing exactly one issued bearer token.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub metadata: SessionMetadata,
}

/// The effective state of a session at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Valid,
    /// Still flagged active, but the wall clock is past `expires_at`.
    Expired,
    /// Logged out, logged out everywhere, or superseded by a refresh.
    Invalidated,
}

impl AuthSession {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The single place where (active flag, expiry, now) turn into a state.
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if !self.is_active {
            SessionState::Invalidated
        } else if self.is_past_expiry(now) {
            SessionState::Expired
        } else {
            SessionState::Valid
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub metadata: SessionMetadata,
}

//=========================================================================================
// Catalog: packages, assets, trades
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a creator supplies when creating or editing a package.
#[derive(Debug, Clone)]
pub struct PackageDraft {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub symbol: String,
    pub pip_value: f64,
    pub spread: f64,
    pub margin: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AssetDraft {
    pub symbol: String,
    pub pip_value: f64,
    pub spread: f64,
    pub margin: f64,
}

impl AssetDraft {
    pub fn new(symbol: &str, pip_value: f64, spread: f64, margin: f64) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            pip_value,
            spread,
            margin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }
}

impl FromStr for TradeDirection {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeDirection::Buy),
            "SELL" => Ok(TradeDirection::Sell),
            other => Err(UnknownVariant::new("trade direction", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Active,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Active => "active",
            TradeStatus::Closed => "closed",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TradeStatus::Active),
            "closed" => Ok(TradeStatus::Closed),
            other => Err(UnknownVariant::new("trade status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    Manual,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TakeProfit => "TP",
            CloseReason::StopLoss => "SL",
            CloseReason::Manual => "Manual",
        }
    }
}

impl FromStr for CloseReason {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TP" => Ok(CloseReason::TakeProfit),
            "SL" => Ok(CloseReason::StopLoss),
            "Manual" => Ok(CloseReason::Manual),
            other => Err(UnknownVariant::new("close reason", other)),
        }
    }
}

/// A trading signal, scoped to one or more of its creator's packages.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub asset_id: Uuid,
    pub direction: TradeDirection,
    pub pip: f64,
    pub spread: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub status: TradeStatus,
    pub close_reason: Option<CloseReason>,
    pub closed_at: Option<DateTime<Utc>>,
    pub package_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TradeDraft {
    pub asset_id: Uuid,
    pub direction: TradeDirection,
    pub pip: f64,
    pub spread: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub package_ids: Vec<Uuid>,
}

//=========================================================================================
// Subscriptions (the ledger)
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(UnknownVariant::new("subscription status", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub creator_id: Uuid,
    pub package_id: Uuid,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub payment_reference: String,
    pub amount_paid: f64,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// True when the sweeper should move this row to `Expired`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expiry_date < now
    }
}

/// The input to a ledger activation. `payment_reference` is the idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub subscriber_id: Uuid,
    pub creator_id: Uuid,
    pub package_id: Uuid,
    pub payment_reference: String,
    pub amount_paid: f64,
}

impl NewSubscription {
    /// Builds the row that an activation at `now` would insert.
    pub fn into_subscription(self, now: DateTime<Utc>) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            subscriber_id: self.subscriber_id,
            creator_id: self.creator_id,
            package_id: self.package_id,
            status: SubscriptionStatus::Active,
            start_date: now,
            expiry_date: now + Duration::days(SUBSCRIPTION_PERIOD_DAYS),
            payment_reference: self.payment_reference,
            amount_paid: self.amount_paid,
            created_at: now,
        }
    }
}

/// Result of `SubscriptionLedger::activate`.
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub subscription: Subscription,
    /// False when the payment reference had already been activated.
    pub created: bool,
}

//=========================================================================================
// Payments
//=========================================================================================

/// Ids the payment was initialized with, echoed back by the provider.
/// Kept as raw strings because the provider may return anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentMeta {
    pub subscriber_id: Option<String>,
    pub package_id: Option<String>,
    pub creator_id: Option<String>,
}

/// A verified transaction as reported by the payment provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmation {
    pub status: String,
    pub tx_ref: String,
    pub amount: f64,
    pub meta: PaymentMeta,
}

impl PaymentConfirmation {
    pub fn is_successful(&self) -> bool {
        self.status == "successful"
    }
}

/// What we ask the provider to charge for.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub tx_ref: String,
    pub amount: f64,
    pub currency: String,
    pub redirect_url: String,
    pub customer_email: String,
    pub customer_name: String,
    pub title: String,
    pub description: String,
    pub subscriber_id: Uuid,
    pub package_id: Uuid,
    pub creator_id: Uuid,
}
