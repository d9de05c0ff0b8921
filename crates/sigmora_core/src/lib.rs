pub mod academy;
pub mod access;
pub mod activation;
pub mod domain;
pub mod ports;

pub use access::{accessible_packages, can_view_trade, summarize, AccessScope, SubscriptionSummary};
pub use activation::{activate_payment, ActivationError};
pub use domain::{
    Activation, Asset, AssetDraft, AuthSession, CloseReason, NewSession, NewSubscription, NewUser,
    Package, PackageDraft, PaymentConfirmation, PaymentMeta, PaymentRequest, Role,
    SessionMetadata, SessionState, Subscription, SubscriptionStatus, Trade, TradeDirection,
    TradeDraft, TradeStatus, User, UserCredentials,
};
pub use ports::{
    CatalogStore, CredentialStore, PaymentProvider, PortError, PortResult, SessionRegistry,
    SubscriptionLedger, UniqueKey,
};
