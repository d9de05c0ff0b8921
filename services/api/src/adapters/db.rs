//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! storage ports from the `core` crate (`CredentialStore`, `SessionRegistry`,
//! `SubscriptionLedger`, `CatalogStore`). It handles all interactions with the
//! PostgreSQL database using `sqlx`.
//!
//! Uniqueness (email, academy code, session token, payment reference) is enforced
//! by unique indexes; violations come back as `PortError::Duplicate`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sigmora_core::domain::{
    Activation, Asset, AssetDraft, AuthSession, CloseReason, NewSession, NewSubscription, NewUser,
    Package, PackageDraft, SessionMetadata, Subscription, Trade, TradeDraft, TradeStatus, User,
    UserCredentials,
};
use sigmora_core::ports::{
    CatalogStore, CredentialStore, PortError, PortResult, SessionRegistry, SubscriptionLedger,
    UniqueKey,
};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every storage port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn parse_enum<T: FromStr>(raw: &str) -> PortResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| PortError::Unexpected(e.to_string()))
}

/// Maps a failed write, turning unique-index violations into `Duplicate` and
/// foreign-key violations into `MissingReference`.
fn write_error(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_foreign_key_violation() {
            let what = db_err.constraint().unwrap_or("row").to_string();
            return PortError::MissingReference(what);
        }
        if db_err.is_unique_violation() {
            let key = match db_err.constraint() {
                Some("users_email_key") => Some(UniqueKey::Email),
                Some("users_academy_code_key") => Some(UniqueKey::AcademyCode),
                Some("sessions_token_key") => Some(UniqueKey::SessionToken),
                Some("subscriptions_payment_reference_key") => Some(UniqueKey::PaymentReference),
                _ => None,
            };
            if let Some(key) = key {
                return PortError::Duplicate(key);
            }
        }
    }
    PortError::Unexpected(e.to_string())
}

fn read_error(what: impl FnOnce() -> String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    academy_code: Option<String>,
    creator_name: Option<String>,
    subscribed_to: Option<Uuid>,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role: parse_enum(&self.role)?,
            academy_code: self.academy_code,
            creator_name: self.creator_name,
            subscribed_to: self.subscribed_to,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    #[sqlx(flatten)]
    user: UserRecord,
    password_hash: String,
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    token: String,
    expires_at: DateTime<Utc>,
    is_active: bool,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> AuthSession {
        AuthSession {
            id: self.id,
            user_id: self.user_id,
            token: self.token,
            expires_at: self.expires_at,
            is_active: self.is_active,
            created_at: self.created_at,
            last_activity: self.last_activity,
            metadata: SessionMetadata {
                ip_address: self.ip_address,
                user_agent: self.user_agent,
            },
        }
    }
}

#[derive(FromRow)]
struct SubscriptionRecord {
    id: Uuid,
    subscriber_id: Uuid,
    creator_id: Uuid,
    package_id: Uuid,
    status: String,
    start_date: DateTime<Utc>,
    expiry_date: DateTime<Utc>,
    payment_reference: String,
    amount_paid: f64,
    created_at: DateTime<Utc>,
}
impl SubscriptionRecord {
    fn to_domain(self) -> PortResult<Subscription> {
        Ok(Subscription {
            id: self.id,
            subscriber_id: self.subscriber_id,
            creator_id: self.creator_id,
            package_id: self.package_id,
            status: parse_enum(&self.status)?,
            start_date: self.start_date,
            expiry_date: self.expiry_date,
            payment_reference: self.payment_reference,
            amount_paid: self.amount_paid,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct PackageRecord {
    id: Uuid,
    creator_id: Uuid,
    name: String,
    description: String,
    price: f64,
    features: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl PackageRecord {
    fn to_domain(self) -> Package {
        Package {
            id: self.id,
            creator_id: self.creator_id,
            name: self.name,
            description: self.description,
            price: self.price,
            features: self.features,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct AssetRecord {
    id: Uuid,
    creator_id: Uuid,
    symbol: String,
    pip_value: f64,
    spread: f64,
    margin: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl AssetRecord {
    fn to_domain(self) -> Asset {
        Asset {
            id: self.id,
            creator_id: self.creator_id,
            symbol: self.symbol,
            pip_value: self.pip_value,
            spread: self.spread,
            margin: self.margin,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct TradeRecord {
    id: Uuid,
    creator_id: Uuid,
    asset_id: Uuid,
    direction: String,
    pip: f64,
    spread: f64,
    take_profit: f64,
    stop_loss: f64,
    status: String,
    close_reason: Option<String>,
    closed_at: Option<DateTime<Utc>>,
    package_ids: Vec<Uuid>,
    created_at: DateTime<Utc>,
}
impl TradeRecord {
    fn to_domain(self) -> PortResult<Trade> {
        Ok(Trade {
            id: self.id,
            creator_id: self.creator_id,
            asset_id: self.asset_id,
            direction: parse_enum(&self.direction)?,
            pip: self.pip,
            spread: self.spread,
            take_profit: self.take_profit,
            stop_loss: self.stop_loss,
            status: parse_enum(&self.status)?,
            close_reason: self
                .close_reason
                .as_deref()
                .map(parse_enum::<CloseReason>)
                .transpose()?,
            closed_at: self.closed_at,
            package_ids: self.package_ids,
            created_at: self.created_at,
        })
    }
}

fn trades_to_domain(records: Vec<TradeRecord>) -> PortResult<Vec<Trade>> {
    records.into_iter().map(TradeRecord::to_domain).collect()
}

fn subscriptions_to_domain(records: Vec<SubscriptionRecord>) -> PortResult<Vec<Subscription>> {
    records.into_iter().map(SubscriptionRecord::to_domain).collect()
}

//=========================================================================================
// `CredentialStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CredentialStore for DbAdapter {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, name, email, password_hash, role, academy_code, creator_name, subscribed_to) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, name, email, role, academy_code, creator_name, subscribed_to, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.academy_code)
        .bind(&user.creator_name)
        .bind(user.subscribed_to)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        record.to_domain()
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, role, academy_code, creator_name, subscribed_to, created_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(read_error(|| format!("User {} not found", user_id)))?
        .to_domain()
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, name, email, role, academy_code, creator_name, subscribed_to, created_at, password_hash \
             FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(read_error(|| "User not found".to_string()))?;
        Ok(UserCredentials {
            user: record.user.to_domain()?,
            password_hash: record.password_hash,
        })
    }

    async fn find_creator_by_academy_code(&self, code: &str) -> PortResult<User> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, role, academy_code, creator_name, subscribed_to, created_at \
             FROM users WHERE academy_code = $1 AND role = 'creator'",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(read_error(|| format!("Academy {} not found", code)))?
        .to_domain()
    }
}

//=========================================================================================
// `SessionRegistry` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionRegistry for DbAdapter {
    async fn create_session(&self, session: NewSession) -> PortResult<AuthSession> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "INSERT INTO sessions (id, user_id, token, expires_at, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, user_id, token, expires_at, is_active, ip_address, user_agent, created_at, last_activity",
        )
        .bind(Uuid::new_v4())
        .bind(session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(&session.metadata.ip_address)
        .bind(&session.metadata.user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(record.to_domain())
    }

    async fn find_active_session(
        &self,
        token: &str,
        user_id: Uuid,
    ) -> PortResult<Option<AuthSession>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, user_id, token, expires_at, is_active, ip_address, user_agent, created_at, last_activity \
             FROM sessions WHERE token = $1 AND user_id = $2 AND is_active",
        )
        .bind(token)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("UPDATE sessions SET last_activity = $2 WHERE id = $1")
            .bind(session_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn invalidate_session(&self, token: &str, user_id: Uuid) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = FALSE WHERE token = $1 AND user_id = $2 AND is_active",
        )
        .bind(token)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }

    async fn invalidate_all_sessions(&self, user_id: Uuid) -> PortResult<u64> {
        let result =
            sqlx::query("UPDATE sessions SET is_active = FALSE WHERE user_id = $1 AND is_active")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}

//=========================================================================================
// `SubscriptionLedger` Trait Implementation
//=========================================================================================

#[async_trait]
impl SubscriptionLedger for DbAdapter {
    async fn activate(&self, entry: NewSubscription, now: DateTime<Utc>) -> PortResult<Activation> {
        let payment_reference = entry.payment_reference.clone();
        let candidate = entry.into_subscription(now);

        // The unique index decides the race; losers fall through to the read.
        let inserted = sqlx::query_as::<_, SubscriptionRecord>(
            "INSERT INTO subscriptions \
             (id, subscriber_id, creator_id, package_id, status, start_date, expiry_date, payment_reference, amount_paid, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (payment_reference) DO NOTHING \
             RETURNING id, subscriber_id, creator_id, package_id, status, start_date, expiry_date, payment_reference, amount_paid, created_at",
        )
        .bind(candidate.id)
        .bind(candidate.subscriber_id)
        .bind(candidate.creator_id)
        .bind(candidate.package_id)
        .bind(candidate.status.as_str())
        .bind(candidate.start_date)
        .bind(candidate.expiry_date)
        .bind(&candidate.payment_reference)
        .bind(candidate.amount_paid)
        .bind(candidate.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)?;

        if let Some(record) = inserted {
            return Ok(Activation {
                subscription: record.to_domain()?,
                created: true,
            });
        }

        let existing = sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT id, subscriber_id, creator_id, package_id, status, start_date, expiry_date, payment_reference, amount_paid, created_at \
             FROM subscriptions WHERE payment_reference = $1",
        )
        .bind(&payment_reference)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(Activation {
            subscription: existing.to_domain()?,
            created: false,
        })
    }

    async fn list_for_subscriber(&self, subscriber_id: Uuid) -> PortResult<Vec<Subscription>> {
        let records = sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT id, subscriber_id, creator_id, package_id, status, start_date, expiry_date, payment_reference, amount_paid, created_at \
             FROM subscriptions WHERE subscriber_id = $1 ORDER BY created_at DESC",
        )
        .bind(subscriber_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        subscriptions_to_domain(records)
    }

    async fn list_for_creator(&self, creator_id: Uuid) -> PortResult<Vec<Subscription>> {
        let records = sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT id, subscriber_id, creator_id, package_id, status, start_date, expiry_date, payment_reference, amount_paid, created_at \
             FROM subscriptions WHERE creator_id = $1 ORDER BY created_at DESC",
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        subscriptions_to_domain(records)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'expired' WHERE status = 'active' AND expiry_date < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}

//=========================================================================================
// `CatalogStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogStore for DbAdapter {
    // --- Packages ---

    async fn create_package(&self, creator_id: Uuid, draft: PackageDraft) -> PortResult<Package> {
        let record = sqlx::query_as::<_, PackageRecord>(
            "INSERT INTO packages (id, creator_id, name, description, price, features) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, creator_id, name, description, price, features, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(creator_id)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.price)
        .bind(&draft.features)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(record.to_domain())
    }

    async fn get_package(&self, package_id: Uuid) -> PortResult<Package> {
        let record = sqlx::query_as::<_, PackageRecord>(
            "SELECT id, creator_id, name, description, price, features, created_at, updated_at \
             FROM packages WHERE id = $1",
        )
        .bind(package_id)
        .fetch_one(&self.pool)
        .await
        .map_err(read_error(|| "Package not found".to_string()))?;
        Ok(record.to_domain())
    }

    async fn list_packages_by_creator(&self, creator_id: Uuid) -> PortResult<Vec<Package>> {
        let records = sqlx::query_as::<_, PackageRecord>(
            "SELECT id, creator_id, name, description, price, features, created_at, updated_at \
             FROM packages WHERE creator_id = $1 ORDER BY created_at DESC",
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(PackageRecord::to_domain).collect())
    }

    async fn update_package(&self, package_id: Uuid, draft: PackageDraft) -> PortResult<Package> {
        let record = sqlx::query_as::<_, PackageRecord>(
            "UPDATE packages SET name = $2, description = $3, price = $4, features = $5, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, creator_id, name, description, price, features, created_at, updated_at",
        )
        .bind(package_id)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.price)
        .bind(&draft.features)
        .fetch_one(&self.pool)
        .await
        .map_err(read_error(|| "Package not found".to_string()))?;
        Ok(record.to_domain())
    }

    async fn delete_package(&self, package_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM packages WHERE id = $1")
            .bind(package_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound("Package not found".to_string()));
        }
        Ok(())
    }

    // --- Assets ---

    async fn create_asset(&self, creator_id: Uuid, draft: AssetDraft) -> PortResult<Asset> {
        let record = sqlx::query_as::<_, AssetRecord>(
            "INSERT INTO assets (id, creator_id, symbol, pip_value, spread, margin) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, creator_id, symbol, pip_value, spread, margin, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(creator_id)
        .bind(&draft.symbol)
        .bind(draft.pip_value)
        .bind(draft.spread)
        .bind(draft.margin)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(record.to_domain())
    }

    async fn get_asset(&self, asset_id: Uuid) -> PortResult<Asset> {
        let record = sqlx::query_as::<_, AssetRecord>(
            "SELECT id, creator_id, symbol, pip_value, spread, margin, created_at, updated_at \
             FROM assets WHERE id = $1",
        )
        .bind(asset_id)
        .fetch_one(&self.pool)
        .await
        .map_err(read_error(|| "Asset not found".to_string()))?;
        Ok(record.to_domain())
    }

    async fn list_assets_by_creator(&self, creator_id: Uuid) -> PortResult<Vec<Asset>> {
        let records = sqlx::query_as::<_, AssetRecord>(
            "SELECT id, creator_id, symbol, pip_value, spread, margin, created_at, updated_at \
             FROM assets WHERE creator_id = $1 ORDER BY created_at DESC",
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(AssetRecord::to_domain).collect())
    }

    async fn update_asset(&self, asset_id: Uuid, draft: AssetDraft) -> PortResult<Asset> {
        let record = sqlx::query_as::<_, AssetRecord>(
            "UPDATE assets SET symbol = $2, pip_value = $3, spread = $4, margin = $5, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, creator_id, symbol, pip_value, spread, margin, created_at, updated_at",
        )
        .bind(asset_id)
        .bind(&draft.symbol)
        .bind(draft.pip_value)
        .bind(draft.spread)
        .bind(draft.margin)
        .fetch_one(&self.pool)
        .await
        .map_err(read_error(|| "Asset not found".to_string()))?;
        Ok(record.to_domain())
    }

    async fn delete_asset(&self, asset_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM assets WHERE id = $1")
            .bind(asset_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound("Asset not found".to_string()));
        }
        Ok(())
    }

    // --- Trades ---

    async fn create_trade(&self, creator_id: Uuid, draft: TradeDraft) -> PortResult<Trade> {
        let record = sqlx::query_as::<_, TradeRecord>(
            "INSERT INTO trades (id, creator_id, asset_id, direction, pip, spread, take_profit, stop_loss, package_ids) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id, creator_id, asset_id, direction, pip, spread, take_profit, stop_loss, status, close_reason, closed_at, package_ids, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(creator_id)
        .bind(draft.asset_id)
        .bind(draft.direction.as_str())
        .bind(draft.pip)
        .bind(draft.spread)
        .bind(draft.take_profit)
        .bind(draft.stop_loss)
        .bind(&draft.package_ids)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        record.to_domain()
    }

    async fn get_trade(&self, trade_id: Uuid) -> PortResult<Trade> {
        sqlx::query_as::<_, TradeRecord>(
            "SELECT id, creator_id, asset_id, direction, pip, spread, take_profit, stop_loss, status, close_reason, closed_at, package_ids, created_at \
             FROM trades WHERE id = $1",
        )
        .bind(trade_id)
        .fetch_one(&self.pool)
        .await
        .map_err(read_error(|| "Trade not found".to_string()))?
        .to_domain()
    }

    async fn list_trades_by_creator(
        &self,
        creator_id: Uuid,
        status: TradeStatus,
    ) -> PortResult<Vec<Trade>> {
        let sql = match status {
            TradeStatus::Active => {
                "SELECT id, creator_id, asset_id, direction, pip, spread, take_profit, stop_loss, status, close_reason, closed_at, package_ids, created_at \
                 FROM trades WHERE creator_id = $1 AND status = $2 ORDER BY created_at DESC"
            }
            TradeStatus::Closed => {
                "SELECT id, creator_id, asset_id, direction, pip, spread, take_profit, stop_loss, status, close_reason, closed_at, package_ids, created_at \
                 FROM trades WHERE creator_id = $1 AND status = $2 ORDER BY closed_at DESC"
            }
        };
        let records = sqlx::query_as::<_, TradeRecord>(sql)
            .bind(creator_id)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        trades_to_domain(records)
    }

    async fn list_trades_for_packages(
        &self,
        package_ids: &[Uuid],
        status: TradeStatus,
    ) -> PortResult<Vec<Trade>> {
        if package_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = match status {
            TradeStatus::Active => {
                "SELECT id, creator_id, asset_id, direction, pip, spread, take_profit, stop_loss, status, close_reason, closed_at, package_ids, created_at \
                 FROM trades WHERE status = $1 AND package_ids && $2 ORDER BY created_at DESC"
            }
            TradeStatus::Closed => {
                "SELECT id, creator_id, asset_id, direction, pip, spread, take_profit, stop_loss, status, close_reason, closed_at, package_ids, created_at \
                 FROM trades WHERE status = $1 AND package_ids && $2 ORDER BY closed_at DESC"
            }
        };
        let records = sqlx::query_as::<_, TradeRecord>(sql)
            .bind(status.as_str())
            .bind(package_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        trades_to_domain(records)
    }

    async fn close_trade(
        &self,
        trade_id: Uuid,
        reason: CloseReason,
        at: DateTime<Utc>,
    ) -> PortResult<Trade> {
        sqlx::query_as::<_, TradeRecord>(
            "UPDATE trades SET status = 'closed', close_reason = $2, closed_at = $3 \
             WHERE id = $1 AND status = 'active' \
             RETURNING id, creator_id, asset_id, direction, pip, spread, take_profit, stop_loss, status, close_reason, closed_at, package_ids, created_at",
        )
        .bind(trade_id)
        .bind(reason.as_str())
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(read_error(|| "Active trade not found".to_string()))?
        .to_domain()
    }
}
