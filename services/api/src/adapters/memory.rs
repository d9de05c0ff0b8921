//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of every storage port. It backs the
//! integration tests and local runs without PostgreSQL. Each operation takes
//! the table lock once, so uniqueness checks and inserts are atomic just like
//! the unique indexes of the database adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sigmora_core::domain::{
    Activation, Asset, AssetDraft, AuthSession, CloseReason, NewSession, NewSubscription, NewUser,
    Package, PackageDraft, Subscription, SubscriptionStatus, Trade, TradeDraft, TradeStatus, User,
    UserCredentials,
};
use sigmora_core::ports::{
    CatalogStore, CredentialStore, PortError, PortResult, SessionRegistry, SubscriptionLedger,
    UniqueKey,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: Vec<(User, String)>,
    sessions: Vec<AuthSession>,
    packages: Vec<Package>,
    assets: Vec<Asset>,
    trades: Vec<Trade>,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first; rows created in the same instant keep "last inserted first".
fn newest_first<T: Clone>(rows: &[T], created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut out: Vec<T> = rows.iter().rev().cloned().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

fn order_trades(trades: Vec<Trade>, status: TradeStatus) -> Vec<Trade> {
    match status {
        TradeStatus::Active => newest_first(&trades, |t| t.created_at),
        TradeStatus::Closed => {
            let mut out: Vec<Trade> = trades.into_iter().rev().collect();
            out.sort_by(|a, b| b.closed_at.cmp(&a.closed_at));
            out
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .iter()
            .any(|(u, _)| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(PortError::Duplicate(UniqueKey::Email));
        }
        if let Some(code) = &user.academy_code {
            if tables
                .users
                .iter()
                .any(|(u, _)| u.academy_code.as_ref() == Some(code))
            {
                return Err(PortError::Duplicate(UniqueKey::AcademyCode));
            }
        }

        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            role: user.role,
            academy_code: user.academy_code,
            creator_name: user.creator_name,
            subscribed_to: user.subscribed_to,
            created_at: Utc::now(),
        };
        tables.users.push((created.clone(), user.password_hash));
        Ok(created)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let tables = self.tables.lock().await;
        tables
            .users
            .iter()
            .find(|(u, _)| u.id == user_id)
            .map(|(u, _)| u.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let tables = self.tables.lock().await;
        tables
            .users
            .iter()
            .find(|(u, _)| u.email.eq_ignore_ascii_case(email))
            .map(|(u, hash)| UserCredentials {
                user: u.clone(),
                password_hash: hash.clone(),
            })
            .ok_or_else(|| PortError::NotFound("User not found".to_string()))
    }

    async fn find_creator_by_academy_code(&self, code: &str) -> PortResult<User> {
        let tables = self.tables.lock().await;
        tables
            .users
            .iter()
            .find(|(u, _)| u.is_creator() && u.academy_code.as_deref() == Some(code))
            .map(|(u, _)| u.clone())
            .ok_or_else(|| PortError::NotFound(format!("Academy {} not found", code)))
    }
}

#[async_trait]
impl SessionRegistry for InMemoryStore {
    async fn create_session(&self, session: NewSession) -> PortResult<AuthSession> {
        let mut tables = self.tables.lock().await;
        if tables.sessions.iter().any(|s| s.token == session.token) {
            return Err(PortError::Duplicate(UniqueKey::SessionToken));
        }
        let now = Utc::now();
        let created = AuthSession {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            token: session.token,
            expires_at: session.expires_at,
            is_active: true,
            created_at: now,
            last_activity: now,
            metadata: session.metadata,
        };
        tables.sessions.push(created.clone());
        Ok(created)
    }

    async fn find_active_session(
        &self,
        token: &str,
        user_id: Uuid,
    ) -> PortResult<Option<AuthSession>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .find(|s| s.token == token && s.user_id == user_id && s.is_active)
            .cloned())
    }

    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(session) = tables.sessions.iter_mut().find(|s| s.id == session_id) {
            session.last_activity = at;
        }
        Ok(())
    }

    async fn invalidate_session(&self, token: &str, user_id: Uuid) -> PortResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables
            .sessions
            .iter_mut()
            .find(|s| s.token == token && s.user_id == user_id && s.is_active)
        {
            Some(session) => {
                session.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn invalidate_all_sessions(&self, user_id: Uuid) -> PortResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut flipped = 0;
        for session in tables
            .sessions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.is_active)
        {
            session.is_active = false;
            flipped += 1;
        }
        Ok(flipped)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|s| s.expires_at >= now);
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl SubscriptionLedger for InMemoryStore {
    async fn activate(&self, entry: NewSubscription, now: DateTime<Utc>) -> PortResult<Activation> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .subscriptions
            .iter()
            .find(|s| s.payment_reference == entry.payment_reference)
        {
            return Ok(Activation {
                subscription: existing.clone(),
                created: false,
            });
        }
        for user_id in [entry.subscriber_id, entry.creator_id] {
            if !tables.users.iter().any(|(u, _)| u.id == user_id) {
                return Err(PortError::MissingReference(format!("user {user_id}")));
            }
        }
        let subscription = entry.into_subscription(now);
        tables.subscriptions.push(subscription.clone());
        Ok(Activation {
            subscription,
            created: true,
        })
    }

    async fn list_for_subscriber(&self, subscriber_id: Uuid) -> PortResult<Vec<Subscription>> {
        let tables = self.tables.lock().await;
        let rows: Vec<Subscription> = tables
            .subscriptions
            .iter()
            .filter(|s| s.subscriber_id == subscriber_id)
            .cloned()
            .collect();
        Ok(newest_first(&rows, |s| s.created_at))
    }

    async fn list_for_creator(&self, creator_id: Uuid) -> PortResult<Vec<Subscription>> {
        let tables = self.tables.lock().await;
        let rows: Vec<Subscription> = tables
            .subscriptions
            .iter()
            .filter(|s| s.creator_id == creator_id)
            .cloned()
            .collect();
        Ok(newest_first(&rows, |s| s.created_at))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut changed = 0;
        for subscription in tables.subscriptions.iter_mut().filter(|s| s.is_overdue(now)) {
            subscription.status = SubscriptionStatus::Expired;
            changed += 1;
        }
        Ok(changed)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn create_package(&self, creator_id: Uuid, draft: PackageDraft) -> PortResult<Package> {
        let now = Utc::now();
        let package = Package {
            id: Uuid::new_v4(),
            creator_id,
            name: draft.name,
            description: draft.description,
            price: draft.price,
            features: draft.features,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.packages.push(package.clone());
        Ok(package)
    }

    async fn get_package(&self, package_id: Uuid) -> PortResult<Package> {
        let tables = self.tables.lock().await;
        tables
            .packages
            .iter()
            .find(|p| p.id == package_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Package not found".to_string()))
    }

    async fn list_packages_by_creator(&self, creator_id: Uuid) -> PortResult<Vec<Package>> {
        let tables = self.tables.lock().await;
        let rows: Vec<Package> = tables
            .packages
            .iter()
            .filter(|p| p.creator_id == creator_id)
            .cloned()
            .collect();
        Ok(newest_first(&rows, |p| p.created_at))
    }

    async fn update_package(&self, package_id: Uuid, draft: PackageDraft) -> PortResult<Package> {
        let mut tables = self.tables.lock().await;
        let package = tables
            .packages
            .iter_mut()
            .find(|p| p.id == package_id)
            .ok_or_else(|| PortError::NotFound("Package not found".to_string()))?;
        package.name = draft.name;
        package.description = draft.description;
        package.price = draft.price;
        package.features = draft.features;
        package.updated_at = Utc::now();
        Ok(package.clone())
    }

    async fn delete_package(&self, package_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        let before = tables.packages.len();
        tables.packages.retain(|p| p.id != package_id);
        if tables.packages.len() == before {
            return Err(PortError::NotFound("Package not found".to_string()));
        }
        Ok(())
    }

    async fn create_asset(&self, creator_id: Uuid, draft: AssetDraft) -> PortResult<Asset> {
        let now = Utc::now();
        let asset = Asset {
            id: Uuid::new_v4(),
            creator_id,
            symbol: draft.symbol,
            pip_value: draft.pip_value,
            spread: draft.spread,
            margin: draft.margin,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.assets.push(asset.clone());
        Ok(asset)
    }

    async fn get_asset(&self, asset_id: Uuid) -> PortResult<Asset> {
        let tables = self.tables.lock().await;
        tables
            .assets
            .iter()
            .find(|a| a.id == asset_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Asset not found".to_string()))
    }

    async fn list_assets_by_creator(&self, creator_id: Uuid) -> PortResult<Vec<Asset>> {
        let tables = self.tables.lock().await;
        let rows: Vec<Asset> = tables
            .assets
            .iter()
            .filter(|a| a.creator_id == creator_id)
            .cloned()
            .collect();
        Ok(newest_first(&rows, |a| a.created_at))
    }

    async fn update_asset(&self, asset_id: Uuid, draft: AssetDraft) -> PortResult<Asset> {
        let mut tables = self.tables.lock().await;
        let asset = tables
            .assets
            .iter_mut()
            .find(|a| a.id == asset_id)
            .ok_or_else(|| PortError::NotFound("Asset not found".to_string()))?;
        asset.symbol = draft.symbol;
        asset.pip_value = draft.pip_value;
        asset.spread = draft.spread;
        asset.margin = draft.margin;
        asset.updated_at = Utc::now();
        Ok(asset.clone())
    }

    async fn delete_asset(&self, asset_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        let before = tables.assets.len();
        tables.assets.retain(|a| a.id != asset_id);
        if tables.assets.len() == before {
            return Err(PortError::NotFound("Asset not found".to_string()));
        }
        Ok(())
    }

    async fn create_trade(&self, creator_id: Uuid, draft: TradeDraft) -> PortResult<Trade> {
        let trade = Trade {
            id: Uuid::new_v4(),
            creator_id,
            asset_id: draft.asset_id,
            direction: draft.direction,
            pip: draft.pip,
            spread: draft.spread,
            take_profit: draft.take_profit,
            stop_loss: draft.stop_loss,
            status: TradeStatus::Active,
            close_reason: None,
            closed_at: None,
            package_ids: draft.package_ids,
            created_at: Utc::now(),
        };
        self.tables.lock().await.trades.push(trade.clone());
        Ok(trade)
    }

    async fn get_trade(&self, trade_id: Uuid) -> PortResult<Trade> {
        let tables = self.tables.lock().await;
        tables
            .trades
            .iter()
            .find(|t| t.id == trade_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Trade not found".to_string()))
    }

    async fn list_trades_by_creator(
        &self,
        creator_id: Uuid,
        status: TradeStatus,
    ) -> PortResult<Vec<Trade>> {
        let tables = self.tables.lock().await;
        let rows: Vec<Trade> = tables
            .trades
            .iter()
            .filter(|t| t.creator_id == creator_id && t.status == status)
            .cloned()
            .collect();
        Ok(order_trades(rows, status))
    }

    async fn list_trades_for_packages(
        &self,
        package_ids: &[Uuid],
        status: TradeStatus,
    ) -> PortResult<Vec<Trade>> {
        let tables = self.tables.lock().await;
        let rows: Vec<Trade> = tables
            .trades
            .iter()
            .filter(|t| t.status == status && t.package_ids.iter().any(|p| package_ids.contains(p)))
            .cloned()
            .collect();
        Ok(order_trades(rows, status))
    }

    async fn close_trade(
        &self,
        trade_id: Uuid,
        reason: CloseReason,
        at: DateTime<Utc>,
    ) -> PortResult<Trade> {
        let mut tables = self.tables.lock().await;
        let trade = tables
            .trades
            .iter_mut()
            .find(|t| t.id == trade_id && t.status == TradeStatus::Active)
            .ok_or_else(|| PortError::NotFound("Active trade not found".to_string()))?;
        trade.status = TradeStatus::Closed;
        trade.close_reason = Some(reason);
        trade.closed_at = Some(at);
        Ok(trade.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sigmora_core::domain::{SessionMetadata, TradeDirection};

    fn entry(reference: &str, (subscriber_id, creator_id): (Uuid, Uuid)) -> NewSubscription {
        NewSubscription {
            subscriber_id,
            creator_id,
            package_id: Uuid::new_v4(),
            payment_reference: reference.to_string(),
            amount_paid: 5000.0,
        }
    }

    /// A subscriber and the creator they joined, as `(subscriber, creator)`.
    async fn seed_users(store: &InMemoryStore) -> (Uuid, Uuid) {
        let creator = store
            .create_user(NewUser::creator("C", "c@x.io", "h".into(), None, "CCC111".into()))
            .await
            .unwrap();
        let subscriber = store
            .create_user(NewUser::subscriber("s@x.io", "h".into(), creator.id))
            .await
            .unwrap();
        (subscriber.id, creator.id)
    }

    #[tokio::test]
    async fn emails_are_unique_case_insensitively() {
        let store = InMemoryStore::new();
        store
            .create_user(NewUser::subscriber("a@x.io", "h".into(), Uuid::new_v4()))
            .await
            .unwrap();
        let err = store
            .create_user(NewUser::subscriber("A@X.IO", "h".into(), Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Duplicate(UniqueKey::Email)));
    }

    #[tokio::test]
    async fn academy_codes_are_unique() {
        let store = InMemoryStore::new();
        store
            .create_user(NewUser::creator("A", "a@x.io", "h".into(), None, "AAA111".into()))
            .await
            .unwrap();
        let err = store
            .create_user(NewUser::creator("B", "b@x.io", "h".into(), None, "AAA111".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Duplicate(UniqueKey::AcademyCode)));
    }

    #[tokio::test]
    async fn activation_is_keyed_by_payment_reference() {
        let store = InMemoryStore::new();
        let users = seed_users(&store).await;
        let first = store.activate(entry("tx_abc", users), Utc::now()).await.unwrap();
        let second = store.activate(entry("tx_abc", users), Utc::now()).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.subscription, second.subscription);
        assert_eq!(store.tables.lock().await.subscriptions.len(), 1);
    }

    #[tokio::test]
    async fn activation_requires_existing_users() {
        let store = InMemoryStore::new();
        let (subscriber, _) = seed_users(&store).await;

        let err = store
            .activate(entry("tx_ghost", (subscriber, Uuid::new_v4())), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::MissingReference(_)));
        assert!(store.tables.lock().await.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn purge_removes_expired_sessions_whatever_their_flag() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        for (token, offset) in [("old", -2), ("fresh", 2)] {
            store
                .create_session(NewSession {
                    user_id,
                    token: token.to_string(),
                    expires_at: now + Duration::hours(offset),
                    metadata: SessionMetadata::default(),
                })
                .await
                .unwrap();
        }
        store.invalidate_session("fresh", user_id).await.unwrap();

        assert_eq!(store.purge_expired_sessions(now).await.unwrap(), 1);
        assert_eq!(store.tables.lock().await.sessions.len(), 1);
    }

    #[tokio::test]
    async fn closed_trades_are_ordered_by_close_time() {
        let store = InMemoryStore::new();
        let creator = Uuid::new_v4();
        let package = Uuid::new_v4();
        let mut ids = Vec::new();
        for _ in 0..2 {
            let trade = store
                .create_trade(
                    creator,
                    TradeDraft {
                        asset_id: Uuid::new_v4(),
                        direction: TradeDirection::Buy,
                        pip: 10.0,
                        spread: 1.0,
                        take_profit: 1.2,
                        stop_loss: 1.0,
                        package_ids: vec![package],
                    },
                )
                .await
                .unwrap();
            ids.push(trade.id);
        }
        let now = Utc::now();
        // The older trade closes last, so it comes first.
        store.close_trade(ids[1], CloseReason::TakeProfit, now).await.unwrap();
        store
            .close_trade(ids[0], CloseReason::StopLoss, now + Duration::seconds(5))
            .await
            .unwrap();

        let closed = store
            .list_trades_for_packages(&[package], TradeStatus::Closed)
            .await
            .unwrap();
        assert_eq!(closed.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ids[0], ids[1]]);
        assert!(store
            .close_trade(ids[0], CloseReason::Manual, now)
            .await
            .is_err());
    }
}
