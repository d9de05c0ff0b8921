//! crates/sigmora_core/src/access.rs
//!
//! Subscription-gated visibility rules. Everything here is a pure function of
//! ledger rows, so handlers fetch the rows once and ask these questions.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::{Subscription, SubscriptionStatus, Trade, TradeStatus};

/// Which ledger rows grant access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// Live signals: only active subscriptions count.
    Active,
    /// History (closed trades): any subscription ever held counts.
    History,
}

impl AccessScope {
    /// Active trades need a live subscription, closed ones only need history.
    pub fn for_trade(trade: &Trade) -> Self {
        match trade.status {
            TradeStatus::Active => AccessScope::Active,
            TradeStatus::Closed => AccessScope::History,
        }
    }

    fn admits(&self, subscription: &Subscription) -> bool {
        match self {
            AccessScope::Active => subscription.is_active(),
            AccessScope::History => true,
        }
    }
}

/// Package ids a subscriber can see under `scope`, deduplicated and sorted.
pub fn accessible_packages(
    subscriber_id: Uuid,
    subscriptions: &[Subscription],
    scope: AccessScope,
) -> Vec<Uuid> {
    subscriptions
        .iter()
        .filter(|s| s.subscriber_id == subscriber_id && scope.admits(s))
        .map(|s| s.package_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Subscriber S may view trade T iff some row with subscriber = S, admitted by
/// `scope`, references a package in T.packages.
pub fn can_view_trade(
    subscriber_id: Uuid,
    subscriptions: &[Subscription],
    trade: &Trade,
    scope: AccessScope,
) -> bool {
    subscriptions.iter().any(|s| {
        s.subscriber_id == subscriber_id
            && scope.admits(s)
            && trade.package_ids.contains(&s.package_id)
    })
}

/// What `GET /subscriptions/status` reports.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSummary {
    pub has_active: bool,
    pub active_count: usize,
    pub nearest_expiry: Option<DateTime<Utc>>,
    /// The active rows the summary was computed from.
    pub active: Vec<Subscription>,
}

/// Summarizes the ledger rows of one subscriber. Only the stored status is
/// consulted: a row past its expiry stays active until the sweeper runs.
pub fn summarize(subscriptions: &[Subscription]) -> SubscriptionSummary {
    let active: Vec<Subscription> = subscriptions
        .iter()
        .filter(|s| s.status == SubscriptionStatus::Active)
        .cloned()
        .collect();
    let nearest_expiry = active.iter().map(|s| s.expiry_date).min();

    SubscriptionSummary {
        has_active: !active.is_empty(),
        active_count: active.len(),
        nearest_expiry,
        active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewSubscription, TradeDirection};
    use chrono::Duration;

    fn subscription(subscriber: Uuid, package: Uuid, status: SubscriptionStatus) -> Subscription {
        let mut sub = NewSubscription {
            subscriber_id: subscriber,
            creator_id: Uuid::new_v4(),
            package_id: package,
            payment_reference: Uuid::new_v4().to_string(),
            amount_paid: 10.0,
        }
        .into_subscription(Utc::now());
        sub.status = status;
        sub
    }

    fn trade(packages: Vec<Uuid>, status: TradeStatus) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            direction: TradeDirection::Buy,
            pip: 10.0,
            spread: 1.5,
            take_profit: 1.2,
            stop_loss: 1.1,
            status,
            close_reason: None,
            closed_at: None,
            package_ids: packages,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn active_scope_ignores_expired_rows() {
        let me = Uuid::new_v4();
        let (gold, silver) = (Uuid::new_v4(), Uuid::new_v4());
        let subs = vec![
            subscription(me, gold, SubscriptionStatus::Active),
            subscription(me, silver, SubscriptionStatus::Expired),
        ];

        assert_eq!(accessible_packages(me, &subs, AccessScope::Active), vec![gold]);
        let mut history = vec![gold, silver];
        history.sort();
        assert_eq!(accessible_packages(me, &subs, AccessScope::History), history);
    }

    #[test]
    fn trade_visibility_needs_a_matching_package() {
        let me = Uuid::new_v4();
        let (gold, silver) = (Uuid::new_v4(), Uuid::new_v4());
        let subs = vec![subscription(me, gold, SubscriptionStatus::Expired)];

        let live = trade(vec![gold, silver], TradeStatus::Active);
        assert!(!can_view_trade(me, &subs, &live, AccessScope::for_trade(&live)));

        let closed = trade(vec![gold], TradeStatus::Closed);
        assert!(can_view_trade(me, &subs, &closed, AccessScope::for_trade(&closed)));

        let other = trade(vec![silver], TradeStatus::Closed);
        assert!(!can_view_trade(me, &subs, &other, AccessScope::History));
    }

    #[test]
    fn rows_of_other_subscribers_never_grant_access() {
        let (me, someone_else) = (Uuid::new_v4(), Uuid::new_v4());
        let gold = Uuid::new_v4();
        let subs = vec![subscription(someone_else, gold, SubscriptionStatus::Active)];
        let t = trade(vec![gold], TradeStatus::Active);

        assert!(!can_view_trade(me, &subs, &t, AccessScope::History));
        assert!(accessible_packages(me, &subs, AccessScope::History).is_empty());
    }

    #[test]
    fn summary_reports_nearest_active_expiry() {
        let me = Uuid::new_v4();
        let mut soon = subscription(me, Uuid::new_v4(), SubscriptionStatus::Active);
        soon.expiry_date = Utc::now() + Duration::days(2);
        let later = subscription(me, Uuid::new_v4(), SubscriptionStatus::Active);
        let mut gone = subscription(me, Uuid::new_v4(), SubscriptionStatus::Expired);
        gone.expiry_date = Utc::now() - Duration::days(10);

        let summary = summarize(&[later.clone(), soon.clone(), gone]);
        assert!(summary.has_active);
        assert_eq!(summary.active_count, 2);
        assert_eq!(summary.nearest_expiry, Some(soon.expiry_date));
    }

    #[test]
    fn empty_ledger_summarizes_to_nothing() {
        let summary = summarize(&[]);
        assert!(!summary.has_active);
        assert_eq!(summary.active_count, 0);
        assert_eq!(summary.nearest_expiry, None);
    }
}
