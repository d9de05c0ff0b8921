//! crates/sigmora_core/src/activation.rs
//!
//! Turns a verified payment confirmation into exactly one ledger entry.
//! Webhooks, retries and the redirect callback may all deliver the same
//! transaction; the ledger's idempotent `activate` makes every delivery after
//! the first a read.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Activation, NewSubscription, PaymentConfirmation};
use crate::ports::{PortError, SubscriptionLedger};

#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("Payment not successful (status '{0}')")]
    PaymentNotSuccessful(String),
    #[error("Invalid payment metadata")]
    InvalidPaymentMetadata,
    #[error(transparent)]
    Port(#[from] PortError),
}

fn meta_id(value: Option<&str>) -> Result<Uuid, ActivationError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or(ActivationError::InvalidPaymentMetadata)
}

/// Validates the confirmation and records the subscription keyed by `tx_ref`.
pub fn subscription_from_confirmation(
    confirmation: &PaymentConfirmation,
) -> Result<NewSubscription, ActivationError> {
    if !confirmation.is_successful() {
        return Err(ActivationError::PaymentNotSuccessful(
            confirmation.status.clone(),
        ));
    }
    if confirmation.tx_ref.trim().is_empty() {
        return Err(ActivationError::InvalidPaymentMetadata);
    }

    let meta = &confirmation.meta;
    Ok(NewSubscription {
        subscriber_id: meta_id(meta.subscriber_id.as_deref())?,
        package_id: meta_id(meta.package_id.as_deref())?,
        creator_id: meta_id(meta.creator_id.as_deref())?,
        payment_reference: confirmation.tx_ref.clone(),
        amount_paid: confirmation.amount,
    })
}

pub async fn activate_payment(
    ledger: &dyn SubscriptionLedger,
    confirmation: &PaymentConfirmation,
    now: DateTime<Utc>,
) -> Result<Activation, ActivationError> {
    let entry = subscription_from_confirmation(confirmation)?;
    ledger.activate(entry, now).await.map_err(|e| match e {
        // Well-formed ids that name no user.
        PortError::MissingReference(_) => ActivationError::InvalidPaymentMetadata,
        other => ActivationError::Port(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PaymentMeta, Subscription};
    use crate::ports::PortResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct VecLedger {
        rows: Mutex<Vec<Subscription>>,
    }

    #[async_trait]
    impl SubscriptionLedger for VecLedger {
        async fn activate(&self, entry: NewSubscription, now: DateTime<Utc>) -> PortResult<Activation> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(existing) = rows
                .iter()
                .find(|s| s.payment_reference == entry.payment_reference)
            {
                return Ok(Activation {
                    subscription: existing.clone(),
                    created: false,
                });
            }
            let subscription = entry.into_subscription(now);
            rows.push(subscription.clone());
            Ok(Activation {
                subscription,
                created: true,
            })
        }

        async fn list_for_subscriber(&self, _: Uuid) -> PortResult<Vec<Subscription>> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn list_for_creator(&self, _: Uuid) -> PortResult<Vec<Subscription>> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn expire_overdue(&self, _: DateTime<Utc>) -> PortResult<u64> {
            Ok(0)
        }
    }

    /// Rejects every write the way a foreign key on the user ids would.
    struct OrphanLedger;

    #[async_trait]
    impl SubscriptionLedger for OrphanLedger {
        async fn activate(&self, entry: NewSubscription, _: DateTime<Utc>) -> PortResult<Activation> {
            Err(PortError::MissingReference(format!("user {}", entry.subscriber_id)))
        }

        async fn list_for_subscriber(&self, _: Uuid) -> PortResult<Vec<Subscription>> {
            Ok(Vec::new())
        }

        async fn list_for_creator(&self, _: Uuid) -> PortResult<Vec<Subscription>> {
            Ok(Vec::new())
        }

        async fn expire_overdue(&self, _: DateTime<Utc>) -> PortResult<u64> {
            Ok(0)
        }
    }

    fn confirmation(status: &str, meta: PaymentMeta) -> PaymentConfirmation {
        PaymentConfirmation {
            status: status.to_string(),
            tx_ref: "tx_abc".to_string(),
            amount: 5000.0,
            meta,
        }
    }

    fn full_meta() -> PaymentMeta {
        PaymentMeta {
            subscriber_id: Some(Uuid::new_v4().to_string()),
            package_id: Some(Uuid::new_v4().to_string()),
            creator_id: Some(Uuid::new_v4().to_string()),
        }
    }

    #[tokio::test]
    async fn replayed_confirmation_creates_one_subscription() {
        let ledger = VecLedger::default();
        let confirmation = confirmation("successful", full_meta());

        let first = activate_payment(&ledger, &confirmation, Utc::now()).await.unwrap();
        let second = activate_payment(&ledger, &confirmation, Utc::now()).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.subscription, second.subscription);
        assert_eq!(ledger.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsuccessful_payment_is_rejected_before_the_ledger() {
        let ledger = VecLedger::default();
        let err = activate_payment(&ledger, &confirmation("failed", full_meta()), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, ActivationError::PaymentNotSuccessful(s) if s == "failed"));
        assert!(ledger.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_users_are_invalid_metadata() {
        let err = activate_payment(&OrphanLedger, &confirmation("successful", full_meta()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ActivationError::InvalidPaymentMetadata));
    }

    #[test]
    fn every_meta_field_is_required() {
        for strip in 0..3 {
            let mut meta = full_meta();
            match strip {
                0 => meta.subscriber_id = None,
                1 => meta.package_id = Some("   ".into()),
                _ => meta.creator_id = Some("not-a-uuid".into()),
            }
            let err = subscription_from_confirmation(&confirmation("successful", meta)).unwrap_err();
            assert!(matches!(err, ActivationError::InvalidPaymentMetadata));
        }
    }

    #[test]
    fn payment_reference_is_the_provider_tx_ref() {
        let entry = subscription_from_confirmation(&confirmation("successful", full_meta())).unwrap();
        assert_eq!(entry.payment_reference, "tx_abc");
        assert_eq!(entry.amount_paid, 5000.0);
    }
}
