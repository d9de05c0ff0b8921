//! services/api/src/adapters/flutterwave.rs
//!
//! This module contains the adapter for the Flutterwave payments API.
//! It implements the `PaymentProvider` port: hosted checkout creation and
//! transaction verification. Only a fully parsed, 2xx verify response ever
//! reaches the activation logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sigmora_core::domain::{PaymentConfirmation, PaymentMeta, PaymentRequest};
use sigmora_core::ports::{PaymentProvider, PortError, PortResult};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaBody {
    subscriber_id: String,
    package_id: String,
    creator_id: String,
}

#[derive(Serialize)]
struct Customer<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct Customizations<'a> {
    title: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct InitializeBody<'a> {
    tx_ref: &'a str,
    amount: f64,
    currency: &'a str,
    redirect_url: &'a str,
    payment_options: &'a str,
    customer: Customer<'a>,
    customizations: Customizations<'a>,
    meta: MetaBody,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct LinkData {
    link: String,
}

#[derive(Deserialize)]
struct TransactionData {
    status: String,
    tx_ref: String,
    amount: f64,
    #[serde(default)]
    meta: Option<HashMap<String, Value>>,
}

impl TransactionData {
    fn into_confirmation(self) -> PaymentConfirmation {
        let meta = self.meta.unwrap_or_default();
        let field = |key: &str| match meta.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        PaymentConfirmation {
            status: self.status,
            tx_ref: self.tx_ref,
            amount: self.amount,
            meta: PaymentMeta {
                subscriber_id: field("subscriberId"),
                package_id: field("packageId"),
                creator_id: field("creatorId"),
            },
        }
    }
}

//=========================================================================================
// The Adapter
//=========================================================================================

/// An adapter that talks to the Flutterwave v3 REST API.
#[derive(Clone)]
pub struct FlutterwaveAdapter {
    client: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
}

impl FlutterwaveAdapter {
    /// Creates a new `FlutterwaveAdapter`. Every outbound call is bounded by `timeout`.
    pub fn new(base_url: &str, secret_key: Option<String>, timeout: Duration) -> PortResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    fn secret(&self) -> PortResult<&str> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| PortError::Unexpected("Payment provider key is not configured".to_string()))
    }

    async fn read_envelope<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> PortResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "payment provider rejected the request");
            return Err(PortError::Unexpected(format!(
                "Payment provider returned {}",
                status
            )));
        }
        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            PortError::Unexpected(format!("Failed to parse payment provider response: {}", e))
        })?;
        envelope.data.ok_or_else(|| {
            PortError::Unexpected(format!(
                "Payment provider response carried no data: {}",
                envelope.message.unwrap_or_default()
            ))
        })
    }
}

#[async_trait]
impl PaymentProvider for FlutterwaveAdapter {
    async fn initialize_payment(&self, request: &PaymentRequest) -> PortResult<String> {
        let secret = self.secret()?;
        let body = InitializeBody {
            tx_ref: &request.tx_ref,
            amount: request.amount,
            currency: &request.currency,
            redirect_url: &request.redirect_url,
            payment_options: "card,account,ussd",
            customer: Customer {
                email: &request.customer_email,
                name: &request.customer_name,
            },
            customizations: Customizations {
                title: &request.title,
                description: &request.description,
            },
            meta: MetaBody {
                subscriber_id: request.subscriber_id.to_string(),
                package_id: request.package_id.to_string(),
                creator_id: request.creator_id.to_string(),
            },
        };

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .bearer_auth(secret)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Payment provider unreachable: {}", e)))?;

        let data: LinkData = Self::read_envelope(response).await?;
        Ok(data.link)
    }

    async fn verify_transaction(&self, transaction_id: &str) -> PortResult<PaymentConfirmation> {
        let secret = self.secret()?;
        let response = self
            .client
            .get(format!(
                "{}/transactions/{}/verify",
                self.base_url, transaction_id
            ))
            .bearer_auth(secret)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Payment provider unreachable: {}", e)))?;

        let data: TransactionData = Self::read_envelope(response).await?;
        Ok(data.into_confirmation())
    }
}
