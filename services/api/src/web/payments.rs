//! services/api/src/web/payments.rs
//!
//! Payment initialization, verification and the provider's redirect callback.
//! Verification always asks the provider for the transaction's real state;
//! nothing a client sends is trusted beyond the transaction id.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sigmora_core::activation::{activate_payment, ActivationError};
use sigmora_core::domain::{Activation, PaymentRequest};
use sigmora_core::ports::PortError;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::error::{ErrorBody, ErrorCode, HttpError};
use crate::web::middleware::SubscriberOnly;
use crate::web::state::AppState;
use crate::web::subscriptions::SubscriptionView;
use crate::web::validation::{JsonBody, Violations};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentRequest {
    #[serde(default)]
    pub package_id: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentResponse {
    pub payment_link: String,
    pub tx_ref: String,
}

/// The provider hands transaction ids out as numbers; clients sometimes echo
/// them back as strings.
#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(untagged)]
pub enum TransactionId {
    Number(u64),
    Text(String),
}

impl TransactionId {
    fn into_string(self) -> String {
        match self {
            TransactionId::Number(n) => n.to_string(),
            TransactionId::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub tx_ref: Option<String>,
    pub transaction_id: Option<TransactionId>,
}

#[derive(Serialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub message: String,
    pub created: bool,
    pub subscription: SubscriptionView,
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub status: Option<String>,
    pub tx_ref: Option<String>,
    pub transaction_id: Option<String>,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn provider_error(err: PortError) -> HttpError {
    error!(error = %err, "payment provider call failed");
    HttpError::new(
        StatusCode::BAD_GATEWAY,
        ErrorCode::PaymentProviderError,
        "Payment provider error",
    )
}

impl From<ActivationError> for HttpError {
    fn from(err: ActivationError) -> Self {
        match err {
            ActivationError::PaymentNotSuccessful(status) => HttpError::bad_request(
                ErrorCode::PaymentNotSuccessful,
                format!("Payment was not successful (status: {status})"),
            ),
            ActivationError::InvalidPaymentMetadata => HttpError::bad_request(
                ErrorCode::InvalidPaymentMetadata,
                "Invalid payment metadata",
            ),
            ActivationError::Port(e) => e.into(),
        }
    }
}

/// Verifies `transaction_id` with the provider and records the subscription.
async fn verify_and_activate(
    state: &AppState,
    transaction_id: &str,
) -> Result<Activation, HttpError> {
    let confirmation = state
        .payments
        .verify_transaction(transaction_id)
        .await
        .map_err(provider_error)?;
    let activation = activate_payment(state.ledger.as_ref(), &confirmation, Utc::now()).await?;
    if activation.created {
        info!(
            tx_ref = %confirmation.tx_ref,
            subscription_id = %activation.subscription.id,
            "subscription activated"
        );
    } else {
        info!(tx_ref = %confirmation.tx_ref, "payment already processed");
    }
    Ok(activation)
}

fn callback_url(frontend: &str, status: &str, tx_ref: &str) -> Result<String, HttpError> {
    let base = format!("{}/payment/callback", frontend.trim_end_matches('/'));
    reqwest::Url::parse_with_params(&base, &[("status", status), ("tx_ref", tx_ref)])
        .map(String::from)
        .map_err(|e| {
            error!(error = %e, "invalid frontend url");
            HttpError::internal("Invalid frontend URL")
        })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/payments/initialize - Start a hosted checkout for a package
#[utoipa::path(
    post,
    path = "/api/payments/initialize",
    request_body = InitializePaymentRequest,
    responses(
        (status = 200, description = "Checkout created", body = InitializePaymentResponse),
        (status = 403, description = "Package belongs to another academy", body = ErrorBody),
        (status = 404, description = "Unknown package", body = ErrorBody),
        (status = 502, description = "Payment provider error", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Payments"
)]
pub async fn initialize_payment_handler(
    SubscriberOnly(ctx): SubscriberOnly,
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<InitializePaymentRequest>,
) -> Result<Json<InitializePaymentResponse>, HttpError> {
    // 1. Validate the input
    let mut v = Violations::new();
    let package_id = v.uuid(&req.package_id, "packageId", "Valid package ID is required");
    v.finish()?;
    let package_id = package_id.ok_or_else(|| HttpError::internal("Package id missing"))?;

    // 2. The package must be sold by the creator the subscriber joined
    let package = state.catalog.get_package(package_id).await?;
    if ctx.user.subscribed_to != Some(package.creator_id) {
        return Err(HttpError::forbidden(
            ErrorCode::NotOwner,
            "Not authorized to subscribe to this package",
        ));
    }

    // 3. Ask the provider for a checkout link
    let tx_ref = format!("sigmora_{}_{}", Utc::now().timestamp_millis(), ctx.user.id);
    let request = PaymentRequest {
        tx_ref: tx_ref.clone(),
        amount: package.price,
        currency: state.config.payment_currency.clone(),
        redirect_url: format!(
            "{}/payment/callback",
            state.config.frontend_url.trim_end_matches('/')
        ),
        customer_email: ctx.user.email.clone(),
        customer_name: ctx.user.name.clone(),
        title: format!("Sigmora - {}", package.name),
        description: package.description.clone(),
        subscriber_id: ctx.user.id,
        package_id: package.id,
        creator_id: package.creator_id,
    };
    let payment_link = state
        .payments
        .initialize_payment(&request)
        .await
        .map_err(provider_error)?;

    info!(%tx_ref, package_id = %package.id, "payment initialized");
    Ok(Json(InitializePaymentResponse {
        payment_link,
        tx_ref,
    }))
}

/// POST /api/payments/verify - Verify a transaction and activate the subscription
#[utoipa::path(
    post,
    path = "/api/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Subscription active", body = VerifyPaymentResponse),
        (status = 400, description = "Payment not successful or bad metadata", body = ErrorBody),
        (status = 502, description = "Payment provider error", body = ErrorBody)
    ),
    tag = "Payments"
)]
pub async fn verify_payment_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, HttpError> {
    let transaction_id = req
        .transaction_id
        .map(TransactionId::into_string)
        .unwrap_or_default();
    Violations::new()
        .require_text(
            &transaction_id,
            "transaction_id",
            "Transaction ID is required",
        )
        .finish()?;

    let activation = verify_and_activate(&state, &transaction_id).await?;
    if let Some(expected) = req.tx_ref.as_deref() {
        if expected != activation.subscription.payment_reference {
            warn!(
                expected,
                actual = %activation.subscription.payment_reference,
                "tx_ref in request does not match the verified transaction"
            );
        }
    }

    let message = if activation.created {
        "Payment verified and subscription activated"
    } else {
        "Payment already processed"
    };
    Ok(Json(VerifyPaymentResponse {
        message: message.to_string(),
        created: activation.created,
        subscription: SubscriptionView::from(activation.subscription),
    }))
}

/// GET /api/payments/callback - Provider redirect target
#[utoipa::path(
    get,
    path = "/api/payments/callback",
    params(
        ("status" = Option<String>, Query, description = "Provider payment status"),
        ("tx_ref" = Option<String>, Query, description = "Our transaction reference"),
        ("transaction_id" = Option<String>, Query, description = "Provider transaction id")
    ),
    responses(
        (status = 303, description = "Redirect to the frontend result page")
    ),
    tag = "Payments"
)]
pub async fn payment_callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, HttpError> {
    let tx_ref = params.tx_ref.unwrap_or_default();
    let status = params.status.unwrap_or_default();
    let transaction_id = params
        .transaction_id
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let outcome = match (status.as_str(), transaction_id) {
        ("successful", Some(id)) => match verify_and_activate(&state, &id).await {
            Ok(_) => "successful",
            Err(e) => {
                warn!(%tx_ref, code = ?e.code, "payment callback could not activate");
                "failed"
            }
        },
        ("successful", None) => "failed",
        ("", _) => "failed",
        (other, _) => {
            info!(%tx_ref, status = other, "payment callback without success");
            other
        }
    };

    let url = callback_url(&state.config.frontend_url, outcome, &tx_ref)?;
    Ok(Redirect::to(&url))
}
