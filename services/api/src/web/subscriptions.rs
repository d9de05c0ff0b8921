//! services/api/src/web/subscriptions.rs
//!
//! Read-only views over the subscription ledger.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sigmora_core::access;
use sigmora_core::domain::Subscription;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorBody, HttpError};
use crate::web::middleware::{CreatorOnly, SubscriberOnly};
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub creator_id: Uuid,
    pub package_id: Uuid,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub payment_reference: String,
    pub amount_paid: f64,
    pub created_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionView {
    fn from(s: Subscription) -> Self {
        Self {
            id: s.id,
            subscriber_id: s.subscriber_id,
            creator_id: s.creator_id,
            package_id: s.package_id,
            status: s.status.as_str().to_string(),
            start_date: s.start_date,
            expiry_date: s.expiry_date,
            payment_reference: s.payment_reference,
            amount_paid: s.amount_paid,
            created_at: s.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEntry {
    pub package_id: Uuid,
    pub expiry_date: DateTime<Utc>,
    pub status: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub has_active: bool,
    pub active_count: usize,
    pub nearest_expiry: Option<DateTime<Utc>>,
    pub subscriptions: Vec<ActiveEntry>,
}

/// GET /api/subscriptions - The caller's subscriptions, newest first
#[utoipa::path(
    get,
    path = "/api/subscriptions",
    responses(
        (status = 200, description = "Subscriptions", body = [SubscriptionView]),
        (status = 403, description = "Not a subscriber", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Subscriptions"
)]
pub async fn list_my_subscriptions_handler(
    SubscriberOnly(ctx): SubscriberOnly,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SubscriptionView>>, HttpError> {
    let rows = state.ledger.list_for_subscriber(ctx.user.id).await?;
    Ok(Json(rows.into_iter().map(SubscriptionView::from).collect()))
}

/// GET /api/subscriptions/status - Whether the caller holds anything active
#[utoipa::path(
    get,
    path = "/api/subscriptions/status",
    responses(
        (status = 200, description = "Active summary", body = SubscriptionStatusResponse),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not a subscriber", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Subscriptions"
)]
pub async fn subscription_status_handler(
    SubscriberOnly(ctx): SubscriberOnly,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SubscriptionStatusResponse>, HttpError> {
    let rows = state.ledger.list_for_subscriber(ctx.user.id).await?;
    let summary = access::summarize(&rows);

    Ok(Json(SubscriptionStatusResponse {
        has_active: summary.has_active,
        active_count: summary.active_count,
        nearest_expiry: summary.nearest_expiry,
        subscriptions: summary
            .active
            .into_iter()
            .map(|s| ActiveEntry {
                package_id: s.package_id,
                expiry_date: s.expiry_date,
                status: s.status.as_str().to_string(),
            })
            .collect(),
    }))
}

/// GET /api/subscriptions/creator - Everyone who has paid the caller
#[utoipa::path(
    get,
    path = "/api/subscriptions/creator",
    responses(
        (status = 200, description = "Subscriptions sold", body = [SubscriptionView]),
        (status = 403, description = "Not a creator", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Subscriptions"
)]
pub async fn list_creator_subscriptions_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SubscriptionView>>, HttpError> {
    let rows = state.ledger.list_for_creator(ctx.user.id).await?;
    Ok(Json(rows.into_iter().map(SubscriptionView::from).collect()))
}
