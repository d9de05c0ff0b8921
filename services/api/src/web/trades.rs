//! services/api/src/web/trades.rs
//!
//! Trade signals. Creators post and close them; subscribers see the trades of
//! the packages they hold. Active trades need a live subscription, closed
//! ones only need a subscription that once existed.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sigmora_core::access::{accessible_packages, can_view_trade, AccessScope};
use sigmora_core::domain::{CloseReason, Trade, TradeDirection, TradeDraft, TradeStatus};
use sigmora_core::ports::PortError;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorCode, HttpError};
use crate::web::middleware::{AuthContext, CreatorOnly, SubscriberOnly};
use crate::web::state::AppState;
use crate::web::validation::{path_id, JsonBody, Violations};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TradeInput {
    #[serde(default)]
    pub asset: String,
    #[serde(default, rename = "type")]
    pub direction: String,
    pub pip: Option<f64>,
    pub spread: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub packages: Vec<String>,
}

impl TradeInput {
    fn into_draft(self) -> Result<TradeDraft, HttpError> {
        let mut v = Violations::new();
        let asset_id = v.uuid(&self.asset, "asset", "Valid asset ID is required");
        let direction = self.direction.trim().parse::<TradeDirection>().ok();
        v.check(direction.is_some(), "type", "Trade type must be BUY or SELL")
            .require_number(self.pip, "pip", "PIP is required")
            .require_non_negative(self.spread, "spread", "Spread must be a positive number")
            .require_number(self.take_profit, "takeProfit", "Take profit is required")
            .require_number(self.stop_loss, "stopLoss", "Stop loss is required")
            .check(
                !self.packages.is_empty(),
                "packages",
                "At least one package is required",
            );

        let mut package_ids = BTreeSet::new();
        for raw in &self.packages {
            if let Some(id) = v.uuid(raw, "packages", "Invalid package ID") {
                package_ids.insert(id);
            }
        }
        v.finish()?;

        match (asset_id, direction) {
            (Some(asset_id), Some(direction)) => Ok(TradeDraft {
                asset_id,
                direction,
                pip: self.pip.unwrap_or_default(),
                spread: self.spread.unwrap_or_default(),
                take_profit: self.take_profit.unwrap_or_default(),
                stop_loss: self.stop_loss.unwrap_or_default(),
                package_ids: package_ids.into_iter().collect(),
            }),
            _ => Err(HttpError::internal("Trade input passed validation incomplete")),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CloseTradeRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TradeView {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub asset_id: Uuid,
    #[serde(rename = "type")]
    pub direction: String,
    pub pip: f64,
    pub spread: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub status: String,
    pub close_reason: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub package_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<Trade> for TradeView {
    fn from(t: Trade) -> Self {
        Self {
            id: t.id,
            creator_id: t.creator_id,
            asset_id: t.asset_id,
            direction: t.direction.as_str().to_string(),
            pip: t.pip,
            spread: t.spread,
            take_profit: t.take_profit,
            stop_loss: t.stop_loss,
            status: t.status.as_str().to_string(),
            close_reason: t.close_reason.map(|r| r.as_str().to_string()),
            closed_at: t.closed_at,
            package_ids: t.package_ids,
            created_at: t.created_at,
        }
    }
}

fn views(trades: Vec<Trade>) -> Vec<TradeView> {
    trades.into_iter().map(TradeView::from).collect()
}

fn already_closed() -> HttpError {
    HttpError::bad_request(ErrorCode::TradeAlreadyClosed, "Trade is already closed")
}

//=========================================================================================
// Creator Handlers
//=========================================================================================

/// POST /api/trades
pub async fn create_trade_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
    JsonBody(input): JsonBody<TradeInput>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. Validate the input
    let draft = input.into_draft()?;

    // 2. The asset and every package must belong to the caller
    let asset = state.catalog.get_asset(draft.asset_id).await?;
    ctx.ensure_owns(asset.creator_id)?;
    for package_id in &draft.package_ids {
        let package = state.catalog.get_package(*package_id).await?;
        ctx.ensure_owns(package.creator_id)?;
    }

    // 3. Store it
    let trade = state.catalog.create_trade(ctx.user.id, draft).await?;
    info!(trade_id = %trade.id, creator_id = %ctx.user.id, "trade posted");
    Ok((StatusCode::CREATED, Json(TradeView::from(trade))))
}

/// GET /api/trades/active
pub async fn list_active_trades_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TradeView>>, HttpError> {
    let trades = state
        .catalog
        .list_trades_by_creator(ctx.user.id, TradeStatus::Active)
        .await?;
    Ok(Json(views(trades)))
}

/// GET /api/trades/completed
pub async fn list_completed_trades_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TradeView>>, HttpError> {
    let trades = state
        .catalog
        .list_trades_by_creator(ctx.user.id, TradeStatus::Closed)
        .await?;
    Ok(Json(views(trades)))
}

/// PUT /api/trades/{id}/close
pub async fn close_trade_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<CloseTradeRequest>,
) -> Result<Json<TradeView>, HttpError> {
    let id = path_id(&id, "id")?;
    let reason = req.reason.trim().parse::<CloseReason>().ok();
    Violations::new()
        .check(
            reason.is_some(),
            "reason",
            "Close reason must be TP, SL, or Manual",
        )
        .finish()?;
    let reason = reason.ok_or_else(|| HttpError::internal("Close reason missing"))?;

    let trade = state.catalog.get_trade(id).await?;
    ctx.ensure_owns(trade.creator_id)?;
    if trade.status == TradeStatus::Closed {
        return Err(already_closed());
    }

    // A concurrent close wins the conditional update; report it as closed.
    let closed = match state.catalog.close_trade(id, reason, Utc::now()).await {
        Ok(trade) => trade,
        Err(PortError::NotFound(_)) => return Err(already_closed()),
        Err(e) => return Err(e.into()),
    };
    info!(trade_id = %id, reason = reason.as_str(), "trade closed");
    Ok(Json(TradeView::from(closed)))
}

//=========================================================================================
// Subscriber Feeds
//=========================================================================================

async fn subscriber_feed(
    state: &AppState,
    subscriber_id: Uuid,
    scope: AccessScope,
    status: TradeStatus,
) -> Result<Vec<TradeView>, HttpError> {
    let subscriptions = state.ledger.list_for_subscriber(subscriber_id).await?;
    let packages = accessible_packages(subscriber_id, &subscriptions, scope);
    if packages.is_empty() {
        return Ok(Vec::new());
    }
    let trades = state
        .catalog
        .list_trades_for_packages(&packages, status)
        .await?;
    Ok(views(trades))
}

/// GET /api/trades/subscriber/active
pub async fn subscriber_active_trades_handler(
    SubscriberOnly(ctx): SubscriberOnly,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TradeView>>, HttpError> {
    let trades =
        subscriber_feed(&state, ctx.user.id, AccessScope::Active, TradeStatus::Active).await?;
    Ok(Json(trades))
}

/// GET /api/trades/subscriber/completed
pub async fn subscriber_completed_trades_handler(
    SubscriberOnly(ctx): SubscriberOnly,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TradeView>>, HttpError> {
    let trades =
        subscriber_feed(&state, ctx.user.id, AccessScope::History, TradeStatus::Closed).await?;
    Ok(Json(trades))
}

/// GET /api/trades/{id}
pub async fn get_trade_handler(
    ctx: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TradeView>, HttpError> {
    let trade = state.catalog.get_trade(path_id(&id, "id")?).await?;

    if ctx.user.is_creator() {
        ctx.ensure_owns(trade.creator_id)?;
        return Ok(Json(TradeView::from(trade)));
    }

    let subscriptions = state.ledger.list_for_subscriber(ctx.user.id).await?;
    let scope = AccessScope::for_trade(&trade);
    if !can_view_trade(ctx.user.id, &subscriptions, &trade, scope) {
        return Err(HttpError::forbidden(
            ErrorCode::NotSubscribed,
            "An active subscription to one of this trade's packages is required",
        ));
    }
    Ok(Json(TradeView::from(trade)))
}
