//! services/api/src/web/assets.rs
//!
//! Tradable instruments a creator configures before posting trades.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sigmora_core::domain::{Asset, AssetDraft};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::HttpError;
use crate::web::auth::MessageResponse;
use crate::web::middleware::{AuthContext, CreatorOnly};
use crate::web::state::AppState;
use crate::web::validation::{path_id, JsonBody, Violations};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetInput {
    #[serde(default)]
    pub symbol: String,
    pub pip_value: Option<f64>,
    pub spread: Option<f64>,
    pub margin: Option<f64>,
}

impl AssetInput {
    fn into_draft(self) -> Result<AssetDraft, HttpError> {
        Violations::new()
            .require_text(&self.symbol, "symbol", "Symbol is required")
            .require_non_negative(self.pip_value, "pipValue", "PIP value must be a positive number")
            .require_non_negative(self.spread, "spread", "Spread must be a positive number")
            .require_non_negative(self.margin, "margin", "Margin must be a positive number")
            .finish()?;
        Ok(AssetDraft::new(
            &self.symbol,
            self.pip_value.unwrap_or_default(),
            self.spread.unwrap_or_default(),
            self.margin.unwrap_or_default(),
        ))
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetView {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub symbol: String,
    pub pip_value: f64,
    pub spread: f64,
    pub margin: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Asset> for AssetView {
    fn from(a: Asset) -> Self {
        Self {
            id: a.id,
            creator_id: a.creator_id,
            symbol: a.symbol,
            pip_value: a.pip_value,
            spread: a.spread,
            margin: a.margin,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

/// POST /api/assets
pub async fn create_asset_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
    JsonBody(input): JsonBody<AssetInput>,
) -> Result<impl IntoResponse, HttpError> {
    let draft = input.into_draft()?;
    let asset = state.catalog.create_asset(ctx.user.id, draft).await?;
    Ok((StatusCode::CREATED, Json(AssetView::from(asset))))
}

/// GET /api/assets
pub async fn list_own_assets_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AssetView>>, HttpError> {
    let assets = state.catalog.list_assets_by_creator(ctx.user.id).await?;
    Ok(Json(assets.into_iter().map(AssetView::from).collect()))
}

/// GET /api/assets/{id}
pub async fn get_asset_handler(
    _ctx: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AssetView>, HttpError> {
    let asset = state.catalog.get_asset(path_id(&id, "id")?).await?;
    Ok(Json(AssetView::from(asset)))
}

/// PUT /api/assets/{id}
pub async fn update_asset_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<AssetInput>,
) -> Result<Json<AssetView>, HttpError> {
    let id = path_id(&id, "id")?;
    let draft = input.into_draft()?;
    let existing = state.catalog.get_asset(id).await?;
    ctx.ensure_owns(existing.creator_id)?;
    let asset = state.catalog.update_asset(id, draft).await?;
    Ok(Json(AssetView::from(asset)))
}

/// DELETE /api/assets/{id}
pub async fn delete_asset_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, HttpError> {
    let id = path_id(&id, "id")?;
    let existing = state.catalog.get_asset(id).await?;
    ctx.ensure_owns(existing.creator_id)?;
    state.catalog.delete_asset(id).await?;
    Ok(Json(MessageResponse::new("Asset removed")))
}
