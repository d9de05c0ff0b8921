//! services/api/src/web/packages.rs
//!
//! Subscription packages a creator sells. Mutations are creator-only and
//! owner-checked.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sigmora_core::domain::{Package, PackageDraft};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::HttpError;
use crate::web::auth::MessageResponse;
use crate::web::middleware::{AuthContext, CreatorOnly};
use crate::web::state::AppState;
use crate::web::validation::{path_id, JsonBody, Violations};

#[derive(Deserialize, ToSchema)]
pub struct PackageInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Option<f64>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl PackageInput {
    fn into_draft(self) -> Result<PackageDraft, HttpError> {
        Violations::new()
            .require_text(&self.name, "name", "Package name is required")
            .require_text(&self.description, "description", "Description is required")
            .require_non_negative(self.price, "price", "Price must be a positive number")
            .finish()?;
        Ok(PackageDraft {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            price: self.price.unwrap_or_default(),
            features: self
                .features
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
        })
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackageView {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Package> for PackageView {
    fn from(p: Package) -> Self {
        Self {
            id: p.id,
            creator_id: p.creator_id,
            name: p.name,
            description: p.description,
            price: p.price,
            features: p.features,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

fn views(packages: Vec<Package>) -> Vec<PackageView> {
    packages.into_iter().map(PackageView::from).collect()
}

/// POST /api/packages
pub async fn create_package_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
    JsonBody(input): JsonBody<PackageInput>,
) -> Result<impl IntoResponse, HttpError> {
    let draft = input.into_draft()?;
    let package = state.catalog.create_package(ctx.user.id, draft).await?;
    info!(package_id = %package.id, creator_id = %ctx.user.id, "package created");
    Ok((StatusCode::CREATED, Json(PackageView::from(package))))
}

/// GET /api/packages/creator
pub async fn list_own_packages_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PackageView>>, HttpError> {
    let packages = state.catalog.list_packages_by_creator(ctx.user.id).await?;
    Ok(Json(views(packages)))
}

/// GET /api/packages/creator/{creator_id} (public)
pub async fn list_creator_packages_handler(
    State(state): State<Arc<AppState>>,
    Path(creator_id): Path<String>,
) -> Result<Json<Vec<PackageView>>, HttpError> {
    let creator_id = path_id(&creator_id, "creatorId")?;
    let packages = state.catalog.list_packages_by_creator(creator_id).await?;
    Ok(Json(views(packages)))
}

/// GET /api/packages/{id}
pub async fn get_package_handler(
    _ctx: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PackageView>, HttpError> {
    let package = state.catalog.get_package(path_id(&id, "id")?).await?;
    Ok(Json(PackageView::from(package)))
}

/// PUT /api/packages/{id}
pub async fn update_package_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<PackageInput>,
) -> Result<Json<PackageView>, HttpError> {
    let id = path_id(&id, "id")?;
    let draft = input.into_draft()?;
    let existing = state.catalog.get_package(id).await?;
    ctx.ensure_owns(existing.creator_id)?;
    let package = state.catalog.update_package(id, draft).await?;
    Ok(Json(PackageView::from(package)))
}

/// DELETE /api/packages/{id}
pub async fn delete_package_handler(
    CreatorOnly(ctx): CreatorOnly,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, HttpError> {
    let id = path_id(&id, "id")?;
    let existing = state.catalog.get_package(id).await?;
    ctx.ensure_owns(existing.creator_id)?;
    state.catalog.delete_package(id).await?;
    info!(package_id = %id, "package deleted");
    Ok(Json(MessageResponse::new("Package removed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_input_lists_every_problem() {
        let err = PackageInput {
            name: " ".into(),
            description: String::new(),
            price: Some(-5.0),
            features: vec![],
        }
        .into_draft()
        .unwrap_err();
        assert_eq!(err.errors.len(), 3);
    }

    #[test]
    fn blank_features_are_dropped() {
        let draft = PackageInput {
            name: "Gold".into(),
            description: "Daily signals".into(),
            price: Some(0.0),
            features: vec!["  VIP chat ".into(), "".into()],
        }
        .into_draft()
        .unwrap();
        assert_eq!(draft.features, vec!["VIP chat".to_string()]);
        assert_eq!(draft.price, 0.0);
    }
}
