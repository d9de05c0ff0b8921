//! services/api/src/web/academy.rs
//!
//! Academy codes: a creator reads their own, anyone can resolve one to the
//! creator and the packages on offer.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use sigmora_core::academy;
use sigmora_core::ports::PortError;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorBody, ErrorCode, HttpError};
use crate::web::middleware::CreatorOnly;
use crate::web::packages::PackageView;
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcademyCodeResponse {
    pub academy_code: Option<String>,
    pub creator_name: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcademyView {
    pub creator_id: Uuid,
    pub creator_name: Option<String>,
    pub name: String,
    pub academy_code: String,
    pub packages: Vec<PackageView>,
}

fn invalid_code() -> HttpError {
    HttpError::new(
        StatusCode::NOT_FOUND,
        ErrorCode::InvalidAcademyCode,
        "Invalid academy code",
    )
}

/// GET /api/academy/code - The caller's own academy code
#[utoipa::path(
    get,
    path = "/api/academy/code",
    responses(
        (status = 200, description = "Academy code", body = AcademyCodeResponse),
        (status = 403, description = "Not a creator", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Academy"
)]
pub async fn academy_code_handler(CreatorOnly(ctx): CreatorOnly) -> Json<AcademyCodeResponse> {
    Json(AcademyCodeResponse {
        academy_code: ctx.user.academy_code,
        creator_name: ctx.user.creator_name,
    })
}

/// GET /api/academy/{code} - Resolve an academy code
#[utoipa::path(
    get,
    path = "/api/academy/{code}",
    params(("code" = String, Path, description = "Six-character academy code")),
    responses(
        (status = 200, description = "Creator and packages", body = AcademyView),
        (status = 404, description = "Unknown academy code", body = ErrorBody)
    ),
    tag = "Academy"
)]
pub async fn academy_lookup_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<AcademyView>, HttpError> {
    let code = academy::normalize_code(&code);
    if !academy::is_valid_code(&code) {
        return Err(invalid_code());
    }
    let creator = match state.users.find_creator_by_academy_code(&code).await {
        Ok(creator) => creator,
        Err(PortError::NotFound(_)) => return Err(invalid_code()),
        Err(e) => return Err(e.into()),
    };
    let packages = state.catalog.list_packages_by_creator(creator.id).await?;

    Ok(Json(AcademyView {
        creator_id: creator.id,
        creator_name: creator.creator_name,
        name: creator.name,
        academy_code: code,
        packages: packages.into_iter().map(PackageView::from).collect(),
    }))
}
