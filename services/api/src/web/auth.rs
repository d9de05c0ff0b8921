//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: registration for both roles, login, identity,
//! logout (one device or all) and token refresh. Every token handed out is
//! backed by a session row, so revoking the row revokes the token.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sigmora_core::academy;
use sigmora_core::domain::{normalize_email, NewSession, NewUser, SessionMetadata, User};
use sigmora_core::ports::{PortError, UniqueKey};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorBody, ErrorCode, HttpError};
use crate::token::IssuedToken;
use crate::web::middleware::{AuthContext, ClientMetadata};
use crate::web::state::AppState;
use crate::web::validation::{JsonBody, Violations};

/// How many fresh academy codes a creator registration tries before giving up.
const ACADEMY_CODE_ATTEMPTS: usize = 5;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCreatorRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Academy display name; defaults to `name`.
    pub creator_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSubscriberRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub academy_code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// The public view of an account.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub creator_name: Option<String>,
    pub academy_code: Option<String>,
    pub subscribed_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            creator_name: user.creator_name.clone(),
            academy_code: user.academy_code.clone(),
            subscribed_to: user.subscribed_to,
            created_at: user.created_at,
        }
    }
}

/// The creator a subscriber belongs to.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatorInfo {
    pub id: Uuid,
    pub creator_name: Option<String>,
    pub academy_code: Option<String>,
}

impl From<&User> for CreatorInfo {
    fn from(creator: &User) -> Self {
        Self {
            id: creator.id,
            creator_name: creator.creator_name.clone(),
            academy_code: creator.academy_code.clone(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserView,
    pub creator_info: Option<CreatorInfo>,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: UserView,
    pub creator_info: Option<CreatorInfo>,
    pub session_expires_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

//=========================================================================================
// Shared Steps
//=========================================================================================

fn hash_password(password: &str) -> Result<String, HttpError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            HttpError::internal("Failed to hash password")
        })
}

fn verify_password(password: &str, stored_hash: &str) -> Result<bool, HttpError> {
    let parsed_hash = PasswordHash::new(stored_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        HttpError::internal("Authentication error")
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Signs a token for `user_id` and records the session backing it.
async fn start_session(
    state: &AppState,
    user_id: Uuid,
    metadata: SessionMetadata,
) -> Result<IssuedToken, HttpError> {
    let issued = state.tokens.issue(user_id).map_err(|e| {
        error!(error = %e, "Failed to sign token");
        HttpError::internal("Failed to create session")
    })?;
    state
        .sessions
        .create_session(NewSession {
            user_id,
            token: issued.token.clone(),
            expires_at: issued.expires_at,
            metadata,
        })
        .await?;
    Ok(issued)
}

/// The creator record of a subscriber, read separately on login and `me`.
async fn creator_info(state: &AppState, user: &User) -> Result<Option<CreatorInfo>, HttpError> {
    let Some(creator_id) = user.subscribed_to else {
        return Ok(None);
    };
    match state.users.get_user_by_id(creator_id).await {
        Ok(creator) => Ok(Some(CreatorInfo::from(&creator))),
        Err(PortError::NotFound(_)) => {
            warn!(user_id = %user.id, %creator_id, "subscriber points at a missing creator");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn duplicate_email() -> HttpError {
    HttpError::new(
        StatusCode::CONFLICT,
        ErrorCode::DuplicateEmail,
        "User already exists",
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/register/creator - Create a creator account and its academy
#[utoipa::path(
    post,
    path = "/api/auth/register/creator",
    request_body = RegisterCreatorRequest,
    responses(
        (status = 201, description = "Creator registered", body = AuthResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    tag = "Auth"
)]
pub async fn register_creator_handler(
    State(state): State<Arc<AppState>>,
    ClientMetadata(metadata): ClientMetadata,
    JsonBody(req): JsonBody<RegisterCreatorRequest>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. Validate the input
    Violations::new()
        .require_text(&req.name, "name", "Name is required")
        .require_email(&req.email)
        .require_password(&req.password)
        .finish()?;

    // 2. Hash the password
    let password_hash = hash_password(&req.password)?;

    // 3. Create the user, drawing a new academy code on collision
    let mut created = None;
    for _ in 0..ACADEMY_CODE_ATTEMPTS {
        let code = academy::generate_code(&mut rand::thread_rng());
        let new_user = NewUser::creator(
            &req.name,
            &req.email,
            password_hash.clone(),
            req.creator_name.as_deref(),
            code,
        );
        match state.users.create_user(new_user).await {
            Ok(user) => {
                created = Some(user);
                break;
            }
            Err(PortError::Duplicate(UniqueKey::AcademyCode)) => continue,
            Err(PortError::Duplicate(UniqueKey::Email)) => return Err(duplicate_email()),
            Err(e) => return Err(e.into()),
        }
    }
    let user = created.ok_or_else(|| {
        error!("Exhausted academy code attempts");
        HttpError::internal("Failed to allocate an academy code")
    })?;

    // 4. Issue the token and its session
    let issued = start_session(&state, user.id, metadata).await?;
    info!(user_id = %user.id, "creator registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserView::from(&user),
            creator_info: None,
            token: issued.token,
            expires_at: issued.expires_at,
        }),
    ))
}

/// POST /api/auth/register/subscriber - Join a creator's academy by code
#[utoipa::path(
    post,
    path = "/api/auth/register/subscriber",
    request_body = RegisterSubscriberRequest,
    responses(
        (status = 201, description = "Subscriber registered", body = AuthResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 404, description = "Unknown academy code", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    tag = "Auth"
)]
pub async fn register_subscriber_handler(
    State(state): State<Arc<AppState>>,
    ClientMetadata(metadata): ClientMetadata,
    JsonBody(req): JsonBody<RegisterSubscriberRequest>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. Validate the input
    Violations::new()
        .require_email(&req.email)
        .require_password(&req.password)
        .require_text(&req.academy_code, "academyCode", "Academy code is required")
        .finish()?;

    // 2. Resolve the academy
    let code = academy::normalize_code(&req.academy_code);
    let creator = match state.users.find_creator_by_academy_code(&code).await {
        Ok(creator) => creator,
        Err(PortError::NotFound(_)) => {
            return Err(HttpError::new(
                StatusCode::NOT_FOUND,
                ErrorCode::InvalidAcademyCode,
                "Invalid academy code",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    // 3. Create the subscriber bound to that creator
    let password_hash = hash_password(&req.password)?;
    let user = match state
        .users
        .create_user(NewUser::subscriber(&req.email, password_hash, creator.id))
        .await
    {
        Ok(user) => user,
        Err(PortError::Duplicate(UniqueKey::Email)) => return Err(duplicate_email()),
        Err(e) => return Err(e.into()),
    };

    // 4. Issue the token and its session
    let issued = start_session(&state, user.id, metadata).await?;
    info!(user_id = %user.id, creator_id = %creator.id, "subscriber registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserView::from(&user),
            creator_info: Some(CreatorInfo::from(&creator)),
            token: issued.token,
            expires_at: issued.expires_at,
        }),
    ))
}

/// POST /api/auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    ),
    tag = "Auth"
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ClientMetadata(metadata): ClientMetadata,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, HttpError> {
    let invalid =
        || HttpError::unauthenticated(ErrorCode::InvalidCredentials, "Invalid email or password");

    // 1. Validate the input
    Violations::new()
        .require_email(&req.email)
        .require_text(&req.password, "password", "Password is required")
        .finish()?;

    // 2. Get the user by email
    let creds = match state
        .users
        .get_credentials_by_email(&normalize_email(&req.email))
        .await
    {
        Ok(creds) => creds,
        Err(PortError::NotFound(_)) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };

    // 3. Verify the password
    if !verify_password(&req.password, &creds.password_hash)? {
        return Err(invalid());
    }

    // 4. Resolve the academy before anything is written
    let creator_info = creator_info(&state, &creds.user).await?;

    // 5. Issue the token and its session
    let issued = start_session(&state, creds.user.id, metadata).await?;
    info!(user_id = %creds.user.id, "user logged in");

    Ok(Json(AuthResponse {
        user: UserView::from(&creds.user),
        creator_info,
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

/// GET /api/auth/me - The authenticated identity
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Auth"
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<MeResponse>, HttpError> {
    let creator_info = creator_info(&state, &ctx.user).await?;
    Ok(Json(MeResponse {
        user: UserView::from(&ctx.user),
        creator_info,
        session_expires_at: ctx.session.expires_at,
    }))
}

/// POST /api/auth/logout - Invalidate the current session
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Auth"
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<MessageResponse>, HttpError> {
    state
        .sessions
        .invalidate_session(&ctx.token, ctx.user.id)
        .await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// POST /api/auth/logout-all - Invalidate every session of the user
#[utoipa::path(
    post,
    path = "/api/auth/logout-all",
    responses(
        (status = 200, description = "Logged out everywhere", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Auth"
)]
pub async fn logout_all_handler(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<MessageResponse>, HttpError> {
    let count = state.sessions.invalidate_all_sessions(ctx.user.id).await?;
    info!(user_id = %ctx.user.id, sessions = count, "logged out from all devices");
    Ok(Json(MessageResponse::new(
        "Logged out from all devices successfully",
    )))
}

/// POST /api/auth/refresh - Swap the current token for a fresh one
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "New token issued", body = TokenResponse),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Auth"
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    ClientMetadata(metadata): ClientMetadata,
    ctx: AuthContext,
) -> Result<Json<TokenResponse>, HttpError> {
    // 1. Retire the current session
    state
        .sessions
        .invalidate_session(&ctx.token, ctx.user.id)
        .await?;

    // 2. Issue the replacement
    let issued = start_session(&state, ctx.user.id, metadata).await?;
    Ok(Json(TokenResponse {
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hashes_verify_only_the_original() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn corrupt_hash_is_an_internal_error() {
        let err = verify_password("x", "not-a-phc-string").unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
