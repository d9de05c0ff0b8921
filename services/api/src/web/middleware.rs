//! services/api/src/web/middleware.rs
//!
//! The auth gate for protected routes and the extractors handlers use to read
//! what it resolved.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use sigmora_core::domain::{AuthSession, Role, SessionMetadata, SessionState, User};
use sigmora_core::ports::PortError;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ErrorCode, HttpError};
use crate::token::TokenError;
use crate::web::state::AppState;

/// What the gate attaches to every authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session: AuthSession,
    /// The raw bearer token, needed by logout and refresh.
    pub token: String,
}

impl AuthContext {
    /// 403 `NOT_OWNER` unless the caller owns the resource.
    pub fn ensure_owns(&self, owner_id: Uuid) -> Result<(), HttpError> {
        if self.user.id == owner_id {
            Ok(())
        } else {
            Err(HttpError::not_owner())
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that resolves the bearer token to a live session and its user.
///
/// If valid, inserts an `AuthContext` into request extensions for handlers to use.
/// Every failure is a 401 with a specific code.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    // 1. Extract the bearer token
    let token = bearer_token(req.headers())
        .ok_or_else(|| HttpError::unauthenticated(ErrorCode::NoToken, "Not authorized, no token"))?
        .to_string();

    // 2. Verify signature and expiry
    let user_id = state.tokens.verify(&token).map_err(|e| match e {
        TokenError::Expired => {
            HttpError::unauthenticated(ErrorCode::TokenExpired, "Token expired, please login again")
        }
        _ => HttpError::unauthenticated(ErrorCode::InvalidToken, "Not authorized, token failed"),
    })?;

    // 3. Find the active session backing this token
    let session = state
        .sessions
        .find_active_session(&token, user_id)
        .await?
        .ok_or_else(|| {
            HttpError::unauthenticated(ErrorCode::InvalidSession, "Session invalid or expired")
        })?;

    // 4. Reject (and retire) sessions past their expiry
    let now = Utc::now();
    match session.state_at(now) {
        SessionState::Valid => {}
        SessionState::Expired => {
            if let Err(e) = state.sessions.invalidate_session(&token, user_id).await {
                warn!(error = %e, session_id = %session.id, "failed to retire expired session");
            }
            return Err(HttpError::unauthenticated(
                ErrorCode::SessionExpired,
                "Session expired, please login again",
            ));
        }
        SessionState::Invalidated => {
            return Err(HttpError::unauthenticated(
                ErrorCode::InvalidSession,
                "Session invalid or expired",
            ));
        }
    }

    // 5. Touch the session (best effort)
    if let Err(e) = state.sessions.touch_session(session.id, now).await {
        debug!(error = %e, session_id = %session.id, "failed to touch session");
    }

    // 6. Load the user
    let user = state.users.get_user_by_id(user_id).await.map_err(|e| match e {
        PortError::NotFound(_) => {
            HttpError::unauthenticated(ErrorCode::UserNotFound, "User not found")
        }
        other => HttpError::from(other),
    })?;

    // 7. Attach and continue
    req.extensions_mut().insert(AuthContext {
        user,
        session,
        token,
    });
    Ok(next.run(req).await)
}

//=========================================================================================
// Extractors
//=========================================================================================

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| HttpError::unauthenticated(ErrorCode::NoToken, "Not authorized, no token"))
    }
}

fn require_role(ctx: &AuthContext, role: Role) -> Result<(), HttpError> {
    if ctx.user.role == role {
        Ok(())
    } else {
        Err(HttpError::forbidden(
            ErrorCode::InsufficientPermissions,
            format!("Access denied. {} role required.", capitalize(role.as_str())),
        ))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// An authenticated creator. Place it before any body extractor.
#[derive(Debug, Clone)]
pub struct CreatorOnly(pub AuthContext);

impl<S> FromRequestParts<S> for CreatorOnly
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = AuthContext::from_request_parts(parts, state).await?;
        require_role(&ctx, Role::Creator)?;
        Ok(CreatorOnly(ctx))
    }
}

/// An authenticated subscriber. Place it before any body extractor.
#[derive(Debug, Clone)]
pub struct SubscriberOnly(pub AuthContext);

impl<S> FromRequestParts<S> for SubscriberOnly
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = AuthContext::from_request_parts(parts, state).await?;
        require_role(&ctx, Role::Subscriber)?;
        Ok(SubscriberOnly(ctx))
    }
}

/// Client address and user agent, recorded on new sessions.
#[derive(Debug, Clone, Default)]
pub struct ClientMetadata(pub SessionMetadata);

impl<S> FromRequestParts<S> for ClientMetadata
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ClientMetadata(SessionMetadata {
            ip_address,
            user_agent,
        }))
    }
}
