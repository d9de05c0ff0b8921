//! services/api/src/web/rest.rs
//!
//! Contains the health and fallback handlers and the master definition for
//! the OpenAPI specification.

use crate::error::{ErrorBody, ErrorCode, FieldError, HttpError};
use crate::web::{academy, auth, payments, subscriptions};
use axum::{http::Uri, Json};
use serde::Serialize;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi, ToSchema,
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::register_creator_handler,
        auth::register_subscriber_handler,
        auth::login_handler,
        auth::me_handler,
        auth::logout_handler,
        auth::logout_all_handler,
        auth::refresh_handler,
        academy::academy_code_handler,
        academy::academy_lookup_handler,
        subscriptions::list_my_subscriptions_handler,
        subscriptions::subscription_status_handler,
        subscriptions::list_creator_subscriptions_handler,
        payments::initialize_payment_handler,
        payments::verify_payment_handler,
        payments::payment_callback_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorBody,
            ErrorCode,
            FieldError,
            auth::RegisterCreatorRequest,
            auth::RegisterSubscriberRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            auth::MeResponse,
            auth::TokenResponse,
            auth::MessageResponse,
            subscriptions::SubscriptionView,
            subscriptions::SubscriptionStatusResponse,
            payments::InitializePaymentRequest,
            payments::InitializePaymentResponse,
            payments::VerifyPaymentRequest,
            payments::VerifyPaymentResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and session lifecycle."),
        (name = "Academy", description = "Academy codes and lookups."),
        (name = "Subscriptions", description = "The subscription ledger."),
        (name = "Payments", description = "Checkout, verification and activation."),
        (name = "Health", description = "Liveness.")
    )
)]
pub struct ApiDoc;

/// Registers the bearer scheme referenced by `security(("bearer" = []))`.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// GET /api/health
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "Health"
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        message: "Sigmora API is running".to_string(),
    })
}

/// Answers unknown routes with the usual JSON error body.
pub async fn not_found_handler(uri: Uri) -> HttpError {
    HttpError::not_found(format!("Route {} not found", uri.path()))
}
