//! services/api/src/web/router.rs
//!
//! Assembles the HTTP surface. Shared by the `api` binary and the
//! integration tests so both exercise the same routes and layers.

use crate::web::{
    academy, assets, auth, middleware::require_auth, packages, payments, rest, state::AppState,
    subscriptions, trades,
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

fn cors_layer(frontend_url: &str) -> CorsLayer {
    match frontend_url.trim_end_matches('/').parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]),
        Err(e) => {
            warn!(error = %e, frontend_url, "FRONTEND_URL is not a valid origin, CORS disabled");
            CorsLayer::new()
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/health", get(rest::health_handler))
        .route(
            "/api/auth/register/creator",
            post(auth::register_creator_handler),
        )
        .route(
            "/api/auth/register/subscriber",
            post(auth::register_subscriber_handler),
        )
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/academy/{code}", get(academy::academy_lookup_handler))
        .route(
            "/api/packages/creator/{creator_id}",
            get(packages::list_creator_packages_handler),
        )
        .route("/api/payments/verify", post(payments::verify_payment_handler))
        .route(
            "/api/payments/callback",
            get(payments::payment_callback_handler),
        );

    // Protected routes (auth required)
    let protected_routes = Router::new()
        // --- Auth ---
        .route("/api/auth/me", get(auth::me_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route("/api/auth/logout-all", post(auth::logout_all_handler))
        .route("/api/auth/refresh", post(auth::refresh_handler))
        // --- Academy ---
        .route("/api/academy/code", get(academy::academy_code_handler))
        // --- Packages ---
        .route("/api/packages", post(packages::create_package_handler))
        .route(
            "/api/packages/creator",
            get(packages::list_own_packages_handler),
        )
        .route(
            "/api/packages/{id}",
            get(packages::get_package_handler)
                .put(packages::update_package_handler)
                .delete(packages::delete_package_handler),
        )
        // --- Assets ---
        .route(
            "/api/assets",
            get(assets::list_own_assets_handler).post(assets::create_asset_handler),
        )
        .route(
            "/api/assets/{id}",
            get(assets::get_asset_handler)
                .put(assets::update_asset_handler)
                .delete(assets::delete_asset_handler),
        )
        // --- Trades ---
        .route("/api/trades", post(trades::create_trade_handler))
        .route("/api/trades/active", get(trades::list_active_trades_handler))
        .route(
            "/api/trades/completed",
            get(trades::list_completed_trades_handler),
        )
        .route(
            "/api/trades/subscriber/active",
            get(trades::subscriber_active_trades_handler),
        )
        .route(
            "/api/trades/subscriber/completed",
            get(trades::subscriber_completed_trades_handler),
        )
        .route("/api/trades/{id}", get(trades::get_trade_handler))
        .route("/api/trades/{id}/close", put(trades::close_trade_handler))
        // --- Subscriptions ---
        .route(
            "/api/subscriptions",
            get(subscriptions::list_my_subscriptions_handler),
        )
        .route(
            "/api/subscriptions/status",
            get(subscriptions::subscription_status_handler),
        )
        .route(
            "/api/subscriptions/creator",
            get(subscriptions::list_creator_subscriptions_handler),
        )
        // --- Payments ---
        .route(
            "/api/payments/initialize",
            post(payments::initialize_payment_handler),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let cors = cors_layer(&state.config.frontend_url);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(rest::not_found_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
