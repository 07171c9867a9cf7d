// API module - HTTP endpoints

use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use middleware::session::AppState;

pub mod admin;
pub mod bids;
pub mod events;
pub mod health;
pub mod me;
pub mod middleware;
pub mod tickets;

/// Builds the full application router
pub fn app(state: AppState) -> Router {
    let cors = state
        .config
        .cors_allowed_origin
        .as_deref()
        .and_then(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .map(|origin| {
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        });

    let router = Router::new()
        .merge(health::router())
        .merge(events::router())
        .merge(tickets::router())
        .merge(bids::router())
        .merge(me::router())
        .merge(admin::router())
        .layer(TraceLayer::new_for_http());

    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.with_state(state)
}
