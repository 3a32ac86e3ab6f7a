//! countgate-api: REST API for countgate.
//!
//! Wraps the shared store in a [`Gateway`] and exposes it over axum. Every
//! `/api/v1` request also bumps the ambient page-hit counter.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/get/{key}` | Read a value |
//! | GET, POST | `/api/v1/set/{key}` | Overwrite a value (`value` param) |
//! | GET, POST | `/api/v1/hit/{key}` | Increment (`amount` param, default 1) |
//! | GET, POST | `/api/v1/decr/{key}` | Decrement (`amount` param, default 1) |
//! | DELETE | `/api/v1/delete/{key}` | Delete a key |
//! | GET | `/api/v1/info/{key}` | Existence and value |
//! | GET | `/api/v1/status` | Uptime, page hits, key count, store stats |
//! | GET | `/api/v1/status/memory` | Store memory section |
//! | GET | `/health` | Store liveness |

pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;

use std::any::Any;
use std::sync::Arc;

use axum::Router;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use countgate_core::config::RateLimitConfig;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;

use middleware::RequestLimiter;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub gateway: Arc<Gateway>,
}

/// Build the complete router (counter API + health).
pub fn build_router(gateway: Arc<Gateway>, rate_limit: Option<&RateLimitConfig>) -> Router {
    let state = ApiState { gateway };

    let mut api_routes = Router::new()
        .route("/get/{key}", get(handlers::get_value))
        .route("/set/{key}", get(handlers::set_value).post(handlers::set_value))
        .route(
            "/hit/{key}",
            get(handlers::increment_value).post(handlers::increment_value),
        )
        .route(
            "/decr/{key}",
            get(handlers::decrement_value).post(handlers::decrement_value),
        )
        .route("/delete/{key}", delete(handlers::delete_key))
        .route("/info/{key}", get(handlers::key_info))
        .route("/status", get(handlers::status))
        .route("/status/memory", get(handlers::memory_status))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::count_page_hits,
        ))
        .with_state(state.clone());

    if let Some(config) = rate_limit {
        match RequestLimiter::from_config(config) {
            Some(limiter) => {
                info!(
                    per_second = config.per_second,
                    burst = config.burst(),
                    "rate limiting enabled"
                );
                api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
                    Arc::new(limiter),
                    middleware::rate_limit,
                ));
            }
            None => warn!("rate limit configured with a zero rate; limiting disabled"),
        }
    }

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health).with_state(state))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(%detail, "handler panicked");
    GatewayError::Internal(detail).into_response()
}
