//! REST API handlers.
//!
//! Every counter route goes through [`run`], which turns a gateway result into
//! a JSON response: `{message, ...result}` on success, `{error}` otherwise.

use std::collections::HashMap;
use std::future::Future;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, RawQuery, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use countgate_core::ValidationError;
use serde::Serialize;
use tracing::{debug, error};
use url::form_urlencoded;

use crate::ApiState;
use crate::error::{GatewayError, GatewayResult};

/// Success envelope. The result's fields are inlined next to `message`.
#[derive(Serialize)]
struct Success<'a, T: Serialize> {
    message: &'a str,
    #[serde(flatten)]
    result: T,
}

/// Await a gateway operation and render its outcome.
pub async fn run<T, F>(op: &'static str, message: &'static str, fut: F) -> Response
where
    T: Serialize,
    F: Future<Output = GatewayResult<T>>,
{
    match fut.await {
        Ok(result) => Json(Success { message, result }).into_response(),
        Err(e) => {
            match &e {
                GatewayError::InvalidInput(_)
                | GatewayError::NotFound { .. }
                | GatewayError::NotNumeric { .. } => {
                    debug!(op, key = ?e.key(), error = %e, "request rejected");
                }
                GatewayError::StoreUnavailable { .. }
                | GatewayError::Store { .. }
                | GatewayError::Internal(_) => {
                    error!(op, key = ?e.key(), error = %e, "operation failed");
                }
            }
            e.into_response()
        }
    }
}

/// The `{key}` path segment.
///
/// Decoding failures (e.g. percent-encoded bytes that are not UTF-8) are
/// reported as invalid input with the usual JSON error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath(pub String);

impl<S> FromRequestParts<S> for KeyPath
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<String>::from_request_parts(parts, state).await {
            Ok(Path(key)) => Ok(KeyPath(key)),
            Err(rejection) => {
                let detail = rejection.body_text();
                debug!(path = %parts.uri.path(), %detail, "undecodable key");
                Err(ValidationError::MalformedKey(detail).into())
            }
        }
    }
}

/// Named parameters from the query string and request body.
///
/// The query string wins when both carry the same name. Bodies are read as a
/// JSON object when they look like one, otherwise as a urlencoded form.
#[derive(Debug, Default)]
pub struct Params {
    query: HashMap<String, String>,
    body: HashMap<String, String>,
}

impl Params {
    pub fn new(query: Option<&str>, headers: &HeaderMap, body: &[u8]) -> Self {
        let query = query
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self {
            query,
            body: parse_body(headers, body),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .or_else(|| self.body.get(name))
            .map(String::as_str)
    }
}

fn parse_body(headers: &HeaderMap, body: &[u8]) -> HashMap<String, String> {
    if body.is_empty() {
        return HashMap::new();
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
        || body.trim_ascii_start().starts_with(b"{");

    if !is_json {
        return form_urlencoded::parse(body).into_owned().collect();
    }

    match serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(body) {
        Ok(object) => object
            .into_iter()
            .filter_map(|(name, value)| match value {
                serde_json::Value::String(s) => Some((name, s)),
                serde_json::Value::Number(n) => Some((name, n.to_string())),
                _ => None,
            })
            .collect(),
        Err(e) => {
            debug!(error = %e, "ignoring malformed JSON body");
            HashMap::new()
        }
    }
}

// ── Counters ───────────────────────────────────────────────────

/// GET /api/v1/get/{key}
pub async fn get_value(State(state): State<ApiState>, KeyPath(key): KeyPath) -> Response {
    run("get_value", "Value retrieved", state.gateway.get_value(&key)).await
}

/// GET|POST /api/v1/set/{key}
pub async fn set_value(
    State(state): State<ApiState>,
    KeyPath(key): KeyPath,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = Params::new(query.as_deref(), &headers, &body);
    run(
        "set_value",
        "Value set",
        state.gateway.set_value(&key, params.get("value")),
    )
    .await
}

/// GET|POST /api/v1/hit/{key}
pub async fn increment_value(
    State(state): State<ApiState>,
    KeyPath(key): KeyPath,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = Params::new(query.as_deref(), &headers, &body);
    run(
        "increment_value",
        "Value incremented",
        state.gateway.increment_value(&key, params.get("amount")),
    )
    .await
}

/// GET|POST /api/v1/decr/{key}
pub async fn decrement_value(
    State(state): State<ApiState>,
    KeyPath(key): KeyPath,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = Params::new(query.as_deref(), &headers, &body);
    run(
        "decrement_value",
        "Value decremented",
        state.gateway.decrement_value(&key, params.get("amount")),
    )
    .await
}

/// DELETE /api/v1/delete/{key}
pub async fn delete_key(State(state): State<ApiState>, KeyPath(key): KeyPath) -> Response {
    run("delete_key", "Key deleted", state.gateway.delete_key(&key)).await
}

/// GET /api/v1/info/{key}
pub async fn key_info(State(state): State<ApiState>, KeyPath(key): KeyPath) -> Response {
    run("key_info", "Key info retrieved", state.gateway.key_info(&key)).await
}

// ── Status ─────────────────────────────────────────────────────

/// GET /api/v1/status
pub async fn status(State(state): State<ApiState>) -> Response {
    run("status", "Status retrieved", state.gateway.status()).await
}

/// GET /api/v1/status/memory
pub async fn memory_status(State(state): State<ApiState>) -> Response {
    run(
        "memory_status",
        "Memory status retrieved",
        state.gateway.memory_status(),
    )
    .await
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Response {
    let report = state.gateway.health_check().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
