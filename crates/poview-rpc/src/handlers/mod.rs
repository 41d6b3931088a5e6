//! JSON-RPC request handlers, split by domain.

mod cache;
mod entries;
mod status;

use crate::server::AppState;
use crate::wrapper::wrap_response;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use poview_core::PoviewError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }

    fn from_error(id: Option<Value>, err: &PoviewError) -> Self {
        let mut response = Self::error(id, err.to_rpc_error_code(), err.to_string());
        if let Some(error) = response.error.as_mut() {
            error.data = Some(json!({ "retryable": err.is_retryable() }));
        }
        response
    }
}

/// JSON-RPC code for an unknown method.
const METHOD_NOT_FOUND: i32 = -32601;

// ============================================================================
// Parameter extraction helpers
// ============================================================================

fn lookup<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .filter(|v| !v.is_null())
}

fn missing(snake: &str) -> PoviewError {
    PoviewError::InvalidParams {
        message: format!("Missing required parameter: {}", snake),
    }
}

/// Extract an optional string parameter, supporting both snake_case and camelCase.
pub(crate) fn get_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a str> {
    lookup(params, snake, camel).and_then(|v| v.as_str())
}

/// Extract a required string parameter or return an error.
pub(crate) fn require_str_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> poview_core::Result<String> {
    get_str_param(params, snake, camel)
        .map(String::from)
        .ok_or_else(|| missing(snake))
}

/// Extract an optional bool parameter, supporting both snake_case and camelCase.
pub(crate) fn get_bool_param(params: &Value, snake: &str, camel: &str) -> Option<bool> {
    lookup(params, snake, camel).and_then(|v| v.as_bool())
}

/// Extract a required bool parameter or return an error.
pub(crate) fn require_bool_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> poview_core::Result<bool> {
    get_bool_param(params, snake, camel).ok_or_else(|| missing(snake))
}

/// Extract an optional i64 parameter, supporting both snake_case and camelCase.
pub(crate) fn get_i64_param(params: &Value, snake: &str, camel: &str) -> Option<i64> {
    lookup(params, snake, camel).and_then(|v| v.as_i64())
}

/// Deserialize a required structured parameter.
pub(crate) fn require_param<T: DeserializeOwned>(
    params: &Value,
    snake: &str,
    camel: &str,
) -> poview_core::Result<T> {
    let value = lookup(params, snake, camel).ok_or_else(|| missing(snake))?;
    serde_json::from_value(value.clone()).map_err(|e| PoviewError::InvalidParams {
        message: format!("Invalid parameter {}: {}", snake, e),
    })
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = request.method.as_str();
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id;

    debug!("RPC call: {}({:?})", method, params);

    // Handle built-in methods
    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    let Some(result) = dispatch_method(&state, method, &params).await else {
        warn!("Method not found: {}", method);
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            )),
        );
    };

    match result {
        Ok(value) => {
            let wrapped = wrap_response(method, value);
            (StatusCode::OK, Json(JsonRpcResponse::success(id, wrapped)))
        }
        Err(e) => {
            error!("RPC error for {}: {}", method, e);
            (StatusCode::OK, Json(JsonRpcResponse::from_error(id, &e)))
        }
    }
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate domain handler.
///
/// Returns `None` for an unknown method.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> Option<poview_core::Result<Value>> {
    let result = match method {
        // Entries
        "load_entries" => entries::load_entries(state, params).await,
        "get_entry" => entries::get_entry(state, params).await,
        "get_entries" => entries::get_entries(state, params).await,
        "get_entry_at" => entries::get_entry_at(state, params).await,
        "get_filtered" => entries::get_filtered(state, params).await,
        "count_filtered" => entries::count_filtered(state, params).await,
        "update_entry" => entries::update_entry(state, params).await,
        "update_entries" => entries::update_entries(state, params).await,
        "import_entries" => entries::import_entries(state, params).await,
        "reorder_entries" => entries::reorder_entries(state, params).await,
        "set_flag" => entries::set_flag(state, params).await,
        "toggle_flag" => entries::toggle_flag(state, params).await,
        "delete_entry" => entries::delete_entry(state, params).await,

        // Cache
        "prefetch" => cache::prefetch(state, params).await,
        "clear_cache" => cache::clear_cache(state, params).await,
        "get_cache_stats" => cache::get_cache_stats(state, params).await,
        "set_cache_enabled" => cache::set_cache_enabled(state, params).await,

        // Status
        "get_statistics" => status::get_statistics(state, params).await,
        "get_flag_statistics" => status::get_flag_statistics(state, params).await,
        "get_status" => status::get_status(state, params).await,
        "mark_saved" => status::mark_saved(state, params).await,

        _ => return None,
    };
    Some(result)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_response_success() {
        let response = JsonRpcResponse::success(Some(json!(1)), json!({"data": "test"}));
        assert!(response.error.is_none());
        assert!(response.result.is_some());
    }

    #[test]
    fn test_json_rpc_response_from_error() {
        let err = PoviewError::EntryNotFound { key: "|x".into() };
        let response = JsonRpcResponse::from_error(Some(json!(1)), &err);
        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, -32002);
        assert_eq!(error.data, Some(json!({"retryable": false})));
    }

    #[test]
    fn test_params_accept_camel_case() {
        let params = json!({"cacheEnabled": true, "key": "|a", "index": 3});
        assert_eq!(get_bool_param(&params, "cache_enabled", "cacheEnabled"), Some(true));
        assert_eq!(get_str_param(&params, "key", "key"), Some("|a"));
        assert_eq!(get_i64_param(&params, "index", "index"), Some(3));
    }

    #[test]
    fn test_missing_param_is_invalid_params() {
        let err = require_str_param(&json!({}), "key", "key").unwrap_err();
        assert_eq!(err.to_rpc_error_code(), -32602);

        let err = require_param::<Vec<String>>(&json!({"keys": "nope"}), "keys", "keys")
            .unwrap_err();
        assert_eq!(err.to_rpc_error_code(), -32602);
    }
}
