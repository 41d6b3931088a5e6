//! Cache control handlers.

use super::{get_bool_param, require_bool_param, require_param};
use crate::server::AppState;
use serde_json::{json, Value};

/// Schedule a background warm-up of the entry cache.
///
/// With `wait: true` the call returns the finished task's outcome instead of
/// returning as soon as the task is scheduled.
pub async fn prefetch(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let keys: Vec<String> = require_param(params, "keys", "keys")?;
    let wait = get_bool_param(params, "wait", "wait").unwrap_or(false);

    let Some(handle) = state.viewer.prefetch(keys) else {
        return Ok(json!({ "scheduled": false, "keys": [] }));
    };

    let scheduled = handle.keys().to_vec();
    if wait {
        let outcome = handle.join().await;
        return Ok(json!({
            "scheduled": true,
            "keys": scheduled,
            "outcome": outcome,
        }));
    }
    Ok(json!({ "scheduled": true, "keys": scheduled }))
}

pub async fn clear_cache(state: &AppState, _params: &Value) -> poview_core::Result<Value> {
    state.viewer.clear_all();
    Ok(json!({ "cleared": true }))
}

pub async fn get_cache_stats(state: &AppState, _params: &Value) -> poview_core::Result<Value> {
    Ok(serde_json::to_value(state.viewer.cache_stats())?)
}

pub async fn set_cache_enabled(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let enabled = require_bool_param(params, "enabled", "enabled")?;
    state.viewer.set_cache_enabled(enabled);
    Ok(json!({ "enabled": state.viewer.cache_stats().enabled }))
}
