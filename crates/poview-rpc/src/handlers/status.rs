//! Catalog statistics and modification state.

use crate::server::AppState;
use serde_json::{json, Value};

pub async fn get_statistics(state: &AppState, _params: &Value) -> poview_core::Result<Value> {
    Ok(serde_json::to_value(state.viewer.statistics()?)?)
}

pub async fn get_flag_statistics(state: &AppState, _params: &Value) -> poview_core::Result<Value> {
    Ok(serde_json::to_value(state.viewer.flag_statistics()?)?)
}

pub async fn get_status(state: &AppState, _params: &Value) -> poview_core::Result<Value> {
    let viewer = &state.viewer;
    Ok(json!({
        "modified": viewer.is_modified(),
        "entries": viewer.store().count()?,
        "cache_enabled": viewer.cache_stats().enabled,
        "listeners": viewer.store().listener_count(),
    }))
}

pub async fn mark_saved(state: &AppState, _params: &Value) -> poview_core::Result<Value> {
    state.viewer.mark_saved();
    Ok(json!({ "modified": false }))
}
