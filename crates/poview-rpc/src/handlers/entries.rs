//! Entry read/write handlers.

use super::{get_i64_param, require_bool_param, require_param, require_str_param};
use crate::server::AppState;
use poview_core::{EntryRecord, FilterCriteria, PoviewError};
use serde_json::{json, Value};
use std::sync::Arc;

/// Criteria come either under `criteria` or as the params object itself.
fn criteria_param(params: &Value) -> poview_core::Result<FilterCriteria> {
    let raw = params.get("criteria").unwrap_or(params);
    serde_json::from_value(raw.clone()).map_err(|e| PoviewError::InvalidParams {
        message: format!("Invalid criteria: {}", e),
    })
}

fn entries_value(entries: &[Arc<EntryRecord>]) -> poview_core::Result<Value> {
    let records: Vec<&EntryRecord> = entries.iter().map(Arc::as_ref).collect();
    Ok(serde_json::to_value(records)?)
}

fn record_param(params: &Value) -> poview_core::Result<EntryRecord> {
    let mut record: EntryRecord = require_param(params, "entry", "entry")?;
    record.ensure_key();
    Ok(record)
}

fn records_param(params: &Value) -> poview_core::Result<Vec<EntryRecord>> {
    let mut records: Vec<EntryRecord> = require_param(params, "entries", "entries")?;
    for record in &mut records {
        record.ensure_key();
    }
    Ok(records)
}

pub async fn load_entries(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let mut records: Vec<EntryRecord> = require_param(params, "entries", "entries")?;
    // Without explicit positions, display order is the order given
    let positioned = records.iter().any(|r| r.position != 0);
    for (index, record) in records.iter_mut().enumerate() {
        record.ensure_key();
        if !positioned {
            record.position = index as i64;
        }
    }
    let count = state.viewer.load_entries(&records)?;
    Ok(json!({ "count": count }))
}

pub async fn get_entry(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let key = require_str_param(params, "key", "key")?;
    let entry = state.viewer.get_entry(&key)?;
    Ok(serde_json::to_value(entry.as_deref())?)
}

pub async fn get_entries(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let keys: Vec<String> = require_param(params, "keys", "keys")?;
    let entries = state.viewer.get_entries_by_keys(&keys)?;
    entries_value(&entries)
}

pub async fn get_entry_at(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let index = get_i64_param(params, "index", "index")
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| PoviewError::InvalidParams {
            message: "Missing or negative parameter: index".to_string(),
        })?;
    let entry = state.viewer.get_entry_at(index)?;
    Ok(serde_json::to_value(entry.as_deref())?)
}

pub async fn get_filtered(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let criteria = criteria_param(params)?;
    let entries = state.viewer.get_filtered(&criteria)?;
    entries_value(&entries)
}

pub async fn count_filtered(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let criteria = criteria_param(params)?;
    let count = state.viewer.count_filtered(&criteria)?;
    Ok(json!({ "count": count }))
}

pub async fn update_entry(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let record = record_param(params)?;
    state.viewer.update_entry(&record)?;
    Ok(json!({ "key": record.key }))
}

pub async fn update_entries(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let records = records_param(params)?;
    let count = state.viewer.update_entries(&records)?;
    Ok(json!({ "count": count }))
}

pub async fn import_entries(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let records = records_param(params)?;
    let (inserted, updated) = state.viewer.import_entries(&records)?;
    Ok(json!({ "inserted": inserted, "updated": updated }))
}

pub async fn reorder_entries(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let keys: Vec<String> = require_param(params, "keys", "keys")?;
    let count = state.viewer.reorder_entries(&keys)?;
    Ok(json!({ "count": count }))
}

pub async fn set_flag(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let key = require_str_param(params, "key", "key")?;
    let flag = require_str_param(params, "flag", "flag")?;
    let on = require_bool_param(params, "on", "on")?;
    let changed = state.viewer.set_flag(&key, &flag, on)?;
    Ok(json!({ "changed": changed }))
}

pub async fn toggle_flag(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let key = require_str_param(params, "key", "key")?;
    let flag = require_str_param(params, "flag", "flag")?;
    let on = state.viewer.toggle_flag(&key, &flag)?;
    Ok(json!({ "on": on }))
}

pub async fn delete_entry(state: &AppState, params: &Value) -> poview_core::Result<Value> {
    let key = require_str_param(params, "key", "key")?;
    state.viewer.delete_entry(&key)?;
    Ok(json!({ "key": key }))
}
