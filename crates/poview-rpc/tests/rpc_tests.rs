//! Router tests for the poview-rpc JSON-RPC server.
//!
//! Requests are driven in-process through `tower::ServiceExt::oneshot`, so no
//! socket is bound.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use poview_core::{CacheConfig, EntryViewer};
use poview_rpc::server::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_router() -> Router {
    let viewer = EntryViewer::new(CacheConfig::default()).unwrap();
    build_router(Arc::new(AppState::new(viewer)))
}

/// Make an RPC call and return the full JSON-RPC payload.
async fn rpc_call_raw(app: &Router, method: &str, params: Value) -> Value {
    let body = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    });
    let request = Request::builder()
        .method(Method::POST)
        .uri("/rpc")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Make an RPC call, panicking on a JSON-RPC error.
async fn rpc_call(app: &Router, method: &str, params: Value) -> Value {
    let payload = rpc_call_raw(app, method, params).await;
    if let Some(error) = payload.get("error") {
        panic!("{} failed: {}", method, error);
    }
    payload["result"].clone()
}

async fn load_cat_dog(app: &Router) {
    let result = rpc_call(
        app,
        "load_entries",
        json!({"entries": [
            {"msgid": "A", "msgstr": "cat"},
            {"msgid": "B", "msgstr": "dog"},
        ]}),
    )
    .await;
    assert_eq!(result["count"], 2);
}

fn keys(result: &Value) -> Vec<String> {
    result["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["key"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_health_check_method() {
    let app = create_test_router();
    let result = rpc_call(&app, "health_check", json!({})).await;
    assert_eq!(result["status"], "ok");
}

#[tokio::test]
async fn test_unknown_method() {
    let app = create_test_router();
    let payload = rpc_call_raw(&app, "no_such_method", json!({})).await;
    assert_eq!(payload["error"]["code"], -32601);
    assert_eq!(payload["id"], 1);
}

#[tokio::test]
async fn test_filter_update_and_refilter() {
    let app = create_test_router();
    load_cat_dog(&app).await;

    let result = rpc_call(&app, "get_filtered", json!({"criteria": {"keyword": "cat"}})).await;
    assert_eq!(result["success"], true);
    assert_eq!(keys(&result), vec!["|A"]);

    let mut b = rpc_call(&app, "get_entry", json!({"key": "|B"})).await;
    b["msgstr"] = json!("catfish");
    rpc_call(&app, "update_entry", json!({"entry": b})).await;

    let result = rpc_call(&app, "get_filtered", json!({"keyword": "cat"})).await;
    assert_eq!(keys(&result), vec!["|A", "|B"]);

    let count = rpc_call(&app, "count_filtered", json!({"keyword": "cat"})).await;
    assert_eq!(count["count"], 2);
}

#[tokio::test]
async fn test_get_entries_keeps_order_and_skips_missing() {
    let app = create_test_router();
    load_cat_dog(&app).await;

    let result = rpc_call(&app, "get_entries", json!({"keys": ["|B", "|missing", "|A"]})).await;
    assert_eq!(keys(&result), vec!["|B", "|A"]);

    let missing = rpc_call(&app, "get_entry", json!({"key": "|missing"})).await;
    assert!(missing.is_null());

    let first = rpc_call(&app, "get_entry_at", json!({"index": 0})).await;
    assert_eq!(first["key"], "|A");
}

#[tokio::test]
async fn test_flags_and_statistics() {
    let app = create_test_router();
    load_cat_dog(&app).await;

    let result = rpc_call(&app, "toggle_flag", json!({"key": "|A", "flag": "fuzzy"})).await;
    assert_eq!(result["on"], true);
    let result = rpc_call(
        &app,
        "set_flag",
        json!({"key": "|A", "flag": "fuzzy", "on": true}),
    )
    .await;
    assert_eq!(result["changed"], false);

    let stats = rpc_call(&app, "get_statistics", json!({})).await;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["fuzzy"], 1);
    assert_eq!(stats["translated"], 1);

    let flags = rpc_call(&app, "get_flag_statistics", json!({})).await;
    assert_eq!(flags["fuzzy"], 1);

    let status = rpc_call(&app, "get_status", json!({})).await;
    assert_eq!(status["modified"], true);
    rpc_call(&app, "mark_saved", json!({})).await;
    let status = rpc_call(&app, "get_status", json!({})).await;
    assert_eq!(status["modified"], false);
}

#[tokio::test]
async fn test_errors_map_to_rpc_codes() {
    let app = create_test_router();
    load_cat_dog(&app).await;

    let payload = rpc_call_raw(&app, "delete_entry", json!({"key": "|missing"})).await;
    assert_eq!(payload["error"]["code"], -32002);

    let payload = rpc_call_raw(&app, "get_entry", json!({})).await;
    assert_eq!(payload["error"]["code"], -32602);

    let payload = rpc_call_raw(&app, "get_filtered", json!({"status": "sideways"})).await;
    assert_eq!(payload["error"]["code"], -32602);
}

#[tokio::test]
async fn test_cache_control() {
    let app = create_test_router();
    load_cat_dog(&app).await;

    rpc_call(&app, "get_filtered", json!({})).await;
    let stats = rpc_call(&app, "get_cache_stats", json!({})).await;
    assert_eq!(stats["enabled"], true);
    assert_eq!(stats["entries"]["entries"], 2);
    assert_eq!(stats["filters"]["entries"], 1);

    rpc_call(&app, "clear_cache", json!({})).await;
    let stats = rpc_call(&app, "get_cache_stats", json!({})).await;
    assert_eq!(stats["entries"]["entries"], 0);
    assert_eq!(stats["filters"]["entries"], 0);

    let result = rpc_call(&app, "set_cache_enabled", json!({"enabled": false})).await;
    assert_eq!(result["enabled"], false);
    rpc_call(&app, "get_filtered", json!({})).await;
    let stats = rpc_call(&app, "get_cache_stats", json!({})).await;
    assert_eq!(stats["filters"]["entries"], 0);
}

#[tokio::test]
async fn test_prefetch_and_wait() {
    let app = create_test_router();
    load_cat_dog(&app).await;

    let result = rpc_call(
        &app,
        "prefetch",
        json!({"keys": ["|A", "|B", "|A"], "wait": true}),
    )
    .await;
    assert_eq!(result["scheduled"], true);
    assert_eq!(result["keys"], json!(["|A", "|B"]));
    assert_eq!(result["outcome"]["inserted"], 2);

    // Both resident now
    let result = rpc_call(&app, "prefetch", json!({"keys": ["|A"]})).await;
    assert_eq!(result["scheduled"], false);
}

#[tokio::test]
async fn test_batch_update_import_and_reorder() {
    let app = create_test_router();
    load_cat_dog(&app).await;
    rpc_call(&app, "get_filtered", json!({})).await;

    let result = rpc_call(
        &app,
        "update_entries",
        json!({"entries": [
            {"msgid": "A", "msgstr": "chat", "position": 0},
            {"msgid": "B", "msgstr": "chien", "position": 1},
        ]}),
    )
    .await;
    assert_eq!(result["count"], 2);
    let stats = rpc_call(&app, "get_cache_stats", json!({})).await;
    assert_eq!(stats["filters"]["entries"], 0);

    let payload = rpc_call_raw(
        &app,
        "update_entries",
        json!({"entries": [{"msgid": "A", "msgstr": "x"}, {"msgid": "Z", "msgstr": "y"}]}),
    )
    .await;
    assert_eq!(payload["error"]["code"], -32002);
    let a = rpc_call(&app, "get_entry", json!({"key": "|A"})).await;
    assert_eq!(a["msgstr"], "chat");

    let result = rpc_call(
        &app,
        "import_entries",
        json!({"entries": [
            {"msgid": "B", "msgstr": "toutou", "position": 1},
            {"msgid": "C", "msgstr": "vache", "position": 2},
        ]}),
    )
    .await;
    assert_eq!((result["inserted"].clone(), result["updated"].clone()), (json!(1), json!(1)));

    let result = rpc_call(&app, "reorder_entries", json!({"keys": ["|C", "|A"]})).await;
    assert_eq!(result["count"], 2);
    let result = rpc_call(&app, "get_filtered", json!({})).await;
    assert_eq!(keys(&result), vec!["|C", "|A", "|B"]);

    let payload = rpc_call_raw(&app, "reorder_entries", json!({"keys": ["|A", "|A"]})).await;
    assert_eq!(payload["error"]["code"], -32602);

    let status = rpc_call(&app, "get_status", json!({})).await;
    assert_eq!(status["modified"], true);
}
