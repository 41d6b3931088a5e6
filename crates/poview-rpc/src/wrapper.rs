//! Response wrapping for front-end compatibility.
//!
//! List-returning methods are wrapped as `{success, <name>: [...]}` so the
//! front-end can treat every list response the same way. Everything else is
//! returned as the handler produced it.

use serde_json::{json, Map, Value};

/// Wrap a handler result in the shape the front-end expects for `method`.
pub fn wrap_response(method: &str, result: Value) -> Value {
    let field = match method {
        "get_entries" | "get_filtered" => "entries",
        _ => return result,
    };
    let mut wrapped = Map::new();
    wrapped.insert("success".to_string(), Value::Bool(true));
    wrapped.insert(
        field.to_string(),
        if result.is_null() { json!([]) } else { result },
    );
    Value::Object(wrapped)
}
