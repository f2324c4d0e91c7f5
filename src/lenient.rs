//! Lenient JSON normalization applied before strict schema parsing.
//!
//! Real senders (and mid-stream partial objects in particular) routinely omit fields
//! that the schema treats as required but that have an obvious zero value. This module
//! fills those in on the raw JSON tree so parsing does not fail for that reason alone.
//!
//! Rules:
//! - Normalization is bottom-up: every nested object (and every object element of an
//!   array) is normalized before the defaults of its parent are injected, so injected
//!   defaults are never walked in the same pass.
//! - Defaults are looked up by the *scope* of an object, which is decided by the key it
//!   sits under (the root is a response scope). A default is only inserted when the key
//!   is wire-absent; an explicit `null` is left for the schema layer.
//! - `truncation: {"type": "auto"}` collapses to `"auto"` and `metadata` maps drop
//!   non-string entries. Nothing else the wire sent is changed or removed.
//! - Payloads under `schema`, `parameters` and `metadata` are opaque and never walked.
//!
//! The result is a fixed point: normalizing normalized JSON changes nothing.

use bytes::Bytes;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::Result;

/// Where an object sits in the payload, which decides the defaults it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Scope {
    Response,
    Usage,
    InputTokensDetails,
    OutputTokensDetails,
    OutputItem,
    ContentPart,
    TextConfig,
    Opaque,
    Other,
}

impl Scope {
    /// Scope of an object held directly under `key`.
    fn of_field(key: &str) -> Self {
        match key {
            "response" => Scope::Response,
            "usage" => Scope::Usage,
            "input_tokens_details" => Scope::InputTokensDetails,
            "output_tokens_details" => Scope::OutputTokensDetails,
            "item" => Scope::OutputItem,
            "part" => Scope::ContentPart,
            "text" => Scope::TextConfig,
            "schema" | "parameters" | "metadata" => Scope::Opaque,
            _ => Scope::Other,
        }
    }

    /// Scope of an object element of the array held under `key`.
    fn of_element(key: &str) -> Self {
        match key {
            "output" => Scope::OutputItem,
            "content" => Scope::ContentPart,
            "schema" | "parameters" | "metadata" => Scope::Opaque,
            _ => Scope::Other,
        }
    }
}

static DEFAULTS: Lazy<HashMap<Scope, Vec<(&'static str, Value)>>> = Lazy::new(|| {
    HashMap::from([
        (
            Scope::Response,
            vec![
                ("metadata", json!({})),
                ("parallel_tool_calls", json!(true)),
                ("temperature", json!(1.0)),
                ("top_p", json!(1.0)),
                ("store", json!(true)),
                ("tool_choice", json!("auto")),
                ("tools", json!([])),
                ("truncation", json!("auto")),
            ],
        ),
        (
            Scope::Usage,
            vec![
                ("input_tokens_details", json!({"cached_tokens": 0})),
                ("output_tokens_details", json!({"reasoning_tokens": 0})),
            ],
        ),
        (Scope::InputTokensDetails, vec![("cached_tokens", json!(0))]),
        (
            Scope::OutputTokensDetails,
            vec![("reasoning_tokens", json!(0))],
        ),
        (
            Scope::OutputItem,
            vec![("content", json!([])), ("status", json!("completed"))],
        ),
        (
            Scope::ContentPart,
            vec![("annotations", json!([])), ("logprobs", json!([]))],
        ),
        (Scope::TextConfig, vec![("format", json!({"type": "text"}))]),
    ])
});

static TEXT_CONFIG_DEFAULT: Lazy<Value> = Lazy::new(|| json!({"format": {"type": "text"}}));

/// Normalize a JSON tree in place. Non-object roots are left untouched.
pub fn normalize(value: &mut Value) {
    if let Value::Object(map) = value {
        normalize_object(map, Scope::Response);
    }
}

/// Normalize raw JSON bytes.
///
/// Bytes holding a non-object JSON value are returned unchanged; invalid JSON is an error.
pub fn normalize_bytes(bytes: &[u8]) -> Result<Bytes> {
    let mut value: Value = serde_json::from_slice(bytes)?;
    if !value.is_object() {
        return Ok(Bytes::copy_from_slice(bytes));
    }
    normalize(&mut value);
    Ok(Bytes::from(serde_json::to_vec(&value)?))
}

/// Normalize raw JSON bytes and parse them as `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut value: Value = serde_json::from_slice(bytes)?;
    normalize(&mut value);
    Ok(serde_json::from_value(value)?)
}

fn normalize_object(map: &mut Map<String, Value>, scope: Scope) {
    if scope == Scope::Opaque {
        return;
    }

    // Children first; defaults inserted below are never walked in this pass.
    for (key, value) in map.iter_mut() {
        match value {
            Value::Object(child) => normalize_object(child, Scope::of_field(key)),
            Value::Array(items) => {
                let element_scope = Scope::of_element(key);
                for item in items.iter_mut() {
                    if let Value::Object(child) = item {
                        normalize_object(child, element_scope);
                    }
                }
            }
            _ => {}
        }
    }

    let looks_like_response = scope == Scope::Response
        && (map.contains_key("model")
            || map.contains_key("output")
            || map.get("object").and_then(Value::as_str) == Some("response"));

    if let Some(defaults) = DEFAULTS.get(&scope) {
        for (field, default) in defaults {
            if !map.contains_key(*field) {
                map.insert((*field).to_string(), default.clone());
            }
        }
    }

    if looks_like_response && !map.contains_key("text") {
        map.insert("text".to_string(), TEXT_CONFIG_DEFAULT.clone());
    }

    collapse_truncation(map);
    retain_string_metadata(map);
}

fn collapse_truncation(map: &mut Map<String, Value>) {
    let collapsed = match map.get("truncation") {
        Some(Value::Object(wrapper)) => wrapper.get("type").and_then(Value::as_str).map(str::to_string),
        _ => None,
    };
    if let Some(kind) = collapsed {
        map.insert("truncation".to_string(), Value::String(kind));
    }
}

fn retain_string_metadata(map: &mut Map<String, Value>) {
    if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
        metadata.retain(|_, v| v.is_string());
    }
}
