//! Value conversion for evaluate arguments and results
//!
//! Encodes [`JsValue`]s into the envelope the driver expects and decodes
//! envelopes back.
//!
//! # Envelope format
//!
//! - `{"v": null}` - null
//! - `{"v": "NaN"}`, `{"v": "Infinity"}`, `{"v": "-Infinity"}`, `{"v": "-0"}` -
//!   numbers JSON cannot carry
//! - plain JSON booleans, strings and finite numbers, unwrapped
//! - `{"d": "2024-01-01T00:00:00.000Z"}` - dates (ISO 8601, UTC, milliseconds)
//! - `{"a": [...]}` - arrays of envelopes
//! - `{"o": {"key": <envelope>}}` - objects
//! - `{"h": 0}` - index into the handle list sent next to the value
//! - a plain JSON object when every value is an untagged primitive
//!
//! A serialized argument travels as `{"value": <envelope>, "handles": [{"guid": ...}]}`.

use crate::error::{Error, Result};
use crate::protocol::JsHandle;
use crate::protocol::js_value::{JsValue, format_date, to_js_value};
use crate::server::channel_owner::downcast;
use crate::server::connection::ConnectionLike;
use crate::server::message::GuidRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Keys that mark an envelope, and so cannot appear in a plain object
const MARKER_KEYS: [&str; 5] = ["v", "d", "a", "o", "h"];

/// Largest integer an f64 holds exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// An encoded argument with its side list of handle guids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedArgument {
    pub value: Value,
    pub handles: Vec<GuidRef>,
}

/// Encodes a value into an argument envelope.
///
/// Every handle inside `value` is appended to the side list and replaced by
/// its index, in encounter order.
pub fn serialize_argument(value: &JsValue) -> SerializedArgument {
    let mut guids = Vec::new();
    let value = encode_value(value, &mut guids);
    SerializedArgument {
        value,
        handles: guids.into_iter().map(|guid| GuidRef { guid }).collect(),
    }
}

/// Encodes any serializable value into an argument envelope.
pub fn serialize_serde_argument<T: Serialize + ?Sized>(arg: &T) -> Result<SerializedArgument> {
    Ok(serialize_argument(&to_js_value(arg)?))
}

/// The envelope for a missing argument: `{"value": {"v": null}, "handles": []}`
pub fn serialize_null() -> SerializedArgument {
    serialize_argument(&JsValue::Null)
}

fn special_number(n: f64) -> Option<&'static str> {
    if n.is_nan() {
        Some("NaN")
    } else if n == f64::INFINITY {
        Some("Infinity")
    } else if n == f64::NEG_INFINITY {
        Some("-Infinity")
    } else if n == 0.0 && n.is_sign_negative() {
        Some("-0")
    } else {
        None
    }
}

fn plain_number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        json!(n as i64)
    } else {
        // Finite by construction, so from_f64 cannot fail
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// True for values that encode as bare JSON
fn is_untagged_primitive(value: &JsValue) -> bool {
    match value {
        JsValue::Bool(_) | JsValue::String(_) => true,
        JsValue::Number(n) => special_number(*n).is_none(),
        _ => false,
    }
}

/// Encodes one value, appending handle guids to `guids`.
pub fn encode_value(value: &JsValue, guids: &mut Vec<Arc<str>>) -> Value {
    match value {
        JsValue::Null => json!({"v": null}),
        JsValue::Bool(b) => Value::Bool(*b),
        JsValue::Number(n) => match special_number(*n) {
            Some(marker) => json!({"v": marker}),
            None => plain_number(*n),
        },
        JsValue::String(s) => Value::String(s.clone()),
        JsValue::Date(date) => json!({"d": format_date(date)}),
        JsValue::Handle(handle) => {
            guids.push(handle.guid_arc());
            json!({"h": guids.len() - 1})
        }
        JsValue::Array(items) => {
            let items: Vec<Value> = items.iter().map(|item| encode_value(item, guids)).collect();
            json!({"a": items})
        }
        JsValue::Object(map) => {
            let plain = map.values().all(is_untagged_primitive)
                && !map.keys().any(|k| MARKER_KEYS.contains(&k.as_str()));
            let encoded: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v, guids)))
                .collect();
            if plain {
                Value::Object(encoded)
            } else {
                json!({"o": encoded})
            }
        }
    }
}

/// Decodes an envelope, resolving `{"h": i}` against `handles`.
///
/// # Errors
///
/// [`Error::Decode`] for an out-of-range handle index, an unparsable date or
/// a marker whose payload has the wrong shape.
pub fn parse_value(value: &Value, handles: &[JsHandle]) -> Result<JsValue> {
    match value {
        Value::Null => Ok(JsValue::Null),
        Value::Bool(b) => Ok(JsValue::Bool(*b)),
        Value::Number(n) => n
            .as_f64()
            .map(JsValue::Number)
            .ok_or_else(|| Error::Decode(format!("number out of range: {}", n))),
        Value::String(s) => Ok(JsValue::String(s.clone())),
        Value::Array(items) => Ok(JsValue::Array(
            items
                .iter()
                .map(|item| parse_value(item, handles))
                .collect::<Result<_>>()?,
        )),
        Value::Object(map) => {
            if map.len() == 1
                && let Some((key, payload)) = map.iter().next()
                && MARKER_KEYS.contains(&key.as_str())
            {
                return parse_marker(key, payload, handles);
            }
            parse_object_entries(map, handles).map(JsValue::Object)
        }
    }
}

fn parse_object_entries(
    map: &Map<String, Value>,
    handles: &[JsHandle],
) -> Result<BTreeMap<String, JsValue>> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), parse_value(v, handles)?)))
        .collect()
}

fn parse_marker(key: &str, payload: &Value, handles: &[JsHandle]) -> Result<JsValue> {
    match (key, payload) {
        ("v", Value::Null) => Ok(JsValue::Null),
        ("v", Value::String(s)) => Ok(match s.as_str() {
            "NaN" => JsValue::Number(f64::NAN),
            "Infinity" => JsValue::Number(f64::INFINITY),
            "-Infinity" => JsValue::Number(f64::NEG_INFINITY),
            "-0" => JsValue::Number(-0.0),
            "undefined" | "null" => JsValue::Null,
            other => JsValue::String(other.to_string()),
        }),
        ("v", Value::Bool(_) | Value::Number(_)) => parse_value(payload, handles),
        ("d", Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|d| JsValue::Date(d.with_timezone(&Utc)))
            .map_err(|e| Error::Decode(format!("invalid date {:?}: {}", s, e))),
        ("a", Value::Array(_)) => parse_value(payload, handles),
        ("o", Value::Object(map)) => parse_object_entries(map, handles).map(JsValue::Object),
        ("h", Value::Number(n)) => {
            let index = n
                .as_u64()
                .ok_or_else(|| Error::Decode(format!("invalid handle index {}", n)))?;
            usize::try_from(index)
                .ok()
                .and_then(|i| handles.get(i))
                .map(|h| JsValue::Handle(h.clone()))
                .ok_or_else(|| {
                    Error::Decode(format!(
                        "handle index {} out of range ({} handle(s) supplied)",
                        index,
                        handles.len()
                    ))
                })
        }
        (key, payload) => Err(Error::Decode(format!(
            "malformed {:?} envelope: {}",
            key, payload
        ))),
    }
}

/// Turns a side list of guids into live handle proxies.
///
/// Every guid must already be in the object tree.
pub fn resolve_handles(
    connection: &Arc<dyn ConnectionLike>,
    guids: &[GuidRef],
) -> Result<Vec<JsHandle>> {
    guids
        .iter()
        .map(|r| {
            let object = connection.get_object(&r.guid)?;
            downcast::<JsHandle>(&object)
        })
        .collect()
}

/// Decodes a call result of the form `{"value": <envelope>, "handles"?: [...]}`.
pub fn parse_result(connection: &Arc<dyn ConnectionLike>, result: &Value) -> Result<JsValue> {
    #[derive(Deserialize)]
    struct WithHandles {
        #[serde(default)]
        handles: Vec<GuidRef>,
    }

    let value = result
        .get("value")
        .ok_or_else(|| Error::ProtocolError(format!("result has no value: {}", result)))?;
    let guids: WithHandles = serde_json::from_value(result.clone())
        .map_err(|e| Error::ProtocolError(format!("invalid result handles: {}", e)))?;
    let handles = resolve_handles(connection, &guids.handles)?;
    parse_value(value, &handles)
}
