// Copyright 2026 Paul Adamson
// Licensed under the Apache License, Version 2.0
//
// Wire messages exchanged with the Playwright driver
//
// Outbound: Request {id, guid, method, params}
// Inbound:  Response {id, result | error} or Event {guid, method, params}
//
// Inbound frames are decoded exactly once, here, into the closed `Inbound`
// enum. The reserved control methods (`__create__`, `__dispose__`,
// `__adopt__`) get their own variants so the dispatcher never matches on
// method strings.

use crate::error::{Error, Result};
use crate::server::channel_owner::DisposeReason;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Protocol request message sent to the driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u32,
    #[serde(
        serialize_with = "serialize_arc_str",
        deserialize_with = "deserialize_arc_str"
    )]
    pub guid: Arc<str>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> std::result::Result<Arc<str>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(Arc::from(s))
}

/// Protocol response message from the driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorWrapper>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl From<ErrorPayload> for Error {
    fn from(payload: ErrorPayload) -> Self {
        Error::Remote {
            name: payload.name,
            message: payload.message,
            stack: payload.stack,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(
        serialize_with = "serialize_arc_str",
        deserialize_with = "deserialize_arc_str"
    )]
    pub guid: Arc<str>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Response(Response),
    Event(Event),
}

/// A reference to a remote object as it appears inside params and results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidRef {
    #[serde(
        serialize_with = "serialize_arc_str",
        deserialize_with = "deserialize_arc_str"
    )]
    pub guid: Arc<str>,
}

#[derive(Deserialize)]
struct CreateParams {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(deserialize_with = "deserialize_arc_str")]
    guid: Arc<str>,
    #[serde(default)]
    initializer: Value,
}

#[derive(Deserialize, Default)]
struct DisposeParams {
    #[serde(default)]
    reason: Option<String>,
}

/// Every kind of inbound frame the dispatcher understands
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Answer to a call, already split into success or remote failure
    Response {
        id: u32,
        outcome: std::result::Result<Value, ErrorPayload>,
    },
    /// `__create__`: a new object under `parent` (empty guid for top-level objects)
    Create {
        parent: Arc<str>,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    },
    /// `__dispose__`: the object and its subtree are gone
    Dispose {
        guid: Arc<str>,
        reason: DisposeReason,
    },
    /// `__adopt__`: move `guid` under `parent`
    Adopt { parent: Arc<str>, guid: Arc<str> },
    /// Any other event, routed to the addressed object
    Event {
        guid: Arc<str>,
        method: String,
        params: Value,
    },
}

impl Inbound {
    /// Decode one raw frame. Malformed frames are a [`Error::ProtocolError`].
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let message: Message = serde_json::from_slice(frame)
            .map_err(|e| Error::ProtocolError(format!("Malformed frame: {}", e)))?;
        Self::from_message(message)
    }

    pub fn from_message(message: Message) -> Result<Self> {
        match message {
            Message::Response(response) => {
                let outcome = match response.error {
                    Some(wrapper) => Err(wrapper.error),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                Ok(Inbound::Response {
                    id: response.id,
                    outcome,
                })
            }
            Message::Event(event) => match event.method.as_str() {
                "__create__" => {
                    let params: CreateParams =
                        serde_json::from_value(event.params).map_err(|e| {
                            Error::ProtocolError(format!("Invalid __create__ params: {}", e))
                        })?;
                    Ok(Inbound::Create {
                        parent: event.guid,
                        type_name: params.type_name,
                        guid: params.guid,
                        initializer: params.initializer,
                    })
                }
                "__dispose__" => {
                    let params: DisposeParams = if event.params.is_null() {
                        DisposeParams::default()
                    } else {
                        serde_json::from_value(event.params).map_err(|e| {
                            Error::ProtocolError(format!("Invalid __dispose__ params: {}", e))
                        })?
                    };
                    let reason = match params.reason.as_deref() {
                        Some("gc") => DisposeReason::GarbageCollected,
                        _ => DisposeReason::Protocol,
                    };
                    Ok(Inbound::Dispose {
                        guid: event.guid,
                        reason,
                    })
                }
                "__adopt__" => {
                    let params: GuidRef = serde_json::from_value(event.params).map_err(|e| {
                        Error::ProtocolError(format!("Invalid __adopt__ params: {}", e))
                    })?;
                    Ok(Inbound::Adopt {
                        parent: event.guid,
                        guid: params.guid,
                    })
                }
                _ => Ok(Inbound::Event {
                    guid: event.guid,
                    method: event.method,
                    params: event.params,
                }),
            },
        }
    }
}
