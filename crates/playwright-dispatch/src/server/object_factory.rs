// Copyright 2026 Paul Adamson
// Licensed under the Apache License, Version 2.0
//
// Object Factory - Creates protocol objects from type names
//
// When the driver sends `__create__`, the factory turns the type tag into the
// matching proxy. Types this crate does not model still get a RemoteObject so
// they take part in the tree and in cascading disposal.

use crate::error::Result;
use crate::protocol::{Frame, JsHandle, Page, RemoteObject, Request, ResponseObject};
use crate::server::channel_owner::{ChannelOwner, ParentOrConnection};
use serde_json::Value;
use std::sync::Arc;

/// Protocol types with a dedicated proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Page,
    Frame,
    Request,
    Response,
    JsHandle,
    ElementHandle,
    Other,
}

impl ObjectType {
    pub fn from_tag(type_name: &str) -> Self {
        match type_name {
            "Page" => ObjectType::Page,
            "Frame" => ObjectType::Frame,
            "Request" => ObjectType::Request,
            "Response" => ObjectType::Response,
            "JSHandle" => ObjectType::JsHandle,
            "ElementHandle" => ObjectType::ElementHandle,
            _ => ObjectType::Other,
        }
    }
}

/// Creates a protocol object from a `__create__` message.
///
/// # Errors
///
/// Returns `Error::ProtocolError` when the initializer is missing fields the
/// proxy needs.
pub fn create_object(
    parent: ParentOrConnection,
    type_name: String,
    guid: Arc<str>,
    initializer: Value,
) -> Result<Arc<dyn ChannelOwner>> {
    let object: Arc<dyn ChannelOwner> = match ObjectType::from_tag(&type_name) {
        ObjectType::Page => Arc::new(Page::new(parent, type_name, guid, initializer)?),
        ObjectType::Frame => Arc::new(Frame::new(parent, type_name, guid, initializer)?),
        ObjectType::Request => Arc::new(Request::new(parent, type_name, guid, initializer)?),
        ObjectType::Response => {
            Arc::new(ResponseObject::new(parent, type_name, guid, initializer)?)
        }
        ObjectType::JsHandle | ObjectType::ElementHandle => {
            Arc::new(JsHandle::new(parent, type_name, guid, initializer)?)
        }
        ObjectType::Other => {
            tracing::debug!("No dedicated proxy for {}, using RemoteObject", type_name);
            Arc::new(RemoteObject::new(parent, type_name, guid, initializer))
        }
    };

    Ok(object)
}
