// Copyright 2026 Paul Adamson
// Licensed under the Apache License, Version 2.0
//
// Channel - RPC proxy for a ChannelOwner
//
// A Channel pairs an object's guid with the connection, so protocol objects
// can issue typed calls without touching request ids or framing.

use crate::error::Result;
use crate::server::connection::ConnectionLike;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Channel provides RPC communication for a ChannelOwner.
///
/// `send` serializes the params, awaits the correlated response and
/// deserializes the result. Remote failures surface as
/// [`Error::Remote`](crate::Error::Remote); a lost connection as
/// [`Error::Disconnected`](crate::Error::Disconnected).
#[derive(Clone)]
pub struct Channel {
    guid: Arc<str>,
    connection: Arc<dyn ConnectionLike>,
}

impl Channel {
    pub fn new(guid: Arc<str>, connection: Arc<dyn ConnectionLike>) -> Self {
        Self { guid, connection }
    }

    /// Sends a method call to the driver and awaits the response.
    pub async fn send<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R> {
        let params_value = serde_json::to_value(params)?;

        let response = self
            .connection
            .send_message(&self.guid, method, params_value)
            .await?;

        serde_json::from_value(response).map_err(Into::into)
    }

    /// Sends a method call with no parameters.
    pub async fn send_no_params<R: DeserializeOwned>(&self, method: &str) -> Result<R> {
        self.send(method, Value::Null).await
    }

    /// Sends a method call and discards the result.
    pub async fn send_no_result<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        let _: Value = self.send(method, params).await?;
        Ok(())
    }

    /// Returns the GUID this channel represents.
    pub fn guid(&self) -> &str {
        &self.guid
    }
}
