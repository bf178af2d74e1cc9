use super::{EventSink, TransportEvent, TransportReceiver, TransportSender};
use crate::api::ConnectOptions;
use crate::{Error, Result};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport for a driver exposed over `ws://` or `wss://`
pub struct WebSocketTransport {
    sender: SplitSink<WsStream, WsMessage>,
    receiver: SplitStream<WsStream>,
    sink: EventSink,
}

/// Send-only part of WebSocketTransport
pub struct WebSocketTransportSender {
    sender: SplitSink<WsStream, WsMessage>,
    sink: EventSink,
}

/// Receive-only part of WebSocketTransport
pub struct WebSocketTransportReceiver {
    receiver: SplitStream<WsStream>,
    sink: EventSink,
}

impl WebSocketTransport {
    /// Performs the WebSocket handshake, honouring the options' headers and timeout.
    ///
    /// A timeout of zero waits indefinitely.
    pub async fn connect(
        url: &str,
        options: &ConnectOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let parsed =
            Url::parse(url).map_err(|e| Error::ConnectionFailed(format!("Invalid URL: {}", e)))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::ConnectionFailed(format!(
                "Unsupported scheme '{}' (expected ws or wss)",
                parsed.scheme()
            )));
        }

        let mut request = url
            .into_client_request()
            .map_err(|e| Error::ConnectionFailed(format!("Failed to build request: {}", e)))?;

        if let Some(headers_map) = &options.headers {
            let headers = request.headers_mut();
            for (k, v) in headers_map {
                let name = HeaderName::from_str(k).map_err(|e| {
                    Error::InvalidArgument(format!("Invalid header name '{}': {}", k, e))
                })?;
                let value = HeaderValue::from_str(v).map_err(|e| {
                    Error::InvalidArgument(format!("Invalid header value for '{}': {}", k, e))
                })?;
                headers.insert(name, value);
            }
        }

        let handshake = tokio_tungstenite::connect_async(request);
        let connected = match options.timeout.filter(|t| *t > 0.0) {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms as u64), handshake)
                .await
                .map_err(|_| {
                    Error::Timeout(format!("WebSocket connect to {} exceeded {}ms", url, ms))
                })?,
            None => handshake.await,
        };
        let (ws_stream, _) = connected
            .map_err(|e| Error::ConnectionFailed(format!("WebSocket connection failed: {}", e)))?;

        tracing::debug!("WebSocket transport connected to {}", parsed);

        let (sender, receiver) = ws_stream.split();
        let (sink, events_rx) = EventSink::new();

        Ok((
            Self {
                sender,
                receiver,
                sink,
            },
            events_rx,
        ))
    }

    pub fn into_parts(self) -> (WebSocketTransportSender, WebSocketTransportReceiver) {
        (
            WebSocketTransportSender {
                sender: self.sender,
                sink: self.sink.clone(),
            },
            WebSocketTransportReceiver {
                receiver: self.receiver,
                sink: self.sink,
            },
        )
    }
}

impl WebSocketTransportReceiver {
    async fn read_frames(&mut self) -> Result<()> {
        while let Some(msg_result) = self.receiver.next().await {
            let msg = msg_result
                .map_err(|e| Error::TransportError(format!("WebSocket read error: {}", e)))?;
            let frame = match msg {
                WsMessage::Text(text) => Bytes::from(text.as_str().to_owned()),
                WsMessage::Binary(data) => data,
                WsMessage::Close(_) => return Ok(()),
                _ => continue,
            };
            if !self.sink.deliver(frame) {
                return Ok(());
            }
        }
        Ok(())
    }
}

impl TransportSender for WebSocketTransportSender {
    fn send(&mut self, frame: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.sink.ensure_open()?;
            let text = String::from_utf8(frame.to_vec())
                .map_err(|e| Error::TransportError(format!("Frame is not UTF-8: {}", e)))?;

            if let Err(e) = self.sender.send(WsMessage::Text(text.into())).await {
                let err = Error::TransportError(format!("Failed to send WebSocket message: {}", e));
                tracing::error!("{}", err);
                self.sink.close(err.to_string());
                return Err(Error::Disconnected(err.to_string()));
            }
            Ok(())
        })
    }
}

impl TransportReceiver for WebSocketTransportReceiver {
    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let result = self.read_frames().await;
            match &result {
                Ok(()) => self.sink.close("WebSocket closed by peer"),
                Err(e) => {
                    tracing::error!("WebSocket transport read failed: {}", e);
                    self.sink.close(e.to_string());
                }
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_non_websocket_scheme() {
        let err = WebSocketTransport::connect("http://127.0.0.1:9000", &ConnectOptions::new())
            .await
            .err()
            .expect("http scheme must be rejected");
        assert!(matches!(err, Error::ConnectionFailed(msg) if msg.contains("Unsupported scheme")));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_header() {
        let mut headers = std::collections::HashMap::new();
        headers.insert("bad header".to_string(), "v".to_string());
        let err = WebSocketTransport::connect(
            "ws://127.0.0.1:9",
            &ConnectOptions::new().headers(headers),
        )
        .await
        .err()
        .expect("invalid header name must be rejected");
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
