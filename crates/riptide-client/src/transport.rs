//! Seam between the push client and the socket implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Message, protocol::frame::coding::CloseCode};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::config::{HEADER_API_KEY, PushClientConfig};

/// Opens push-channel connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection; resolves once the channel is ready for frames.
    async fn connect(&self, config: &PushClientConfig) -> Result<Box<dyn Connection>>;
}

/// An open push-channel connection.
#[async_trait]
pub trait Connection: Send {
    /// Next text frame, or `None` once the peer closed the channel.
    async fn next_frame(&mut self) -> Result<Option<String>>;
}

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, config: &PushClientConfig) -> Result<Box<dyn Connection>> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .context("failed to build upgrade request")?;
        if let Some(credential) = &config.credential {
            let value = HeaderValue::from_str(credential)
                .context("credential is not a valid header value")?;
            request.headers_mut().insert(HEADER_API_KEY, value);
        }
        let (stream, _response) = connect_async(request)
            .await
            .with_context(|| format!("failed to connect to {}", config.url))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message.context("push channel read failed")? {
                Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                Message::Close(frame) => {
                    if let Some(frame) = frame {
                        debug!(
                            code = u16::from(frame.code),
                            reason = frame.reason.as_str(),
                            unauthorized = frame.code == CloseCode::Library(4001),
                            "push channel closed by server"
                        );
                    }
                    return Ok(None);
                }
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }
}
