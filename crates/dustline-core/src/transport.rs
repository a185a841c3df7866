//! Push transports feeding [`LiveChannel`](crate::LiveChannel).
//!
//! A [`Transport`] opens one connection and hands back a [`FrameSource`]
//! that yields text frames until the connection ends. Reconnection is not
//! the transport's concern.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Opens connections to the push endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open one connection.
    async fn connect(&self) -> Result<Box<dyn FrameSource>>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> String;
}

/// An open connection yielding text frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame.
    ///
    /// `Ok(None)` means the server closed the connection cleanly.
    async fn next_frame(&mut self) -> Result<Option<String>>;
}

/// Largest event-stream line or event body accepted, in bytes.
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Incremental decoder for `text/event-stream` bodies.
///
/// Only `data:` fields are kept; multi-line data is joined with `\n` and
/// dispatched on the blank line that ends the event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
    data: Vec<String>,
    data_len: usize,
}

impl SseDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes.
    ///
    /// Fails once a line or an event grows past [`MAX_EVENT_BYTES`]; the
    /// connection is then unusable and should be dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw = self.buf.split_to(pos + 1);
            let mut bytes: &[u8] = &raw[..pos];
            if let Some(stripped) = bytes.strip_suffix(b"\r") {
                bytes = stripped;
            }
            let line = String::from_utf8_lossy(bytes);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                    self.data_len = 0;
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_ref(), ""),
            };
            if field == "data" {
                self.data_len += value.len() + 1;
                if self.data_len > MAX_EVENT_BYTES {
                    return Err(Error::transport(format!(
                        "event-stream event exceeds {} bytes",
                        MAX_EVENT_BYTES
                    )));
                }
                self.data.push(value.to_string());
            } else {
                trace!("Ignoring event-stream field {}", field);
            }
        }

        if self.buf.len() > MAX_EVENT_BYTES {
            return Err(Error::transport(format!(
                "event-stream line exceeds {} bytes",
                MAX_EVENT_BYTES
            )));
        }
        Ok(events)
    }
}

/// Server-sent events over HTTP (`GET /updates/all`).
#[derive(Debug, Clone)]
pub struct EventStreamTransport {
    client: reqwest::Client,
    url: String,
}

impl EventStreamTransport {
    /// Path of the all-devices update stream.
    pub const UPDATES_PATH: &'static str = "/updates/all";

    /// Create a transport for `base_url` + [`Self::UPDATES_PATH`].
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::invalid_config(format!(
                "server URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        // No overall timeout: the response body is open-ended.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::transport(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url, Self::UPDATES_PATH),
        })
    }
}

#[async_trait]
impl Transport for EventStreamTransport {
    async fn connect(&self) -> Result<Box<dyn FrameSource>> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::transport(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(format!("{} returned {}", self.url, status)));
        }

        debug!("Event stream open at {}", self.url);
        Ok(Box::new(EventStreamSource {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

struct EventStreamSource {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
}

#[async_trait]
impl FrameSource for EventStreamSource {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.push(&chunk)?),
                Some(Err(e)) => return Err(Error::transport(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket text frames (`ws://host/devices/{uuid}/ws`).
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// Create a transport for a full `ws://` or `wss://` URL.
    pub fn new(url: &str) -> Result<Self> {
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(Error::invalid_config(format!(
                "WebSocket URL must start with ws:// or wss://, got: {}",
                url
            )));
        }
        Ok(Self {
            url: url.to_string(),
        })
    }

    /// Derive the per-device socket URL from an HTTP base URL.
    pub fn for_device(base_url: &str, device_uuid: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base_url.to_string()
        };
        Self::new(&format!("{}/devices/{}/ws", ws_base, device_uuid))
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn FrameSource>> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::transport(format!("{}: {}", self.url, e)))?;
        debug!("WebSocket open at {}", self.url);
        Ok(Box::new(WebSocketSource { stream }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

struct WebSocketSource {
    stream: WsStream,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message.map_err(|e| Error::transport(e.to_string()))? {
                WsMessage::Text(text) => return Ok(Some(text.to_string())),
                WsMessage::Binary(data) => {
                    return Ok(Some(String::from_utf8_lossy(&data).into_owned()));
                }
                WsMessage::Close(frame) => {
                    debug!("WebSocket closed by server: {:?}", frame);
                    return Ok(None);
                }
                _ => continue,
            }
        }
        Ok(None)
    }
}
