use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;

/// Protocol version emitted when a message carries none.
pub const DEFAULT_VERSION: &str = "HTTP/1.1";

/// One header line of a [`Message`], kept as the raw bytes seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl HeaderEntry {
    /// Key as text, with invalid UTF-8 replaced.
    pub fn key_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    /// Value as text, with invalid UTF-8 replaced.
    pub fn value_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Body of a message, tagged by who owns the bytes.
///
/// `Owned` bytes were allocated for this message (a parsed request body, a
/// per-request response). `Borrowed` bytes live elsewhere and are only
/// referenced, e.g. a static page served without copying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    Owned(Vec<u8>),
    Borrowed(Bytes),
}

impl Body {
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Body::Borrowed(Bytes::from_static(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Empty => &[],
            Body::Owned(vec) => vec.as_slice(),
            Body::Borrowed(bytes) => bytes.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for Body {
    fn from(vec: Vec<u8>) -> Self {
        Body::Owned(vec)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Borrowed(bytes)
    }
}

/// A request or a response: ordered headers plus the metadata they decorate.
///
/// Header keys are unique and compared byte-for-byte. A new key is inserted
/// right after the first entry, so the first header ever set stays at the
/// head and later ones appear newest-first behind it.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// `headers[0]` is the head of the chain; the rest are stored oldest
    /// first, so chain order is the head followed by the tail reversed and a
    /// head-adjacent insert is a push.
    headers: Vec<HeaderEntry>,
    /// Response status, 0 while unset
    pub status: u16,
    pub method: Option<String>,
    pub target: Option<String>,
    pub version: Option<String>,
    pub body: Body,
    peer: Option<SocketAddr>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a response with `Content-Type` (defaulting to
    /// `application/octet-stream`) and a `Content-Length` matching `body`.
    pub fn response(status: u16, content_type: Option<&str>, body: impl Into<Body>) -> Self {
        let body = body.into();
        let mut message = Self::new();

        message.set(
            "Content-Type",
            content_type.unwrap_or("application/octet-stream"),
        );
        message.set_int("Content-Length", body.len() as i64);
        message.status = status;
        message.body = body;

        message
    }

    /// Returns the raw value stored under `key`, if any.
    pub fn get_bytes(&self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        let key = key.as_ref();
        self.headers
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_slice())
    }

    /// Returns the value stored under `key` if it is present and valid UTF-8.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&str> {
        self.get_bytes(key)
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Replaces the value of an existing key in place, or inserts a new entry
    /// as the second element of the chain (the sole element when empty).
    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        let value = value.into();

        if key.is_empty() {
            tracing::debug!(
                value = %String::from_utf8_lossy(&value),
                "Refusing to set a header with an empty key"
            );
            return;
        }

        if let Some(entry) = self.headers.iter_mut().find(|entry| entry.key == key) {
            entry.value = value;
            return;
        }

        self.headers.push(HeaderEntry { key, value });
    }

    pub fn set_int(&mut self, key: impl Into<Vec<u8>>, value: i64) {
        self.set(key, value.to_string());
    }

    /// Header entries in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        let (head, tail) = self.headers.split_at(self.headers.len().min(1));
        head.iter().chain(tail.iter().rev())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    pub fn peer_address(&self) -> Option<IpAddr> {
        self.peer.map(|peer| peer.ip())
    }

    /// Peer port, 0 when the peer is unknown.
    pub fn peer_port(&self) -> u16 {
        self.peer.map_or(0, |peer| peer.port())
    }

    /// `ip:port` of the peer, or `-` when unknown.
    pub fn client_info(&self) -> String {
        match self.peer {
            Some(peer) => peer.to_string(),
            None => "-".to_string(),
        }
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_bytes()
    }

    /// Serializes the status line and header block.
    ///
    /// The reason phrase is always `OK`. The returned buffer's length is the
    /// exact size of the head; the body is written separately.
    pub fn serialize_response(&self) -> Vec<u8> {
        let version = self.version.as_deref().unwrap_or(DEFAULT_VERSION);

        let mut buf = Vec::with_capacity(64 + self.headers.len() * 32);
        buf.extend_from_slice(format!("{} {} OK\r\n", version, self.status).as_bytes());

        for entry in self.iter() {
            buf.extend_from_slice(&entry.key);
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(&entry.value);
            buf.extend_from_slice(b"\r\n");
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Logs the request line, headers, peer and body at debug level.
    pub fn debug_dump(&self) {
        if let (Some(method), Some(target)) = (&self.method, &self.target) {
            tracing::debug!(
                "{} {} {}",
                method,
                target,
                self.version.as_deref().unwrap_or("HTTP/1.0")
            );
        }

        for entry in self.iter() {
            tracing::debug!("{}: {}", entry.key_lossy(), entry.value_lossy());
        }

        if let Some(peer) = self.peer {
            tracing::debug!(peer = %peer, "requested from");
        }

        if !self.body.is_empty() {
            tracing::debug!(body = %String::from_utf8_lossy(self.body.as_bytes()), "body");
        }
    }

    /// Consumes the message, releasing headers, fields and body.
    pub fn release(self) {
        tracing::trace!(headers = self.headers.len(), body = self.body.len(), "message released");
    }
}
