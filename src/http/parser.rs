use thiserror::Error;

use crate::config::ServerConfig;
use crate::http::message::{Body, Message};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("raw request is empty")]
    Empty,
}

/// Size limits and body policy applied while parsing.
///
/// Tokens, keys and values longer than their limit are truncated; the excess
/// bytes are dropped, never reported.
#[derive(Debug, Clone)]
pub struct ParseLimits {
    pub token_max: usize,
    pub header_line_max: usize,
    /// Methods whose requests never carry a body
    pub bodyless_methods: Vec<String>,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ParseLimits {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            token_max: cfg.token_max,
            header_line_max: cfg.header_line_max,
            bodyless_methods: cfg.bodyless_methods.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum State {
    Method,
    Uri,
    Version,
    HeaderPairs,
}

impl State {
    fn next(self) -> Self {
        match self {
            State::Method => State::Uri,
            State::Uri => State::Version,
            State::Version | State::HeaderPairs => State::HeaderPairs,
        }
    }
}

/// One-shot request parser.
///
/// The whole request must already be in the buffer: there is no incremental
/// feeding and a body shorter than its `Content-Length` is taken as is.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    limits: ParseLimits,
}

impl Parser {
    pub fn new(limits: ParseLimits) -> Self {
        Self { limits }
    }

    /// Parses `raw` into a request message.
    ///
    /// Only an empty buffer fails. Anything else yields a message, possibly
    /// with truncated tokens or missing headers; the scan index only moves
    /// forward so parsing always terminates.
    pub fn parse(&self, raw: &[u8]) -> Result<Message, ParseError> {
        if raw.is_empty() {
            tracing::debug!("raw request empty, cannot continue");
            return Err(ParseError::Empty);
        }

        let mut request = Message::new();
        let mut pos = self.parse_request_line(raw, &mut request);

        let mut headers_done = false;
        while pos < raw.len() {
            match self.parse_header_pair(raw, &mut pos) {
                Some((key, value)) => {
                    tracing::trace!(
                        key = %String::from_utf8_lossy(&key),
                        value = %String::from_utf8_lossy(&value),
                        "read header"
                    );
                    request.set(key, value);
                }
                None => {
                    headers_done = pos <= raw.len();
                    break;
                }
            }
        }

        if headers_done && !self.is_bodyless(&request) {
            request.body = Body::Owned(self.read_body(&raw[pos..], &request));
        }

        Ok(request)
    }

    /// Consumes method, target and version. Returns the index of the first
    /// header byte.
    fn parse_request_line(&self, raw: &[u8], request: &mut Message) -> usize {
        let mut state = State::Method;
        let mut token = Vec::with_capacity(self.limits.token_max.min(256));
        let mut pos = 0;

        while state < State::HeaderPairs && pos < raw.len() {
            let current = raw[pos];
            pos += 1;

            if current == b'\r' {
                continue;
            }

            if !current.is_ascii_whitespace() {
                if token.len() < self.limits.token_max {
                    token.push(current);
                }
                continue;
            }

            let value = String::from_utf8_lossy(&token).into_owned();
            tracing::trace!(token = %value, state = ?state, "token committed");

            match state {
                State::Method => request.method = Some(value),
                State::Uri => request.target = Some(value),
                State::Version => request.version = Some(value),
                State::HeaderPairs => {}
            }

            token.clear();
            state = state.next();
        }

        pos
    }

    /// Reads one `key: value` line. Returns `None` when the end-of-headers
    /// signal (a `\n` before any `:`) fires or the input runs out; `pos` is
    /// left past that `\n` in the first case and at `raw.len() + 1` in the
    /// second. Key and value are returned as raw bytes.
    fn parse_header_pair(&self, raw: &[u8], pos: &mut usize) -> Option<(Vec<u8>, Vec<u8>)> {
        let max = self.limits.header_line_max;
        let mut key = Vec::new();

        loop {
            let Some(&current) = raw.get(*pos) else {
                *pos = raw.len() + 1;
                return None;
            };
            *pos += 1;

            match current {
                b'\r' => continue,
                b'\n' => return None,
                b':' => break,
                _ if key.len() < max => key.push(current),
                _ => {}
            }
        }

        // a single leading whitespace byte separates key and value
        if matches!(raw.get(*pos), Some(b' ' | b'\t')) {
            *pos += 1;
        }

        let mut value = Vec::new();
        while let Some(&current) = raw.get(*pos) {
            if current == b'\r' || current == b'\n' {
                break;
            }
            *pos += 1;
            if value.len() < max {
                value.push(current);
            }
        }

        if raw.get(*pos) == Some(&b'\r') {
            *pos += 1;
        }
        if raw.get(*pos) == Some(&b'\n') {
            *pos += 1;
        }

        Some((key, value))
    }

    fn is_bodyless(&self, request: &Message) -> bool {
        let method = request.method.as_deref().unwrap_or_default();
        self.limits.bodyless_methods.iter().any(|m| m == method)
    }

    fn read_body(&self, rest: &[u8], request: &Message) -> Vec<u8> {
        let declared = request.get_bytes("Content-Length").map(leading_integer);

        let len = match declared {
            Some(declared) if declared > rest.len() => {
                tracing::debug!(
                    declared,
                    buffered = rest.len(),
                    "declared body exceeds the buffered bytes, truncating"
                );
                rest.len()
            }
            Some(declared) => declared,
            None => rest.len(),
        };

        rest[..len].to_vec()
    }
}

/// Parses like C `atoi`: optional leading whitespace, then as many decimal
/// digits as present. No digits yields 0.
fn leading_integer(raw: &[u8]) -> usize {
    raw.iter()
        .skip_while(|byte| byte.is_ascii_whitespace())
        .take_while(|byte| byte.is_ascii_digit())
        .fold(0usize, |acc, &digit| {
            acc.saturating_mul(10).saturating_add(usize::from(digit - b'0'))
        })
}
