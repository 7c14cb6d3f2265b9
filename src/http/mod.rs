//! HTTP/1.x wire protocol.
//!
//! - **`message`**: ordered header store plus request/response metadata, and
//!   response head serialization
//! - **`parser`**: one-shot state machine turning a raw buffer into a request
//!   `Message`
//! - **`writer`**: flushes a response head and body onto a stream
//!
//! # Parser states
//!
//! ```text
//!   METHOD ──ws──▶ URI ──ws──▶ VERSION ──ws──▶ HEADER_PAIRS ──blank line──▶ BODY
//!                                                                (skipped for
//!                                                                 bodyless methods)
//! ```
//!
//! Transitions are strictly forward. `\r` bytes are ignored on the request
//! line so both CRLF and bare LF line endings are accepted.

pub mod message;
pub mod parser;
pub mod writer;

pub use message::{Body, HeaderEntry, Message};
pub use parser::{ParseError, ParseLimits, Parser};
pub use writer::ResponseWriter;
