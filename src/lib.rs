//! minihttp - single-threaded HTTP/1.1 server
//!
//! Core library: message store, request parser, connection registry and the
//! readiness-driven event loop.

pub mod config;
pub mod http;
pub mod server;
