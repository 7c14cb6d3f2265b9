//! Connection handling: the client registry and the event loop that drives it.

pub mod listener;
pub mod registry;

pub use listener::Server;
pub use registry::{Registry, RegistryError};
