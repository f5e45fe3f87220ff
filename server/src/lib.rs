//! Chat relay server.
//!
//! Every accepted connection gets its own [`client_handler::ClientHandler`]
//! task. Handlers register participants in the shared
//! [`registry::Registry`] and fan frames out through
//! [`delivery::Delivery`].

pub mod config;
pub mod error;

// shared state
pub mod registry;

// fan out
pub mod delivery;

// per connection worker and accept loop
pub mod client_handler;
pub mod server_listener;
