//! Chat relay client.
//!
//! A [`client::Client`] session joins the channel under one name, sends
//! what the user types and runs a [`server_reader::ServerReader`] that
//! shows everything the server relays.

pub mod error;
pub mod settings;

// io
pub mod input_reader;
pub mod sink;

// session
pub mod server_reader;
pub mod client;
