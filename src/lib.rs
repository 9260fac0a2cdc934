//! Client for the Fuddle service registry
//!
//! A [`Fuddle`] client connects to one of a list of seed registry nodes,
//! registers the members owned by the application and streams every other
//! member of the cluster into a local, eventually consistent
//! [`Registry`]. The replica can be queried and subscribed to with
//! [`Filter`]s, and keeps serving the last known view while the connection
//! is down.
//!
//! Sessions survive transport failures: each time the connection becomes
//! ready again the local members are re-registered and the update stream is
//! re-opened with the versions already held, so only the delta is sent.
//!
//! See [`client`] for a complete example.

pub mod client;
mod config;
mod errors;
mod filter;
pub mod network;
mod proto;
mod registry;
pub mod utils;

pub use client::*;
pub use config::*;
pub use errors::*;
pub use filter::*;
pub use network::ConnectionState;
pub use network::Connector;
pub use network::Transport;
pub use network::UpdateStream;
pub use registry::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
