#![deny(unsafe_code)]

//! # Pulsar protocol proxy
//!
//! Accepts client connections, reads the CONNECT handshake, dials the broker
//! named in its `proxy_to_broker_url` field on the client's behalf and then
//! relays frames between the two.
//!
//! Outbound sessions are kept in a [`SessionRegistry`](registry::SessionRegistry)
//! keyed by the client's remote address, at most one per client connection.
//!
//! ```rust,no_run
//! use pulsar_proxy::context::ServerContext;
//! use pulsar_proxy::conf::{Options, Settings};
//! use pulsar_proxy::net::Result;
//! use pulsar_proxy::server::ProxyServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let settings = Settings::new(Options::default())?;
//!     let max_frame_size = settings.max_frame_size();
//!     let listeners = settings
//!         .listeners
//!         .iter()
//!         .map(|l| l.builder(max_frame_size).bind())
//!         .collect::<Result<Vec<_>>>()?;
//!
//!     let mut server = ProxyServer::new(ServerContext::new(settings).build());
//!     for l in listeners {
//!         server = server.listener(l);
//!     }
//!     server.build().run().await
//! }
//! ```

pub mod context;
pub mod error;
pub mod logger;
pub mod registry;
pub mod reporter;
pub mod router;
pub mod server;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use net::{Error, Result};
pub use pulsar_proxy_codec as codec;
pub use pulsar_proxy_conf as conf;
pub use pulsar_proxy_net as net;
pub use pulsar_proxy_utils as utils;
