#![deny(unsafe_code)]

mod builder;
mod client;
mod error;
mod stream;

pub use builder::{Acceptor, Builder, Listener};
pub use client::{Client, ClientConfig};
pub use error::NetError;
pub use stream::PulsarStream;

pub type Error = anyhow::Error;
pub type Result<T> = anyhow::Result<T, Error>;
