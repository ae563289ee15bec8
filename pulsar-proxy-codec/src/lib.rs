#![deny(unsafe_code)]

//! Pulsar binary protocol framing
//!
//! Every frame on the wire is
//!
//! ```text
//! [total_size: u32][command_size: u32][BaseCommand][rest]
//! ```
//!
//! where `rest` is empty for simple commands and carries the magic number,
//! checksum, metadata and payload for payload commands. The proxy only
//! inspects the command of a few frames, so [`Frame`] keeps the raw bytes and
//! relays everything else untouched.
//!
//! - [`PulsarCodec`]: `tokio_util::codec` implementation with a frame size bound
//! - [`proto`]: the protobuf subset the proxy decodes (connect, connected, error, ping, pong)

#[macro_use]
mod utils;

/// Error types for encoding/decoding operations
pub mod error;

/// Protobuf command subset
pub mod proto;

mod codec;
mod frame;

pub use codec::PulsarCodec;
pub use frame::Frame;

/// Extra room granted on top of the max message size for command and metadata bytes
pub const FRAME_PADDING: usize = 10 * 1024;

/// Pulsar's default max message size (5 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 5 * 1024 * 1024;

/// Frame size bound derived from the max message size
#[inline]
pub fn max_frame_size(max_message_size: usize) -> usize {
    max_message_size.saturating_add(FRAME_PADDING)
}
