use std::fmt;

use bytes::Bytes;
use prost::Message;

use crate::error::DecodeError;
use crate::proto::{BaseCommand, Type};
use crate::utils::COMMAND_SIZE_LEN;

/// One wire frame, kept as raw bytes
///
/// `command` is the serialized `BaseCommand`; `payload` is whatever follows it
/// (empty for simple commands).
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Bytes,
    pub payload: Bytes,
}

impl Frame {
    #[inline]
    pub fn new(command: Bytes, payload: Bytes) -> Self {
        Frame { command, payload }
    }

    /// A simple (payload-less) frame carrying `cmd`
    #[inline]
    pub fn from_command(cmd: &BaseCommand) -> Self {
        Frame { command: Bytes::from(cmd.encode_to_vec()), payload: Bytes::new() }
    }

    #[inline]
    pub fn command(&self) -> Result<BaseCommand, DecodeError> {
        Ok(BaseCommand::decode(self.command.clone())?)
    }

    #[inline]
    pub fn command_type(&self) -> Result<Type, DecodeError> {
        self.command()?.command_type()
    }

    /// Value written into the `total_size` field
    #[inline]
    pub fn total_size(&self) -> usize {
        COMMAND_SIZE_LEN + self.command.len() + self.payload.len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let typ = self.command().ok().and_then(|c| c.command_type().ok());
        write!(
            f,
            "Frame {{ type: {:?}, command: {}B, payload: {}B }}",
            typ,
            self.command.len(),
            self.payload.len()
        )
    }
}
