use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{DecodeError, EncodeError};
use crate::frame::Frame;
use crate::utils::{COMMAND_SIZE_LEN, TOTAL_SIZE_LEN};

/// Length-prefixed Pulsar frame codec
///
/// `max_frame_size` bounds the `total_size` field in both directions;
/// `0` means unlimited.
#[derive(Debug, Clone)]
pub struct PulsarCodec {
    max_frame_size: usize,
}

impl PulsarCodec {
    pub fn new(max_frame_size: usize) -> Self {
        PulsarCodec { max_frame_size }
    }

    #[inline]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    #[inline]
    fn check_size(&self, size: usize) -> bool {
        self.max_frame_size == 0 || size <= self.max_frame_size
    }
}

impl Default for PulsarCodec {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Decoder for PulsarCodec {
    type Item = Frame;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, DecodeError> {
        if src.len() < TOTAL_SIZE_LEN {
            return Ok(None);
        }

        let total_size = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        ensure!(self.check_size(total_size), DecodeError::MaxSizeExceeded(total_size, self.max_frame_size));
        ensure!(total_size >= COMMAND_SIZE_LEN, DecodeError::InvalidLength);

        if src.len() < TOTAL_SIZE_LEN + total_size {
            src.reserve(TOTAL_SIZE_LEN + total_size - src.len());
            return Ok(None);
        }

        src.advance(TOTAL_SIZE_LEN);
        let mut frame = src.split_to(total_size);
        let command_size = frame.get_u32() as usize;
        ensure!(command_size <= frame.len(), DecodeError::InvalidLength);

        let command = frame.split_to(command_size).freeze();
        Ok(Some(Frame::new(command, frame.freeze())))
    }
}

impl Encoder<Frame> for PulsarCodec {
    type Error = EncodeError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let total_size = item.total_size();
        if !self.check_size(total_size) {
            return Err(EncodeError::OverMaxFrameSize(total_size, self.max_frame_size));
        }
        dst.reserve(TOTAL_SIZE_LEN + total_size);
        dst.put_u32(total_size as u32);
        dst.put_u32(item.command.len() as u32);
        dst.extend_from_slice(&item.command);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{BaseCommand, CommandConnected, Type};
    use bytes::Bytes;

    #[test]
    fn test_max_size() {
        let mut codec = PulsarCodec::new(16);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"\0\0\0\x20");
        assert!(matches!(codec.decode(&mut buf), Err(DecodeError::MaxSizeExceeded(32, 16))));

        let big = Frame::new(Bytes::from(vec![0u8; 8]), Bytes::from(vec![0u8; 8]));
        assert!(matches!(
            codec.encode(big, &mut BytesMut::new()),
            Err(EncodeError::OverMaxFrameSize(20, 16))
        ));
    }

    #[test]
    fn test_command_size_overflow() {
        let mut codec = PulsarCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"\0\0\0\x06\0\0\0\x09ab");
        assert!(matches!(codec.decode(&mut buf), Err(DecodeError::InvalidLength)));
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = PulsarCodec::default();
        let frame = Frame::from_command(&BaseCommand::new_ping());
        let mut full = BytesMut::new();
        codec.encode(frame.clone(), &mut full).unwrap();

        let mut buf = BytesMut::from(&full[..3]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&full[3..full.len() - 1]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&full[full.len() - 1..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(frame));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_payload_is_carried_opaquely() {
        let mut codec = PulsarCodec::new(1024);
        let cmd = BaseCommand::from_connected(CommandConnected {
            server_version: "Pulsar Server".into(),
            protocol_version: Some(19),
            max_message_size: Some(5 * 1024 * 1024),
        });
        let frame = Frame::new(Frame::from_command(&cmd).command, Bytes::from_static(b"\x0e\x01opaque"));

        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        codec.encode(Frame::from_command(&BaseCommand::new_pong()), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, frame);
        assert_eq!(first.command().unwrap(), cmd);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().command_type().unwrap(), Type::Pong);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
