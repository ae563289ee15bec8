use std::io;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid length")]
    InvalidLength,
    #[error("Max size exceeded, frame size: {0}, max: {1}")]
    MaxSizeExceeded(usize, usize),
    #[error("Malformed command, {0}")]
    MalformedCommand(#[from] prost::DecodeError),
    #[error("Unknown command type: {0}")]
    UnknownCommandType(i32),
    #[error("io error, {:?}", _0)]
    Io(io::Error),
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> DecodeError {
        DecodeError::Io(e)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Frame is bigger than the maximum frame size, frame size: {0}, max: {1}")]
    OverMaxFrameSize(usize, usize),
    #[error("io error, {:?}", _0)]
    Io(io::Error),
}

impl From<io::Error> for EncodeError {
    fn from(e: io::Error) -> EncodeError {
        EncodeError::Io(e)
    }
}
