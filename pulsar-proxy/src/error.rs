use std::sync::Arc;
use std::time::Duration;

use pulsar_proxy_codec::proto::{BaseCommand, ServerError};
use pulsar_proxy_codec::Frame;

use crate::types::BrokerTarget;
use crate::Error;

/// Failure to open an outbound broker session
///
/// Concurrent callers waiting on the same dial all observe the same error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CreationError {
    #[error("connect to broker {0} failed, {1}")]
    Connect(BrokerTarget, Arc<Error>),
    #[error("connect to broker {0} timed out after {1:?}")]
    Timeout(BrokerTarget, Duration),
    /// The identity was removed from the registry before the dial finished
    #[error("session to broker {0} was removed while connecting")]
    Removed(BrokerTarget),
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("proxy to broker url is missing")]
    MissingTarget,
    #[error("proxy to broker url is invalid, {0}")]
    InvalidTarget(String),
    #[error("broker unreachable, {0}")]
    BrokerUnreachable(CreationError),
    #[error("forward to broker {0} failed, {1}")]
    ForwardFailed(BrokerTarget, Error),
    #[error("broker {0} timed out after {1:?}")]
    Timeout(BrokerTarget, Duration),
    /// The broker answered the handshake with an ERROR command
    #[error("handshake rejected by broker, {0:?}")]
    Rejected(Frame),
}

impl From<CreationError> for RoutingError {
    #[inline]
    fn from(e: CreationError) -> Self {
        match e {
            CreationError::Timeout(target, tm) => RoutingError::Timeout(target, tm),
            e => RoutingError::BrokerUnreachable(e),
        }
    }
}

impl RoutingError {
    #[inline]
    pub fn server_error(&self) -> ServerError {
        match self {
            RoutingError::MissingTarget | RoutingError::InvalidTarget(_) => ServerError::UnknownError,
            RoutingError::BrokerUnreachable(_)
            | RoutingError::ForwardFailed(..)
            | RoutingError::Timeout(..)
            | RoutingError::Rejected(_) => ServerError::ServiceNotReady,
        }
    }

    /// Frame sent to the client in place of CONNECTED
    ///
    /// A broker rejection is passed through unchanged.
    pub fn to_frame(&self) -> Frame {
        match self {
            RoutingError::Rejected(frame) => frame.clone(),
            e => Frame::from_command(&BaseCommand::from_error(0, e.server_error(), e.to_string())),
        }
    }
}
