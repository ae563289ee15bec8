//! The part of `PulsarApi.proto` the proxy decodes
//!
//! Field tags and enum values follow the upstream definition, so frames built
//! here are understood by real brokers and clients. Fields the proxy never
//! looks at are omitted; they are skipped on decode, and frames are relayed
//! from their raw bytes, never re-encoded from these types.

use crate::error::DecodeError;

pub use self::base_command::Type;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BaseCommand {
    #[prost(enumeration = "base_command::Type", required, tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub connect: Option<CommandConnect>,
    #[prost(message, optional, tag = "3")]
    pub connected: Option<CommandConnected>,
    #[prost(message, optional, tag = "14")]
    pub error: Option<CommandError>,
    #[prost(message, optional, tag = "18")]
    pub ping: Option<CommandPing>,
    #[prost(message, optional, tag = "19")]
    pub pong: Option<CommandPong>,
}

pub mod base_command {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Connect = 2,
        Connected = 3,
        Subscribe = 4,
        Producer = 5,
        Send = 6,
        SendReceipt = 7,
        SendError = 8,
        Message = 9,
        Ack = 10,
        Flow = 11,
        Unsubscribe = 12,
        Success = 13,
        Error = 14,
        CloseProducer = 15,
        CloseConsumer = 16,
        ProducerSuccess = 17,
        Ping = 18,
        Pong = 19,
        RedeliverUnacknowledgedMessages = 20,
        PartitionedMetadata = 21,
        PartitionedMetadataResponse = 22,
        Lookup = 23,
        LookupResponse = 24,
        ConsumerStats = 25,
        ConsumerStatsResponse = 26,
        ReachedEndOfTopic = 27,
        Seek = 28,
        GetLastMessageId = 29,
        GetLastMessageIdResponse = 30,
        ActiveConsumerChange = 31,
        GetTopicsOfNamespace = 32,
        GetTopicsOfNamespaceResponse = 33,
        GetSchema = 34,
        GetSchemaResponse = 35,
        AuthChallenge = 36,
        AuthResponse = 37,
        AckResponse = 38,
        GetOrCreateSchema = 39,
        GetOrCreateSchemaResponse = 40,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandConnect {
    #[prost(string, required, tag = "1")]
    pub client_version: String,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub auth_data: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "4")]
    pub protocol_version: Option<i32>,
    #[prost(string, optional, tag = "5")]
    pub auth_method_name: Option<String>,
    /// Broker the client wants to reach through the proxy, `host:port`
    #[prost(string, optional, tag = "6")]
    pub proxy_to_broker_url: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub original_principal: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub original_auth_data: Option<String>,
    #[prost(string, optional, tag = "9")]
    pub original_auth_method: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandConnected {
    #[prost(string, required, tag = "1")]
    pub server_version: String,
    #[prost(int32, optional, tag = "2")]
    pub protocol_version: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub max_message_size: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandError {
    #[prost(uint64, required, tag = "1")]
    pub request_id: u64,
    #[prost(enumeration = "ServerError", required, tag = "2")]
    pub error: i32,
    #[prost(string, required, tag = "3")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandPing {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandPong {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ServerError {
    UnknownError = 0,
    MetadataError = 1,
    PersistenceError = 2,
    AuthenticationError = 3,
    AuthorizationError = 4,
    ConsumerBusy = 5,
    ServiceNotReady = 6,
    ProducerBlockedQuotaExceededError = 7,
    ProducerBlockedQuotaExceededException = 8,
    ChecksumError = 9,
    UnsupportedVersionError = 10,
    TopicNotFound = 11,
    SubscriptionNotFound = 12,
    ConsumerNotFound = 13,
    TooManyRequests = 14,
    TopicTerminatedError = 15,
    ProducerBusy = 16,
    InvalidTopicName = 17,
    IncompatibleSchema = 18,
    ConsumerAssignError = 19,
    TransactionCoordinatorNotFound = 20,
    InvalidTxnStatus = 21,
    NotAllowedError = 22,
    TransactionConflict = 23,
    TransactionNotFound = 24,
    ProducerFenced = 25,
}

impl BaseCommand {
    #[inline]
    pub fn from_connect(connect: CommandConnect) -> Self {
        BaseCommand { r#type: Type::Connect as i32, connect: Some(connect), ..Default::default() }
    }

    #[inline]
    pub fn from_connected(connected: CommandConnected) -> Self {
        BaseCommand { r#type: Type::Connected as i32, connected: Some(connected), ..Default::default() }
    }

    #[inline]
    pub fn from_error(request_id: u64, error: ServerError, message: impl Into<String>) -> Self {
        BaseCommand {
            r#type: Type::Error as i32,
            error: Some(CommandError { request_id, error: error as i32, message: message.into() }),
            ..Default::default()
        }
    }

    #[inline]
    pub fn new_ping() -> Self {
        BaseCommand { r#type: Type::Ping as i32, ping: Some(CommandPing {}), ..Default::default() }
    }

    #[inline]
    pub fn new_pong() -> Self {
        BaseCommand { r#type: Type::Pong as i32, pong: Some(CommandPong {}), ..Default::default() }
    }

    /// The command type, failing on values this build does not know
    #[inline]
    pub fn command_type(&self) -> Result<Type, DecodeError> {
        Type::try_from(self.r#type).map_err(|_| DecodeError::UnknownCommandType(self.r#type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_connect_keeps_broker_url() {
        let cmd = BaseCommand::from_connect(CommandConnect {
            client_version: "Pulsar-Java-v3.0.0".into(),
            protocol_version: Some(19),
            proxy_to_broker_url: Some("broker1:6650".into()),
            ..Default::default()
        });
        let decoded = BaseCommand::decode(cmd.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.command_type().unwrap(), Type::Connect);
        assert_eq!(decoded.connect.unwrap().proxy_to_broker_url.as_deref(), Some("broker1:6650"));
    }

    #[test]
    fn test_unknown_command_type() {
        let cmd = BaseCommand { r#type: 999, ..Default::default() };
        assert!(matches!(cmd.command_type(), Err(DecodeError::UnknownCommandType(999))));
    }

    #[test]
    fn test_error_command() {
        let cmd = BaseCommand::from_error(0, ServerError::ServiceNotReady, "broker unreachable");
        assert_eq!(cmd.command_type().unwrap(), Type::Error);
        let err = cmd.error.unwrap();
        assert_eq!(err.error, ServerError::ServiceNotReady as i32);
        assert_eq!(err.message, "broker unreachable");
    }
}
