use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use pulsar_proxy_conf::Settings;
use pulsar_proxy_net::ClientConfig;

use crate::error::RoutingError;

pub type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// Key of one inbound connection, its remote address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InboundIdentity(SocketAddr);

impl InboundIdentity {
    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for InboundIdentity {
    #[inline]
    fn from(addr: SocketAddr) -> Self {
        InboundIdentity(addr)
    }
}

impl FromStr for InboundIdentity {
    type Err = std::net::AddrParseError;
    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(InboundIdentity(s.parse()?))
    }
}

impl fmt::Display for InboundIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for InboundIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broker address carried in the handshake, `host:port`
///
/// IPv6 literals are written in brackets, `[::1]:6650`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BrokerTarget {
    pub host: String,
    pub port: u16,
}

impl BrokerTarget {
    #[inline]
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        BrokerTarget { host: host.into(), port }
    }

    /// Target of an optional handshake url field
    #[inline]
    pub fn parse(url: Option<&str>) -> Result<Self, RoutingError> {
        match url {
            None => Err(RoutingError::MissingTarget),
            Some(url) => url.parse(),
        }
    }
}

impl FromStr for BrokerTarget {
    type Err = RoutingError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RoutingError::MissingTarget);
        }
        let invalid = || RoutingError::InvalidTarget(url.to_owned());

        let (host, port) = url.rsplit_once(':').ok_or_else(invalid)?;
        let host = match host.strip_prefix('[') {
            Some(h) => h.strip_suffix(']').ok_or_else(invalid)?,
            None if host.contains(':') => return Err(invalid()),
            None => host,
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port.parse::<u16>() {
            Ok(p) if p > 0 => p,
            _ => return Err(invalid()),
        };
        Ok(BrokerTarget::new(host, port))
    }
}

impl fmt::Display for BrokerTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for BrokerTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Settings applied to every outbound broker session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub max_frame_size: usize,
    pub send_queue_size: usize,
    pub pending_queue_size: usize,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let c = ClientConfig::default();
        SessionConfig {
            max_frame_size: c.max_frame_size,
            send_queue_size: c.send_queue_size,
            pending_queue_size: c.pending_queue_size,
            connect_timeout: c.connect_timeout,
            request_timeout: Duration::from_secs(30),
            send_timeout: c.send_timeout,
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        SessionConfig {
            max_frame_size: settings.max_frame_size(),
            send_queue_size: settings.broker.send_queue_size,
            pending_queue_size: settings.broker.pending_queue_size,
            connect_timeout: settings.broker.connect_timeout,
            request_timeout: settings.broker.request_timeout,
            send_timeout: settings.broker.send_timeout,
        }
    }

    #[inline]
    pub fn client_config(&self, target: &BrokerTarget) -> ClientConfig {
        ClientConfig {
            host: target.host.clone(),
            port: target.port,
            max_frame_size: self.max_frame_size,
            send_queue_size: self.send_queue_size,
            pending_queue_size: self.pending_queue_size,
            connect_timeout: self.connect_timeout,
            send_timeout: self.send_timeout,
        }
    }
}
