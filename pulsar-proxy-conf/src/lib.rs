#![deny(unsafe_code)]

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File};
use serde::Deserialize;

use pulsar_proxy_net::Result;
use pulsar_proxy_utils::*;

use self::listener::Listeners;
use self::logging::Log;

pub use self::listener::Listener;
pub use self::options::Options;

pub mod listener;
pub mod logging;
pub mod options;

#[derive(Clone)]
pub struct Settings(Arc<Inner>);

#[derive(Debug, Clone, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub proxy: Proxy,
    #[serde(default)]
    pub broker: Broker,
    #[serde(default)]
    pub log: Log,
    #[serde(rename = "listener")]
    #[serde(default)]
    pub listeners: Listeners,
    #[serde(default, skip)]
    pub opts: Options,
}

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    pub fn new(opts: Options) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("/etc/pulsar-proxy/pulsar-proxy").required(false))
            .add_source(File::with_name("pulsar-proxy").required(false))
            .add_source(
                config::Environment::with_prefix("pulsar_proxy")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(cfg) = opts.cfg_name.as_ref() {
            builder = builder.add_source(File::with_name(cfg).required(false));
        }

        Self::build(builder, opts)
    }

    fn build(builder: ConfigBuilder<DefaultState>, opts: Options) -> Result<Self> {
        let mut inner: Inner = builder.build()?.try_deserialize()?;

        inner.listeners.init(opts.laddr);

        inner.opts = opts;
        Ok(Self(Arc::new(inner)))
    }

    /// Upper bound for a single frame on either side of the proxy
    #[inline]
    pub fn max_frame_size(&self) -> usize {
        pulsar_proxy_codec::max_frame_size(self.proxy.max_message_size.as_usize())
    }

    #[inline]
    pub fn logs(&self) {
        log::debug!("Config info is {:?}", self.0);
        log::info!("proxy version is {}", self.proxy.version);
        log::info!("protocol version is {}", self.proxy.protocol_version);
        log::info!("max message size is {}", self.proxy.max_message_size);
        log::info!("broker config is: {:?}", self.broker);
        for l in self.listeners.iter() {
            log::info!("listener {} on {}", l.name, l.addr);
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Settings ...")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Proxy {
    //Version string reported by the proxy.
    #[serde(default = "Proxy::version_default")]
    pub version: String,
    #[serde(default = "Proxy::protocol_version_default")]
    pub protocol_version: i32,
    //Largest message accepted from a client or broker, frames may exceed it by the padding.
    #[serde(default = "Proxy::max_message_size_default")]
    pub max_message_size: Bytesize,
}

impl Default for Proxy {
    #[inline]
    fn default() -> Self {
        Self {
            version: Self::version_default(),
            protocol_version: Self::protocol_version_default(),
            max_message_size: Self::max_message_size_default(),
        }
    }
}

impl Proxy {
    fn version_default() -> String {
        format!("pulsar-proxy/{}", env!("CARGO_PKG_VERSION"))
    }
    fn protocol_version_default() -> i32 {
        19
    }
    fn max_message_size_default() -> Bytesize {
        Bytesize(pulsar_proxy_codec::DEFAULT_MAX_MESSAGE_SIZE)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Broker {
    #[serde(default = "Broker::connect_timeout_default", deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    //Deadline for the broker to answer a forwarded handshake.
    #[serde(default = "Broker::request_timeout_default", deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
    #[serde(default = "Broker::send_timeout_default", deserialize_with = "deserialize_duration")]
    pub send_timeout: Duration,
    #[serde(default = "Broker::queue_size_default")]
    pub send_queue_size: usize,
    #[serde(default = "Broker::queue_size_default")]
    pub pending_queue_size: usize,
}

impl Default for Broker {
    #[inline]
    fn default() -> Self {
        Self {
            connect_timeout: Self::connect_timeout_default(),
            request_timeout: Self::request_timeout_default(),
            send_timeout: Self::send_timeout_default(),
            send_queue_size: Self::queue_size_default(),
            pending_queue_size: Self::queue_size_default(),
        }
    }
}

impl Broker {
    fn connect_timeout_default() -> Duration {
        Duration::from_secs(10)
    }
    fn request_timeout_default() -> Duration {
        Duration::from_secs(30)
    }
    fn send_timeout_default() -> Duration {
        Duration::from_secs(10)
    }
    fn queue_size_default() -> usize {
        1024
    }
}
