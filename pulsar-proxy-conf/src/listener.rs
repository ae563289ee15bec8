use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use pulsar_proxy_net::Builder;
use pulsar_proxy_utils::{deserialize_addr, deserialize_duration};

type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// `[listener.tcp.<name>]` tables, keyed by name
///
/// Several listeners may share a port as long as they bind different addresses.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Listeners {
    #[serde(default)]
    tcp: HashMap<String, Listener>,
}

impl Listeners {
    /// Drops disabled entries and qualifies names, an empty set gets one `external` listener
    pub(crate) fn init(&mut self, laddr: Option<SocketAddr>) {
        self.tcp.retain(|_, l| l.enable);
        for (name, l) in self.tcp.iter_mut() {
            l.name = format!("{name}/tcp");
        }

        if self.tcp.is_empty() {
            let mut l = Listener { name: "external/tcp".into(), ..Default::default() };
            if let Some(laddr) = laddr {
                l.addr = laddr;
            }
            self.tcp.insert("external".into(), l);
        }
    }

    #[inline]
    pub fn tcp(&self, name: &str) -> Option<&Listener> {
        self.tcp.get(name)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.tcp.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tcp.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tcp.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Listener {
    pub name: String,
    pub enable: bool,
    #[serde(deserialize_with = "deserialize_addr")]
    pub addr: SocketAddr,
    pub max_connections: usize,
    pub backlog: i32,
    pub nodelay: bool,
    pub reuseaddr: Option<bool>,
    pub reuseport: Option<bool>,
    //Time a client gets to send CONNECT after the TCP accept.
    #[serde(deserialize_with = "deserialize_duration")]
    pub handshake_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub send_timeout: Duration,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            name: String::new(),
            enable: true,
            addr: ([0, 0, 0, 0], 6650).into(),
            max_connections: 1024000,
            backlog: 1024,
            nodelay: true,
            reuseaddr: Some(true),
            reuseport: None,
            handshake_timeout: Duration::from_secs(15),
            send_timeout: Duration::from_secs(10),
        }
    }
}

impl Listener {
    /// Listener builder for this entry, `max_frame_size` comes from the proxy section
    pub fn builder(&self, max_frame_size: usize) -> Builder {
        Builder {
            name: self.name.clone(),
            laddr: self.addr,
            backlog: self.backlog,
            nodelay: self.nodelay,
            reuseaddr: self.reuseaddr,
            reuseport: self.reuseport,
            max_connections: self.max_connections,
            max_frame_size,
            handshake_timeout: self.handshake_timeout,
            send_timeout: self.send_timeout,
        }
    }
}
