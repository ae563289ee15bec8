//! Outbound broker sessions
//!
//! A [`BrokerSession`] wraps one connection to a broker opened on behalf of
//! one inbound connection. The network side sits behind two seams:
//! [`BrokerConnector`] dials, [`BrokerTransport`] carries frames. The
//! production pair is [`TcpConnector`] over [`pulsar_proxy_net::Client`].

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pulsar_proxy_codec::Frame;
use pulsar_proxy_net::Client;
use pulsar_proxy_utils::{timestamp_millis, TimestampMillis};

use crate::types::{BrokerTarget, InboundIdentity, SessionConfig};
use crate::Result;

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, target: &BrokerTarget, cfg: &SessionConfig) -> Result<Box<dyn BrokerTransport>>;
}

#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Sends `frame` and waits for the broker's reply
    async fn request(&self, frame: Frame) -> Result<Frame>;

    /// Sends `frame` without waiting for a reply
    async fn send(&self, frame: Frame) -> Result<()>;

    /// Unsolicited broker frames, available once
    fn take_events(&self) -> Option<mpsc::Receiver<Frame>>;

    fn is_closed(&self) -> bool;

    async fn close(&self);
}

#[derive(Default, Clone, Copy, Debug)]
pub struct TcpConnector;

#[async_trait]
impl BrokerConnector for TcpConnector {
    async fn connect(&self, target: &BrokerTarget, cfg: &SessionConfig) -> Result<Box<dyn BrokerTransport>> {
        let client = Client::connect(cfg.client_config(target)).await?;
        Ok(Box::new(client))
    }
}

#[async_trait]
impl BrokerTransport for Client {
    #[inline]
    async fn request(&self, frame: Frame) -> Result<Frame> {
        Client::request(self, frame).await
    }

    #[inline]
    async fn send(&self, frame: Frame) -> Result<()> {
        Client::send(self, frame).await
    }

    #[inline]
    fn take_events(&self) -> Option<mpsc::Receiver<Frame>> {
        Client::take_events(self)
    }

    #[inline]
    fn is_closed(&self) -> bool {
        Client::is_closed(self)
    }

    #[inline]
    async fn close(&self) {
        Client::close(self).await
    }
}

pub struct BrokerSession {
    identity: InboundIdentity,
    target: BrokerTarget,
    transport: Box<dyn BrokerTransport>,
    created_at: TimestampMillis,
}

impl BrokerSession {
    pub fn new(identity: InboundIdentity, target: BrokerTarget, transport: Box<dyn BrokerTransport>) -> Self {
        BrokerSession { identity, target, transport, created_at: timestamp_millis() }
    }

    #[inline]
    pub fn identity(&self) -> InboundIdentity {
        self.identity
    }

    #[inline]
    pub fn target(&self) -> &BrokerTarget {
        &self.target
    }

    #[inline]
    pub async fn request(&self, frame: Frame) -> Result<Frame> {
        self.transport.request(frame).await
    }

    #[inline]
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.transport.send(frame).await
    }

    #[inline]
    pub fn take_events(&self) -> Option<mpsc::Receiver<Frame>> {
        self.transport.take_events()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    pub async fn close(&self) {
        log::debug!(
            "{} close broker session to {}, alive {}ms",
            self.identity,
            self.target,
            timestamp_millis() - self.created_at
        );
        self.transport.close().await
    }
}

impl fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BrokerSession")
            .field("identity", &self.identity)
            .field("target", &self.target)
            .field("created_at", &self.created_at)
            .finish()
    }
}
