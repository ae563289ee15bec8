use std::sync::Arc;
use std::time::Duration;

use pulsar_proxy_codec::proto::{CommandConnect, Type};
use pulsar_proxy_codec::Frame;

use crate::error::RoutingError;
use crate::registry::SessionRegistry;
use crate::session::BrokerSession;
use crate::types::{BrokerTarget, InboundIdentity, SessionConfig};

/// Handshake routed to a broker
#[derive(Debug)]
pub struct Routed {
    pub session: Arc<BrokerSession>,
    /// Broker reply to the handshake, unchanged
    pub response: Frame,
}

pub struct ConnectionRouter {
    registry: SessionRegistry,
    cfg: SessionConfig,
}

impl ConnectionRouter {
    pub fn new(registry: SessionRegistry, cfg: SessionConfig) -> Self {
        ConnectionRouter { registry, cfg }
    }

    #[inline]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[inline]
    pub fn cfg(&self) -> &SessionConfig {
        &self.cfg
    }

    /// Routes one inbound handshake
    ///
    /// `frame` is the raw CONNECT frame, it is forwarded verbatim. Any failure
    /// after a session was obtained evicts and closes that session.
    pub async fn handle_connect(
        &self,
        identity: InboundIdentity,
        frame: &Frame,
        connect: &CommandConnect,
    ) -> Result<Routed, RoutingError> {
        let target = BrokerTarget::parse(connect.proxy_to_broker_url.as_deref())?;

        let session = self.registry.get_or_create(identity, &target, &self.cfg).await?;

        let response = match self.forward(&session, frame.clone()).await {
            Ok(response) => response,
            Err(e) => {
                self.disconnect(&identity).await;
                return Err(e);
            }
        };

        if matches!(response.command_type(), Ok(Type::Error)) {
            log::debug!("{identity} handshake rejected by broker {}", session.target());
            self.disconnect(&identity).await;
            return Err(RoutingError::Rejected(response));
        }

        log::debug!("{identity} routed to broker {}", session.target());
        Ok(Routed { session, response })
    }

    async fn forward(&self, session: &BrokerSession, frame: Frame) -> Result<Frame, RoutingError> {
        let tm = self.cfg.request_timeout;
        let target = session.target();
        let res = if tm.is_zero() {
            session.request(frame).await
        } else {
            match tokio::time::timeout(tm, session.request(frame)).await {
                Ok(res) => res,
                Err(_) => return Err(RoutingError::Timeout(target.clone(), tm)),
            }
        };
        res.map_err(|e| RoutingError::ForwardFailed(target.clone(), e))
    }

    /// Tears down the session of `identity`, if any
    pub async fn disconnect(&self, identity: &InboundIdentity) {
        if let Some(session) = self.registry.remove(identity) {
            session.close().await;
        }
    }

    /// Closes every session, used on shutdown
    pub async fn close_all(&self, tm: Duration) {
        log::info!("broker session stats {}", self.registry.stats());
        let sessions = self.registry.drain();
        if sessions.is_empty() {
            return;
        }
        log::info!("closing {} broker sessions", sessions.len());
        let closing = futures::future::join_all(sessions.iter().map(|s| s.close()));
        if tokio::time::timeout(tm, closing).await.is_err() {
            log::warn!("closing broker sessions timed out");
        }
    }
}
