use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use pulsar_proxy_conf::Settings;

use crate::registry::SessionRegistry;
use crate::reporter::{ErrorReporter, LogReporter};
use crate::router::ConnectionRouter;
use crate::session::{BrokerConnector, TcpConnector};
use crate::types::SessionConfig;

/// Proxy state shared by every listener and connection task
#[derive(Clone)]
pub struct ServerContext {
    inner: Arc<ServerContextInner>,
}

pub struct ServerContextInner {
    pub settings: Settings,
    pub router: ConnectionRouter,
    pub reporter: Box<dyn ErrorReporter>,
}

impl Deref for ServerContext {
    type Target = ServerContextInner;
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl ServerContext {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(settings: Settings) -> ServerContextBuilder {
        ServerContextBuilder { settings, connector: None, reporter: None, session_cfg: None }
    }

    #[inline]
    pub fn registry(&self) -> &SessionRegistry {
        self.router.registry()
    }

    /// Closes all broker sessions
    pub async fn shutdown(&self) {
        self.router.close_all(self.settings.broker.send_timeout).await;
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ServerContext ...")?;
        Ok(())
    }
}

pub struct ServerContextBuilder {
    settings: Settings,
    connector: Option<Arc<dyn BrokerConnector>>,
    reporter: Option<Box<dyn ErrorReporter>>,
    session_cfg: Option<SessionConfig>,
}

impl ServerContextBuilder {
    pub fn connector(mut self, connector: Arc<dyn BrokerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn reporter(mut self, reporter: Box<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Overrides the session settings derived from `Settings`
    pub fn session_cfg(mut self, cfg: SessionConfig) -> Self {
        self.session_cfg = Some(cfg);
        self
    }

    pub fn build(self) -> ServerContext {
        let cfg = self.session_cfg.unwrap_or_else(|| SessionConfig::from_settings(&self.settings));
        let connector = self.connector.unwrap_or_else(|| Arc::new(TcpConnector));
        let registry = SessionRegistry::new(connector);
        ServerContext {
            inner: Arc::new(ServerContextInner {
                router: ConnectionRouter::new(registry, cfg),
                reporter: self.reporter.unwrap_or_else(|| Box::new(LogReporter)),
                settings: self.settings,
            }),
        }
    }
}
