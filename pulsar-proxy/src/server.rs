//! Pulsar proxy server
//!
//! One accept loop per listener, one task per inbound connection:
//!
//! 1. read the CONNECT handshake within the listener's handshake timeout
//! 2. route it with [`ConnectionRouter::handle_connect`](crate::router::ConnectionRouter::handle_connect)
//! 3. answer with the broker's reply, or an ERROR frame on failure
//! 4. relay frames both ways until either side goes away
//! 5. drop the identity's broker session
//!
//! ```rust,no_run
//! use pulsar_proxy::context::ServerContext;
//! use pulsar_proxy::conf::{Options, Settings};
//! use pulsar_proxy::net::{Builder, Result};
//! use pulsar_proxy::server::ProxyServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let settings = Settings::new(Options::default())?;
//!     let max_frame_size = settings.max_frame_size();
//!     let scx = ServerContext::new(settings).build();
//!
//!     ProxyServer::new(scx)
//!         .listener(
//!             Builder::new()
//!                 .name("external/tcp")
//!                 .laddr(([0, 0, 0, 0], 6650).into())
//!                 .max_frame_size(max_frame_size)
//!                 .bind()?,
//!         )
//!         .build()
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use itertools::Itertools;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use pulsar_proxy_codec::Frame;
use pulsar_proxy_net::{Listener, NetError, PulsarStream, Result};
use pulsar_proxy_utils::Counter;

use crate::context::ServerContext;
use crate::session::BrokerSession;
use crate::types::InboundIdentity;

pub struct ProxyServerBuilder {
    scx: ServerContext,
    listeners: Vec<Listener>,
}

impl ProxyServerBuilder {
    fn new(scx: ServerContext) -> Self {
        Self { scx, listeners: Vec::default() }
    }

    pub fn listener(mut self, listen: Listener) -> Self {
        self.listeners.push(listen);
        self
    }

    pub fn build(self) -> ProxyServer {
        ProxyServer { inner: Arc::new(ProxyServerInner { scx: self.scx, listeners: self.listeners }) }
    }
}

#[derive(Clone)]
pub struct ProxyServer {
    inner: Arc<ProxyServerInner>,
}

pub struct ProxyServerInner {
    scx: ServerContext,
    listeners: Vec<Listener>,
}

impl Deref for ProxyServer {
    type Target = ProxyServerInner;
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl ProxyServer {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(scx: ServerContext) -> ProxyServerBuilder {
        ProxyServerBuilder::new(scx)
    }

    /// Runs every listener, returns once all accept loops ended
    pub async fn run(self) -> Result<()> {
        futures::future::join_all(self.listeners.iter().map(|l| listen_tcp(self.scx.clone(), l)).collect_vec())
            .await;
        Ok(())
    }
}

async fn listen_tcp(scx: ServerContext, l: &Listener) {
    let conns = Arc::new(Counter::new());
    loop {
        match l.accept().await {
            Ok(accept) => {
                let max_connections = accept.cfg.max_connections;
                if conns.count() >= max_connections as isize {
                    scx.reporter
                        .accept_error(Some(accept.remote_addr), &NetError::TooManyConnections(max_connections));
                    continue;
                }
                conns.inc();
                let conns = scopeguard::guard(conns.clone(), |c| c.dec());
                let scx = scx.clone();
                tokio::spawn(async move {
                    log::debug!("TCP connection from {}", accept.remote_addr);
                    let remote_addr = accept.remote_addr;
                    match accept.tcp() {
                        Ok(s) => process(scx, s).await,
                        Err(e) => scx.reporter.accept_error(Some(remote_addr), &e),
                    }
                    drop(conns);
                });
            }
            Err(e) => {
                scx.reporter.accept_error(None, &e);
                tokio::time::sleep(Duration::from_millis(1000)).await;
            }
        }
    }
}

async fn process(scx: ServerContext, mut stream: PulsarStream<TcpStream>) {
    let remote_addr = stream.remote_addr;
    let identity = InboundIdentity::from(remote_addr);

    let (frame, connect) = match stream.recv_connect(stream.cfg.handshake_timeout).await {
        Ok(handshake) => handshake,
        Err(e) => {
            scx.reporter.read_error(remote_addr, &e);
            return;
        }
    };

    let routed = match scx.router.handle_connect(identity, &frame, &connect).await {
        Ok(routed) => routed,
        Err(e) => {
            scx.reporter.react_error(remote_addr, &e);
            if let Err(e) = stream.send(e.to_frame()).await {
                scx.reporter.write_error(remote_addr, &e);
            }
            let _ = stream.close().await;
            return;
        }
    };

    match stream.send(routed.response).await {
        Ok(()) => relay(&scx, &mut stream, &routed.session).await,
        Err(e) => scx.reporter.write_error(remote_addr, &e),
    }

    scx.router.disconnect(&identity).await;
    if let Err(e) = stream.close().await {
        log::debug!("{identity} close error, {e}");
    }
    log::debug!("{identity} connection closed");
}

enum Relay {
    Inbound(Option<Result<Frame>>),
    Outbound(Option<Frame>),
}

async fn relay(scx: &ServerContext, stream: &mut PulsarStream<TcpStream>, session: &BrokerSession) {
    let remote_addr = stream.remote_addr;
    let mut events = session.take_events();
    loop {
        let ev = tokio::select! {
            item = stream.next() => Relay::Inbound(item),
            frame = next_event(&mut events) => Relay::Outbound(frame),
        };
        match ev {
            Relay::Inbound(Some(Ok(frame))) => {
                if let Err(e) = session.send(frame).await {
                    scx.reporter.write_error(remote_addr, &e);
                    break;
                }
            }
            Relay::Inbound(Some(Err(e))) => {
                scx.reporter.read_error(remote_addr, &e);
                break;
            }
            Relay::Inbound(None) => {
                log::debug!("{remote_addr} client closed the connection");
                break;
            }
            Relay::Outbound(Some(frame)) => {
                if let Err(e) = stream.send(frame).await {
                    scx.reporter.write_error(remote_addr, &e);
                    break;
                }
            }
            Relay::Outbound(None) => {
                log::debug!("{remote_addr} broker {} closed the connection", session.target());
                break;
            }
        }
    }
}

#[inline]
async fn next_event(events: &mut Option<mpsc::Receiver<Frame>>) -> Option<Frame> {
    match events {
        Some(rx) => rx.recv().await,
        None => futures::future::pending().await,
    }
}
