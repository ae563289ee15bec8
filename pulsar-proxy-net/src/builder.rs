use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, SockAddr, Socket, Type};
use tokio::net::{TcpListener, TcpStream};

use pulsar_proxy_codec::{max_frame_size, DEFAULT_MAX_MESSAGE_SIZE};

use crate::stream::PulsarStream;
use crate::Result;

#[derive(Clone, Debug)]
pub struct Builder {
    /// The name of the listener.
    pub name: String,
    ///The local address the listener binds to.
    pub laddr: SocketAddr,
    ///The maximum length of the pending connection queue.
    pub backlog: i32,
    ///Sets the value of the TCP_NODELAY option on accepted sockets.
    pub nodelay: bool,
    ///Whether to enable the SO_REUSEADDR option.
    pub reuseaddr: Option<bool>,
    ///Whether to enable the SO_REUSEPORT option.
    pub reuseport: Option<bool>,
    ///The maximum number of concurrent connections allowed by the listener.
    pub max_connections: usize,
    ///Maximum allowed frame length, 0 means unlimited, default: 5M + 10K
    pub max_frame_size: usize,
    ///Time allowed for the client to send its CONNECT command.
    pub handshake_timeout: Duration,
    ///Send timeout, zero means no timeout.
    pub send_timeout: Duration,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            name: Default::default(),
            laddr: SocketAddr::from(SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), 6650)),
            backlog: 512,
            nodelay: true,
            reuseaddr: None,
            reuseport: None,
            max_connections: 1_000_000,
            max_frame_size: max_frame_size(DEFAULT_MAX_MESSAGE_SIZE),
            handshake_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
        }
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    pub fn laddr(mut self, laddr: SocketAddr) -> Self {
        self.laddr = laddr;
        self
    }

    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// Opens the listening socket, `reuseaddr`/`reuseport` are left to the OS when unset
    pub fn bind(self) -> Result<Listener> {
        let socket = Socket::new(Domain::for_address(self.laddr), Type::STREAM, None)?;
        socket.set_nonblocking(true)?;
        if let Some(on) = self.reuseaddr {
            socket.set_reuse_address(on)?;
        }
        #[cfg(not(windows))]
        if let Some(on) = self.reuseport {
            socket.set_reuse_port(on)?;
        }

        socket.bind(&SockAddr::from(self.laddr))?;
        socket.listen(self.backlog)?;
        let tcp_listener = TcpListener::from_std(socket.into())?;
        let local_addr = tcp_listener.local_addr()?;
        log::info!("Pulsar Proxy Listening on {} {}", self.name, local_addr);
        Ok(Listener { cfg: Arc::new(self), local_addr, tcp_listener })
    }
}

pub struct Listener {
    pub cfg: Arc<Builder>,
    local_addr: SocketAddr,
    tcp_listener: TcpListener,
}

impl Listener {
    /// Bound address, with the real port when `laddr` asked for port 0
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn accept(&self) -> Result<Acceptor<TcpStream>> {
        let (socket, remote_addr) = self.tcp_listener.accept().await?;
        socket.set_nodelay(self.cfg.nodelay)?;
        Ok(Acceptor { socket, remote_addr, cfg: self.cfg.clone() })
    }
}

pub struct Acceptor<S> {
    pub(crate) socket: S,
    pub remote_addr: SocketAddr,
    pub cfg: Arc<Builder>,
}

impl Acceptor<TcpStream> {
    #[inline]
    pub fn tcp(self) -> Result<PulsarStream<TcpStream>> {
        Ok(PulsarStream::new(self.socket, self.remote_addr, self.cfg))
    }
}
