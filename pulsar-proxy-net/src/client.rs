use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use pulsar_proxy_codec::proto::{BaseCommand, Type};
use pulsar_proxy_codec::{max_frame_size, Frame, PulsarCodec, DEFAULT_MAX_MESSAGE_SIZE};

use crate::error::NetError;
use crate::stream::{close, send};
use crate::Result;

type FramedSink = SplitSink<Framed<TcpStream, PulsarCodec>, Frame>;
type FramedStream = SplitStream<Framed<TcpStream, PulsarCodec>>;
type Responder = oneshot::Sender<Result<Frame>>;
type Pending = Arc<Mutex<VecDeque<Responder>>>;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    ///Maximum allowed frame length in both directions, 0 means unlimited
    pub max_frame_size: usize,
    ///Capacity of the outgoing frame queue
    pub send_queue_size: usize,
    ///Maximum number of requests waiting for a reply
    pub pending_queue_size: usize,
    ///Connect timeout, zero means no timeout
    pub connect_timeout: Duration,
    ///Send timeout, zero means no timeout
    pub send_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".into(),
            port: 6650,
            max_frame_size: max_frame_size(DEFAULT_MAX_MESSAGE_SIZE),
            send_queue_size: 1024,
            pending_queue_size: 1024,
            connect_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
        }
    }
}

enum Command {
    Request(Frame, Responder),
    Send(Frame),
    Close,
}

/// Outbound connection to one broker
///
/// A writer task drains the bounded send queue, a reader task matches replies
/// to outstanding requests in FIFO order. Broker PINGs are answered here; every
/// other frame that is not a reply goes to the event channel.
pub struct Client {
    peer_addr: SocketAddr,
    tx: mpsc::Sender<Command>,
    events: Mutex<Option<mpsc::Receiver<Frame>>>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Client {
    pub async fn connect(cfg: ClientConfig) -> Result<Client> {
        let cfg = Arc::new(cfg);
        let connect = TcpStream::connect((cfg.host.as_str(), cfg.port));
        //zero means no timeout
        let socket = if cfg.connect_timeout.is_zero() {
            connect.await?
        } else {
            match tokio::time::timeout(cfg.connect_timeout, connect).await {
                Ok(res) => res?,
                Err(_) => return Err(NetError::ConnectTimeout(format!("{}:{}", cfg.host, cfg.port)).into()),
            }
        };
        socket.set_nodelay(true)?;
        let peer_addr = socket.peer_addr()?;

        let (sink, stream) = Framed::new(socket, PulsarCodec::new(cfg.max_frame_size)).split();
        let (tx, rx) = mpsc::channel(cfg.send_queue_size.max(1));
        let (events_tx, events_rx) = mpsc::channel(cfg.send_queue_size.max(1));
        let pending: Pending = Arc::new(Mutex::new(VecDeque::new()));

        let writer = tokio::spawn(write_loop(sink, rx, pending.clone(), cfg.clone(), peer_addr));
        let reader = tokio::spawn(read_loop(stream, tx.clone(), events_tx, pending, peer_addr));
        log::debug!("connected to broker {peer_addr}");

        Ok(Client { peer_addr, tx, events: Mutex::new(Some(events_rx)), writer, reader })
    }

    /// Sends `frame` and waits for the next reply from the broker
    pub async fn request(&self, frame: Frame) -> Result<Frame> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(Command::Request(frame, reply_tx)).await.map_err(|_| NetError::Disconnected)?;
        reply_rx.await.map_err(|_| NetError::Disconnected)?
    }

    /// Queues `frame` without waiting for a reply
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.tx.send(Command::Send(frame)).await.map_err(|_| NetError::Disconnected)?;
        Ok(())
    }

    /// Frames pushed by the broker that answer no request, can be taken once
    #[inline]
    pub fn take_events(&self) -> Option<mpsc::Receiver<Frame>> {
        self.events.lock().take()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn close(&self) {
        if self.tx.send(Command::Close).await.is_err() {
            log::debug!("broker connection {} already closed", self.peer_addr);
        }
        self.reader.abort();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

async fn write_loop(
    mut sink: FramedSink,
    mut rx: mpsc::Receiver<Command>,
    pending: Pending,
    cfg: Arc<ClientConfig>,
    peer_addr: SocketAddr,
) {
    while let Some(cmd) = rx.recv().await {
        let frame = match cmd {
            Command::Request(frame, reply) => {
                let mut waiters = pending.lock();
                if waiters.len() >= cfg.pending_queue_size {
                    drop(waiters);
                    let _ = reply.send(Err(NetError::PendingQueueFull(cfg.pending_queue_size).into()));
                    continue;
                }
                waiters.push_back(reply);
                frame
            }
            Command::Send(frame) => frame,
            Command::Close => {
                if let Err(e) = close(&mut sink, cfg.send_timeout).await {
                    log::debug!("close broker connection {peer_addr} error, {e}");
                }
                break;
            }
        };
        if let Err(e) = send(&mut sink, frame, cfg.send_timeout).await {
            log::warn!("write to broker {peer_addr} error, {e}");
            break;
        }
    }
    fail_pending(&pending);
}

async fn read_loop(
    mut stream: FramedStream,
    tx: mpsc::Sender<Command>,
    events: mpsc::Sender<Frame>,
    pending: Pending,
    peer_addr: SocketAddr,
) {
    while let Some(item) = stream.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("read from broker {peer_addr} error, {e}");
                break;
            }
        };

        if matches!(frame.command_type(), Ok(Type::Ping)) {
            let pong = Frame::from_command(&BaseCommand::new_pong());
            if tx.send(Command::Send(pong)).await.is_err() {
                break;
            }
            continue;
        }

        let waiter = pending.lock().pop_front();
        match waiter {
            Some(reply) => {
                let _ = reply.send(Ok(frame));
            }
            None => {
                if events.send(frame).await.is_err() {
                    log::debug!("no event receiver for broker {peer_addr}, frame dropped");
                }
            }
        }
    }
    fail_pending(&pending);
    log::debug!("broker connection {peer_addr} closed");
}

fn fail_pending(pending: &Pending) {
    for reply in pending.lock().drain(..) {
        let _ = reply.send(Err(NetError::Disconnected.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use pulsar_proxy_codec::proto::{CommandConnect, CommandConnected};
    use tokio::net::TcpListener;

    fn connected() -> BaseCommand {
        BaseCommand::from_connected(CommandConnected {
            server_version: "Pulsar Server".into(),
            protocol_version: Some(19),
            max_message_size: None,
        })
    }

    fn connect() -> Frame {
        Frame::from_command(&BaseCommand::from_connect(CommandConnect {
            client_version: "test".into(),
            ..Default::default()
        }))
    }

    /// Answers CONNECT with CONNECTED, then pings and pushes one SUCCESS-less frame
    async fn fake_broker() -> SocketAddr {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = l.local_addr().unwrap();
        tokio::spawn(async move {
            let (s, _) = l.accept().await.unwrap();
            let mut io = Framed::new(s, PulsarCodec::default());
            while let Some(Ok(frame)) = io.next().await {
                match frame.command_type() {
                    Ok(Type::Connect) => {
                        io.send(Frame::from_command(&connected())).await.unwrap();
                        io.send(Frame::from_command(&BaseCommand::new_ping())).await.unwrap();
                    }
                    Ok(Type::Pong) => {
                        io.send(Frame::from_command(&BaseCommand::new_pong())).await.unwrap();
                    }
                    _ => {}
                }
            }
        });
        addr
    }

    fn cfg(addr: SocketAddr) -> ClientConfig {
        ClientConfig { host: addr.ip().to_string(), port: addr.port(), ..Default::default() }
    }

    #[tokio::test]
    async fn test_request_and_events() {
        let addr = fake_broker().await;
        let client = Client::connect(cfg(addr)).await.unwrap();
        let mut events = client.take_events().unwrap();
        assert!(client.take_events().is_none());

        let reply = client.request(connect()).await.unwrap();
        assert_eq!(reply.command().unwrap(), connected());

        // the broker's ping is answered by the client, the broker echoes a pong back
        let ev = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
        assert_eq!(ev.command_type().unwrap(), Type::Pong);

        client.close().await;
        assert!(tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_connect_timeout_waits() {
        let addr = fake_broker().await;
        let client = Client::connect(ClientConfig { connect_timeout: Duration::ZERO, ..cfg(addr) }).await.unwrap();
        let reply = client.request(connect()).await.unwrap();
        assert_eq!(reply.command().unwrap(), connected());
        client.close().await;
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = l.local_addr().unwrap();
        drop(l);
        assert!(Client::connect(cfg(addr)).await.is_err());
    }

    #[tokio::test]
    async fn test_pending_queue_full() {
        let addr = fake_broker().await;
        let client = Client::connect(ClientConfig { pending_queue_size: 0, ..cfg(addr) }).await.unwrap();
        let err = client.request(connect()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<NetError>(), Some(NetError::PendingQueueFull(0))));
    }
}
