use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use pulsar_proxy_codec::proto::{BaseCommand, CommandConnected};
use pulsar_proxy_codec::Frame;
use pulsar_proxy_net::NetError;

use crate::session::{BrokerConnector, BrokerTransport};
use crate::types::{BrokerTarget, SessionConfig};
use crate::Result;

#[derive(Clone, Debug)]
pub enum Reply {
    Frame(Frame),
    Fail,
    Hang,
}

pub fn connected_frame() -> Frame {
    Frame::from_command(&BaseCommand::from_connected(CommandConnected {
        server_version: "Pulsar Server".into(),
        protocol_version: Some(19),
        max_message_size: Some(5 * 1024 * 1024),
    }))
}

/// In-memory broker connector counting dials and closes
pub struct MockConnector {
    pub dials: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub unreachable: AtomicBool,
    pub delay: Duration,
    pub reply: Mutex<Reply>,
    pub targets: Mutex<Vec<BrokerTarget>>,
    /// Frames handed to any transport of this connector, in order
    pub forwarded: Arc<Mutex<Vec<Frame>>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(MockConnector {
            dials: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            unreachable: AtomicBool::new(false),
            delay,
            reply: Mutex::new(Reply::Frame(connected_frame())),
            targets: Mutex::new(Vec::new()),
            forwarded: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn set_unreachable(&self, b: bool) {
        self.unreachable.store(b, Ordering::SeqCst)
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock() = reply;
    }
}

#[async_trait]
impl BrokerConnector for MockConnector {
    async fn connect(&self, target: &BrokerTarget, _cfg: &SessionConfig) -> Result<Box<dyn BrokerTransport>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().push(target.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("connection refused"));
        }
        let (events_tx, events_rx) = mpsc::channel(8);
        Ok(Box::new(MockTransport {
            reply: self.reply.lock().clone(),
            closes: self.closes.clone(),
            closed: AtomicBool::new(false),
            forwarded: self.forwarded.clone(),
            _events_tx: events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }))
    }
}

pub struct MockTransport {
    reply: Reply,
    closes: Arc<AtomicUsize>,
    closed: AtomicBool,
    forwarded: Arc<Mutex<Vec<Frame>>>,
    _events_tx: mpsc::Sender<Frame>,
    events_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
}

#[async_trait]
impl BrokerTransport for MockTransport {
    async fn request(&self, frame: Frame) -> Result<Frame> {
        self.forwarded.lock().push(frame);
        match &self.reply {
            Reply::Frame(f) => Ok(f.clone()),
            Reply::Fail => Err(NetError::Disconnected.into()),
            Reply::Hang => futures::future::pending().await,
        }
    }

    async fn send(&self, frame: Frame) -> Result<()> {
        self.forwarded.lock().push(frame);
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<Frame>> {
        self.events_rx.lock().take()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
