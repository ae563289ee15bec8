use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use pulsar_proxy_codec::error::EncodeError;
use pulsar_proxy_codec::proto::{BaseCommand, CommandConnect, Type};
use pulsar_proxy_codec::{Frame, PulsarCodec};

use crate::error::NetError;
use crate::{Builder, Error, Result};

/// Framed inbound connection from a Pulsar client
pub struct PulsarStream<Io> {
    pub io: Framed<Io, PulsarCodec>,
    pub remote_addr: SocketAddr,
    pub cfg: Arc<Builder>,
}

impl<Io> PulsarStream<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: Io, remote_addr: SocketAddr, cfg: Arc<Builder>) -> Self {
        let codec = PulsarCodec::new(cfg.max_frame_size);
        PulsarStream { io: Framed::new(io, codec), remote_addr, cfg }
    }

    #[inline]
    pub async fn send(&mut self, frame: Frame) -> Result<()> {
        send(&mut self.io, frame, self.cfg.send_timeout).await
    }

    #[inline]
    pub async fn send_command(&mut self, cmd: &BaseCommand) -> Result<()> {
        self.send(Frame::from_command(cmd)).await
    }

    #[inline]
    pub async fn close(&mut self) -> Result<()> {
        close(&mut self.io, self.cfg.send_timeout).await
    }

    #[inline]
    pub async fn recv(&mut self, tm: Duration) -> Result<Option<Frame>> {
        match tokio::time::timeout(tm, self.next()).await {
            Ok(Some(Ok(frame))) => Ok(Some(frame)),
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => Ok(None),
            Err(_) => Err(NetError::ReadTimeout.into()),
        }
    }

    /// Waits for the handshake, the first frame must be a CONNECT command
    ///
    /// Returns the raw frame (to be forwarded verbatim) together with the
    /// decoded command.
    #[inline]
    pub async fn recv_connect(&mut self, tm: Duration) -> Result<(Frame, CommandConnect)> {
        let frame = match self.recv(tm).await? {
            Some(frame) => frame,
            None => return Err(NetError::Disconnected.into()),
        };
        let cmd = frame.command().map_err(NetError::Decode)?;
        match (cmd.command_type(), cmd.connect) {
            (Ok(Type::Connect), Some(connect)) => Ok((frame, connect)),
            _ => Err(NetError::InvalidProtocol("CONNECT").into()),
        }
    }
}

impl<Io> futures::Stream for PulsarStream<Io>
where
    Io: AsyncRead + Unpin,
{
    type Item = Result<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let next = Pin::new(&mut self.io).poll_next(cx);
        Poll::Ready(match futures::ready!(next) {
            Some(Ok(frame)) => Some(Ok(frame)),
            Some(Err(e)) => Some(Err(Error::from(NetError::Decode(e)))),
            None => None,
        })
    }
}

#[inline]
pub(crate) async fn send<S>(io: &mut S, frame: Frame, send_timeout: Duration) -> Result<()>
where
    S: Sink<Frame, Error = EncodeError> + Unpin,
{
    if send_timeout.is_zero() {
        io.send(frame).await.map_err(NetError::Encode)?;
        Ok(())
    } else {
        match tokio::time::timeout(send_timeout, io.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(NetError::Encode(e)),
            Err(_) => Err(NetError::WriteTimeout),
        }?;
        Ok(())
    }
}

#[inline]
pub(crate) async fn close<S>(io: &mut S, send_timeout: Duration) -> Result<()>
where
    S: Sink<Frame, Error = EncodeError> + Unpin,
{
    if send_timeout.is_zero() {
        io.close().await.map_err(NetError::Encode)?;
        Ok(())
    } else {
        match tokio::time::timeout(send_timeout, io.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(NetError::Encode(e)),
            Err(_) => Err(NetError::CloseTimeout),
        }?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsar_proxy_codec::proto::{BaseCommand, CommandConnect};
    use tokio::io::duplex;

    fn cfg() -> Arc<Builder> {
        Arc::new(Builder::new().handshake_timeout(Duration::from_millis(200)))
    }

    #[tokio::test]
    async fn test_recv_connect() {
        let (a, b) = duplex(4096);
        let addr: SocketAddr = "10.0.0.5:54321".parse().unwrap();
        let mut client = PulsarStream::new(a, addr, cfg());
        let mut server = PulsarStream::new(b, addr, cfg());

        let connect = CommandConnect {
            client_version: "test".into(),
            proxy_to_broker_url: Some("broker1:6650".into()),
            ..Default::default()
        };
        client.send_command(&BaseCommand::from_connect(connect.clone())).await.unwrap();

        let (frame, got) = server.recv_connect(Duration::from_millis(200)).await.unwrap();
        assert_eq!(got, connect);
        assert_eq!(frame, Frame::from_command(&BaseCommand::from_connect(connect)));
    }

    #[tokio::test]
    async fn test_recv_connect_rejects_other_commands() {
        let (a, b) = duplex(4096);
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let mut client = PulsarStream::new(a, addr, cfg());
        let mut server = PulsarStream::new(b, addr, cfg());

        client.send_command(&BaseCommand::new_ping()).await.unwrap();
        let err = server.recv_connect(Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<NetError>(), Some(NetError::InvalidProtocol(_))));
    }

    #[tokio::test]
    async fn test_recv_timeout() {
        let (_a, b) = duplex(4096);
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let mut server = PulsarStream::new(b, addr, cfg());
        let err = server.recv(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<NetError>(), Some(NetError::ReadTimeout)));
    }
}
