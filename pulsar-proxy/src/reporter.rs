use std::fmt;
use std::net::SocketAddr;

/// Sink for transport level failures
///
/// Reported only, nothing here feeds back into routing or the registry.
pub trait ErrorReporter: Send + Sync {
    /// Accepting a connection failed, `remote` is unknown when the listener itself failed
    fn accept_error(&self, remote: Option<SocketAddr>, err: &dyn fmt::Display);

    /// Reading or decoding from the client failed
    fn read_error(&self, remote: SocketAddr, err: &dyn fmt::Display);

    /// Writing to the client or the broker failed
    fn write_error(&self, remote: SocketAddr, err: &dyn fmt::Display);

    /// Handling a decoded command failed
    fn react_error(&self, remote: SocketAddr, err: &dyn fmt::Display);
}

#[derive(Default, Debug, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn accept_error(&self, remote: Option<SocketAddr>, err: &dyn fmt::Display) {
        match remote {
            Some(remote) => log::error!("Accept {remote} connection error {err}"),
            None => log::error!("Accept - connection error {err}"),
        }
    }

    fn read_error(&self, remote: SocketAddr, err: &dyn fmt::Display) {
        log::error!("Read {remote} connection error {err}");
    }

    fn write_error(&self, remote: SocketAddr, err: &dyn fmt::Display) {
        log::error!("Write {remote} connection error {err}");
    }

    fn react_error(&self, remote: SocketAddr, err: &dyn fmt::Display) {
        log::error!("React {remote} connection error {err}");
    }
}
