use std::time::Duration;

use crate::device::DeviceState;

/// How a transport reports the progress of a running measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTracking {
    /// The instrument answers `RUN_MACRO` with an id that is probed with
    /// `MACRO_RESULTS <id>`.
    MacroId,
    /// The remote device tracks its own job; its device state is the progress.
    Native,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Not connected to {address}")]
    NotConnected { address: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for a response to '{command}' (timeout was {timeout:?})")]
    Timeout { command: String, timeout: Duration },

    #[error("Connection closed by the instrument")]
    ConnectionClosed,

    #[error("Could not resolve instrument address {0}")]
    Unresolvable(String),

    #[error("Remote call {call} failed: {reason}")]
    Remote { call: &'static str, reason: String },

    #[error("Device proxy {0} is not available")]
    NoProxy(String),

    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),
}

impl TransportError {
    pub fn remote(call: &'static str, reason: impl Into<String>) -> Self {
        Self::Remote {
            call,
            reason: reason.into(),
        }
    }
}

/// The channel used to exchange commands and responses with the instrument.
///
/// Implemented by the line protocol socket ([`crate::LineTransport`]) and by
/// the device-proxy wrapper ([`crate::ProxyTransport`]). A controller picks one
/// at construction time and keeps it for its whole life.
pub trait Transport {
    /// Send a command and return the instrument's reply.
    fn send_command(&mut self, command: &str) -> Result<String, TransportError>;

    /// Send a command without waiting for its outcome.
    ///
    /// Transports without a separate fire-and-forget path just drop the reply.
    fn submit(&mut self, command: &str) -> Result<(), TransportError> {
        self.send_command(command).map(|_| ())
    }

    fn current_state(&mut self) -> DeviceState;

    fn current_status(&mut self) -> String;

    /// The most recent result produced by an asynchronous command.
    fn last_output(&mut self) -> Result<String, TransportError>;

    fn is_connected(&self) -> bool;

    /// Cheap liveness check used before starting an acquisition.
    fn probe(&mut self) -> Result<(), TransportError>;

    fn reconnect(&mut self) -> Result<(), TransportError>;

    fn tracking(&self) -> JobTracking;

    /// Stop whatever job the remote side is running.
    fn stop(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("stop"))
    }
}
