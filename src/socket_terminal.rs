use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::device::{DeviceState, FAULT_STATUS};
use crate::protocol::PROBE;
use crate::transport::{JobTracking, Transport, TransportError};

/// Port the OPUS pipe server listens on.
pub const DEFAULT_PORT: u16 = 5000;

/// Replies are read with a single bounded read of this size.
const RESPONSE_BUFFER_SIZE: usize = 4096;

/// Line protocol connection to the OPUS pipe server.
///
/// One request per line, one buffered read per reply. The socket is only ever
/// replaced by an explicit [`LineTransport::reconnect`].
#[derive(Debug)]
pub struct LineTransport {
    address: String,
    timeout: Duration,
    stream: Option<TcpStream>,
    last_response: String,
}

impl LineTransport {
    /// Create a transport and try to connect right away.
    ///
    /// A failed connection is not an error here: the transport simply starts
    /// out disconnected and reports [`DeviceState::Fault`].
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        let mut transport = Self::disconnected(host, port, timeout);
        transport.connect();
        transport
    }

    /// Create a transport without opening the socket.
    pub fn disconnected(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            address: format!("{host}:{port}"),
            timeout,
            stream: None,
            last_response: String::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Open the connection, returning whether it succeeded.
    pub fn connect(&mut self) -> bool {
        match self.try_connect() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Cannot connect to the OPUS server at {}: {}", self.address, e);
                false
            }
        }
    }

    fn try_connect(&mut self) -> Result<(), TransportError> {
        self.stream = None;
        let socket_address = self
            .address
            .to_socket_addrs()
            .map_err(|_| TransportError::Unresolvable(self.address.clone()))?
            .next()
            .ok_or_else(|| TransportError::Unresolvable(self.address.clone()))?;

        let stream = TcpStream::connect_timeout(&socket_address, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;

        log::debug!("Connected to the OPUS server at {}", self.address);
        self.stream = Some(stream);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            // The peer may already be gone
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn exchange(&mut self, command: &str) -> Result<String, TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected {
                address: self.address.clone(),
            })?;

        let command_with_newline = format!("{command}\n");
        stream.write_all(command_with_newline.as_bytes())?;

        let mut buffer = [0u8; RESPONSE_BUFFER_SIZE];
        let read = match stream.read(&mut buffer) {
            Ok(0) => return Err(TransportError::ConnectionClosed),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(TransportError::Timeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                });
            }
            Err(e) => return Err(e.into()),
        };

        Ok(String::from_utf8_lossy(&buffer[..read]).into_owned())
    }
}

impl Transport for LineTransport {
    fn send_command(&mut self, command: &str) -> Result<String, TransportError> {
        log::debug!("-> {command}");
        match self.exchange(command) {
            Ok(response) => {
                log::debug!("<- {}", response.trim_end());
                self.last_response.clone_from(&response);
                Ok(response)
            }
            Err(e) => {
                // A late reply would desynchronize the stream, so any failure
                // on an open socket retires it.
                if !matches!(e, TransportError::NotConnected { .. }) {
                    self.disconnect();
                }
                Err(e)
            }
        }
    }

    fn current_state(&mut self) -> DeviceState {
        if self.is_connected() {
            DeviceState::Idle
        } else {
            DeviceState::Fault
        }
    }

    fn current_status(&mut self) -> String {
        if self.is_connected() {
            "On".to_string()
        } else {
            FAULT_STATUS.to_string()
        }
    }

    fn last_output(&mut self) -> Result<String, TransportError> {
        Ok(self.last_response.clone())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        self.send_command(PROBE).map(|_| ())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        log::debug!("Reconnecting to the OPUS server at {}", self.address);
        self.disconnect();
        self.try_connect()
    }

    fn tracking(&self) -> JobTracking {
        JobTracking::MacroId
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
