use std::fmt;

use crate::device::DeviceState;
use crate::protocol::{self, ProtocolError, MACRO_DONE, MACRO_RUNNING};
use crate::transport::{JobTracking, Transport, TransportError};

/// Identifies the measurement currently running on the instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroHandle {
    /// Id returned by `RUN_MACRO` on the line protocol.
    Macro(String),
    /// Job tracked by the device server itself.
    Job,
}

impl fmt::Display for MacroHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Macro(id) => write!(f, "macro {id}"),
            Self::Job => write!(f, "device server job"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MacroError {
    #[error("A macro is already running")]
    AlreadyRunning,

    #[error("Cannot start a macro from the {0} state, reconnect first")]
    NotReady(DeviceState),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Runs one measurement macro at a time and follows it to completion.
///
/// Nothing happens in the background: [`MacroRunner::poll`] performs exactly
/// one probe per call and the caller decides how often to call it. Without a
/// poll limit a macro that never reports completion stays `Acquiring`.
pub struct MacroRunner {
    transport: Box<dyn Transport>,
    state: DeviceState,
    handle: Option<MacroHandle>,
    polls: u32,
    max_polls: Option<u32>,
}

impl MacroRunner {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        let state = if transport.is_connected() {
            DeviceState::Idle
        } else {
            DeviceState::Fault
        };
        Self {
            transport,
            state,
            handle: None,
            polls: 0,
            max_polls: None,
        }
    }

    /// Fault a macro that is still running after `max_polls` probes.
    pub fn with_poll_limit(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn handle(&self) -> Option<&MacroHandle> {
        self.handle.as_ref()
    }

    pub fn tracking(&self) -> JobTracking {
        self.transport.tracking()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn transport(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    /// Start `command` as the new measurement.
    ///
    /// Only valid from `Idle`. A rejected or failed start moves the runner to
    /// `Fault`; starting while a macro runs leaves everything untouched.
    pub fn start(&mut self, command: &str) -> Result<(), MacroError> {
        match self.state {
            DeviceState::Idle => {}
            DeviceState::Acquiring => return Err(MacroError::AlreadyRunning),
            DeviceState::Fault => return Err(MacroError::NotReady(self.state)),
        }

        let launched = match self.tracking() {
            JobTracking::MacroId => self.launch_macro(command),
            JobTracking::Native => self
                .transport
                .submit(command)
                .map(|()| MacroHandle::Job)
                .map_err(MacroError::from),
        };

        match launched {
            Ok(handle) => {
                log::debug!("Started {handle}: {command}");
                self.handle = Some(handle);
                self.state = DeviceState::Acquiring;
                self.polls = 0;
                Ok(())
            }
            Err(e) => {
                log::warn!("Cannot start '{command}': {e}");
                self.fault();
                Err(e)
            }
        }
    }

    fn launch_macro(&mut self, command: &str) -> Result<MacroHandle, MacroError> {
        let response = self.transport.send_command(command)?;
        let id = protocol::parse_reply(&response)?;
        Ok(MacroHandle::Macro(id.to_string()))
    }

    /// Probe the running macro once and return the resulting state.
    ///
    /// Outside `Acquiring` this is a no-op returning the current state.
    pub fn poll(&mut self) -> DeviceState {
        if self.state != DeviceState::Acquiring {
            return self.state;
        }

        let probed = match self.tracking() {
            JobTracking::MacroId => self.probe_macro(),
            JobTracking::Native => Ok(self.transport.current_state()),
        };

        match probed {
            Ok(DeviceState::Idle) => {
                log::debug!("Macro finished after {} polls", self.polls.saturating_add(1));
                self.handle = None;
                self.state = DeviceState::Idle;
            }
            Ok(DeviceState::Acquiring) => {
                self.polls = self.polls.saturating_add(1);
                if let Some(max_polls) = self.max_polls {
                    if self.polls >= max_polls {
                        log::warn!("Macro still running after {max_polls} polls, giving up");
                        self.fault();
                    }
                }
            }
            Ok(DeviceState::Fault) => {
                log::warn!("Instrument reports a fault while running the macro");
                self.fault();
            }
            Err(e) => {
                log::warn!("Error reading macro status: {e}");
                self.fault();
            }
        }
        self.state
    }

    fn probe_macro(&mut self) -> Result<DeviceState, MacroError> {
        let Some(MacroHandle::Macro(id)) = &self.handle else {
            return Ok(DeviceState::Fault);
        };
        let command = protocol::macro_results(id);
        let response = self.transport.send_command(&command)?;
        match protocol::parse_macro_status(&response)? {
            MACRO_DONE => Ok(DeviceState::Idle),
            MACRO_RUNNING => Ok(DeviceState::Acquiring),
            code => Err(ProtocolError::UnknownStatus(code.to_string()).into()),
        }
    }

    /// Stop the running macro and return to `Idle`.
    ///
    /// The stop request is best effort; local state is reset whatever the
    /// instrument answers.
    pub fn abort(&mut self) {
        if self.state == DeviceState::Acquiring {
            let stopped = match &self.handle {
                Some(MacroHandle::Macro(id)) => {
                    let command = protocol::kill_macro(id);
                    self.transport.send_command(&command).map(|_| ())
                }
                Some(MacroHandle::Job) => self.transport.stop(),
                None => Ok(()),
            };
            if let Err(e) = stopped {
                log::warn!("Stop request failed: {e}");
            }
        }
        self.handle = None;
        self.state = DeviceState::Idle;
    }

    /// Recreate the transport connection and clear any macro.
    pub fn reconnect(&mut self) -> Result<(), TransportError> {
        self.handle = None;
        match self.transport.reconnect() {
            Ok(()) => {
                self.state = DeviceState::Idle;
                Ok(())
            }
            Err(e) => {
                log::warn!("Reconnect failed: {e}");
                self.state = DeviceState::Fault;
                Err(e)
            }
        }
    }

    /// Make sure the transport is usable before a new acquisition.
    ///
    /// Reconnects when in `Fault`, when the transport is down, or when the
    /// liveness probe fails. A running macro is left alone.
    pub fn ensure_connected(&mut self) -> bool {
        if self.state == DeviceState::Acquiring {
            return self.transport.is_connected();
        }
        let alive = self.state != DeviceState::Fault
            && self.transport.is_connected()
            && self.transport.probe().is_ok();
        if !alive {
            // The error is logged by reconnect
            let _ = self.reconnect();
        }
        self.transport.is_connected()
    }

    /// Run a command synchronously outside the macro lifecycle.
    pub fn execute(&mut self, command: &str) -> Result<String, TransportError> {
        self.transport.send_command(command)
    }

    /// Drop any macro and report `Fault` until the next reconnect.
    pub fn fault(&mut self) {
        self.handle = None;
        self.state = DeviceState::Fault;
    }
}
