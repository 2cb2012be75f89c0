//! Scripted stand-ins for the instrument.
//!
//! [`LoopbackTransport`] replays queued line protocol replies and
//! [`LoopbackProxy`] plays a device server. Both are cheap to clone and every
//! clone shares the same script, so a test can keep one handle while the
//! driver owns another.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::device::{DeviceState, FAULT_STATUS};
use crate::protocol::PROBE;
use crate::proxy::{DeviceProxy, ProxyState};
use crate::transport::{JobTracking, Transport, TransportError};

const LOOPBACK_ADDRESS: &str = "loopback";

#[derive(Debug)]
struct LineScript {
    replies: VecDeque<Option<String>>,
    sent: Vec<String>,
    connected: bool,
    reconnect_succeeds: bool,
    last_output: String,
}

/// Line protocol transport answering from a queue of replies.
///
/// Every command consumes one queued reply. A queued failure, or an empty
/// queue, fails the command and drops the connection the way a real socket
/// does.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    script: Rc<RefCell<LineScript>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            script: Rc::new(RefCell::new(LineScript {
                replies: VecDeque::new(),
                sent: Vec::new(),
                connected: true,
                reconnect_succeeds: true,
                last_output: String::new(),
            })),
        }
    }

    pub fn push_response(&self, response: &str) {
        self.script
            .borrow_mut()
            .replies
            .push_back(Some(response.to_string()));
    }

    /// Make the next command fail as if the peer had dropped the link.
    pub fn push_failure(&self) {
        self.script.borrow_mut().replies.push_back(None);
    }

    pub fn set_connected(&self, connected: bool) {
        self.script.borrow_mut().connected = connected;
    }

    pub fn set_reconnect_succeeds(&self, succeeds: bool) {
        self.script.borrow_mut().reconnect_succeeds = succeeds;
    }

    /// Commands received so far, without line terminator.
    pub fn sent(&self) -> Vec<String> {
        self.script.borrow().sent.clone()
    }

    pub fn pending_replies(&self) -> usize {
        self.script.borrow().replies.len()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackTransport {
    fn send_command(&mut self, command: &str) -> Result<String, TransportError> {
        let mut script = self.script.borrow_mut();
        if !script.connected {
            return Err(TransportError::NotConnected {
                address: LOOPBACK_ADDRESS.to_string(),
            });
        }
        script.sent.push(command.to_string());
        match script.replies.pop_front() {
            Some(Some(response)) => {
                script.last_output.clone_from(&response);
                Ok(response)
            }
            Some(None) => {
                script.connected = false;
                Err(TransportError::ConnectionClosed)
            }
            None => {
                script.connected = false;
                Err(TransportError::Timeout {
                    command: command.to_string(),
                    timeout: Duration::ZERO,
                })
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
        Ok(self.script.borrow().last_output.clone())
    }

    fn is_connected(&self) -> bool {
        self.script.borrow().connected
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        self.send_command(PROBE).map(|_| ())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        let mut script = self.script.borrow_mut();
        script.connected = script.reconnect_succeeds;
        if script.connected {
            Ok(())
        } else {
            Err(TransportError::NotConnected {
                address: LOOPBACK_ADDRESS.to_string(),
            })
        }
    }

    fn tracking(&self) -> JobTracking {
        JobTracking::MacroId
    }
}

#[derive(Debug)]
struct ProxyScript {
    states: VecDeque<ProxyState>,
    state: ProxyState,
    status: String,
    sync_output: String,
    last_output: String,
    calls: Vec<String>,
    failing: bool,
}

/// Device server double.
///
/// `state()` pops queued states and keeps reporting the last one once the
/// queue runs dry.
#[derive(Debug, Clone)]
pub struct LoopbackProxy {
    script: Rc<RefCell<ProxyScript>>,
}

impl LoopbackProxy {
    pub fn new() -> Self {
        Self {
            script: Rc::new(RefCell::new(ProxyScript {
                states: VecDeque::new(),
                state: ProxyState::On,
                status: "The device is in ON state.".to_string(),
                sync_output: String::new(),
                last_output: String::new(),
                calls: Vec::new(),
                failing: false,
            })),
        }
    }

    pub fn push_state(&self, state: ProxyState) {
        self.script.borrow_mut().states.push_back(state);
    }

    pub fn set_status(&self, status: &str) {
        self.script.borrow_mut().status = status.to_string();
    }

    /// Output returned by every synchronous command.
    pub fn set_sync_output(&self, output: &str) {
        self.script.borrow_mut().sync_output = output.to_string();
    }

    pub fn set_last_output(&self, output: &str) {
        self.script.borrow_mut().last_output = output.to_string();
    }

    /// Make every remote call fail.
    pub fn set_failing(&self, failing: bool) {
        self.script.borrow_mut().failing = failing;
    }

    /// Remote calls received so far, e.g. `runOpusCMD READ_PKA`.
    pub fn calls(&self) -> Vec<String> {
        self.script.borrow().calls.clone()
    }

    fn record(&self, call: &'static str, call_log: String) -> Result<(), TransportError> {
        let mut script = self.script.borrow_mut();
        script.calls.push(call_log);
        if script.failing {
            Err(TransportError::remote(call, "device server not responding"))
        } else {
            Ok(())
        }
    }
}

impl Default for LoopbackProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProxy for LoopbackProxy {
    fn state(&mut self) -> Result<ProxyState, TransportError> {
        let mut script = self.script.borrow_mut();
        if script.failing {
            return Err(TransportError::remote("state", "device server not responding"));
        }
        if let Some(state) = script.states.pop_front() {
            script.state = state;
        }
        Ok(script.state)
    }

    fn status(&mut self) -> Result<String, TransportError> {
        let script = self.script.borrow();
        if script.failing {
            return Err(TransportError::remote("status", "device server not responding"));
        }
        Ok(script.status.clone())
    }

    fn run_opus_cmd(&mut self, command: &str) -> Result<(), TransportError> {
        self.record("runOpusCMD", format!("runOpusCMD {command}"))
    }

    fn run_opus_cmd_sync(&mut self, command: &str) -> Result<String, TransportError> {
        self.record("runOpusCMDSync", format!("runOpusCMDSync {command}"))?;
        Ok(self.script.borrow().sync_output.clone())
    }

    fn get_last_opus_output(&mut self) -> Result<String, TransportError> {
        self.record("getLastOpusOutput", "getLastOpusOutput".to_string())?;
        Ok(self.script.borrow().last_output.clone())
    }

    fn stop_opus_macro(&mut self) -> Result<(), TransportError> {
        self.record("stopOpusMacro", "stopOpusMacro".to_string())
    }
}
