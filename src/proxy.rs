use crate::device::{DeviceState, FAULT_STATUS};
use crate::transport::{JobTracking, Transport, TransportError};

/// State reported by a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    On,
    Running,
    Alarm,
    /// Any state this driver has no meaning for.
    Unknown,
}

impl ProxyState {
    pub fn to_device_state(self) -> DeviceState {
        match self {
            Self::On => DeviceState::Idle,
            Self::Running => DeviceState::Acquiring,
            Self::Alarm | Self::Unknown => DeviceState::Fault,
        }
    }
}

/// Remote procedure surface of the OPUS device server.
///
/// Implemented by whatever RPC layer hosts the driver. Calls are synchronous
/// and the connection is the RPC layer's business.
pub trait DeviceProxy {
    fn state(&mut self) -> Result<ProxyState, TransportError>;

    fn status(&mut self) -> Result<String, TransportError>;

    /// Start a command and return immediately.
    fn run_opus_cmd(&mut self, command: &str) -> Result<(), TransportError>;

    /// Run a command and return its output.
    fn run_opus_cmd_sync(&mut self, command: &str) -> Result<String, TransportError>;

    fn get_last_opus_output(&mut self) -> Result<String, TransportError>;

    fn stop_opus_macro(&mut self) -> Result<(), TransportError>;
}

/// Creates device proxies from device names.
pub trait ProxyConnector {
    fn connect(&self, device: &str) -> Result<Box<dyn DeviceProxy>, TransportError>;
}

impl<F> ProxyConnector for F
where
    F: Fn(&str) -> Result<Box<dyn DeviceProxy>, TransportError>,
{
    fn connect(&self, device: &str) -> Result<Box<dyn DeviceProxy>, TransportError> {
        self(device)
    }
}

/// Transport that drives the instrument through its device server.
pub struct ProxyTransport {
    device: String,
    proxy: Option<Box<dyn DeviceProxy>>,
    connector: Option<Box<dyn ProxyConnector>>,
}

impl ProxyTransport {
    /// Wrap an already created proxy.
    pub fn new(device: &str, proxy: Box<dyn DeviceProxy>) -> Self {
        Self {
            device: device.to_string(),
            proxy: Some(proxy),
            connector: None,
        }
    }

    /// Create the proxy through `connector`.
    ///
    /// A failure leaves the transport without proxy; it then reports
    /// [`DeviceState::Fault`] until [`Transport::reconnect`] succeeds.
    pub fn connect(device: &str, connector: Box<dyn ProxyConnector>) -> Self {
        let proxy = match connector.connect(device) {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                log::warn!("Cannot create device proxy {device}: {e}");
                None
            }
        };
        Self {
            device: device.to_string(),
            proxy,
            connector: Some(connector),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    fn proxy(&mut self) -> Result<&mut Box<dyn DeviceProxy>, TransportError> {
        self.proxy
            .as_mut()
            .ok_or_else(|| TransportError::NoProxy(self.device.clone()))
    }
}

impl Transport for ProxyTransport {
    fn send_command(&mut self, command: &str) -> Result<String, TransportError> {
        log::debug!("runOpusCMDSync {command}");
        let output = self.proxy()?.run_opus_cmd_sync(command)?;
        log::debug!("runOpusCMDSync output: {output}");
        Ok(output)
    }

    fn submit(&mut self, command: &str) -> Result<(), TransportError> {
        log::debug!("runOpusCMD {command}");
        self.proxy()?.run_opus_cmd(command)
    }

    fn current_state(&mut self) -> DeviceState {
        match self.proxy().and_then(|proxy| proxy.state()) {
            Ok(state) => state.to_device_state(),
            Err(e) => {
                log::warn!("Cannot read the state of {}: {}", self.device, e);
                DeviceState::Fault
            }
        }
    }

    fn current_status(&mut self) -> String {
        self.proxy()
            .and_then(|proxy| proxy.status())
            .unwrap_or_else(|_| FAULT_STATUS.to_string())
    }

    fn last_output(&mut self) -> Result<String, TransportError> {
        self.proxy()?.get_last_opus_output()
    }

    fn is_connected(&self) -> bool {
        self.proxy.is_some()
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        self.proxy()?.state().map(|_| ())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        if let Some(connector) = &self.connector {
            self.proxy = None;
            self.proxy = Some(connector.connect(&self.device)?);
        }
        self.probe()
    }

    fn tracking(&self) -> JobTracking {
        JobTracking::Native
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        log::debug!("stopOpusMacro");
        self.proxy()?.stop_opus_macro()
    }
}
