//! Host framework facade for the spectrometer.
//!
//! [`OpusController`] exposes the lifecycle hooks an instrument-control
//! framework calls on a counter or 1D detector: `PreStartOne`, `StartOne`,
//! `StateOne`, `ReadOne`, `RefOne`, `LoadOne`, `AbortOne` and the named
//! extra parameters. The spectrometer is a single channel, axis 1.

use std::time::Duration;

use crate::command::{self, MeasureCommand};
use crate::config::{ControllerConfig, TransportConfig};
use crate::device::{DeviceMonitor, DeviceState};
use crate::macro_runner::{MacroError, MacroRunner};
use crate::parameters::{
    AcquisitionMode, AcquisitionParameters, ParameterError, ParameterName, ParameterStore,
    ParameterValue,
};
use crate::protocol;
use crate::proxy::{ProxyConnector, ProxyTransport};
use crate::socket_terminal::LineTransport;
use crate::transport::{Transport, TransportError};

/// The only axis of the spectrometer.
pub const AXIS: usize = 1;

/// Read-only numeric source for the sample temperature.
pub trait TemperatureSource {
    fn temperature(&mut self) -> Result<f64, TransportError>;
}

impl<F> TemperatureSource for F
where
    F: FnMut() -> Result<f64, TransportError>,
{
    fn temperature(&mut self) -> Result<f64, TransportError> {
        self()
    }
}

/// Creates temperature sources from device names.
pub trait TemperatureConnector {
    fn connect(&self, device: &str) -> Result<Box<dyn TemperatureSource>, TransportError>;
}

impl<F> TemperatureConnector for F
where
    F: Fn(&str) -> Result<Box<dyn TemperatureSource>, TransportError>,
{
    fn connect(&self, device: &str) -> Result<Box<dyn TemperatureSource>, TransportError> {
        self(device)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Invalid axis {0}, the spectrometer only has axis {AXIS}")]
    InvalidAxis(usize),

    #[error("Macro error: {0}")]
    Macro(#[from] MacroError),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

fn connect_temperature(
    device: &str,
    thermometer: Option<&dyn TemperatureConnector>,
) -> Option<Box<dyn TemperatureSource>> {
    let Some(thermometer) = thermometer else {
        log::warn!("No way to reach temperature device {device}, file names get no temperature suffix");
        return None;
    };
    match thermometer.connect(device) {
        Ok(source) => Some(source),
        Err(e) => {
            log::warn!("Cannot connect to temperature device {device}: {e}");
            None
        }
    }
}

fn check_axis(axis: usize) -> Result<(), ControllerError> {
    if axis == AXIS {
        Ok(())
    } else {
        Err(ControllerError::InvalidAxis(axis))
    }
}

pub struct OpusController {
    runner: MacroRunner,
    parameters: ParameterStore,
    monitor: DeviceMonitor,
    temperature: Option<Box<dyn TemperatureSource>>,
    command: Option<MeasureCommand>,
    integration_time: Option<f64>,
}

impl OpusController {
    pub fn new(transport: Box<dyn Transport>, parameters: AcquisitionParameters) -> Self {
        Self {
            runner: MacroRunner::new(transport),
            parameters: ParameterStore::new(parameters),
            monitor: DeviceMonitor::new(),
            temperature: None,
            command: None,
            integration_time: None,
        }
    }

    /// Build the controller described by `config`.
    ///
    /// A proxy transport needs `connector` to create the device proxy; a
    /// proxy that cannot be created leaves the controller in `Fault`.
    ///
    /// With a `[temperature]` section, `thermometer` creates the source for
    /// the file name suffix from its device name. Without a connector, or when
    /// it fails, acquisitions run without the suffix.
    pub fn from_config(
        config: &ControllerConfig,
        connector: Option<Box<dyn ProxyConnector>>,
        thermometer: Option<&dyn TemperatureConnector>,
    ) -> Result<Self, ControllerError> {
        let transport: Box<dyn Transport> = match &config.transport {
            TransportConfig::Socket {
                host,
                port,
                timeout_ms,
            } => Box::new(LineTransport::new(
                host,
                *port,
                Duration::from_millis(*timeout_ms),
            )),
            TransportConfig::Proxy { device } => {
                let connector = connector.ok_or_else(|| TransportError::NoProxy(device.clone()))?;
                Box::new(ProxyTransport::connect(device, connector))
            }
        };
        let mut controller = Self::new(transport, config.acquisition.clone())
            .with_poll_limit(config.polling.max_polls);
        if let Some(temperature) = &config.temperature {
            controller.temperature = connect_temperature(&temperature.device, thermometer);
        }
        Ok(controller)
    }

    pub fn with_temperature(mut self, source: Box<dyn TemperatureSource>) -> Self {
        self.temperature = Some(source);
        self
    }

    pub fn with_poll_limit(mut self, max_polls: Option<u32>) -> Self {
        self.runner = self.runner.with_poll_limit(max_polls);
        self
    }

    pub fn state(&self) -> DeviceState {
        self.runner.state()
    }

    pub fn parameters(&self) -> &AcquisitionParameters {
        self.parameters.parameters()
    }

    /// Command rendered by the last `pre_start_one`.
    pub fn command(&self) -> Option<&MeasureCommand> {
        self.command.as_ref()
    }

    /// Integration time set by the last `load_one`.
    pub fn integration_time(&self) -> Option<f64> {
        self.integration_time
    }

    pub fn add_device(&mut self, axis: usize) -> Result<(), ControllerError> {
        check_axis(axis)?;
        log::debug!("AddDevice {axis}");
        Ok(())
    }

    /// Render the measurement command and make sure the instrument is reachable.
    ///
    /// Returns whether the transport is connected afterwards.
    pub fn pre_start_one(&mut self, axis: usize) -> Result<bool, ControllerError> {
        check_axis(axis)?;
        let temperature = self.read_temperature();
        let command = MeasureCommand::build(self.parameters.parameters(), temperature);
        log::debug!("PreStartOne... {}", command.as_str());
        self.parameters.record_command(command.as_str());
        self.command = Some(command);
        Ok(self.runner.ensure_connected())
    }

    fn read_temperature(&mut self) -> Option<f64> {
        let parameters = self.parameters.parameters();
        if !parameters.temperature_suffix || parameters.file_name.is_empty() {
            return None;
        }
        let Some(source) = self.temperature.as_mut() else {
            log::warn!("No temperature source, file name gets no temperature suffix");
            return None;
        };
        match source.temperature() {
            Ok(temperature) => Some(temperature),
            Err(e) => {
                log::warn!("Cannot read the temperature: {e}");
                None
            }
        }
    }

    pub fn start_one(&mut self, axis: usize) -> Result<(), ControllerError> {
        check_axis(axis)?;
        let command = self.launch_command();
        log::debug!("StartOne {command}");
        self.monitor.reset();
        self.runner.start(&command)?;
        Ok(())
    }

    fn file_stem(&self) -> &str {
        self.command
            .as_ref()
            .map_or(self.parameters.parameters().file_name.as_str(), MeasureCommand::file_stem)
    }

    fn launch_command(&self) -> String {
        let parameters = self.parameters.parameters();
        if parameters.mode == AcquisitionMode::Visible {
            return command::snapshot_command(&parameters.output_path, self.file_stem());
        }
        if !parameters.macro_name.is_empty() {
            return protocol::run_macro(&parameters.macro_name);
        }
        match &self.command {
            Some(command) => command.as_str().to_string(),
            None => MeasureCommand::build(parameters, None).into_string(),
        }
    }

    pub fn state_one(&mut self, axis: usize) -> Result<(DeviceState, String), ControllerError> {
        check_axis(axis)?;
        let read_peak = self.parameters.parameters().read_peak;
        Ok(self.monitor.state_one(&mut self.runner, read_peak))
    }

    /// Peak value of the last acquisition, when peak reading is enabled.
    pub fn read_one(&mut self, axis: usize) -> Result<Option<f64>, ControllerError> {
        check_axis(axis)?;
        let value = if self.parameters.parameters().read_peak {
            self.monitor.peak()
        } else {
            None
        };
        log::debug!("ReadOne... {value:?}");
        Ok(value)
    }

    /// URI of the file written by the last acquisition.
    pub fn ref_one(&mut self, axis: usize) -> Result<String, ControllerError> {
        check_axis(axis)?;
        let uri = command::reference_uri(&self.parameters.parameters().output_path, self.file_stem());
        log::debug!("RefOne... {uri}");
        Ok(uri)
    }

    pub fn load_one(&mut self, axis: usize, integration_time: f64) -> Result<(), ControllerError> {
        check_axis(axis)?;
        self.integration_time = Some(integration_time);
        Ok(())
    }

    pub fn abort_one(&mut self, axis: usize) -> Result<(), ControllerError> {
        check_axis(axis)?;
        log::debug!("AbortOne");
        self.runner.abort();
        self.monitor.reset();
        Ok(())
    }

    pub fn get_axis_extra_par(
        &self,
        axis: usize,
        name: &str,
    ) -> Result<ParameterValue, ControllerError> {
        check_axis(axis)?;
        let name: ParameterName = name.parse()?;
        Ok(self.parameters.get(name))
    }

    /// Write a named parameter and issue the instrument commands it requires.
    ///
    /// Failing side-effect commands are logged; the parameter keeps its new
    /// value and the device state is not touched.
    pub fn set_axis_extra_par(
        &mut self,
        axis: usize,
        name: &str,
        value: ParameterValue,
    ) -> Result<(), ControllerError> {
        check_axis(axis)?;
        let name: ParameterName = name.parse()?;
        log::debug!("SetAxisExtraPar {name} = {value}");
        for command in self.parameters.set(name, value)? {
            if let Err(e) = self.runner.execute(&command) {
                log::warn!("Cannot apply {name} with '{command}': {e}");
            }
        }
        Ok(())
    }

    /// Recreate the connection to the instrument.
    pub fn reconnect(&mut self) -> Result<(), ControllerError> {
        self.monitor.reset();
        self.runner.reconnect()?;
        Ok(())
    }
}
