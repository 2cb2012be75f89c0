//! Motorized sample stage driven through the OPUS device server.
//!
//! The stage controller sits behind the spectrometer's serial port; every
//! request is a `send_serial_cmd ...` line run synchronously on the device
//! server.

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::StageConfig;
use crate::device::FAULT_STATUS;
use crate::parameters::ParameterValue;
use crate::proxy::{DeviceProxy, ProxyConnector, ProxyState};
use crate::transport::TransportError;

pub const MAX_AXES: usize = 3;

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    On,
    Moving,
    Fault,
}

impl fmt::Display for MotorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::On => "On",
            Self::Moving => "Moving",
            Self::Fault => "Fault",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Invalid axis {0}, the stage has axes 1 to {MAX_AXES}")]
    InvalidAxis(usize),

    #[error("Axis {0} has not been added")]
    NoDevice(usize),

    #[error("Axis {0} has no axis name")]
    NoAxisName(usize),

    #[error("Unknown axis parameter {0}")]
    UnknownParameter(String),

    #[error("Axis parameter {name} expects a {expected} value, got {value}")]
    TypeMismatch {
        name: AxisParameter,
        expected: &'static str,
        value: ParameterValue,
    },

    #[error("Device server still {0:?} after {1:?}")]
    NotSettled(ProxyState, Duration),

    #[error("Unexpected reply {0:?}")]
    InvalidReply(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Motion settings of one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSettings {
    /// Name the stage controller knows the axis by (`x`, `y` or `z`).
    pub axis_name: Option<String>,
    pub step_per_unit: f64,
    pub base_rate: f64,
    pub acceleration: f64,
    pub deceleration: f64,
    pub velocity: f64,
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            axis_name: None,
            step_per_unit: 1.0,
            base_rate: 0.0,
            acceleration: 0.0,
            deceleration: 0.0,
            velocity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisParameter {
    Velocity,
    Acceleration,
    Deceleration,
    StepPerUnit,
    BaseRate,
    AxisName,
}

const AXIS_PARAMETERS: [(&str, AxisParameter); 6] = [
    ("velocity", AxisParameter::Velocity),
    ("acceleration", AxisParameter::Acceleration),
    ("deceleration", AxisParameter::Deceleration),
    ("step_per_unit", AxisParameter::StepPerUnit),
    ("base_rate", AxisParameter::BaseRate),
    ("axis_name", AxisParameter::AxisName),
];

impl AxisParameter {
    pub fn as_str(self) -> &'static str {
        AXIS_PARAMETERS
            .iter()
            .find(|(_, parameter)| *parameter == self)
            .map_or("", |(name, _)| *name)
    }
}

impl FromStr for AxisParameter {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AXIS_PARAMETERS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, parameter)| *parameter)
            .ok_or_else(|| StageError::UnknownParameter(s.to_string()))
    }
}

impl fmt::Display for AxisParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn serial_command(request: &str, axis_name: &str) -> String {
    format!("send_serial_cmd {request} {axis_name}")
}

/// Map a `?statusaxis` reply to a motor state.
///
/// `M` means moving. `E` (error), `T` (timeout) and `-` (axis not enabled)
/// are faults. Everything else (`@`, `J`, `S`, `A`, `D`) is a stopped axis.
pub fn parse_axis_status(reply: &str) -> MotorState {
    if reply.contains('M') {
        MotorState::Moving
    } else if reply.contains(['E', 'T', '-']) {
        MotorState::Fault
    } else {
        MotorState::On
    }
}

/// Up to three stage axes sharing the spectrometer's device server.
pub struct StageController {
    device: String,
    proxy: Option<Box<dyn DeviceProxy>>,
    axes: [Option<AxisSettings>; MAX_AXES],
    settle_timeout: Duration,
}

impl StageController {
    pub fn new(device: &str, proxy: Box<dyn DeviceProxy>, settle_timeout: Duration) -> Self {
        Self {
            device: device.to_string(),
            proxy: Some(proxy),
            axes: Default::default(),
            settle_timeout,
        }
    }

    /// Create the device proxy named in `config`.
    ///
    /// When that fails every axis reports `Fault`.
    pub fn connect(config: &StageConfig, connector: &dyn ProxyConnector) -> Self {
        let proxy = match connector.connect(&config.device) {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                log::warn!("Cannot create device proxy {}: {e}", config.device);
                None
            }
        };
        Self {
            device: config.device.clone(),
            proxy,
            axes: Default::default(),
            settle_timeout: config.settle_timeout(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn settings(&self, axis: usize) -> Option<&AxisSettings> {
        self.axes.get(axis.wrapping_sub(1))?.as_ref()
    }

    pub fn add_device(&mut self, axis: usize) -> Result<(), StageError> {
        log::debug!("AddDevice {axis}");
        *self.slot(axis)? = Some(AxisSettings::default());
        Ok(())
    }

    pub fn delete_device(&mut self, axis: usize) -> Result<(), StageError> {
        *self.slot(axis)? = None;
        Ok(())
    }

    fn slot(&mut self, axis: usize) -> Result<&mut Option<AxisSettings>, StageError> {
        if axis == 0 {
            return Err(StageError::InvalidAxis(axis));
        }
        self.axes
            .get_mut(axis - 1)
            .ok_or(StageError::InvalidAxis(axis))
    }

    fn axis(&mut self, axis: usize) -> Result<&mut AxisSettings, StageError> {
        self.slot(axis)?.as_mut().ok_or(StageError::NoDevice(axis))
    }

    fn axis_name(&mut self, axis: usize) -> Result<String, StageError> {
        self.axis(axis)?
            .axis_name
            .clone()
            .ok_or(StageError::NoAxisName(axis))
    }

    fn proxy(&mut self) -> Result<&mut Box<dyn DeviceProxy>, StageError> {
        self.proxy
            .as_mut()
            .ok_or_else(|| TransportError::NoProxy(self.device.clone()).into())
    }

    fn run(&mut self, command: &str) -> Result<String, StageError> {
        log::debug!("runOpusCMDSync {command}");
        let answer = self.proxy()?.run_opus_cmd_sync(command)?;
        log::debug!("runOpusCMDSync output: {answer}");
        Ok(answer)
    }

    /// Current position, or infinity when it cannot be read.
    pub fn read_one(&mut self, axis: usize) -> f64 {
        let position = self.read_position(axis).unwrap_or_else(|e| {
            log::debug!("Error in ReadOne: {e}");
            f64::INFINITY
        });
        log::debug!("ReadOne axis {axis} [{position}]");
        position
    }

    fn read_position(&mut self, axis: usize) -> Result<f64, StageError> {
        let name = self.axis_name(axis)?;
        self.wait_until_on()?;
        let answer = self.run(&serial_command("?pos", &name))?;
        let position = answer.trim().parse::<f64>();
        position.map_err(|_| StageError::InvalidReply(answer))
    }

    /// The serial port is shared with running macros; wait until it is free.
    fn wait_until_on(&mut self) -> Result<(), StageError> {
        let started = Instant::now();
        loop {
            let state = self.proxy()?.state()?;
            if state == ProxyState::On {
                return Ok(());
            }
            if started.elapsed() >= self.settle_timeout {
                return Err(StageError::NotSettled(state, self.settle_timeout));
            }
            thread::sleep(SETTLE_POLL_INTERVAL);
        }
    }

    pub fn state_one(&mut self, axis: usize) -> Result<(MotorState, String), StageError> {
        let name = self.axis_name(axis)?;
        let remote = self
            .proxy()
            .and_then(|proxy| proxy.state().map_err(StageError::from));
        let state = match remote {
            Ok(ProxyState::On) => match self.run(&serial_command("?statusaxis", &name)) {
                Ok(answer) => parse_axis_status(&answer),
                Err(e) => {
                    log::warn!("Cannot read the status of axis {name}: {e}");
                    MotorState::Fault
                }
            },
            Ok(ProxyState::Running) => MotorState::Moving,
            Ok(ProxyState::Alarm | ProxyState::Unknown) => MotorState::Fault,
            Err(e) => {
                log::warn!("Cannot read the device server state: {e}");
                MotorState::Fault
            }
        };
        let status = self
            .proxy()
            .and_then(|proxy| proxy.status().map_err(StageError::from))
            .unwrap_or_else(|_| FAULT_STATUS.to_string());
        log::debug!("StateOne... {state}, {status}");
        Ok((state, status))
    }

    pub fn start_one(&mut self, axis: usize, position: f64) -> Result<(), StageError> {
        let name = self.axis_name(axis)?;
        self.run(&format!("send_serial_cmd !go {name} {position}"))?;
        Ok(())
    }

    pub fn stop_one(&mut self, axis: usize) -> Result<(), StageError> {
        let name = self.axis_name(axis)?;
        self.run(&serial_command("?abort", &name))?;
        Ok(())
    }

    pub fn get_axis_extra_par(
        &mut self,
        axis: usize,
        name: &str,
    ) -> Result<ParameterValue, StageError> {
        let parameter: AxisParameter = name.parse()?;
        let settings = self.axis(axis)?;
        Ok(match parameter {
            AxisParameter::Velocity => (settings.velocity / settings.step_per_unit).into(),
            AxisParameter::Acceleration => settings.acceleration.into(),
            AxisParameter::Deceleration => settings.deceleration.into(),
            AxisParameter::StepPerUnit => settings.step_per_unit.into(),
            AxisParameter::BaseRate => settings.base_rate.into(),
            AxisParameter::AxisName => settings.axis_name.as_deref().unwrap_or("").into(),
        })
    }

    pub fn set_axis_extra_par(
        &mut self,
        axis: usize,
        name: &str,
        value: ParameterValue,
    ) -> Result<(), StageError> {
        let parameter: AxisParameter = name.parse()?;
        let settings = self.axis(axis)?;
        if parameter == AxisParameter::AxisName {
            return match value {
                ParameterValue::Str(axis_name) => {
                    settings.axis_name = Some(axis_name);
                    Ok(())
                }
                value => Err(StageError::TypeMismatch {
                    name: parameter,
                    expected: "string",
                    value,
                }),
            };
        }

        let number = value.as_f64().ok_or_else(|| StageError::TypeMismatch {
            name: parameter,
            expected: "number",
            value: value.clone(),
        })?;
        match parameter {
            AxisParameter::Velocity => settings.velocity = number,
            AxisParameter::Acceleration => settings.acceleration = number,
            AxisParameter::Deceleration => settings.deceleration = number,
            AxisParameter::StepPerUnit => settings.step_per_unit = number,
            AxisParameter::BaseRate => settings.base_rate = number,
            AxisParameter::AxisName => {}
        }
        Ok(())
    }
}
