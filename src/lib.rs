//! # OPUS RS
//!
//! A Rust library for driving a Bruker OPUS FTIR spectrometer from an
//! instrument-control framework.
//!
//! The spectrometer is reached either through the OPUS line protocol on a TCP
//! socket or through a device server proxy. Measurements run as macros on the
//! instrument; this crate starts them, follows them to completion by polling
//! and reports the result as a counter reading or a file reference.
//!
//! ## Features
//!
//! - **Two transports**: raw line protocol ([`LineTransport`]) or device server ([`ProxyTransport`])
//! - **Macro lifecycle**: at most one running macro, polled one probe at a time
//! - **Parameter table**: typed acquisition parameters with case-insensitive names
//! - **Stage control**: sample stage axes and a temperature-coupled pseudo motor
//! - **Configuration**: TOML files via `serde`
//! - **Scripted doubles**: [`loopback`] transports to test drivers without hardware
//!
//! ## Examples
//!
//! ### One acquisition over the line protocol
//!
//! ```rust,no_run
//! use opus_rs::{AcquisitionParameters, DeviceState, LineTransport, OpusController, AXIS};
//! use std::time::Duration;
//!
//! let transport = LineTransport::new("bl01bruker", 5000, Duration::from_secs(1));
//! let parameters = AcquisitionParameters {
//!     experiment: "TR_ATR.XPM".to_string(),
//!     experiment_path: "C:\\OPUS\\XPM".to_string(),
//!     file_name: "sample1".to_string(),
//!     output_path: "C:\\DATA".to_string(),
//!     ..AcquisitionParameters::default()
//! };
//! let mut opus = OpusController::new(Box::new(transport), parameters);
//!
//! opus.pre_start_one(AXIS)?;
//! opus.start_one(AXIS)?;
//! while opus.state_one(AXIS)?.0 == DeviceState::Acquiring {
//!     std::thread::sleep(Duration::from_millis(500));
//! }
//! println!("Spectrum written to {}", opus.ref_one(AXIS)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Scripted instrument
//!
//! ```rust
//! use opus_rs::loopback::LoopbackTransport;
//! use opus_rs::{AcquisitionParameters, DeviceState, OpusController, AXIS};
//!
//! let instrument = LoopbackTransport::new();
//! let mut opus = OpusController::new(
//!     Box::new(instrument.clone()),
//!     AcquisitionParameters::default(),
//! );
//!
//! instrument.push_response("OK\n42\n");
//! opus.start_one(AXIS).unwrap();
//! instrument.push_response("OK\n1\n");
//! assert_eq!(opus.state_one(AXIS).unwrap().0, DeviceState::Idle);
//! assert_eq!(instrument.sent().last().unwrap(), "MACRO_RESULTS 42");
//! ```
//!
//! ### Parameters
//!
//! ```rust
//! use opus_rs::loopback::LoopbackTransport;
//! use opus_rs::{AcquisitionParameters, OpusController, ParameterValue, AXIS};
//!
//! let mut opus = OpusController::new(
//!     Box::new(LoopbackTransport::new()),
//!     AcquisitionParameters::default(),
//! );
//! opus.set_axis_extra_par(AXIS, "OPUS_NAM", "sample1".into()).unwrap();
//! assert_eq!(
//!     opus.get_axis_extra_par(AXIS, "opus_nam").unwrap(),
//!     ParameterValue::from("sample1")
//! );
//! ```

pub mod command;
pub mod config;
pub mod controller;
pub mod device;
pub mod loopback;
pub mod macro_runner;
pub mod parameters;
pub mod protocol;
pub mod proxy;
pub mod pseudo;
pub mod socket_terminal;
pub mod stage;
pub mod transport;

// Re-export the main types for convenience
pub use command::MeasureCommand;

pub use config::{ConfigError, ControllerConfig, TransportConfig};

pub use controller::{
    ControllerError, OpusController, TemperatureConnector, TemperatureSource, AXIS,
};

pub use device::{DeviceMonitor, DeviceState};

pub use macro_runner::{MacroError, MacroHandle, MacroRunner};

pub use parameters::{
    AcquisitionMode, AcquisitionParameters, ParameterError, ParameterName, ParameterStore,
    ParameterValue,
};

pub use protocol::ProtocolError;

pub use proxy::{DeviceProxy, ProxyConnector, ProxyState, ProxyTransport};

pub use pseudo::{LinkamStagePseudoMotor, PseudoError};

pub use socket_terminal::LineTransport;

pub use stage::{MotorState, StageController, StageError};

pub use transport::{JobTracking, Transport, TransportError};
