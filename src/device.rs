use std::fmt;

use crate::macro_runner::MacroRunner;
use crate::protocol::{self, READ_PEAK};
use crate::transport::JobTracking;

/// Status reported while in [`DeviceState::Fault`].
pub const FAULT_STATUS: &str = "cannot connect to instrument";

const ACQUIRING_STATUS: &str = "Acquiring";

/// State of the instrument as seen by the host framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Idle,
    Acquiring,
    Fault,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Acquiring => "Acquiring",
            Self::Fault => "Fault",
        };
        f.write_str(name)
    }
}

/// Turns the macro lifecycle into the `(state, status)` pair of `StateOne`.
///
/// When a measurement ends with peak reading enabled, the peak value is
/// fetched before the device is reported idle. On the line protocol that is
/// one extra request; on a device server `READ_PKA` runs as its own job and
/// the device stays `Acquiring` until it is done. A reply that is not a number
/// only loses the peak, a transport failure faults the device.
#[derive(Debug, Default)]
pub struct DeviceMonitor {
    peak: Option<f64>,
    peak_pending: bool,
}

impl DeviceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peak value of the last finished measurement, if it could be read.
    pub fn peak(&self) -> Option<f64> {
        self.peak
    }

    /// Forget the previous measurement's peak.
    pub fn reset(&mut self) {
        self.peak = None;
        self.peak_pending = false;
    }

    pub fn state_one(&mut self, runner: &mut MacroRunner, read_peak: bool) -> (DeviceState, String) {
        let was_acquiring = runner.state() == DeviceState::Acquiring;
        let mut state = runner.poll();

        if state == DeviceState::Idle && was_acquiring {
            if self.peak_pending {
                self.peak_pending = false;
                self.peak = match runner.transport().last_output() {
                    Ok(output) => parse_peak(&output),
                    Err(e) => {
                        log::warn!("Cannot read the peak value: {e}");
                        None
                    }
                };
            } else if read_peak {
                state = self.request_peak(runner);
            }
        }
        if state == DeviceState::Fault {
            self.peak_pending = false;
        }

        let status = match state {
            DeviceState::Idle => runner.transport().current_status(),
            DeviceState::Acquiring => ACQUIRING_STATUS.to_string(),
            DeviceState::Fault => FAULT_STATUS.to_string(),
        };
        log::debug!("StateOne... {state}, {status}");
        (state, status)
    }

    fn request_peak(&mut self, runner: &mut MacroRunner) -> DeviceState {
        match runner.tracking() {
            JobTracking::MacroId => {
                self.peak = match runner.execute(READ_PEAK) {
                    Ok(response) => match protocol::parse_reply(&response) {
                        Ok(value) => parse_peak(value),
                        Err(e) => {
                            log::warn!("Cannot read the peak value: {e}");
                            None
                        }
                    },
                    Err(e) => {
                        log::warn!("Lost the instrument while reading the peak value: {e}");
                        runner.fault();
                        return DeviceState::Fault;
                    }
                };
                DeviceState::Idle
            }
            JobTracking::Native => match runner.start(READ_PEAK) {
                Ok(()) => {
                    self.peak_pending = true;
                    DeviceState::Acquiring
                }
                Err(e) => {
                    log::warn!("Cannot request the peak value: {e}");
                    runner.state()
                }
            },
        }
    }
}

fn parse_peak(text: &str) -> Option<f64> {
    match text.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Peak value {text:?} is not a number: {e}");
            None
        }
    }
}
