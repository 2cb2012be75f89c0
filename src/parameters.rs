use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::command::{infrared_path_command, light_intensity_command, visible_path_command};

pub const MAX_INTENSITY: u8 = 100;

/// Optical path used for an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// Infrared measurement through the interferometer.
    #[default]
    Infrared,
    /// Camera snapshot through the visible path.
    Visible,
}

impl AcquisitionMode {
    pub fn code(self) -> i64 {
        match self {
            Self::Infrared => 0,
            Self::Visible => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Infrared),
            1 => Some(Self::Visible),
            _ => None,
        }
    }
}

/// Settings of the next acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionParameters {
    pub experiment: String,
    pub experiment_path: String,
    pub file_name: String,
    pub output_path: String,
    /// Append the sample temperature to the file name.
    pub temperature_suffix: bool,
    pub mode: AcquisitionMode,
    /// Camera light in percent, used in visible mode.
    pub intensity: u8,
    pub read_peak: bool,
    /// Instrument-side macro started instead of a measurement when set.
    pub macro_name: String,
}

impl Default for AcquisitionParameters {
    fn default() -> Self {
        Self {
            experiment: String::new(),
            experiment_path: String::new(),
            file_name: String::new(),
            output_path: String::new(),
            temperature_suffix: false,
            mode: AcquisitionMode::Infrared,
            intensity: MAX_INTENSITY,
            read_peak: false,
            macro_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterName {
    Experiment,
    ExperimentPath,
    FileName,
    OutputPath,
    TemperatureSuffix,
    Mode,
    Intensity,
    ReadPeak,
    MacroName,
    /// The rendered measurement command.
    Command,
}

const PARAMETER_NAMES: [(&str, ParameterName); 10] = [
    ("opus_exp", ParameterName::Experiment),
    ("opus_xpp", ParameterName::ExperimentPath),
    ("opus_nam", ParameterName::FileName),
    ("opus_pth", ParameterName::OutputPath),
    ("add_temp2filename", ParameterName::TemperatureSuffix),
    ("opus_mode", ParameterName::Mode),
    ("opus_cam_intensity", ParameterName::Intensity),
    ("read_peak", ParameterName::ReadPeak),
    ("opus_macro_name", ParameterName::MacroName),
    ("opus_cmd", ParameterName::Command),
];

impl ParameterName {
    pub fn all() -> impl Iterator<Item = Self> {
        PARAMETER_NAMES.iter().map(|(_, name)| *name)
    }

    /// Name used by the host framework.
    pub fn as_str(self) -> &'static str {
        PARAMETER_NAMES
            .iter()
            .find(|(_, name)| *name == self)
            .map_or("", |(external, _)| *external)
    }

    pub fn is_read_only(self) -> bool {
        self == Self::Command
    }
}

impl FromStr for ParameterName {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PARAMETER_NAMES
            .iter()
            .find(|(external, _)| external.eq_ignore_ascii_case(s))
            .map(|(_, name)| *name)
            .ok_or_else(|| ParameterError::Unknown(s.to_string()))
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    /// Numeric view of integer and float values.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            Self::Str(_) | Self::Bool(_) => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("Unknown parameter {0}")]
    Unknown(String),

    #[error("Parameter {0} is read-only")]
    ReadOnly(ParameterName),

    #[error("Parameter {name} expects a {expected} value, got {value}")]
    TypeMismatch {
        name: ParameterName,
        expected: &'static str,
        value: ParameterValue,
    },

    #[error("Value {value} of parameter {name} is out of range [{min}, {max}]")]
    OutOfRange {
        name: ParameterName,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Named access to the acquisition parameters.
///
/// Writes return the instrument commands they require; the caller issues them.
/// Only the optical path selection has such side effects.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    parameters: AcquisitionParameters,
    command: String,
}

impl ParameterStore {
    pub fn new(parameters: AcquisitionParameters) -> Self {
        Self {
            parameters,
            command: String::new(),
        }
    }

    pub fn parameters(&self) -> &AcquisitionParameters {
        &self.parameters
    }

    /// Remember the command rendered by the last PreStart.
    pub fn record_command(&mut self, command: &str) {
        command.clone_into(&mut self.command);
    }

    pub fn get(&self, name: ParameterName) -> ParameterValue {
        let p = &self.parameters;
        match name {
            ParameterName::Experiment => p.experiment.as_str().into(),
            ParameterName::ExperimentPath => p.experiment_path.as_str().into(),
            ParameterName::FileName => p.file_name.as_str().into(),
            ParameterName::OutputPath => p.output_path.as_str().into(),
            ParameterName::TemperatureSuffix => p.temperature_suffix.into(),
            ParameterName::Mode => p.mode.code().into(),
            ParameterName::Intensity => i64::from(p.intensity).into(),
            ParameterName::ReadPeak => p.read_peak.into(),
            ParameterName::MacroName => p.macro_name.as_str().into(),
            ParameterName::Command => self.command.as_str().into(),
        }
    }

    /// Write a parameter and return the instrument commands it triggers.
    pub fn set(
        &mut self,
        name: ParameterName,
        value: ParameterValue,
    ) -> Result<Vec<String>, ParameterError> {
        let p = &mut self.parameters;
        match name {
            ParameterName::Command => return Err(ParameterError::ReadOnly(name)),
            ParameterName::Experiment => p.experiment = expect_str(name, value)?,
            ParameterName::ExperimentPath => p.experiment_path = expect_str(name, value)?,
            ParameterName::FileName => p.file_name = expect_str(name, value)?,
            ParameterName::OutputPath => p.output_path = expect_str(name, value)?,
            ParameterName::MacroName => p.macro_name = expect_str(name, value)?,
            ParameterName::TemperatureSuffix => p.temperature_suffix = expect_bool(name, value)?,
            ParameterName::ReadPeak => p.read_peak = expect_bool(name, value)?,
            ParameterName::Mode => {
                let code = expect_int(name, value)?;
                p.mode = AcquisitionMode::from_code(code).ok_or(ParameterError::OutOfRange {
                    name,
                    value: code,
                    min: 0,
                    max: 1,
                })?;
                return Ok(match p.mode {
                    AcquisitionMode::Infrared => vec![infrared_path_command()],
                    AcquisitionMode::Visible => vec![
                        visible_path_command(),
                        light_intensity_command(p.intensity),
                    ],
                });
            }
            ParameterName::Intensity => {
                let level = expect_int(name, value)?;
                p.intensity = u8::try_from(level)
                    .ok()
                    .filter(|level| *level <= MAX_INTENSITY)
                    .ok_or(ParameterError::OutOfRange {
                        name,
                        value: level,
                        min: 0,
                        max: i64::from(MAX_INTENSITY),
                    })?;
                if p.mode == AcquisitionMode::Visible {
                    return Ok(vec![light_intensity_command(p.intensity)]);
                }
            }
        }
        Ok(Vec::new())
    }
}

fn expect_str(name: ParameterName, value: ParameterValue) -> Result<String, ParameterError> {
    match value {
        ParameterValue::Str(s) => Ok(s),
        value => Err(ParameterError::TypeMismatch {
            name,
            expected: "string",
            value,
        }),
    }
}

fn expect_bool(name: ParameterName, value: ParameterValue) -> Result<bool, ParameterError> {
    match value {
        ParameterValue::Bool(b) => Ok(b),
        value => Err(ParameterError::TypeMismatch {
            name,
            expected: "boolean",
            value,
        }),
    }
}

fn expect_int(name: ParameterName, value: ParameterValue) -> Result<i64, ParameterError> {
    match value {
        ParameterValue::Int(i) => Ok(i),
        value => Err(ParameterError::TypeMismatch {
            name,
            expected: "integer",
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!("opus_exp".parse(), Ok(ParameterName::Experiment));
        assert_eq!("OPUS_Cam_Intensity".parse(), Ok(ParameterName::Intensity));
        assert_eq!(
            "ip".parse::<ParameterName>(),
            Err(ParameterError::Unknown("ip".to_string()))
        );
    }

    #[test]
    fn test_name_table_round_trips() {
        for name in ParameterName::all() {
            assert_eq!(name.as_str().parse(), Ok(name));
        }
        assert_eq!(ParameterName::all().filter(|n| n.is_read_only()).count(), 1);
    }

    #[test]
    fn test_plain_writes_have_no_side_effects() {
        let mut store = ParameterStore::default();
        assert!(store.set(ParameterName::Experiment, "E1".into()).unwrap().is_empty());
        assert!(store.set(ParameterName::TemperatureSuffix, true.into()).unwrap().is_empty());
        assert!(store.set(ParameterName::Intensity, ParameterValue::Int(40)).unwrap().is_empty());

        assert_eq!(store.get(ParameterName::Experiment), ParameterValue::from("E1"));
        assert_eq!(store.get(ParameterName::TemperatureSuffix), ParameterValue::Bool(true));
        assert_eq!(store.get(ParameterName::Intensity), ParameterValue::Int(40));
        assert_eq!(store.parameters().intensity, 40);
    }

    #[test]
    fn test_command_is_read_only() {
        let mut store = ParameterStore::default();
        store.record_command("COMMAND_LINE MeasureSample (0, {EXP='', XPP=''});");
        assert_eq!(
            store.set(ParameterName::Command, "RUN_MACRO x".into()),
            Err(ParameterError::ReadOnly(ParameterName::Command))
        );
        assert_eq!(
            store.get(ParameterName::Command),
            ParameterValue::from("COMMAND_LINE MeasureSample (0, {EXP='', XPP=''});")
        );
    }

    #[test]
    fn test_type_mismatch() {
        let mut store = ParameterStore::default();
        assert!(matches!(
            store.set(ParameterName::ReadPeak, "yes".into()),
            Err(ParameterError::TypeMismatch { expected: "boolean", .. })
        ));
        assert!(matches!(
            store.set(ParameterName::FileName, ParameterValue::Int(3)),
            Err(ParameterError::TypeMismatch { expected: "string", .. })
        ));
    }

    #[test]
    fn test_switching_to_visible_moves_selector_and_sets_light() {
        let mut store = ParameterStore::default();
        store.set(ParameterName::Intensity, ParameterValue::Int(40)).unwrap();
        let effects = store.set(ParameterName::Mode, ParameterValue::Int(1)).unwrap();
        assert_eq!(
            effects,
            vec![
                "COMMAND_LINE SendCommand(0,+{UNI='MOT56=2'});",
                "COMMAND_LINE SendCommand(0,+{UNI='MOT56=140'});",
            ]
        );
        assert_eq!(store.parameters().mode, AcquisitionMode::Visible);
    }

    #[test]
    fn test_switching_to_infrared() {
        let mut store = ParameterStore::default();
        let effects = store.set(ParameterName::Mode, ParameterValue::Int(0)).unwrap();
        assert_eq!(effects, vec!["COMMAND_LINE SendCommand(0,+{UNI='MOT56=1'});"]);
    }

    #[test]
    fn test_intensity_in_visible_mode_is_applied() {
        let mut store = ParameterStore::default();
        store.set(ParameterName::Mode, ParameterValue::Int(1)).unwrap();
        let effects = store.set(ParameterName::Intensity, ParameterValue::Int(75)).unwrap();
        assert_eq!(effects, vec!["COMMAND_LINE SendCommand(0,+{UNI='MOT56=175'});"]);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let mut store = ParameterStore::default();
        assert!(matches!(
            store.set(ParameterName::Mode, ParameterValue::Int(2)),
            Err(ParameterError::OutOfRange { max: 1, .. })
        ));
        assert!(matches!(
            store.set(ParameterName::Intensity, ParameterValue::Int(101)),
            Err(ParameterError::OutOfRange { max: 100, .. })
        ));
        assert!(matches!(
            store.set(ParameterName::Intensity, ParameterValue::Int(-1)),
            Err(ParameterError::OutOfRange { .. })
        ));
        assert_eq!(store.parameters().mode, AcquisitionMode::Infrared);
        assert_eq!(store.parameters().intensity, MAX_INTENSITY);
    }
}
