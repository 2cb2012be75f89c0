//! OPUS command strings.

use std::path::Path;

use crate::parameters::AcquisitionParameters;

const MEASURE_SAMPLE: &str = "COMMAND_LINE MeasureSample";

/// `MOT56` drives the optical path selector: 1 infrared, 2 visible, and
/// `100 + n` sets the camera light to `n` percent.
const SELECTOR_INFRARED: u32 = 1;
const SELECTOR_VISIBLE: u32 = 2;
const LIGHT_INTENSITY_BASE: u32 = 100;

/// Measurement command rendered for one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureCommand {
    command: String,
    file_stem: String,
}

impl MeasureCommand {
    /// Render the measurement command from a snapshot of the parameters.
    ///
    /// `temperature` is only used when the suffix toggle is on and a file name
    /// is set.
    pub fn build(parameters: &AcquisitionParameters, temperature: Option<f64>) -> Self {
        let suffix = match temperature {
            Some(t) if parameters.temperature_suffix && !parameters.file_name.is_empty() => {
                temperature_suffix(t)
            }
            _ => String::new(),
        };
        let file_stem = format!("{}{}", parameters.file_name, suffix);

        let mut fields = vec![
            format!("EXP='{}'", parameters.experiment),
            format!("XPP='{}'", parameters.experiment_path),
        ];
        if !parameters.file_name.is_empty() {
            fields.push(format!("NAM='{file_stem}'"));
        }
        if !parameters.output_path.is_empty() {
            fields.push(format!("PTH='{}'", parameters.output_path));
        }

        Self {
            command: format!("{MEASURE_SAMPLE} (0, {{{}}});", fields.join(", ")),
            file_stem,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.command
    }

    /// Output file name including the temperature suffix.
    pub fn file_stem(&self) -> &str {
        &self.file_stem
    }

    pub fn into_string(self) -> String {
        self.command
    }
}

/// Filename-safe rendering of a temperature, e.g. `_Temp+23_46`.
pub fn temperature_suffix(temperature: f64) -> String {
    format!("_Temp{temperature:+.2}").replace('.', "_")
}

/// Camera snapshot used instead of a measurement in visible mode.
pub fn snapshot_command(output_path: &str, file_stem: &str) -> String {
    format!("take_snapshot {output_path} {file_stem}")
}

/// URI of the file the instrument writes for a measurement.
pub fn reference_uri(output_path: &str, file_stem: &str) -> String {
    let path = Path::new(output_path).join(format!("{file_stem}.0"));
    format!("file://{}", path.display())
}

fn selector_command(value: u32) -> String {
    format!("COMMAND_LINE SendCommand(0,+{{UNI='MOT56={value}'}});")
}

pub fn infrared_path_command() -> String {
    selector_command(SELECTOR_INFRARED)
}

pub fn visible_path_command() -> String {
    selector_command(SELECTOR_VISIBLE)
}

pub fn light_intensity_command(intensity: u8) -> String {
    selector_command(LIGHT_INTENSITY_BASE + u32::from(intensity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters() -> AcquisitionParameters {
        AcquisitionParameters {
            experiment: "E1".to_string(),
            experiment_path: "/cfg".to_string(),
            file_name: "sample1".to_string(),
            output_path: "/data".to_string(),
            temperature_suffix: true,
            ..AcquisitionParameters::default()
        }
    }

    #[test]
    fn test_full_command_field_order() {
        let command = MeasureCommand::build(&parameters(), Some(23.456));
        assert_eq!(
            command.as_str(),
            "COMMAND_LINE MeasureSample (0, {EXP='E1', XPP='/cfg', NAM='sample1_Temp+23_46', PTH='/data'});"
        );
        assert_eq!(command.file_stem(), "sample1_Temp+23_46");
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let parameters = parameters();
        let first = MeasureCommand::build(&parameters, Some(-4.5));
        let second = MeasureCommand::build(&parameters, Some(-4.5));
        assert_eq!(first, second);
        assert_eq!(first.into_string().as_bytes(), second.as_str().as_bytes());
    }

    #[test]
    fn test_empty_name_drops_nam_and_suffix() {
        let parameters = AcquisitionParameters {
            file_name: String::new(),
            ..parameters()
        };
        let command = MeasureCommand::build(&parameters, Some(23.456));
        assert_eq!(
            command.as_str(),
            "COMMAND_LINE MeasureSample (0, {EXP='E1', XPP='/cfg', PTH='/data'});"
        );
        assert_eq!(command.file_stem(), "");
    }

    #[test]
    fn test_suffix_needs_toggle_and_reading() {
        let off = AcquisitionParameters {
            temperature_suffix: false,
            ..parameters()
        };
        assert_eq!(MeasureCommand::build(&off, Some(23.456)).file_stem(), "sample1");
        assert_eq!(MeasureCommand::build(&parameters(), None).file_stem(), "sample1");
    }

    #[test]
    fn test_minimal_command() {
        let command = MeasureCommand::build(&AcquisitionParameters::default(), None);
        assert_eq!(
            command.as_str(),
            "COMMAND_LINE MeasureSample (0, {EXP='', XPP=''});"
        );
    }

    #[test]
    fn test_temperature_suffix_sign() {
        assert_eq!(temperature_suffix(23.456), "_Temp+23_46");
        assert_eq!(temperature_suffix(-5.0), "_Temp-5_00");
        assert_eq!(temperature_suffix(0.0), "_Temp+0_00");
        assert_eq!(temperature_suffix(150.004), "_Temp+150_00");
    }

    #[test]
    fn test_reference_uri() {
        assert_eq!(
            reference_uri("/data", "sample1_Temp+23_46"),
            "file:///data/sample1_Temp+23_46.0"
        );
        assert_eq!(reference_uri("/data/", "s"), "file:///data/s.0");
    }

    #[test]
    fn test_selector_commands() {
        assert_eq!(
            infrared_path_command(),
            "COMMAND_LINE SendCommand(0,+{UNI='MOT56=1'});"
        );
        assert_eq!(
            visible_path_command(),
            "COMMAND_LINE SendCommand(0,+{UNI='MOT56=2'});"
        );
        assert_eq!(
            light_intensity_command(40),
            "COMMAND_LINE SendCommand(0,+{UNI='MOT56=140'});"
        );
        assert_eq!(snapshot_command("/data", "cam1"), "take_snapshot /data cam1");
    }
}
