//! Pseudo motor keeping the sample in focus while the temperature changes.
//!
//! The pseudo position is the Linkam stage temperature. Heating or cooling
//! shifts the sample, so each stage axis follows the temperature change by a
//! fixed factor.

use crate::parameters::ParameterValue;

/// Physical motors, in the order positions are passed around.
pub const MOTOR_ROLES: [&str; 4] = ["linkam", "opus_x", "opus_y", "opus_z"];

const FACTOR_NAMES: [&str; 3] = ["x_factor", "y_factor", "z_factor"];

const DEFAULT_FACTORS: [f64; 3] = [0.34743, 0.12602, 0.43009];

#[derive(Debug, thiserror::Error)]
pub enum PseudoError {
    #[error("Invalid motor index {0}")]
    InvalidIndex(usize),

    #[error("Expected {expected} positions, got {got}")]
    MissingPosition { expected: usize, got: usize },

    #[error("Unknown parameter {0}")]
    UnknownParameter(String),

    #[error("Parameter {name} expects a number, got {value}")]
    NotANumber { name: String, value: ParameterValue },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkamStagePseudoMotor {
    factors: [f64; 3],
}

impl Default for LinkamStagePseudoMotor {
    fn default() -> Self {
        Self {
            factors: DEFAULT_FACTORS,
        }
    }
}

impl LinkamStagePseudoMotor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of physical motor `index` (1-based, see [`MOTOR_ROLES`]) for
    /// the requested temperature `pseudo[0]`.
    pub fn calc_physical(
        &self,
        index: usize,
        pseudo: &[f64],
        physical: &[f64],
    ) -> Result<f64, PseudoError> {
        if index == 0 || index > MOTOR_ROLES.len() {
            return Err(PseudoError::InvalidIndex(index));
        }
        let target = *pseudo.first().ok_or(PseudoError::MissingPosition {
            expected: 1,
            got: pseudo.len(),
        })?;
        if index == 1 {
            return Ok(target);
        }
        if physical.len() < index {
            return Err(PseudoError::MissingPosition {
                expected: MOTOR_ROLES.len(),
                got: physical.len(),
            });
        }

        let temperature = physical[0];
        let variation = (temperature - target).abs();
        let sign = if target < temperature { -1.0 } else { 1.0 };
        Ok(physical[index - 1] + self.factors[index - 2] * variation * sign)
    }

    /// Positions of all physical motors for the requested temperature.
    pub fn calc_all_physical(&self, pseudo: &[f64], physical: &[f64]) -> Result<Vec<f64>, PseudoError> {
        (1..=MOTOR_ROLES.len())
            .map(|index| self.calc_physical(index, pseudo, physical))
            .collect()
    }

    /// The pseudo position is the temperature itself.
    pub fn calc_pseudo(&self, index: usize, physical: &[f64]) -> Result<f64, PseudoError> {
        if index != 1 {
            return Err(PseudoError::InvalidIndex(index));
        }
        physical.first().copied().ok_or(PseudoError::MissingPosition {
            expected: MOTOR_ROLES.len(),
            got: 0,
        })
    }

    fn factor_index(name: &str) -> Result<usize, PseudoError> {
        FACTOR_NAMES
            .iter()
            .position(|factor| factor.eq_ignore_ascii_case(name))
            .ok_or_else(|| PseudoError::UnknownParameter(name.to_string()))
    }

    pub fn get_axis_extra_par(&self, name: &str) -> Result<ParameterValue, PseudoError> {
        let index = Self::factor_index(name)?;
        Ok(self.factors[index].into())
    }

    pub fn set_axis_extra_par(&mut self, name: &str, value: ParameterValue) -> Result<(), PseudoError> {
        let index = Self::factor_index(name)?;
        let factor = value.as_f64().ok_or_else(|| PseudoError::NotANumber {
            name: name.to_string(),
            value: value.clone(),
        })?;
        log::debug!("{} = {factor}", FACTOR_NAMES[index]);
        self.factors[index] = factor;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_linkam_follows_pseudo() {
        let motor = LinkamStagePseudoMotor::new();
        assert_eq!(motor.calc_physical(1, &[40.0], &[25.0, 1.0, 2.0, 3.0]).unwrap(), 40.0);
        assert_eq!(motor.calc_pseudo(1, &[25.0, 1.0, 2.0, 3.0]).unwrap(), 25.0);
    }

    #[test]
    fn test_heating_moves_axes_forward() {
        let motor = LinkamStagePseudoMotor::new();
        let positions = motor
            .calc_all_physical(&[35.0], &[25.0, 1.0, 2.0, 3.0])
            .unwrap();
        assert!(close(positions[1], 1.0 + 0.34743 * 10.0));
        assert!(close(positions[2], 2.0 + 0.12602 * 10.0));
        assert!(close(positions[3], 3.0 + 0.43009 * 10.0));
    }

    #[test]
    fn test_cooling_moves_axes_back() {
        let motor = LinkamStagePseudoMotor::new();
        let x = motor.calc_physical(2, &[20.0], &[25.0, 1.0, 2.0, 3.0]).unwrap();
        assert!(close(x, 1.0 - 0.34743 * 5.0));
        let z = motor.calc_physical(4, &[25.0], &[25.0, 1.0, 2.0, 3.0]).unwrap();
        assert!(close(z, 3.0));
    }

    #[test]
    fn test_bad_indices() {
        let motor = LinkamStagePseudoMotor::new();
        assert!(matches!(
            motor.calc_physical(5, &[20.0], &[25.0, 1.0, 2.0, 3.0]),
            Err(PseudoError::InvalidIndex(5))
        ));
        assert!(matches!(
            motor.calc_physical(3, &[20.0], &[25.0]),
            Err(PseudoError::MissingPosition { .. })
        ));
        assert!(matches!(motor.calc_pseudo(2, &[25.0]), Err(PseudoError::InvalidIndex(2))));
    }

    #[test]
    fn test_factors_are_parameters() {
        let mut motor = LinkamStagePseudoMotor::new();
        assert_eq!(
            motor.get_axis_extra_par("y_factor").unwrap(),
            ParameterValue::Float(0.12602)
        );
        motor
            .set_axis_extra_par("Y_FACTOR", ParameterValue::Float(0.5))
            .unwrap();
        let y = motor.calc_physical(3, &[30.0], &[25.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(close(y, 2.5));
        assert!(matches!(
            motor.set_axis_extra_par("x_factor", "big".into()),
            Err(PseudoError::NotANumber { .. })
        ));
        assert!(matches!(
            motor.get_axis_extra_par("w_factor"),
            Err(PseudoError::UnknownParameter(_))
        ));
    }
}
