// Simulated readings shown while no transport is available
use crate::domain::motor::{MotorFields, MotorId, MotorStatus, Variable};
use crate::infrastructure::config::ThresholdsConfig;

/// Deterministic in-band values: slow sinusoidal drift around the middle of
/// each variable's normal band, phase-shifted per motor.
pub fn simulated_readings(thresholds: &ThresholdsConfig, elapsed_secs: f64) -> Vec<(MotorId, MotorFields)> {
    MotorId::ALL
        .into_iter()
        .enumerate()
        .map(|(motor_idx, motor)| {
            let mut fields = MotorFields {
                status: Some(MotorStatus::Normal),
                ..Default::default()
            };

            for (var_idx, variable) in Variable::ALL.into_iter().enumerate() {
                let band = thresholds.get(variable);
                let mid = (band.normal_min + band.normal_max) / 2.0;
                let amplitude = (band.normal_max - band.normal_min) / 4.0;
                let phase = motor_idx as f64 * 1.3 + var_idx as f64 * 0.7;
                let value = mid + amplitude * (elapsed_secs / 60.0 + phase).sin();
                fields.set(variable, (value * 10.0).round() / 10.0);
            }

            (motor, fields)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_values_stay_in_band() {
        let thresholds = ThresholdsConfig::default();

        for t in [0.0, 17.0, 95.0, 600.0, 3600.0] {
            let readings = simulated_readings(&thresholds, t);
            assert_eq!(readings.len(), 2);

            for (_, fields) in readings {
                assert_eq!(fields.status, Some(MotorStatus::Normal));
                for variable in Variable::ALL {
                    let band = thresholds.get(variable);
                    let value = fields.get(variable).unwrap();
                    assert!(value >= band.normal_min && value <= band.normal_max);
                }
            }
        }
    }

    #[test]
    fn test_motors_differ() {
        let readings = simulated_readings(&ThresholdsConfig::default(), 0.0);
        assert_ne!(readings[0].1, readings[1].1);
    }
}
