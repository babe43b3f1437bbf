// Motor domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorId {
    Motor1,
    Motor2,
}

impl MotorId {
    pub const ALL: [MotorId; 2] = [MotorId::Motor1, MotorId::Motor2];

    pub fn as_str(&self) -> &'static str {
        match self {
            MotorId::Motor1 => "motor1",
            MotorId::Motor2 => "motor2",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MotorId::Motor1 => "Motor 1",
            MotorId::Motor2 => "Motor 2",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "motor1" => Some(MotorId::Motor1),
            "motor2" => Some(MotorId::Motor2),
            _ => None,
        }
    }
}

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored sensor channel on a motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Temperature,
    OilPressure,
    ClutchPressure,
}

impl Variable {
    pub const ALL: [Variable; 3] = [
        Variable::Temperature,
        Variable::OilPressure,
        Variable::ClutchPressure,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Variable::Temperature => "temperature",
            Variable::OilPressure => "oil_pressure",
            Variable::ClutchPressure => "clutch_pressure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.key() == value)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorStatus {
    Normal,
    Warning,
    Error,
    #[default]
    Offline,
}

/// Partial update for a motor. Absent fields leave the reading untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorFields {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub oil_pressure: Option<f64>,
    #[serde(default)]
    pub clutch_pressure: Option<f64>,
    #[serde(default)]
    pub status: Option<MotorStatus>,
}

impl MotorFields {
    pub fn get(&self, variable: Variable) -> Option<f64> {
        match variable {
            Variable::Temperature => self.temperature,
            Variable::OilPressure => self.oil_pressure,
            Variable::ClutchPressure => self.clutch_pressure,
        }
    }

    pub fn set(&mut self, variable: Variable, value: f64) {
        match variable {
            Variable::Temperature => self.temperature = Some(value),
            Variable::OilPressure => self.oil_pressure = Some(value),
            Variable::ClutchPressure => self.clutch_pressure = Some(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.oil_pressure.is_none()
            && self.clutch_pressure.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotorReading {
    pub temperature: f64,
    pub oil_pressure: f64,
    pub clutch_pressure: f64,
    pub status: MotorStatus,
    pub last_update: Option<DateTime<Utc>>,
    pub is_simulated: bool,
}

impl MotorReading {
    /// Shallow merge: present fields overwrite, missing ones are kept.
    pub fn merge(&mut self, fields: &MotorFields, at: DateTime<Utc>, simulated: bool) {
        if let Some(v) = fields.temperature {
            self.temperature = v;
        }
        if let Some(v) = fields.oil_pressure {
            self.oil_pressure = v;
        }
        if let Some(v) = fields.clutch_pressure {
            self.clutch_pressure = v;
        }
        if let Some(status) = fields.status {
            self.status = status;
        }
        self.last_update = Some(at);
        self.is_simulated = simulated;
    }
}
