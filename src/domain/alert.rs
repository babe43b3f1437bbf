// Alert domain models
use super::motor::{MotorId, Variable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity level, ordered by escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    #[serde(alias = "info")]
    Normal,
    Warning,
    #[serde(alias = "error")]
    Critical,
}

/// Operating bands for one variable.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ThresholdConfig {
    pub name: String,
    pub unit: String,
    pub normal_min: f64,
    pub normal_max: f64,
    #[serde(default)]
    pub critical_low: Option<f64>,
    #[serde(default)]
    pub critical: Option<f64>,
}

impl ThresholdConfig {
    /// Width of the hysteresis band. The high band scale is used for both
    /// directions.
    pub fn hysteresis_band(&self) -> f64 {
        0.02 * self.normal_max
    }
}

pub fn alert_key(motor: MotorId, variable: Variable) -> String {
    format!("{}_{}", motor.as_str(), variable.key())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: Uuid,
    pub key: String,
    pub motor_id: MotorId,
    pub variable: Variable,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub update_count: u32,
}

impl AlertRecord {
    pub fn new(
        motor_id: MotorId,
        variable: Variable,
        severity: Severity,
        message: String,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: alert_key(motor_id, variable),
            motor_id,
            variable,
            severity,
            message,
            value,
            timestamp,
            resolved: false,
            resolved_at: None,
            update_count: 0,
        }
    }

    pub fn mark_resolved(&mut self, at: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_at = Some(at);
    }
}

/// Alert raised by the plant itself and forwarded over the push transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAlert {
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}
