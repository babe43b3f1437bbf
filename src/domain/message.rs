// Push transport wire messages
use super::alert::SystemAlert;
use super::motor::{MotorFields, MotorId, MotorStatus};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Inbound push message, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    TelemetryLatest {
        data: BTreeMap<String, MotorFields>,
    },
    #[serde(rename = "motor_status")]
    StatusUpdate {
        #[serde(alias = "motorId")]
        motor_id: String,
        status: MotorStatus,
        #[serde(default)]
        data: MotorFields,
    },
    SystemAlert(SystemAlert),
    KpiUpdate {
        data: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Keep the motors we know, drop the rest.
pub fn known_motors(data: BTreeMap<String, MotorFields>) -> Vec<(MotorId, MotorFields)> {
    data.into_iter()
        .filter_map(|(id, fields)| MotorId::parse(&id).map(|motor| (motor, fields)))
        .collect()
}
