// Connection state domain model
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Which transport is currently authoritative for motor data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    None,
    Push,
    Polling,
    Offline,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionMode::None => "none",
            ConnectionMode::Push => "push",
            ConnectionMode::Polling => "polling",
            ConnectionMode::Offline => "offline",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub mode: ConnectionMode,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
}
