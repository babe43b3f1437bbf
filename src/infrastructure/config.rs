use crate::domain::alert::ThresholdConfig;
use crate::domain::motor::{MotorId, Variable};
use crate::infrastructure::error::MonitorError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MonitorConfig {
    pub server: ServerSettings,
    pub api: ApiSettings,
    pub push: PushSettings,
    pub polling: PollingSettings,
    pub history: HistorySettings,
    pub alerts: AlertSettings,
    pub motors: MotorsConfig,
    pub thresholds: ThresholdsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub latest_path: String,
    pub history_path: String,
    /// Bearer credential; polling and history fail fast without it
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            latest_path: "/api/telemetry/latest".to_string(),
            history_path: "/api/telemetry/history".to_string(),
            token: None,
            request_timeout_secs: 10,
        }
    }
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PushSettings {
    pub enabled: bool,
    /// `${token}` is replaced with the API credential
    pub url: String,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_retries: u32,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "ws://localhost:8000/ws/telemetry?token=${token}".to_string(),
            base_delay_ms: 3000,
            backoff_factor: 1.5,
            max_retries: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_secs: u64,
    pub failure_threshold: u32,
    pub liveness_check_secs: u64,
    pub liveness_timeout_secs: u64,
    pub recovery_delay_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            failure_threshold: 3,
            liveness_check_secs: 10,
            liveness_timeout_secs: 30,
            recovery_delay_secs: 30,
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn liveness_check(&self) -> Duration {
        Duration::from_secs(self.liveness_check_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_secs(self.recovery_delay_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistorySettings {
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub max_chart_points: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_secs: 300,
            max_chart_points: 150,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertSettings {
    pub history_capacity: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            history_capacity: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MotorsConfig {
    pub motor1: MotorSettings,
    pub motor2: MotorSettings,
}

impl Default for MotorsConfig {
    fn default() -> Self {
        Self {
            motor1: MotorSettings {
                suffix: "m1".to_string(),
            },
            motor2: MotorSettings {
                suffix: "m2".to_string(),
            },
        }
    }
}

impl MotorsConfig {
    pub fn suffix(&self, motor: MotorId) -> &str {
        match motor {
            MotorId::Motor1 => &self.motor1.suffix,
            MotorId::Motor2 => &self.motor2.suffix,
        }
    }

    pub fn by_suffix(&self, suffix: &str) -> Option<MotorId> {
        MotorId::ALL.into_iter().find(|m| self.suffix(*m) == suffix)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MotorSettings {
    pub suffix: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub temperature: ThresholdConfig,
    pub oil_pressure: ThresholdConfig,
    pub clutch_pressure: ThresholdConfig,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            temperature: ThresholdConfig {
                name: "Temperature".to_string(),
                unit: "°C".to_string(),
                normal_min: 20.0,
                normal_max: 95.0,
                critical_low: None,
                critical: Some(105.0),
            },
            oil_pressure: ThresholdConfig {
                name: "Oil Pressure".to_string(),
                unit: "bar".to_string(),
                normal_min: 2.0,
                normal_max: 6.0,
                critical_low: Some(1.0),
                critical: Some(8.0),
            },
            clutch_pressure: ThresholdConfig {
                name: "Clutch Pressure".to_string(),
                unit: "bar".to_string(),
                normal_min: 8.0,
                normal_max: 16.0,
                critical_low: Some(5.0),
                critical: Some(20.0),
            },
        }
    }
}

impl ThresholdsConfig {
    pub fn get(&self, variable: Variable) -> &ThresholdConfig {
        match variable {
            Variable::Temperature => &self.temperature,
            Variable::OilPressure => &self.oil_pressure,
            Variable::ClutchPressure => &self.clutch_pressure,
        }
    }
}

/// Load `config/monitor.toml` (optional) layered with `MONITOR__*` environment variables.
pub fn load_monitor_config() -> anyhow::Result<MonitorConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor").required(false))
        .add_source(config::Environment::with_prefix("MONITOR").separator("__"))
        .build()?;

    let monitor_config: MonitorConfig = settings.try_deserialize()?;
    monitor_config.validate()?;
    Ok(monitor_config)
}

impl MonitorConfig {
    /// Reject settings the timers and evaluator cannot run with.
    pub fn validate(&self) -> Result<(), MonitorError> {
        let invalid = |msg: String| Err(MonitorError::Config(msg));

        if self.polling.interval_secs == 0 || self.polling.liveness_check_secs == 0 {
            return invalid("polling and liveness periods must be non-zero".to_string());
        }
        if self.polling.failure_threshold == 0 {
            return invalid("polling.failure_threshold must be at least 1".to_string());
        }
        if self.push.enabled && !(self.push.url.starts_with("ws://") || self.push.url.starts_with("wss://")) {
            return invalid(format!("push.url must be a ws:// or wss:// URL, got '{}'", self.push.url));
        }
        if self.push.backoff_factor < 1.0 {
            return invalid("push.backoff_factor must be >= 1.0".to_string());
        }
        for variable in Variable::ALL {
            let band = self.thresholds.get(variable);
            if band.normal_min >= band.normal_max {
                return invalid(format!("thresholds.{}: normal_min must be below normal_max", variable));
            }
        }
        Ok(())
    }
}

/// Replace `${name}` placeholders in a template string
pub fn expand_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
