// Threshold evaluation - one active alert per motor+variable, bounded history

use crate::application::event_bus::{EventBus, MonitorEvent};
use crate::domain::alert::{AlertRecord, Severity, ThresholdConfig, alert_key};
use crate::domain::motor::{MotorFields, MotorId, Variable};
use crate::infrastructure::config::ThresholdsConfig;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Float noise allowed at the edge of the hysteresis band.
const HYSTERESIS_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breach {
    CriticalHigh,
    CriticalLow,
    High,
    Low,
}

impl Breach {
    pub fn severity(&self) -> Severity {
        match self {
            Breach::CriticalHigh | Breach::CriticalLow => Severity::Critical,
            Breach::High | Breach::Low => Severity::Warning,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Breach::CriticalHigh => "CRITICAL",
            Breach::CriticalLow => "CRITICALLY LOW",
            Breach::High => "HIGH",
            Breach::Low => "LOW",
        }
    }
}

/// Severity rule, first match wins. `None` means the normal band.
pub fn classify(value: f64, config: &ThresholdConfig) -> Option<Breach> {
    if config.critical.is_some_and(|critical| value >= critical) {
        Some(Breach::CriticalHigh)
    } else if config.critical_low.is_some_and(|low| value <= low) {
        Some(Breach::CriticalLow)
    } else if value > config.normal_max {
        Some(Breach::High)
    } else if value < config.normal_min {
        Some(Breach::Low)
    } else {
        None
    }
}

pub fn within_hysteresis(prior: f64, value: f64, config: &ThresholdConfig) -> bool {
    (value - prior).abs() < config.hysteresis_band() + HYSTERESIS_TOLERANCE
}

pub fn format_message(motor: MotorId, config: &ThresholdConfig, breach: Breach, value: f64) -> String {
    format!(
        "{} {} {} ({:.1}{})",
        motor.display_name(),
        config.name,
        breach.label(),
        value,
        config.unit
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Change smaller than the hysteresis band; nothing evaluated
    Suppressed,
    /// NaN or infinite reading, dropped before any bookkeeping
    Rejected,
    /// In band with no open alert
    Normal,
    Raised(AlertRecord),
    Updated(AlertRecord),
    Resolved(AlertRecord),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertSummary {
    pub critical: usize,
    pub warning: usize,
}

#[derive(Default)]
struct AlertBook {
    last_values: HashMap<String, f64>,
    active: HashMap<String, AlertRecord>,
    history: VecDeque<AlertRecord>,
}

impl AlertBook {
    fn sync_history(&mut self, record: &AlertRecord) {
        if let Some(entry) = self.history.iter_mut().find(|r| r.id == record.id) {
            *entry = record.clone();
        }
    }
}

pub struct AlertEvaluator {
    thresholds: ThresholdsConfig,
    history_capacity: usize,
    book: Mutex<AlertBook>,
    bus: EventBus,
}

impl AlertEvaluator {
    pub fn new(thresholds: ThresholdsConfig, history_capacity: usize, bus: EventBus) -> Self {
        Self {
            thresholds,
            history_capacity: history_capacity.max(1),
            book: Mutex::new(AlertBook::default()),
            bus,
        }
    }

    /// Evaluate every variable present in a motor update.
    pub fn evaluate_fields(&self, motor: MotorId, fields: &MotorFields) -> Vec<Evaluation> {
        Variable::ALL
            .into_iter()
            .filter_map(|variable| {
                fields
                    .get(variable)
                    .map(|value| self.evaluate(motor, variable, value))
            })
            .collect()
    }

    pub fn evaluate(&self, motor: MotorId, variable: Variable, value: f64) -> Evaluation {
        if !value.is_finite() {
            tracing::warn!("Dropping non-finite {} reading for {}", variable, motor);
            return Evaluation::Rejected;
        }
        let config = self.thresholds.get(variable);
        let key = alert_key(motor, variable);
        let now = Utc::now();

        let evaluation = {
            let mut book = self.book.lock();

            if let Some(prior) = book.last_values.get(&key) {
                if within_hysteresis(*prior, value, config) {
                    return Evaluation::Suppressed;
                }
            }
            book.last_values.insert(key.clone(), value);

            match classify(value, config) {
                Some(breach) => {
                    let message = format_message(motor, config, breach, value);
                    let severity = breach.severity();

                    if let Some(existing) = book.active.get_mut(&key) {
                        existing.value = value;
                        existing.timestamp = now;
                        existing.message = message;
                        existing.severity = severity;
                        existing.update_count += 1;
                        let updated = existing.clone();
                        book.sync_history(&updated);
                        Evaluation::Updated(updated)
                    } else {
                        let record = AlertRecord::new(motor, variable, severity, message, value, now);
                        if book.history.len() >= self.history_capacity {
                            book.history.pop_front();
                        }
                        book.history.push_back(record.clone());
                        book.active.insert(key, record.clone());
                        Evaluation::Raised(record)
                    }
                }
                None => match book.active.remove(&key) {
                    Some(mut record) => {
                        record.mark_resolved(now);
                        book.sync_history(&record);
                        Evaluation::Resolved(record)
                    }
                    None => Evaluation::Normal,
                },
            }
        };

        self.announce(&evaluation);
        evaluation
    }

    /// Manually resolve an active alert. Unknown or already resolved ids are a no-op.
    pub fn resolve(&self, id: Uuid) -> Option<AlertRecord> {
        let resolved = {
            let mut book = self.book.lock();
            let key = book
                .active
                .iter()
                .find(|(_, record)| record.id == id)
                .map(|(key, _)| key.clone())?;
            let mut record = book.active.remove(&key)?;
            record.mark_resolved(Utc::now());
            book.sync_history(&record);
            record
        };

        tracing::info!("Alert {} resolved manually: {}", resolved.id, resolved.message);
        self.bus.publish(MonitorEvent::AlertResolved(resolved.clone()));
        Some(resolved)
    }

    /// Open alerts, most severe and most recent first.
    pub fn active_alerts(&self) -> Vec<AlertRecord> {
        let mut alerts: Vec<AlertRecord> = self.book.lock().active.values().cloned().collect();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        alerts
    }

    /// Bounded history, newest first.
    pub fn history(&self) -> Vec<AlertRecord> {
        self.book.lock().history.iter().rev().cloned().collect()
    }

    pub fn summary(&self) -> AlertSummary {
        let book = self.book.lock();
        let mut summary = AlertSummary::default();
        for record in book.active.values() {
            match record.severity {
                Severity::Critical => summary.critical += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Normal => {}
            }
        }
        summary
    }

    fn announce(&self, evaluation: &Evaluation) {
        match evaluation {
            Evaluation::Raised(record) => {
                tracing::info!("Alert raised [{}]: {}", record.key, record.message);
                self.bus.publish(MonitorEvent::AlertRaised(record.clone()));
                if record.severity == Severity::Critical {
                    tracing::warn!("Critical alert: {}", record.message);
                    self.bus.publish(MonitorEvent::CriticalAlert(record.clone()));
                }
            }
            Evaluation::Updated(record) => {
                tracing::debug!(
                    "Alert updated [{}] (#{}): {}",
                    record.key,
                    record.update_count,
                    record.message
                );
                self.bus.publish(MonitorEvent::AlertUpdated(record.clone()));
            }
            Evaluation::Resolved(record) => {
                tracing::info!("Alert resolved [{}]", record.key);
                self.bus.publish(MonitorEvent::AlertResolved(record.clone()));
            }
            Evaluation::Suppressed | Evaluation::Rejected | Evaluation::Normal => {}
        }
    }
}
