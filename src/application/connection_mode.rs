// Connection mode selection - pure transition table, effects run by the monitor

use crate::domain::connection::ConnectionMode;

/// External input to the mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSignal {
    Start,
    PushConnected,
    PushDisconnected,
    /// Push retries exhausted, or too many consecutive polling failures
    Exhausted,
    RecoveryElapsed,
    /// No state update inside the liveness window
    LivenessExpired,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEffect {
    ResetErrors,
    PollNow,
    GenerateSimulated,
    ScheduleRecovery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionMode,
    pub effects: Vec<ModeEffect>,
}

impl Transition {
    fn to(next: ConnectionMode) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: ModeEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn changes_mode(&self, current: ConnectionMode) -> bool {
        self.next != current
    }
}

/// Total, deterministic transition table.
pub fn transition(current: ConnectionMode, signal: ModeSignal) -> Transition {
    use crate::domain::connection::ConnectionMode as Mode;

    match (current, signal) {
        // Optimistic: the push layer is about to attempt a connection
        (_, ModeSignal::Start) => Transition::to(Mode::Push),
        (_, ModeSignal::PushConnected) => Transition::to(Mode::Push).with(ModeEffect::ResetErrors),
        (_, ModeSignal::PushDisconnected) => Transition::to(Mode::Polling).with(ModeEffect::PollNow),
        // Already offline: the pending recovery keeps its original deadline
        (Mode::Offline, ModeSignal::Exhausted) => Transition::to(Mode::Offline),
        (_, ModeSignal::Exhausted) => Transition::to(Mode::Offline)
            .with(ModeEffect::GenerateSimulated)
            .with(ModeEffect::ScheduleRecovery),
        (Mode::Offline, ModeSignal::RecoveryElapsed) => {
            Transition::to(Mode::Polling).with(ModeEffect::ResetErrors)
        }
        (mode, ModeSignal::RecoveryElapsed) => Transition::to(mode),
        (Mode::Push, ModeSignal::LivenessExpired) => Transition::to(Mode::Polling),
        (mode, ModeSignal::LivenessExpired) => Transition::to(mode),
    }
}
