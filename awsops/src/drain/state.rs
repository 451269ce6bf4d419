//! Poller state machine.
//!
//! The transition function is pure: given the current state, what just
//! happened, and the poller policy, it returns the next state and the single
//! action the poller must perform next. All I/O lives in [`super::poller`].

use super::DrainMode;

/// Consecutive empty receives after which a poller assumes the queue is empty.
pub const EMPTY_RECEIVE_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerPolicy {
    pub mode: DrainMode,
    pub empty_receive_threshold: u32,
}

impl PollerPolicy {
    pub fn new(mode: DrainMode) -> Self {
        Self {
            mode,
            empty_receive_threshold: EMPTY_RECEIVE_THRESHOLD,
        }
    }
}

/// Why a poller stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Hit the empty-receive threshold. A heuristic: producers or other
    /// pollers can still race with this decision.
    QueueEmpty,
    /// Disposed of its one batch in [`DrainMode::OneBatch`].
    BatchLimit,
    /// Shutdown was requested before the next receive.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Polling,
    /// Number of consecutive empty receives so far.
    EmptyStreak(u32),
    /// Holding a non-empty batch that still has to be kept or deleted.
    Draining,
    Terminated(Termination),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A receive returned this many messages.
    Received(usize),
    /// The current batch was kept or deleted.
    Disposed,
    ShutdownRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Receive,
    Dispose,
    Stop,
}

impl PollerState {
    pub fn termination(&self) -> Option<Termination> {
        match self {
            PollerState::Terminated(t) => Some(*t),
            _ => None,
        }
    }
}

pub fn transition(state: PollerState, event: Event, policy: &PollerPolicy) -> (PollerState, Action) {
    use PollerState::*;

    match (state, event) {
        (Terminated(t), _) => (Terminated(t), Action::Stop),
        (_, Event::ShutdownRequested) => (Terminated(Termination::Cancelled), Action::Stop),

        (_, Event::Received(0)) => {
            let streak = match state {
                EmptyStreak(n) => n + 1,
                _ => 1,
            };
            if streak >= policy.empty_receive_threshold.max(1) {
                (Terminated(Termination::QueueEmpty), Action::Stop)
            } else {
                // no backoff between empty receives
                (EmptyStreak(streak), Action::Receive)
            }
        }
        (_, Event::Received(_)) => (Draining, Action::Dispose),

        (Draining, Event::Disposed) => match policy.mode {
            DrainMode::OneBatch => (Terminated(Termination::BatchLimit), Action::Stop),
            DrainMode::UntilEmpty => (Polling, Action::Receive),
        },
        // nothing was held; keep polling
        (s, Event::Disposed) => (s, Action::Receive),
    }
}
