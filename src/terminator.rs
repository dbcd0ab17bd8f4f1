//! Escalating termination protocol.
//!
//! One kill attempt is a short state machine: deliver the graceful signal,
//! give the target a bounded grace window to exit on its own, then force it
//! down and confirm within a second bounded window. The machine itself is
//! pure — every wait is an explicit suspension point the async drivers turn
//! into short sleeps — so tests drive it synchronously without wall-clock
//! delays.
//!
//! Two short circuits skip escalation entirely: a target that is already gone
//! when the graceful signal is sent counts as success, and a permission
//! failure is terminal because forcing would fail the same way.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;

use crate::control::{ProcessControl, SignalError};

/// Grace window after the graceful signal.
pub const GRACE_WAIT: Duration = Duration::from_millis(1500);
/// Confirmation window after the forceful signal.
pub const FORCE_WAIT: Duration = Duration::from_millis(1000);
/// Liveness poll cadence inside either window.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which signal a deliver step refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Graceful,
    Forceful,
}

/// How a successful kill concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillMethod {
    /// The target exited inside the grace window.
    Graceful,
    /// The forceful signal took it down.
    Forceful,
    /// The target was gone before anything was delivered.
    AlreadyGone,
}

/// Why a kill failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillFailure {
    PermissionDenied,
    /// Still running after the forceful signal and its window.
    StillAlive,
    /// Signal delivery failed outright.
    Undeliverable,
    /// The target was the dashboard itself.
    SelfTarget,
}

/// Terminal result of one kill attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    Succeeded(KillMethod),
    Failed(KillFailure),
}

/// Next obligation of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStep {
    /// Deliver this signal, then report the result via
    /// [`Escalation::delivered`].
    Deliver(SignalKind),
    /// Suspend for this long, observe liveness, and step again.
    Wait(Duration),
    /// The attempt is over.
    Done(KillOutcome),
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    DeliverGraceful,
    GraceWait { waited: Duration },
    DeliverForceful,
    ForceWait { waited: Duration },
    Done(KillOutcome),
}

/// The kill state machine. Terminal in one cycle: it never re-enters an
/// earlier phase.
#[derive(Debug)]
pub struct Escalation {
    phase: Phase,
}

impl Default for Escalation {
    fn default() -> Self {
        Self::new()
    }
}

impl Escalation {
    pub fn new() -> Self {
        Self {
            phase: Phase::DeliverGraceful,
        }
    }

    /// Advances the machine given the latest liveness observation.
    pub fn step(&mut self, alive: bool) -> EscalationStep {
        match self.phase {
            Phase::DeliverGraceful => EscalationStep::Deliver(SignalKind::Graceful),
            Phase::GraceWait { waited } => {
                if !alive {
                    self.finish(KillOutcome::Succeeded(KillMethod::Graceful))
                } else if waited >= GRACE_WAIT {
                    self.phase = Phase::DeliverForceful;
                    EscalationStep::Deliver(SignalKind::Forceful)
                } else {
                    self.phase = Phase::GraceWait {
                        waited: waited + POLL_INTERVAL,
                    };
                    EscalationStep::Wait(POLL_INTERVAL)
                }
            }
            Phase::DeliverForceful => EscalationStep::Deliver(SignalKind::Forceful),
            Phase::ForceWait { waited } => {
                if !alive {
                    self.finish(KillOutcome::Succeeded(KillMethod::Forceful))
                } else if waited >= FORCE_WAIT {
                    self.finish(KillOutcome::Failed(KillFailure::StillAlive))
                } else {
                    self.phase = Phase::ForceWait {
                        waited: waited + POLL_INTERVAL,
                    };
                    EscalationStep::Wait(POLL_INTERVAL)
                }
            }
            Phase::Done(outcome) => EscalationStep::Done(outcome),
        }
    }

    /// Feeds back the result of a requested delivery.
    pub fn delivered(&mut self, kind: SignalKind, result: Result<(), SignalError>) {
        self.phase = match (kind, result) {
            (SignalKind::Graceful, Ok(())) => Phase::GraceWait {
                waited: Duration::ZERO,
            },
            (SignalKind::Graceful, Err(SignalError::AlreadyGone)) => {
                Phase::Done(KillOutcome::Succeeded(KillMethod::AlreadyGone))
            }
            (_, Err(SignalError::PermissionDenied)) => {
                Phase::Done(KillOutcome::Failed(KillFailure::PermissionDenied))
            }
            // Graceful delivery failed for an unknown reason: waiting is
            // pointless, move straight to force.
            (SignalKind::Graceful, Err(SignalError::Other)) => Phase::DeliverForceful,
            (SignalKind::Forceful, Ok(())) => Phase::ForceWait {
                waited: Duration::ZERO,
            },
            // Gone by the time force was attempted: the graceful signal
            // evidently took effect inside the grace window.
            (SignalKind::Forceful, Err(SignalError::AlreadyGone)) => {
                Phase::Done(KillOutcome::Succeeded(KillMethod::Graceful))
            }
            (SignalKind::Forceful, Err(SignalError::Other)) => {
                Phase::Done(KillOutcome::Failed(KillFailure::Undeliverable))
            }
        };
    }

    fn finish(&mut self, outcome: KillOutcome) -> EscalationStep {
        self.phase = Phase::Done(outcome);
        EscalationStep::Done(outcome)
    }
}

/// Kills an arbitrary PID, polling liveness through the platform control.
pub async fn kill_pid(control: &Arc<dyn ProcessControl>, pid: u32) -> KillOutcome {
    if pid == control.own_pid() {
        return KillOutcome::Failed(KillFailure::SelfTarget);
    }
    let mut escalation = Escalation::new();
    loop {
        let alive = control.is_alive(pid);
        match escalation.step(alive) {
            EscalationStep::Deliver(kind) => {
                let result = match kind {
                    SignalKind::Graceful => control.signal_graceful(pid),
                    SignalKind::Forceful => control.signal_forceful(pid),
                };
                escalation.delivered(kind, result);
            }
            EscalationStep::Wait(pause) => tokio::time::sleep(pause).await,
            EscalationStep::Done(outcome) => return outcome,
        }
    }
}

/// Kills a supervised child, observing liveness through its own handle so
/// the exit is reaped instead of left to the process table.
pub async fn terminate_child(mut child: Child, control: &Arc<dyn ProcessControl>) -> KillOutcome {
    let Some(pid) = child.id() else {
        // Already reaped by a prior wait.
        let _ = child.wait().await;
        return KillOutcome::Succeeded(KillMethod::AlreadyGone);
    };
    if pid == control.own_pid() {
        return KillOutcome::Failed(KillFailure::SelfTarget);
    }

    let mut escalation = Escalation::new();
    let outcome = loop {
        let alive = matches!(child.try_wait(), Ok(None));
        match escalation.step(alive) {
            EscalationStep::Deliver(kind) => {
                let result = match kind {
                    SignalKind::Graceful => control.signal_graceful(pid),
                    SignalKind::Forceful => control.signal_forceful(pid),
                };
                escalation.delivered(kind, result);
            }
            EscalationStep::Wait(pause) => tokio::time::sleep(pause).await,
            EscalationStep::Done(outcome) => break outcome,
        }
    };
    if matches!(outcome, KillOutcome::Succeeded(_)) {
        let _ = child.wait().await;
    }
    outcome
}

/// Human-readable outcome for notice lines.
pub fn describe(outcome: KillOutcome) -> &'static str {
    match outcome {
        KillOutcome::Succeeded(KillMethod::Graceful) => "terminated gracefully",
        KillOutcome::Succeeded(KillMethod::Forceful) => "force killed",
        KillOutcome::Succeeded(KillMethod::AlreadyGone) => "already gone",
        KillOutcome::Failed(KillFailure::PermissionDenied) => "permission denied",
        KillOutcome::Failed(KillFailure::StillAlive) => "still alive after forced kill",
        KillOutcome::Failed(KillFailure::Undeliverable) => "signal could not be delivered",
        KillOutcome::Failed(KillFailure::SelfTarget) => "refused: target is the dashboard itself",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_waiting(escalation: &mut Escalation) {
        assert_eq!(
            escalation.step(true),
            EscalationStep::Deliver(SignalKind::Graceful)
        );
        escalation.delivered(SignalKind::Graceful, Ok(()));
    }

    #[test]
    fn stubborn_target_gets_force_only_after_full_grace_window() {
        let mut escalation = Escalation::new();
        start_waiting(&mut escalation);

        let mut waited = Duration::ZERO;
        loop {
            match escalation.step(true) {
                EscalationStep::Wait(pause) => waited += pause,
                EscalationStep::Deliver(SignalKind::Forceful) => break,
                other => panic!("unexpected step {:?}", other),
            }
        }
        assert_eq!(waited, GRACE_WAIT);
    }

    #[test]
    fn target_exiting_in_grace_window_succeeds_gracefully() {
        let mut escalation = Escalation::new();
        start_waiting(&mut escalation);

        // A few polls while alive, then the target exits.
        for _ in 0..3 {
            assert!(matches!(escalation.step(true), EscalationStep::Wait(_)));
        }
        assert_eq!(
            escalation.step(false),
            EscalationStep::Done(KillOutcome::Succeeded(KillMethod::Graceful))
        );
        // Terminal: no forceful signal ever gets requested.
        assert_eq!(
            escalation.step(true),
            EscalationStep::Done(KillOutcome::Succeeded(KillMethod::Graceful))
        );
    }

    #[test]
    fn already_gone_short_circuits() {
        let mut escalation = Escalation::new();
        assert_eq!(
            escalation.step(false),
            EscalationStep::Deliver(SignalKind::Graceful)
        );
        escalation.delivered(SignalKind::Graceful, Err(SignalError::AlreadyGone));
        assert_eq!(
            escalation.step(false),
            EscalationStep::Done(KillOutcome::Succeeded(KillMethod::AlreadyGone))
        );
    }

    #[test]
    fn permission_denied_never_escalates() {
        let mut escalation = Escalation::new();
        assert_eq!(
            escalation.step(true),
            EscalationStep::Deliver(SignalKind::Graceful)
        );
        escalation.delivered(SignalKind::Graceful, Err(SignalError::PermissionDenied));
        assert_eq!(
            escalation.step(true),
            EscalationStep::Done(KillOutcome::Failed(KillFailure::PermissionDenied))
        );
    }

    #[test]
    fn survivor_of_force_window_reports_still_alive() {
        let mut escalation = Escalation::new();
        start_waiting(&mut escalation);
        loop {
            match escalation.step(true) {
                EscalationStep::Wait(_) => {}
                EscalationStep::Deliver(SignalKind::Forceful) => break,
                other => panic!("unexpected step {:?}", other),
            }
        }
        escalation.delivered(SignalKind::Forceful, Ok(()));

        let mut waited = Duration::ZERO;
        let outcome = loop {
            match escalation.step(true) {
                EscalationStep::Wait(pause) => waited += pause,
                EscalationStep::Done(outcome) => break outcome,
                other => panic!("unexpected step {:?}", other),
            }
        };
        assert_eq!(waited, FORCE_WAIT);
        assert_eq!(outcome, KillOutcome::Failed(KillFailure::StillAlive));
    }

    #[test]
    fn force_confirms_when_target_dies_in_second_window() {
        let mut escalation = Escalation::new();
        start_waiting(&mut escalation);
        loop {
            match escalation.step(true) {
                EscalationStep::Wait(_) => {}
                EscalationStep::Deliver(SignalKind::Forceful) => break,
                other => panic!("unexpected step {:?}", other),
            }
        }
        escalation.delivered(SignalKind::Forceful, Ok(()));
        assert!(matches!(escalation.step(true), EscalationStep::Wait(_)));
        assert_eq!(
            escalation.step(false),
            EscalationStep::Done(KillOutcome::Succeeded(KillMethod::Forceful))
        );
    }
}
