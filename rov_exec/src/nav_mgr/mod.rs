//! # Navigation manager
//!
//! Owns the navigation state of the rover and is the only place it can be
//! changed. Every transition is logged and kept in a bounded history.
//!
//! `ERROR` and `EMERGENCY_STOP` are sticky: while in either the only way
//! out is [`NavMgr::clear_error`], and the only transition accepted is an
//! escalation to `EMERGENCY_STOP`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

pub use comms_if::tm::NavState;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of transitions kept in the history.
pub const MAX_HISTORY: usize = 20;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Why a transition happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionReason {
    pub kind: ReasonKind,
    pub detail: Option<String>,
}

/// A recorded state transition.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub timestamp: DateTime<Utc>,
    pub from: NavState,
    pub to: NavState,
    pub reason: TransitionReason,
}

/// The navigation state and its history.
#[derive(Debug)]
pub struct NavMgr {
    state: NavState,
    history: VecDeque<Transition>,
    error_message: Option<String>,
    emergency_cause: Option<EmergencyCause>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Kinds of transition reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReasonKind {
    MissionLoaded,
    MissionStarted,
    MissionResumed,
    HeadingAligned,
    WaypointReached,
    NextWaypoint,
    MissionComplete,
    OperatorStop,
    EmergencyStop(EmergencyCause),
    Fault,
    ErrorCleared,
}

/// Causes of an emergency stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmergencyCause {
    /// The position source went silent for longer than the watchdog timeout
    ConnectionLost,

    /// The RTK solution degraded below the minimum while moving
    RtkLost,

    /// Requested by the operator
    Operator,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TransitionReason {
    pub fn new(kind: ReasonKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn with_detail<S: Into<String>>(kind: ReasonKind, detail: S) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(d) => write!(f, "{:?}: {}", self.kind, d),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl Default for NavMgr {
    fn default() -> Self {
        Self {
            state: NavState::Idle,
            history: VecDeque::with_capacity(MAX_HISTORY),
            error_message: None,
            emergency_cause: None,
        }
    }
}

impl NavMgr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    /// Transition to a new state.
    ///
    /// Transitioning to the current state is a no-op. Returns false if the
    /// transition was refused because the rover is in `ERROR` or
    /// `EMERGENCY_STOP`.
    pub fn set_state(&mut self, new_state: NavState, reason: TransitionReason) -> bool {
        if new_state == self.state {
            return true;
        }

        if !self.is_operational() && new_state != NavState::EmergencyStop {
            warn!(
                "Refusing transition {} -> {} ({}), clear the {} first",
                self.state, new_state, reason, self.state
            );
            return false;
        }

        self.transition(new_state, reason);
        true
    }

    /// Enter `EMERGENCY_STOP`. Accepted from any state.
    pub fn emergency_stop(&mut self, cause: EmergencyCause, detail: &str) {
        error!("EMERGENCY STOP ({:?}): {}", cause, detail);

        self.error_message = Some(detail.to_string());
        self.emergency_cause = Some(cause);

        if self.state != NavState::EmergencyStop {
            self.transition(
                NavState::EmergencyStop,
                TransitionReason::with_detail(ReasonKind::EmergencyStop(cause), detail),
            );
        }
    }

    /// Enter `ERROR` for a recoverable fault.
    ///
    /// Ignored while in `EMERGENCY_STOP`, the emergency takes precedence.
    pub fn set_error(&mut self, message: &str) {
        if self.state == NavState::EmergencyStop {
            warn!("Ignoring error while in emergency stop: {}", message);
            return;
        }

        error!("Navigation error: {}", message);
        self.error_message = Some(message.to_string());

        if self.state != NavState::Error {
            self.transition(
                NavState::Error,
                TransitionReason::with_detail(ReasonKind::Fault, message),
            );
        }
    }

    /// Leave `ERROR` or `EMERGENCY_STOP` and return to `IDLE`.
    ///
    /// Returns false if there was nothing to clear.
    pub fn clear_error(&mut self) -> bool {
        if self.is_operational() {
            return false;
        }

        info!("Clearing {} ({:?})", self.state, self.error_message);

        self.error_message = None;
        self.emergency_cause = None;
        self.transition(NavState::Idle, TransitionReason::new(ReasonKind::ErrorCleared));

        true
    }

    /// False only in `ERROR` and `EMERGENCY_STOP`.
    pub fn is_operational(&self) -> bool {
        !matches!(self.state, NavState::Error | NavState::EmergencyStop)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn emergency_cause(&self) -> Option<EmergencyCause> {
        self.emergency_cause
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Transition> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn transition(&mut self, new_state: NavState, reason: TransitionReason) {
        info!("State transition: {} -> {} ({})", self.state, new_state, reason);

        if self.history.len() >= MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(Transition {
            timestamp: Utc::now(),
            from: self.state,
            to: new_state,
            reason,
        });

        self.state = new_state;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn reason() -> TransitionReason {
        TransitionReason::new(ReasonKind::MissionStarted)
    }

    #[test]
    fn test_same_state_is_noop() {
        let mut nm = NavMgr::new();
        assert!(nm.set_state(NavState::Idle, reason()));
        assert_eq!(nm.history_len(), 0);

        assert!(nm.set_state(NavState::Rotating, reason()));
        assert!(nm.set_state(NavState::Rotating, reason()));
        assert_eq!(nm.history_len(), 1);
    }

    #[test]
    fn test_history_bounded() {
        let mut nm = NavMgr::new();

        for i in 0..50 {
            let s = if i % 2 == 0 {
                NavState::Rotating
            } else {
                NavState::Driving
            };
            nm.set_state(s, reason());
        }

        assert_eq!(nm.history_len(), MAX_HISTORY);

        // Oldest entries were dropped, the newest is last
        let last = nm.history().last().unwrap();
        assert_eq!(last.to, NavState::Driving);
        assert_eq!(last.from, NavState::Rotating);
    }

    #[test]
    fn test_emergency_is_sticky() {
        let mut nm = NavMgr::new();
        nm.set_state(NavState::Driving, reason());

        nm.emergency_stop(EmergencyCause::ConnectionLost, "GPS connection timeout (31.0s)");
        assert_eq!(nm.state(), NavState::EmergencyStop);
        assert!(!nm.is_operational());
        assert_eq!(nm.emergency_cause(), Some(EmergencyCause::ConnectionLost));

        // Nothing but clear_error leaves the emergency stop
        for s in [
            NavState::Idle,
            NavState::Rotating,
            NavState::Driving,
            NavState::ReachedWaypoint,
            NavState::MissionComplete,
            NavState::Error,
        ]
        .iter()
        {
            assert!(!nm.set_state(*s, reason()));
            assert_eq!(nm.state(), NavState::EmergencyStop);
        }

        nm.set_error("motor fault");
        assert_eq!(nm.state(), NavState::EmergencyStop);

        assert!(nm.clear_error());
        assert_eq!(nm.state(), NavState::Idle);
        assert!(nm.is_operational());
        assert_eq!(nm.error_message(), None);

        let last = nm.history().last().unwrap();
        assert_eq!(last.reason.kind, ReasonKind::ErrorCleared);
    }

    #[test]
    fn test_error_escalates_to_emergency() {
        let mut nm = NavMgr::new();
        nm.set_error("heading sensor lost");
        assert_eq!(nm.state(), NavState::Error);
        assert_eq!(nm.error_message(), Some("heading sensor lost"));

        assert!(nm.set_state(
            NavState::EmergencyStop,
            TransitionReason::new(ReasonKind::EmergencyStop(EmergencyCause::Operator))
        ));
        assert_eq!(nm.state(), NavState::EmergencyStop);
    }

    #[test]
    fn test_clear_error_when_operational() {
        let mut nm = NavMgr::new();
        assert!(!nm.clear_error());
        assert_eq!(nm.history_len(), 0);
    }

    #[test]
    fn test_transition_records_reason() {
        let mut nm = NavMgr::new();
        nm.set_state(
            NavState::Rotating,
            TransitionReason::with_detail(ReasonKind::NextWaypoint, "waypoint 2/3"),
        );

        let t = nm.history().next().unwrap();
        assert_eq!(t.from, NavState::Idle);
        assert_eq!(t.to, NavState::Rotating);
        assert_eq!(t.reason.kind, ReasonKind::NextWaypoint);
        assert_eq!(t.reason.detail.as_deref(), Some("waypoint 2/3"));
    }
}
