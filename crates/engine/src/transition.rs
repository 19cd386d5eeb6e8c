//! Pure session phase transitions
//!
//! `transition(phase, input) -> phase` holds every rule for how the
//! session-wide phase moves. No IO or locking, so it is unit-testable on
//! its own. Combinations not listed leave the phase unchanged.

use crate::decoder::{Event, EventKind};
use crate::session::{AgentState, AgentTable, SessionPhase};

// ---------------------------------------------------------------------------
// PhaseInput: everything that can move the phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum PhaseInput<'a> {
    /// A new session was requested (implies reset of the previous one)
    SessionStarted,
    /// Transport reported the connection open
    TransportOpened,
    /// Transport failed to connect or dropped
    TransportFailed,
    /// Transport closed by the peer
    TransportClosed,
    /// A decoded pipeline event
    Event(&'a EventKind),
    /// Explicit reset / cancel
    Reset,
}

/// Pure, synchronous phase transition.
pub fn transition(phase: SessionPhase, input: PhaseInput<'_>) -> SessionPhase {
    use SessionPhase::*;

    match input {
        PhaseInput::Reset => return Idle,
        PhaseInput::SessionStarted => return Connecting,
        _ => {}
    }

    if phase.is_terminal() {
        return phase;
    }

    match (phase, input) {
        (Connecting, PhaseInput::TransportOpened) => Open,

        // A close before Completed is always unexpected.
        (_, PhaseInput::TransportFailed) | (_, PhaseInput::TransportClosed) => Failed,

        (_, PhaseInput::Event(kind)) => match (phase, kind) {
            (_, EventKind::Error { agent: None }) => Failed,
            (Open, EventKind::FetchStarted) => Analyzing,
            (Open | Analyzing, EventKind::AnalysisStarted) => Analyzing,
            (Analyzing, EventKind::AnalysisCompleted) => Completed,
            _ => phase,
        },

        _ => phase,
    }
}

/// Whether `event` may update the agent table in `phase`.
///
/// After `Failed` nothing is applied. After `Completed` only a catch-up
/// `agent_completed` for an agent still `Running` is accepted.
pub fn accepts_agent_update(phase: SessionPhase, agents: &AgentTable, event: &Event) -> bool {
    match phase {
        SessionPhase::Failed => false,
        SessionPhase::Completed => match &event.kind {
            EventKind::AgentCompleted { agent, .. } => {
                *agents.state(*agent) == AgentState::Running
            }
            _ => false,
        },
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use reviewdock_protocol::AgentName;
    use SessionPhase::*;

    const ALL_PHASES: [SessionPhase; 6] = [Idle, Connecting, Open, Analyzing, Completed, Failed];

    fn all_event_kinds() -> Vec<EventKind> {
        vec![
            EventKind::FetchStarted,
            EventKind::FetchCompleted,
            EventKind::AnalysisStarted,
            EventKind::AgentStarted {
                agent: AgentName::Security,
            },
            EventKind::AgentCompleted {
                agent: AgentName::Security,
                findings_count: 1,
                execution_time: 1.0,
            },
            EventKind::AnalysisCompleted,
            EventKind::Error { agent: None },
            EventKind::Error {
                agent: Some(AgentName::Testing),
            },
            EventKind::Malformed {
                reason: "bad".into(),
            },
            EventKind::Other("agent_thinking".into()),
        ]
    }

    fn completed_event(agent: AgentName) -> Event {
        Event {
            kind: EventKind::AgentCompleted {
                agent,
                findings_count: 0,
                execution_time: 0.5,
            },
            agent: Some(agent),
            message: String::new(),
            payload: None,
            timestamp: "0Z".into(),
        }
    }

    #[test]
    fn connecting_opens_on_transport_open() {
        assert_eq!(transition(Connecting, PhaseInput::TransportOpened), Open);
        assert_eq!(transition(Analyzing, PhaseInput::TransportOpened), Analyzing);
    }

    #[test]
    fn open_moves_to_analyzing_on_fetch_or_analysis_start() {
        assert_eq!(
            transition(Open, PhaseInput::Event(&EventKind::FetchStarted)),
            Analyzing
        );
        assert_eq!(
            transition(Open, PhaseInput::Event(&EventKind::AnalysisStarted)),
            Analyzing
        );
        assert_eq!(
            transition(Analyzing, PhaseInput::Event(&EventKind::AnalysisStarted)),
            Analyzing
        );
        // Not listed for Connecting
        assert_eq!(
            transition(Connecting, PhaseInput::Event(&EventKind::AnalysisStarted)),
            Connecting
        );
    }

    #[test]
    fn analysis_completed_only_completes_from_analyzing() {
        assert_eq!(
            transition(Analyzing, PhaseInput::Event(&EventKind::AnalysisCompleted)),
            Completed
        );
        assert_eq!(
            transition(Open, PhaseInput::Event(&EventKind::AnalysisCompleted)),
            Open
        );
    }

    #[test]
    fn session_wide_error_fails_any_live_phase() {
        for phase in [Idle, Connecting, Open, Analyzing] {
            assert_eq!(
                transition(phase, PhaseInput::Event(&EventKind::Error { agent: None })),
                Failed
            );
        }
    }

    #[test]
    fn agent_scoped_error_keeps_phase() {
        let kind = EventKind::Error {
            agent: Some(AgentName::Security),
        };
        assert_eq!(transition(Analyzing, PhaseInput::Event(&kind)), Analyzing);
    }

    #[test]
    fn transport_loss_fails_live_sessions() {
        for phase in [Connecting, Open, Analyzing] {
            assert_eq!(transition(phase, PhaseInput::TransportFailed), Failed);
            assert_eq!(transition(phase, PhaseInput::TransportClosed), Failed);
        }
        assert_eq!(transition(Completed, PhaseInput::TransportClosed), Completed);
    }

    #[test]
    fn terminal_phases_are_sticky_until_reset() {
        for phase in [Completed, Failed] {
            for kind in all_event_kinds() {
                assert_eq!(transition(phase, PhaseInput::Event(&kind)), phase);
            }
            assert_eq!(transition(phase, PhaseInput::TransportOpened), phase);
            assert_eq!(transition(phase, PhaseInput::TransportFailed), phase);
            assert_eq!(transition(phase, PhaseInput::Reset), Idle);
        }
    }

    #[test]
    fn reset_and_start_apply_from_every_phase() {
        for phase in ALL_PHASES {
            assert_eq!(transition(phase, PhaseInput::Reset), Idle);
            assert_eq!(transition(phase, PhaseInput::SessionStarted), Connecting);
        }
    }

    #[test]
    fn agent_updates_blocked_after_failure() {
        let agents = AgentTable::new();
        assert!(!accepts_agent_update(
            Failed,
            &agents,
            &completed_event(AgentName::Security)
        ));
        assert!(accepts_agent_update(
            Analyzing,
            &agents,
            &completed_event(AgentName::Security)
        ));
    }

    #[test]
    fn late_completion_accepted_only_for_running_agent() {
        let mut agents = AgentTable::new();
        agents.set(AgentName::Testing, AgentState::Running);

        assert!(accepts_agent_update(
            Completed,
            &agents,
            &completed_event(AgentName::Testing)
        ));
        // Still Waiting: not a catch-up
        assert!(!accepts_agent_update(
            Completed,
            &agents,
            &completed_event(AgentName::Security)
        ));
    }
}
