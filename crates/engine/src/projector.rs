//! Status projector
//!
//! Pure function from (agent table, event) to the next agent table.
//! Later events win per agent, except that an agent in a terminal state
//! (`Completed`/`Errored`) is never moved back to `Waiting`/`Running`.

use crate::decoder::{Event, EventKind};
use crate::session::{AgentState, AgentTable};

pub fn project(table: &AgentTable, event: &Event) -> AgentTable {
    let mut next = table.clone();

    match &event.kind {
        // The pipeline commits to running every agent at once.
        EventKind::AnalysisStarted => {
            for status in table.iter() {
                if !status.state.is_terminal() {
                    next.set(status.name, AgentState::Running);
                }
            }
        }

        // Only Waiting -> Running; duplicates and late starts are no-ops.
        EventKind::AgentStarted { agent } => {
            if *next.state(*agent) == AgentState::Waiting {
                next.set(*agent, AgentState::Running);
            }
        }

        // Repeated completions overwrite the metadata.
        EventKind::AgentCompleted {
            agent,
            findings_count,
            execution_time,
        } => {
            next.set(
                *agent,
                AgentState::Completed {
                    findings_count: *findings_count,
                    execution_time_seconds: *execution_time,
                },
            );
        }

        EventKind::Error { agent: Some(agent) } => {
            next.set(*agent, AgentState::Errored);
        }

        EventKind::Error { agent: None }
        | EventKind::FetchStarted
        | EventKind::FetchCompleted
        | EventKind::AnalysisCompleted
        | EventKind::Malformed { .. }
        | EventKind::Other(_) => {}
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewdock_protocol::AgentName;

    fn event(kind: EventKind) -> Event {
        Event {
            agent: match &kind {
                EventKind::AgentStarted { agent } => Some(*agent),
                EventKind::AgentCompleted { agent, .. } => Some(*agent),
                EventKind::Error { agent } => *agent,
                _ => None,
            },
            kind,
            message: String::new(),
            payload: None,
            timestamp: "0Z".to_string(),
        }
    }

    fn completed(agent: AgentName, findings_count: u32, execution_time: f64) -> Event {
        event(EventKind::AgentCompleted {
            agent,
            findings_count,
            execution_time,
        })
    }

    #[test]
    fn analysis_started_runs_every_agent() {
        let table = project(&AgentTable::new(), &event(EventKind::AnalysisStarted));
        assert!(table.iter().all(|s| s.state == AgentState::Running));
    }

    #[test]
    fn analysis_started_does_not_regress_terminal_agents() {
        let mut table = AgentTable::new();
        table.set(AgentName::Security, AgentState::Errored);
        let table = project(&table, &completed(AgentName::Testing, 1, 1.0));

        let table = project(&table, &event(EventKind::AnalysisStarted));
        assert_eq!(*table.state(AgentName::Security), AgentState::Errored);
        assert!(table.state(AgentName::Testing).is_terminal());
        assert_eq!(*table.state(AgentName::Standards), AgentState::Running);
    }

    #[test]
    fn agent_started_only_moves_waiting_agents() {
        let started = event(EventKind::AgentStarted {
            agent: AgentName::Performance,
        });

        let table = project(&AgentTable::new(), &started);
        assert_eq!(*table.state(AgentName::Performance), AgentState::Running);
        assert_eq!(*table.state(AgentName::Security), AgentState::Waiting);

        let done = project(&table, &completed(AgentName::Performance, 0, 1.0));
        let after_dup = project(&done, &started);
        assert_eq!(after_dup, done);
    }

    #[test]
    fn duplicate_completion_is_idempotent() {
        let once = project(&AgentTable::new(), &completed(AgentName::Security, 2, 3.5));
        let twice = project(&once, &completed(AgentName::Security, 2, 3.5));
        assert_eq!(once, twice);
    }

    #[test]
    fn later_completion_overwrites_metadata() {
        let first = project(&AgentTable::new(), &completed(AgentName::Security, 2, 3.5));
        let second = project(&first, &completed(AgentName::Security, 5, 4.0));
        assert_eq!(
            *second.state(AgentName::Security),
            AgentState::Completed {
                findings_count: 5,
                execution_time_seconds: 4.0,
            }
        );
    }

    #[test]
    fn scoped_error_marks_one_agent() {
        let running = project(&AgentTable::new(), &event(EventKind::AnalysisStarted));
        let table = project(
            &running,
            &event(EventKind::Error {
                agent: Some(AgentName::Documentation),
            }),
        );
        assert_eq!(*table.state(AgentName::Documentation), AgentState::Errored);
        assert_eq!(
            table.iter().filter(|s| s.state == AgentState::Running).count(),
            AgentName::COUNT - 1
        );
    }

    #[test]
    fn session_wide_error_and_other_kinds_leave_table_alone() {
        let running = project(&AgentTable::new(), &event(EventKind::AnalysisStarted));
        for kind in [
            EventKind::Error { agent: None },
            EventKind::FetchStarted,
            EventKind::FetchCompleted,
            EventKind::AnalysisCompleted,
            EventKind::Malformed {
                reason: "bad".into(),
            },
            EventKind::Other("agent_thinking".into()),
        ] {
            assert_eq!(project(&running, &event(kind)), running);
        }
    }
}
