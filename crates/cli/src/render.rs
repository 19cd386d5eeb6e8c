//! Terminal rendering of session snapshots.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use console::style;
use reviewdock_engine::{AgentState, AgentStatus, Event, EventKind, SessionPhase, SessionSnapshot};
use reviewdock_protocol::{AgentName, AnalysisResult, AnalysisStatus, Severity};

/// How many findings the final summary lists
const TOP_FINDINGS: usize = 10;

/// Prints each new piece of a snapshot stream exactly once.
pub struct Renderer {
    json: bool,
    session_id: Option<String>,
    printed: usize,
    last_phase: Option<SessionPhase>,
}

impl Renderer {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            session_id: None,
            printed: 0,
            last_phase: None,
        }
    }

    pub fn render(&mut self, snap: &SessionSnapshot) {
        if self.json {
            match serde_json::to_string(snap) {
                Ok(line) => println!("{line}"),
                Err(err) => eprintln!("failed to encode snapshot: {err}"),
            }
            return;
        }

        if snap.session_id != self.session_id {
            self.session_id = snap.session_id.clone();
            self.printed = 0;
            self.last_phase = None;
        }

        for event in snap.transcript.iter().skip(self.printed) {
            println!("{}", event_line(event));
        }
        self.printed = snap.transcript.len();

        if self.last_phase != Some(snap.phase) {
            self.last_phase = Some(snap.phase);
            println!("  {} {}", style("phase:").dim(), phase_label(snap.phase));
            if matches!(snap.phase, SessionPhase::Analyzing) || snap.phase.is_terminal() {
                println!("{}", agent_table(&snap.agents, &snap.transcript));
            }
        }
    }

    /// Final summary once the session has ended.
    pub fn finish(&self, snap: &SessionSnapshot) {
        if self.json {
            return;
        }
        match snap.phase {
            SessionPhase::Completed => {
                for line in summary_lines(snap) {
                    println!("{line}");
                }
            }
            SessionPhase::Failed => {
                let message = snap.last_error.as_deref().unwrap_or("Analysis failed");
                println!();
                println!("  {} {}", style("Analysis failed:").red().bold(), message);
            }
            phase => {
                println!();
                println!("  Session ended while {phase}.");
            }
        }
        println!();
    }
}

pub fn event_line(event: &Event) -> String {
    let tag = match &event.kind {
        EventKind::Error { .. } => style("[ERROR]").red().bold(),
        EventKind::AgentCompleted { .. }
            if event.reported_status() == Some(AnalysisStatus::Failed) =>
        {
            style("[FAIL] ").red()
        }
        EventKind::Malformed { .. } => style("[DROP] ").yellow(),
        kind if kind.as_str().ends_with("_completed") => style("[DONE] ").green(),
        kind if kind.as_str().ends_with("_started") => style("[START]").cyan(),
        _ => style("[EVENT]").dim(),
    };
    let agent = event
        .agent
        .map(|a| format!(" ({a})"))
        .unwrap_or_default();
    format!("  {tag}{agent} {}", event.message)
}

fn phase_label(phase: SessionPhase) -> String {
    let label = phase.as_str();
    match phase {
        SessionPhase::Completed => style(label).green().bold().to_string(),
        SessionPhase::Failed => style(label).red().bold().to_string(),
        SessionPhase::Analyzing => style(label).cyan().to_string(),
        _ => label.to_string(),
    }
}

/// Whether the latest completion recorded for `agent` was reported as failed.
fn reported_failed(agent: AgentName, transcript: &[Event]) -> bool {
    transcript
        .iter()
        .rev()
        .find(|e| matches!(e.kind, EventKind::AgentCompleted { agent: a, .. } if a == agent))
        .is_some_and(|e| e.reported_status() == Some(AnalysisStatus::Failed))
}

pub fn agent_table(agents: &[AgentStatus], transcript: &[Event]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Agent", "State", "Findings", "Time"]);

    for agent in agents {
        let failed = matches!(agent.state, AgentState::Completed { .. })
            && reported_failed(agent.name, transcript);
        let (label, color) = match agent.state {
            AgentState::Waiting => ("waiting", Color::DarkGrey),
            AgentState::Running => ("running", Color::Cyan),
            AgentState::Completed { .. } if failed => ("completed (failed)", Color::Red),
            AgentState::Completed { .. } => ("completed", Color::Green),
            AgentState::Errored => ("errored", Color::Red),
        };
        table.add_row(vec![
            Cell::new(agent.name.as_str()),
            Cell::new(label).fg(color),
            Cell::new(
                agent
                    .findings_count()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".into()),
            ),
            Cell::new(
                agent
                    .execution_time_seconds()
                    .map(|t| format!("{t:.1}s"))
                    .unwrap_or_else(|| "-".into()),
            ),
        ]);
    }
    table
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Red,
        Severity::High => Color::DarkYellow,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Blue,
    }
}

/// Summary of the final result. Falls back to the agent table when the
/// payload does not match the expected result shape.
pub fn summary_lines(snap: &SessionSnapshot) -> Vec<String> {
    let mut lines = vec![String::new(), format!("  {}", style("FINAL RESULT").bold())];

    let result = snap
        .final_result
        .as_ref()
        .and_then(|payload| AnalysisResult::from_payload(payload).ok());
    let Some(result) = result else {
        let total: u32 = snap.agents.iter().filter_map(|a| a.findings_count()).sum();
        lines.push(format!("  Total findings: {total}"));
        return lines;
    };

    if !result.pr_data.title.is_empty() {
        lines.push(format!(
            "  {}/{} #{}: {}",
            result.pr_data.owner, result.pr_data.repo, result.pr_data.pr_number, result.pr_data.title
        ));
    }
    lines.push(format!("  Total findings: {}", result.total_findings));

    let mut counts = Table::new();
    counts
        .load_preset(UTF8_FULL)
        .set_header(vec!["Critical", "High", "Medium", "Low"]);
    counts.add_row(vec![
        Cell::new(result.critical_count).fg(severity_color(Severity::Critical)),
        Cell::new(result.high_count).fg(severity_color(Severity::High)),
        Cell::new(result.medium_count).fg(severity_color(Severity::Medium)),
        Cell::new(result.low_count).fg(severity_color(Severity::Low)),
    ]);
    lines.push(counts.to_string());

    if !result.agent_results.is_empty() {
        let mut agents = Table::new();
        agents
            .load_preset(UTF8_FULL)
            .set_header(vec!["Agent", "Status", "Findings", "Time", "Model"]);
        for agent in &result.agent_results {
            let status = match agent.status {
                AnalysisStatus::Completed => Cell::new("completed").fg(Color::Green),
                AnalysisStatus::Failed => Cell::new("failed").fg(Color::Red),
                AnalysisStatus::InProgress => Cell::new("in progress"),
                AnalysisStatus::Pending => Cell::new("pending"),
            };
            agents.add_row(vec![
                Cell::new(agent.agent.as_str()),
                status,
                Cell::new(agent.findings.len()),
                Cell::new(format!("{:.1}s", agent.execution_time)),
                Cell::new(&agent.model_used),
            ]);
        }
        lines.push(agents.to_string());
    }

    for finding in result.findings_by_severity().into_iter().take(TOP_FINDINGS) {
        let location = match (&finding.file_path, finding.line_number) {
            (Some(path), Some(line)) => format!(" {path}:{line}"),
            (Some(path), None) => format!(" {path}"),
            _ => String::new(),
        };
        lines.push(format!(
            "  [{}] {}{} ({})",
            finding.severity.as_str().to_uppercase(),
            finding.title,
            location,
            finding.agent
        ));
    }

    lines.push(format!("  Time: {:.1}s", result.total_execution_time));
    lines
}
