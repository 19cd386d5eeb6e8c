//! Core types shared across the protocol

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One of the fixed analysis agents run by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    Security,
    Performance,
    Testing,
    Documentation,
    Standards,
}

impl AgentName {
    pub const COUNT: usize = 5;

    /// Every agent, in the order the pipeline reports them.
    pub const ALL: [AgentName; AgentName::COUNT] = [
        AgentName::Security,
        AgentName::Performance,
        AgentName::Testing,
        AgentName::Documentation,
        AgentName::Standards,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Security => "security",
            AgentName::Performance => "performance",
            AgentName::Testing => "testing",
            AgentName::Documentation => "documentation",
            AgentName::Standards => "standards",
        }
    }

    /// Position in `ALL`
    pub fn index(&self) -> usize {
        match self {
            AgentName::Security => 0,
            AgentName::Performance => 1,
            AgentName::Testing => 2,
            AgentName::Documentation => 3,
            AgentName::Standards => 4,
        }
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire string names no known agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAgent(pub String);

impl fmt::Display for UnknownAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown agent '{}'", self.0)
    }
}

impl std::error::Error for UnknownAgent {}

impl FromStr for AgentName {
    type Err = UnknownAgent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentName::ALL
            .into_iter()
            .find(|agent| agent.as_str() == s)
            .ok_or_else(|| UnknownAgent(s.to_string()))
    }
}

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Lifecycle status reported by the pipeline for an agent or a whole analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A single issue found by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub agent: AgentName,
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.8
}

/// A single file touched by the analyzed change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
    #[serde(default)]
    pub patch: String,
}

/// Pull request metadata echoed back in the final result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrData {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub files: Vec<FileChange>,
    #[serde(default)]
    pub raw_diff: String,
}

/// Output of one agent inside the final result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: AgentName,
    pub status: AnalysisStatus,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub model_used: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Typed view of the `analysis_completed` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub pr_data: PrData,
    #[serde(default)]
    pub agent_results: Vec<AgentResult>,
    #[serde(default)]
    pub total_findings: u32,
    #[serde(default)]
    pub critical_count: u32,
    #[serde(default)]
    pub high_count: u32,
    #[serde(default)]
    pub medium_count: u32,
    #[serde(default)]
    pub low_count: u32,
    #[serde(default)]
    pub total_execution_time: f64,
    pub status: AnalysisStatus,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl AnalysisResult {
    /// Parse the opaque result payload into the typed view.
    pub fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(payload)
    }

    /// Findings of every agent, most severe first.
    pub fn findings_by_severity(&self) -> Vec<&Finding> {
        let mut findings: Vec<&Finding> = self
            .agent_results
            .iter()
            .flat_map(|result| result.findings.iter())
            .collect();
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        findings
    }
}
