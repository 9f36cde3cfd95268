// Reconciliation pass reports, served by /api/status

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassOutcome {
    /// Enumeration succeeded; individual installs may still have failed.
    Ok,
    /// Enumeration failed; nothing was installed.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub outcome: PassOutcome,
    /// Records produced by enumeration.
    pub records: usize,
    pub shaped: usize,
    pub failed: usize,
    /// Enumeration error, or the last install error.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub passes_total: u64,
    pub last_pass: Option<PassReport>,
}
