use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of a trust policy synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicySyncOutcome {
    Updated,
    Unchanged,
}

/// Summary of a completed deploy run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployReport {
    pub run_id: String,
    pub stack_name: String,
    pub integration: String,
    pub endpoint: String,
    pub policy: PolicySyncOutcome,
    pub functions: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// A function DROP that failed during teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDrop {
    pub function: String,
    pub error: String,
}

/// Summary of a completed teardown run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownReport {
    pub run_id: String,
    pub stack_name: String,
    pub integration: String,
    pub dropped_functions: Vec<String>,
    pub failed_drops: Vec<FailedDrop>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl TeardownReport {
    pub fn new(stack_name: impl Into<String>, integration: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            stack_name: stack_name.into(),
            integration: integration.into(),
            dropped_functions: Vec::new(),
            failed_drops: Vec::new(),
            started_at: now,
            completed_at: now,
        }
    }

    pub fn mark_completed(&mut self) {
        self.completed_at = Utc::now();
    }
}
