// Warehouse session trait, the only primitive the reconciliation core needs
use crate::error::SyncError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Kind of statement issued against the warehouse, carried into errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    ConnectionCheck,
    DescribeIntegration,
    CreateIntegration,
    DropIntegration,
    CreateFunction,
    DropFunction,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::ConnectionCheck => "CONNECTION CHECK",
            StatementKind::DescribeIntegration => "DESCRIBE INTEGRATION",
            StatementKind::CreateIntegration => "CREATE INTEGRATION",
            StatementKind::DropIntegration => "DROP INTEGRATION",
            StatementKind::CreateFunction => "CREATE FUNCTION",
            StatementKind::DropFunction => "DROP FUNCTION",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully rendered statement plus the object it targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    pub object: String,
    pub sql: String,
}

impl Statement {
    pub fn new(kind: StatementKind, object: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            kind,
            object: object.into(),
            sql: sql.into(),
        }
    }

    /// Build the error reported when the warehouse rejects this statement
    pub fn rejected(&self, code: impl Into<String>, message: impl Into<String>) -> SyncError {
        SyncError::Statement {
            kind: self.kind,
            object: self.object.clone(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Statement execution result
#[derive(Debug, Clone, Default)]
pub struct StatementResult {
    pub rows: Vec<Value>,
    pub execution_time_ms: u64,
}

/// A live warehouse session.
///
/// Statements are issued one at a time; callers never execute concurrently
/// against the same session.
#[async_trait::async_trait]
pub trait WarehouseSession: Send + Sync {
    /// Execute a single statement and return its rows
    async fn execute(&self, statement: &Statement) -> Result<StatementResult, SyncError>;
}
