use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::warehouse::StatementKind;

/// Reconciliation error types
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Statement error: {kind} {object} failed with code {code}: {message}")]
    Statement {
        kind: StatementKind,
        object: String,
        code: String,
        message: String,
    },

    #[error("Integration {integration} is still reported missing (code {code}) after it was created")]
    IntegrationNotVisible { integration: String, code: String },

    #[error("Policy update error: {0}")]
    PolicyUpdate(String),

    #[error("Malformed descriptor: integration {integration} has no {property} property")]
    MalformedDescriptor { integration: String, property: String },

    #[error("Stack output error for {stack}: {message}")]
    StackOutputs { stack: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: {operation} did not complete within {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },

    #[error("Internal error: {0}")]
    Internal(String),

    /// A fatal error raised while reconciling one stack
    #[error("Stack {stack}: {source}")]
    Run {
        stack: String,
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Stable machine-readable code, used in run reports
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Connection(_) => "CONNECTION_ERROR",
            SyncError::Statement { .. } => "STATEMENT_ERROR",
            SyncError::IntegrationNotVisible { .. } => "INTEGRATION_NOT_VISIBLE",
            SyncError::PolicyUpdate(_) => "POLICY_UPDATE_ERROR",
            SyncError::MalformedDescriptor { .. } => "MALFORMED_DESCRIPTOR",
            SyncError::StackOutputs { .. } => "STACK_OUTPUTS_ERROR",
            SyncError::Validation(_) => "VALIDATION_ERROR",
            SyncError::Config(_) => "CONFIG_ERROR",
            SyncError::Timeout { .. } => "TIMEOUT",
            SyncError::Internal(_) => "INTERNAL_ERROR",
            SyncError::Run { source, .. } => source.code(),
        }
    }

    /// Attach the stack the failing run was reconciling
    pub fn in_stack(self, stack: &str) -> Self {
        match self {
            SyncError::Run { .. } => self,
            other => SyncError::Run {
                stack: stack.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Build the operator-facing error detail
    pub fn to_detail(&self) -> ErrorDetail {
        let detail = ErrorDetail::new(self.code(), self.to_string());
        match self {
            SyncError::Statement { kind, object, .. } => {
                detail.with_details(format!("{} {}", kind, object))
            }
            SyncError::Connection(_) => detail.with_details(
                "Check the warehouse account, user and token settings and re-run.",
            ),
            SyncError::IntegrationNotVisible { .. } => detail.with_details(
                "The integration was created but DESCRIBE still fails; check the role's privileges.",
            ),
            SyncError::Run { stack, source } => {
                let inner = source.to_detail();
                let details = match inner.details {
                    Some(details) => format!("stack {}: {}", stack, details),
                    None => format!("stack {}", stack),
                };
                detail.with_details(details)
            }
            _ => detail,
        }
    }
}

/// Error report format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Validation(format!("Invalid JSON: {}", err))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Internal(err.to_string())
    }
}
