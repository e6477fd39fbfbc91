use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::FunctionSpec;
use crate::services::cloud::CloudControlPlane;
use crate::services::warehouse::WarehouseSession;
use crate::validation::SqlValidator;

/// Context threaded through one deployment run.
///
/// Built once per run, extended in place by each step and dropped at the end.
/// The warehouse session is only absent before the connection succeeds.
pub struct ReconciliationState {
    pub run_id: String,
    pub stack_name: String,
    pub provider: Arc<dyn CloudControlPlane>,
    pub endpoint: Option<String>,
    pub execution_role_arn: Option<String>,
    pub session: Option<Box<dyn WarehouseSession>>,
    pub functions: Vec<FunctionSpec>,
    pub started_at: DateTime<Utc>,
}

impl ReconciliationState {
    pub fn new(stack_name: impl Into<String>, provider: Arc<dyn CloudControlPlane>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            stack_name: stack_name.into(),
            provider,
            endpoint: None,
            execution_role_arn: None,
            session: None,
            functions: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Record the gateway endpoint and execution role read from the stack outputs
    pub fn attach_outputs(
        &mut self,
        endpoint: &str,
        execution_role_arn: &str,
    ) -> Result<(), SyncError> {
        self.endpoint = Some(SqlValidator::validate_endpoint(endpoint)?);
        self.execution_role_arn = Some(execution_role_arn.trim().to_string());
        Ok(())
    }

    pub fn attach_session(&mut self, session: Box<dyn WarehouseSession>) {
        self.session = Some(session);
    }

    pub fn attach_functions(&mut self, functions: Vec<FunctionSpec>) {
        self.functions = functions;
    }

    pub fn session(&self) -> Result<&dyn WarehouseSession, SyncError> {
        self.session
            .as_deref()
            .ok_or_else(|| SyncError::Internal("Warehouse session is not connected".to_string()))
    }

    pub fn endpoint(&self) -> Result<&str, SyncError> {
        self.endpoint
            .as_deref()
            .ok_or_else(|| SyncError::Internal("Gateway endpoint has not been resolved".to_string()))
    }

    pub fn execution_role_arn(&self) -> Result<&str, SyncError> {
        self.execution_role_arn.as_deref().ok_or_else(|| {
            SyncError::Internal("Execution role ARN has not been resolved".to_string())
        })
    }
}
