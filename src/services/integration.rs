use tracing::{info, warn};

use crate::error::SyncError;
use crate::models::IntegrationDescriptor;
use crate::services::warehouse::{StatementBuilder, WarehouseSession};

/// What DESCRIBE reported about the integration
#[derive(Debug)]
enum IntegrationState {
    Absent,
    Present(IntegrationDescriptor),
}

/// Ensures the stack's API integration exists and returns its descriptor
pub struct IntegrationReconciler {
    not_found_code: String,
}

impl IntegrationReconciler {
    /// `not_found_code` is the warehouse error code meaning "object does not exist"
    pub fn new(not_found_code: impl Into<String>) -> Self {
        Self {
            not_found_code: not_found_code.into(),
        }
    }

    /// Describe the integration, creating it when it is absent.
    ///
    /// The create path is attempted at most once: DESCRIBE, CREATE OR REPLACE on
    /// not-found, then one more DESCRIBE. A second not-found is fatal.
    pub async fn ensure_integration(
        &self,
        session: &dyn WarehouseSession,
        stack_name: &str,
        gateway_endpoint: &str,
        execution_role_arn: &str,
    ) -> Result<IntegrationDescriptor, SyncError> {
        let integration = StatementBuilder::integration_name(stack_name);

        if let IntegrationState::Present(descriptor) = self.describe(session, stack_name).await? {
            info!(stack = stack_name, integration = %integration, "API integration already exists");
            return Ok(descriptor);
        }

        info!(
            stack = stack_name,
            integration = %integration,
            endpoint = gateway_endpoint,
            "API integration not found, creating it"
        );
        let create =
            StatementBuilder::create_integration(stack_name, execution_role_arn, gateway_endpoint)?;
        let result = session.execute(&create).await?;
        if let Some(status) = result.rows.first().and_then(|row| row.get("status")) {
            info!(
                integration = %integration,
                elapsed_ms = result.execution_time_ms,
                "{}",
                status
            );
        }

        match self.describe(session, stack_name).await? {
            IntegrationState::Present(descriptor) => Ok(descriptor),
            IntegrationState::Absent => {
                warn!(
                    integration = %integration,
                    "API integration still missing after create, giving up"
                );
                Err(SyncError::IntegrationNotVisible {
                    integration,
                    code: self.not_found_code.clone(),
                })
            }
        }
    }

    async fn describe(
        &self,
        session: &dyn WarehouseSession,
        stack_name: &str,
    ) -> Result<IntegrationState, SyncError> {
        let statement = StatementBuilder::describe_integration(stack_name)?;
        match session.execute(&statement).await {
            Ok(result) => Ok(IntegrationState::Present(IntegrationDescriptor::from_rows(
                statement.object,
                &result.rows,
            ))),
            Err(SyncError::Statement { ref code, .. }) if *code == self.not_found_code => {
                Ok(IntegrationState::Absent)
            }
            Err(err) => Err(err),
        }
    }
}
