use tracing::{info, warn};

use crate::error::SyncError;
use crate::models::{FailedDrop, FunctionSpec, TeardownReport};
use crate::services::warehouse::{StatementBuilder, WarehouseSession};

/// Removes the stack's external functions and its API integration
pub struct TeardownOrchestrator;

impl TeardownOrchestrator {
    /// Drop the integration with CASCADE, then every function.
    ///
    /// The cascade usually takes the functions with it, so a failed function
    /// drop is logged and recorded but does not stop the teardown. Failing to
    /// drop the integration is fatal and no function drop is attempted.
    pub async fn teardown(
        session: &dyn WarehouseSession,
        stack_name: &str,
        functions: &[FunctionSpec],
    ) -> Result<TeardownReport, SyncError> {
        let integration = StatementBuilder::integration_name(stack_name);
        let mut report = TeardownReport::new(stack_name, integration.clone());

        let statement = StatementBuilder::drop_integration(stack_name)?;
        let result = session.execute(&statement).await?;
        info!(
            stack = stack_name,
            integration = %integration,
            elapsed_ms = result.execution_time_ms,
            "Dropped API integration"
        );

        for function in functions {
            let result = match StatementBuilder::drop_function(function) {
                Ok(statement) => session.execute(&statement).await.map(|_| statement.object),
                Err(e) => Err(e),
            };
            match result {
                Ok(dropped) => {
                    info!(stack = stack_name, function = %dropped, "Dropped external function");
                    report.dropped_functions.push(dropped);
                }
                Err(e) => {
                    warn!(
                        stack = stack_name,
                        function = %function.name,
                        error = %e,
                        "Failed to drop external function, continuing"
                    );
                    report.failed_drops.push(FailedDrop {
                        function: function.warehouse_name(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.mark_completed();
        Ok(report)
    }
}
