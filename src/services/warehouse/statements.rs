use crate::error::SyncError;
use crate::models::FunctionSpec;
use crate::services::warehouse::adapter::{Statement, StatementKind};
use crate::validation::{normalize, SqlValidator};

/// Gateway provider type declared on every API integration
pub const API_PROVIDER: &str = "aws_api_gateway";

/// Renders warehouse statements. Every name is normalized and quoted here, and
/// every externally supplied value is quoted as a literal.
pub struct StatementBuilder;

impl StatementBuilder {
    /// Warehouse name of the integration owned by a stack
    pub fn integration_name(stack_name: &str) -> String {
        normalize(stack_name)
    }

    pub fn connection_check() -> Statement {
        Statement::new(StatementKind::ConnectionCheck, "SESSION", "SELECT 1")
    }

    pub fn describe_integration(stack_name: &str) -> Result<Statement, SyncError> {
        let name = Self::integration_name(stack_name);
        let sql = format!("DESCRIBE INTEGRATION {}", SqlValidator::quote_identifier(&name)?);
        Ok(Statement::new(StatementKind::DescribeIntegration, name, sql))
    }

    pub fn create_integration(
        stack_name: &str,
        execution_role_arn: &str,
        endpoint: &str,
    ) -> Result<Statement, SyncError> {
        let name = Self::integration_name(stack_name);
        let sql = format!(
            "CREATE OR REPLACE API INTEGRATION {}\n  \
             API_PROVIDER={}\n  \
             API_AWS_ROLE_ARN={}\n  \
             ENABLED=TRUE\n  \
             API_ALLOWED_PREFIXES=({})",
            SqlValidator::quote_identifier(&name)?,
            API_PROVIDER,
            SqlValidator::quote_literal(execution_role_arn)?,
            SqlValidator::quote_literal(endpoint)?,
        );
        Ok(Statement::new(StatementKind::CreateIntegration, name, sql))
    }

    pub fn drop_integration(stack_name: &str) -> Result<Statement, SyncError> {
        let name = Self::integration_name(stack_name);
        let sql = format!(
            "DROP API INTEGRATION IF EXISTS {} CASCADE",
            SqlValidator::quote_identifier(&name)?
        );
        Ok(Statement::new(StatementKind::DropIntegration, name, sql))
    }

    pub fn create_function(
        function: &FunctionSpec,
        stack_name: &str,
        endpoint: &str,
    ) -> Result<Statement, SyncError> {
        let name = function.warehouse_name();
        let arguments = function.parsed_arguments()?;
        let sql = format!(
            "CREATE OR REPLACE EXTERNAL FUNCTION {}({})\n  \
             RETURNS {}\n  \
             API_INTEGRATION={}\n  \
             COMPRESSION=NONE\n  \
             AS {}",
            SqlValidator::quote_identifier(&name)?,
            SqlValidator::render_signature(&arguments),
            function.return_type()?,
            SqlValidator::quote_identifier(&Self::integration_name(stack_name))?,
            SqlValidator::quote_literal(&function.target_url(endpoint))?,
        );
        Ok(Statement::new(StatementKind::CreateFunction, name, sql))
    }

    pub fn drop_function(function: &FunctionSpec) -> Result<Statement, SyncError> {
        let name = function.warehouse_name();
        let arguments = function.parsed_arguments()?;
        let sql = format!(
            "DROP FUNCTION IF EXISTS {}({})",
            SqlValidator::quote_identifier(&name)?,
            SqlValidator::render_argument_types(&arguments),
        );
        Ok(Statement::new(StatementKind::DropFunction, name, sql))
    }
}
