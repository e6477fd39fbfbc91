use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::FunctionConfig;
use crate::error::SyncError;
use crate::models::FunctionSpec;
use crate::services::warehouse::{StatementBuilder, WarehouseSession};

/// Registers one external function per HTTP-triggered function
pub struct FunctionRegistrar;

impl FunctionRegistrar {
    /// Functions with an HTTP path, in declaration order.
    ///
    /// Names that normalize to the same warehouse identifier are kept; the later
    /// CREATE OR REPLACE overwrites the earlier one.
    pub fn enumerate_http_functions(functions: &[FunctionConfig]) -> Vec<FunctionSpec> {
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut specs = Vec::new();

        for function in functions {
            let path = match function.http_path.as_deref().map(str::trim) {
                Some(path) if !path.is_empty() => path,
                _ => continue,
            };

            let spec = FunctionSpec::new(
                function.name.clone(),
                function.arguments.clone(),
                function.returns.clone(),
                path,
            );
            if let Some(previous) = seen.insert(spec.warehouse_name(), function.name.clone()) {
                warn!(
                    function = %function.name,
                    previous = %previous,
                    warehouse_name = %spec.warehouse_name(),
                    "Function name collides after normalization, later definition wins"
                );
            }
            specs.push(spec);
        }

        specs
    }

    /// Create or replace every function against the stack's integration.
    ///
    /// All statements are built before any is sent, so an invalid signature
    /// aborts without touching the warehouse. The first rejected statement is
    /// fatal and names the function.
    pub async fn register_functions(
        session: &dyn WarehouseSession,
        stack_name: &str,
        endpoint: &str,
        functions: &[FunctionSpec],
    ) -> Result<Vec<String>, SyncError> {
        let statements = functions
            .iter()
            .map(|function| StatementBuilder::create_function(function, stack_name, endpoint))
            .collect::<Result<Vec<_>, _>>()?;

        let mut registered = Vec::with_capacity(statements.len());
        for (function, statement) in functions.iter().zip(statements) {
            let result = session.execute(&statement).await?;
            info!(
                stack = stack_name,
                function = %function.name,
                warehouse_name = %statement.object,
                url = %function.target_url(endpoint),
                elapsed_ms = result.execution_time_ms,
                "Registered external function"
            );
            registered.push(statement.object);
        }

        Ok(registered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::ScriptedSession;
    use crate::services::warehouse::StatementKind;

    const ENDPOINT: &str = "https://abc.execute-api.us-east-1.amazonaws.com/";

    fn function(name: &str, http_path: Option<&str>) -> FunctionConfig {
        FunctionConfig {
            name: name.to_string(),
            http_path: http_path.map(str::to_string),
            arguments: "(id VARCHAR)".to_string(),
            returns: String::new(),
        }
    }

    #[test]
    fn test_enumerate_skips_functions_without_http_path() {
        let specs = FunctionRegistrar::enumerate_http_functions(&[
            function("get-user", Some("users")),
            function("nightly-job", None),
            function("blank", Some("  ")),
        ]);

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "get-user");
        assert_eq!(specs[0].http_path, "users");
    }

    #[tokio::test]
    async fn test_register_builds_url_and_signature() {
        let session = ScriptedSession::new();
        let specs =
            FunctionRegistrar::enumerate_http_functions(&[function("get-user", Some("/users"))]);

        let registered = FunctionRegistrar::register_functions(&session, "my-api", ENDPOINT, &specs)
            .await
            .unwrap();

        assert_eq!(registered, vec!["GET_USER".to_string()]);
        let sql = &session.executed()[0].sql;
        assert!(sql.starts_with("CREATE OR REPLACE EXTERNAL FUNCTION \"GET_USER\"(id VARCHAR)"));
        assert!(sql.contains("RETURNS VARIANT"));
        assert!(sql.contains("API_INTEGRATION=\"MY_API\""));
        assert!(sql.contains("COMPRESSION=NONE"));
        assert!(sql.contains("AS 'https://abc.execute-api.us-east-1.amazonaws.com/users'"));
    }

    #[tokio::test]
    async fn test_first_failure_aborts_and_names_function() {
        let session = ScriptedSession::new();
        session.fail(StatementKind::CreateFunction, "B", "002140", "Unknown function");
        let specs = FunctionRegistrar::enumerate_http_functions(&[
            function("a", Some("a")),
            function("b", Some("b")),
            function("c", Some("c")),
        ]);

        let result = FunctionRegistrar::register_functions(&session, "my-api", ENDPOINT, &specs).await;

        match result {
            Err(SyncError::Statement { kind, object, code, .. }) => {
                assert_eq!(kind, StatementKind::CreateFunction);
                assert_eq!(object, "B");
                assert_eq!(code, "002140");
            }
            other => panic!("expected statement error, got {:?}", other),
        }
        let objects: Vec<String> = session.executed().into_iter().map(|s| s.object).collect();
        assert_eq!(objects, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_colliding_names_issue_two_creates() {
        let session = ScriptedSession::new();
        let specs = FunctionRegistrar::enumerate_http_functions(&[
            function("get-user", Some("v1/user")),
            function("GET_USER", Some("v2/user")),
        ]);
        assert_eq!(specs.len(), 2);

        FunctionRegistrar::register_functions(&session, "my-api", ENDPOINT, &specs)
            .await
            .unwrap();

        let executed = session.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed.iter().all(|s| s.object == "GET_USER"));
        assert!(executed[1].sql.contains("/v2/user'"));
    }

    #[tokio::test]
    async fn test_invalid_signature_sends_nothing() {
        let session = ScriptedSession::new();
        let mut broken = function("b", Some("b"));
        broken.arguments = "(id VARCHAR); DROP TABLE users".to_string();
        let specs =
            FunctionRegistrar::enumerate_http_functions(&[function("a", Some("a")), broken]);

        let result = FunctionRegistrar::register_functions(&session, "my-api", ENDPOINT, &specs).await;

        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert!(session.executed().is_empty());
    }

    #[tokio::test]
    async fn test_return_type_with_extra_clauses_is_rejected() {
        let session = ScriptedSession::new();
        let mut hostile = function("b", Some("b"));
        hostile.returns = "VARIANT NOT NULL IMMUTABLE REQUEST_TRANSLATOR ATTACKER_FN".to_string();
        let specs = FunctionRegistrar::enumerate_http_functions(&[hostile]);

        let result = FunctionRegistrar::register_functions(&session, "my-api", ENDPOINT, &specs).await;

        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert!(session.executed().is_empty());
    }
}
