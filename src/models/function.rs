use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::validation::{normalize, FunctionArgument, SqlValidator};

/// Default return type for functions that do not declare one
pub const DEFAULT_RETURN_TYPE: &str = "VARIANT";

/// A deployed HTTP function to be exposed as a warehouse external function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub arguments: String,
    pub returns: String,
    pub http_path: String,
}

impl FunctionSpec {
    pub fn new(
        name: impl Into<String>,
        arguments: impl Into<String>,
        returns: impl Into<String>,
        http_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
            returns: returns.into(),
            http_path: http_path.into(),
        }
    }

    /// Identifier the function is registered under in the warehouse
    pub fn warehouse_name(&self) -> String {
        normalize(&self.name)
    }

    pub fn parsed_arguments(&self) -> Result<Vec<FunctionArgument>, SyncError> {
        SqlValidator::parse_signature(&self.arguments).map_err(|e| {
            SyncError::Validation(format!("Function {}: {}", self.name, e))
        })
    }

    pub fn return_type(&self) -> Result<String, SyncError> {
        let declared = if self.returns.trim().is_empty() {
            DEFAULT_RETURN_TYPE
        } else {
            self.returns.as_str()
        };
        SqlValidator::validate_type(declared)
            .map_err(|e| SyncError::Validation(format!("Function {}: {}", self.name, e)))
    }

    /// Gateway URL the external function calls: `endpoint + "/" + path`
    pub fn target_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            self.http_path.trim_start_matches('/')
        )
    }
}
