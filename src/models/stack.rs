use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SyncError;

/// Key/value outputs of a deployed stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutputs {
    pub stack_name: String,
    pub outputs: BTreeMap<String, String>,
}

impl StackOutputs {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn require(&self, key: &str) -> Result<&str, SyncError> {
        self.outputs
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| SyncError::StackOutputs {
                stack: self.stack_name.clone(),
                message: format!("output {} is missing", key),
            })
    }
}
