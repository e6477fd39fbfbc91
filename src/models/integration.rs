use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::SyncError;

/// Warehouse principal that assumes the execution role
pub const API_AWS_IAM_USER_ARN: &str = "API_AWS_IAM_USER_ARN";
/// External id the warehouse presents when assuming the role
pub const API_AWS_EXTERNAL_ID: &str = "API_AWS_EXTERNAL_ID";

/// The warehouse's view of an API integration, as returned by DESCRIBE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationDescriptor {
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

impl IntegrationDescriptor {
    /// Build a descriptor from DESCRIBE INTEGRATION rows.
    ///
    /// Each row is an object with at least `property` and `property_value` columns;
    /// column names are matched case-insensitively.
    pub fn from_rows(name: impl Into<String>, rows: &[Value]) -> Self {
        let mut properties = BTreeMap::new();
        for row in rows {
            let Some(object) = row.as_object() else {
                continue;
            };
            let mut property = None;
            let mut value = None;
            for (column, cell) in object {
                match column.to_ascii_lowercase().as_str() {
                    "property" => property = cell.as_str().map(str::to_string),
                    "property_value" => value = Some(cell_to_string(cell)),
                    _ => {}
                }
            }
            if let (Some(property), Some(value)) = (property, value) {
                properties.insert(property, value);
            }
        }

        Self {
            name: name.into(),
            properties,
        }
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.properties.get(property).map(String::as_str)
    }

    /// Look up a property that must be present and non-empty
    pub fn require(&self, property: &str) -> Result<&str, SyncError> {
        match self.get(property) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(SyncError::MalformedDescriptor {
                integration: self.name.clone(),
                property: property.to_string(),
            }),
        }
    }

    pub fn iam_user_arn(&self) -> Result<&str, SyncError> {
        self.require(API_AWS_IAM_USER_ARN)
    }

    pub fn external_id(&self) -> Result<&str, SyncError> {
        self.require(API_AWS_EXTERNAL_ID)
    }
}

fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
