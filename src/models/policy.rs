use percent_encoding::percent_decode_str;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::error::SyncError;

pub const POLICY_VERSION: &str = "2012-10-17";
pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";
pub const WAREHOUSE_TRUST_SID: &str = "WarehouseExternalFunctionTrust";
pub const COMPUTE_SERVICE_TRUST_SID: &str = "ComputeServiceTrust";

/// An IAM role trust policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustPolicyDocument {
    #[serde(rename = "Version", default = "default_version")]
    pub version: String,
    #[serde(rename = "Statement", default, deserialize_with = "one_or_many")]
    pub statements: Vec<PolicyStatement>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single trust statement. Fields this crate does not interpret are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "Effect")]
    pub effect: String,
    #[serde(rename = "Principal", default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
    #[serde(rename = "Action", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    #[serde(rename = "Condition", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> String {
    POLICY_VERSION.to_string()
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<PolicyStatement>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<PolicyStatement>),
        One(PolicyStatement),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(statements) => statements,
        OneOrMany::One(statement) => vec![statement],
    })
}

impl PolicyStatement {
    /// Lets the warehouse principal assume the role when it presents the external id
    pub fn warehouse_trust(iam_user_arn: &str, external_id: &str) -> Self {
        Self {
            sid: Some(WAREHOUSE_TRUST_SID.to_string()),
            effect: "Allow".to_string(),
            principal: Some(json!({ "AWS": iam_user_arn })),
            action: Some(json!(ASSUME_ROLE_ACTION)),
            condition: Some(json!({
                "StringEquals": { "sts:ExternalId": external_id }
            })),
            extra: Map::new(),
        }
    }

    /// Lets the serverless compute service assume the role unconditionally
    pub fn compute_service_trust(service_principal: &str) -> Self {
        Self {
            sid: Some(COMPUTE_SERVICE_TRUST_SID.to_string()),
            effect: "Allow".to_string(),
            principal: Some(json!({ "Service": service_principal })),
            action: Some(json!(ASSUME_ROLE_ACTION)),
            condition: None,
            extra: Map::new(),
        }
    }

    pub fn is_allow_assume_role(&self) -> bool {
        if self.effect != "Allow" {
            return false;
        }
        match &self.action {
            Some(Value::String(action)) => action == ASSUME_ROLE_ACTION,
            Some(Value::Array(actions)) => actions
                .iter()
                .any(|a| a.as_str() == Some(ASSUME_ROLE_ACTION)),
            _ => false,
        }
    }

    /// The `(kind, principal)` pair when the statement names exactly one principal
    pub fn single_principal(&self) -> Option<(String, String)> {
        let map = self.principal.as_ref()?.as_object()?;
        if map.len() != 1 {
            return None;
        }
        let (kind, value) = map.iter().next()?;
        value.as_str().map(|v| (kind.clone(), v.to_string()))
    }

    /// Remove one principal from this statement.
    ///
    /// Returns true when the statement no longer names any principal afterwards.
    fn remove_principal(&mut self, kind: &str, principal: &str) -> bool {
        let Some(Value::Object(map)) = self.principal.as_mut() else {
            return false;
        };

        let mut touched = false;
        let remove_kind = match map.get_mut(kind) {
            Some(Value::String(existing)) => {
                touched = existing == principal;
                touched
            }
            Some(Value::Array(items)) => {
                let before = items.len();
                items.retain(|item| item.as_str() != Some(principal));
                touched = items.len() != before;
                items.is_empty()
            }
            _ => false,
        };
        if remove_kind {
            map.remove(kind);
        }

        touched && map.is_empty()
    }
}

impl TrustPolicyDocument {
    pub fn empty() -> Self {
        Self {
            version: default_version(),
            statements: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Parse a trust policy as returned by IAM, which URL-encodes the document
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let trimmed = raw.trim();
        let decoded = if trimmed.starts_with('{') {
            trimmed.to_string()
        } else {
            percent_decode_str(trimmed)
                .decode_utf8()
                .map_err(|e| SyncError::PolicyUpdate(format!("Trust policy is not valid UTF-8: {}", e)))?
                .into_owned()
        };

        serde_json::from_str(&decoded)
            .map_err(|e| SyncError::PolicyUpdate(format!("Trust policy is not valid JSON: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn find_by_sid(&self, sid: &str) -> Option<&PolicyStatement> {
        self.statements.iter().find(|s| s.sid.as_deref() == Some(sid))
    }

    /// Merge the desired statements into this document by principal.
    ///
    /// Any other statement granting `sts:AssumeRole` to one of the desired principals
    /// loses that principal (and is dropped when nothing else remains). Statements
    /// sharing a desired `Sid` are replaced in place. Everything else is preserved.
    /// Returns whether the document changed.
    pub fn merge_by_principal(&mut self, desired: &[PolicyStatement]) -> bool {
        let before = self.clone();
        let desired_sids: Vec<&str> = desired.iter().filter_map(|s| s.sid.as_deref()).collect();

        for wanted in desired {
            let Some((kind, principal)) = wanted.single_principal() else {
                continue;
            };
            self.statements.retain_mut(|existing| {
                let owned = existing
                    .sid
                    .as_deref()
                    .map(|sid| desired_sids.contains(&sid))
                    .unwrap_or(false);
                if owned || !existing.is_allow_assume_role() {
                    return true;
                }
                !existing.remove_principal(&kind, &principal)
            });
        }

        for wanted in desired {
            let position = wanted.sid.as_deref().and_then(|sid| {
                self.statements
                    .iter()
                    .position(|s| s.sid.as_deref() == Some(sid))
            });
            match position {
                Some(idx) => {
                    self.statements[idx] = wanted.clone();
                    let mut seen = 0;
                    self.statements.retain(|s| {
                        if s.sid == wanted.sid {
                            seen += 1;
                            seen == 1
                        } else {
                            true
                        }
                    });
                }
                None => self.statements.push(wanted.clone()),
            }
        }

        *self != before
    }
}

/// Role name addressed by a role ARN (`arn:aws:iam::123:role/path/name` → `name`)
pub fn role_name_from_arn(arn: &str) -> Result<String, SyncError> {
    let parts: Vec<&str> = arn.trim().splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" || parts[2] != "iam" {
        return Err(SyncError::Validation(format!("Not an IAM ARN: {}", arn)));
    }
    let resource = parts[5];
    let path = resource
        .strip_prefix("role/")
        .ok_or_else(|| SyncError::Validation(format!("Not an IAM role ARN: {}", arn)))?;

    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(SyncError::Validation(format!("IAM role ARN has no role name: {}", arn))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVERLESS_DEFAULT: &str = r#"{
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": ["lambda.amazonaws.com"] },
                "Action": ["sts:AssumeRole"]
            }
        ]
    }"#;

    fn desired() -> Vec<PolicyStatement> {
        vec![
            PolicyStatement::warehouse_trust("arn:aws:iam::111:user/sf", "EXT_ID"),
            PolicyStatement::compute_service_trust("lambda.amazonaws.com"),
        ]
    }

    #[test]
    fn test_parse_url_encoded() {
        let encoded = "%7B%22Version%22%3A%222012-10-17%22%2C%22Statement%22%3A%5B%5D%7D";
        let doc = TrustPolicyDocument::parse(encoded).unwrap();
        assert_eq!(doc.version, "2012-10-17");
        assert!(doc.statements.is_empty());
    }

    #[test]
    fn test_parse_single_statement_object() {
        let raw = r#"{"Version":"2012-10-17","Statement":{"Effect":"Allow","Principal":{"AWS":"arn:aws:iam::1:root"},"Action":"sts:AssumeRole"}}"#;
        let doc = TrustPolicyDocument::parse(raw).unwrap();
        assert_eq!(doc.statements.len(), 1);
        assert!(doc.statements[0].is_allow_assume_role());
    }

    #[test]
    fn test_merge_replaces_default_compute_statement() {
        let mut doc = TrustPolicyDocument::parse(SERVERLESS_DEFAULT).unwrap();
        assert!(doc.merge_by_principal(&desired()));

        assert_eq!(doc.statements.len(), 2);
        let warehouse = doc.find_by_sid(WAREHOUSE_TRUST_SID).unwrap();
        assert_eq!(
            warehouse.condition,
            Some(json!({"StringEquals": {"sts:ExternalId": "EXT_ID"}}))
        );
        assert!(doc.find_by_sid(COMPUTE_SERVICE_TRUST_SID).is_some());
    }

    #[test]
    fn test_merge_preserves_unrelated_statements() {
        let raw = r#"{
            "Version": "2012-10-17",
            "Statement": [
                {"Sid": "Ops", "Effect": "Allow", "Principal": {"AWS": "arn:aws:iam::999:role/ops"}, "Action": "sts:AssumeRole"},
                {"Effect": "Allow", "Principal": {"Service": ["lambda.amazonaws.com", "edgelambda.amazonaws.com"]}, "Action": "sts:AssumeRole"}
            ]
        }"#;
        let mut doc = TrustPolicyDocument::parse(raw).unwrap();
        doc.merge_by_principal(&desired());

        assert!(doc.find_by_sid("Ops").is_some());
        let shared = &doc.statements[1];
        assert_eq!(
            shared.principal,
            Some(json!({"Service": ["edgelambda.amazonaws.com"]}))
        );
        assert_eq!(doc.statements.len(), 4);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut doc = TrustPolicyDocument::parse(SERVERLESS_DEFAULT).unwrap();
        doc.merge_by_principal(&desired());
        let snapshot = doc.clone();

        assert!(!doc.merge_by_principal(&desired()));
        assert_eq!(doc, snapshot);
    }

    #[test]
    fn test_merge_replaces_stale_warehouse_principal() {
        let mut doc = TrustPolicyDocument::empty();
        doc.merge_by_principal(&desired());

        let rotated = vec![
            PolicyStatement::warehouse_trust("arn:aws:iam::111:user/new", "NEW_ID"),
            PolicyStatement::compute_service_trust("lambda.amazonaws.com"),
        ];
        assert!(doc.merge_by_principal(&rotated));
        assert_eq!(doc.statements.len(), 2);
        assert_eq!(
            doc.statements[0].principal,
            Some(json!({"AWS": "arn:aws:iam::111:user/new"}))
        );
    }

    #[test]
    fn test_role_name_from_arn() {
        assert_eq!(
            role_name_from_arn("arn:aws:iam::123456789012:role/snowflake-aws-nodejs-dev-us-west-2-lambdaRole")
                .unwrap(),
            "snowflake-aws-nodejs-dev-us-west-2-lambdaRole"
        );
        assert_eq!(
            role_name_from_arn("arn:aws:iam::123456789012:role/service/path/my-role").unwrap(),
            "my-role"
        );
        assert!(role_name_from_arn("arn:aws:iam::123456789012:user/bob").is_err());
        assert!(role_name_from_arn("my-role").is_err());
    }
}
