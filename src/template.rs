// Compiled CloudFormation template patching
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::models::POLICY_VERSION;

pub const REST_API_TYPE: &str = "AWS::ApiGateway::RestApi";
/// Logical id of the execution role in the compiled template
pub const EXECUTION_ROLE_RESOURCE: &str = "IamRoleLambdaExecution";
pub const EXECUTION_ROLE_OUTPUT: &str = "IamRoleLambdaExecutionArn";
pub const WAREHOUSE_INVOKE_SID: &str = "WarehouseInvoke";
/// Session name the warehouse uses when it assumes the execution role
pub const WAREHOUSE_SESSION_NAME: &str = "snowflake";

/// What a template patch changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplatePatch {
    pub rest_apis: Vec<String>,
    pub output: String,
}

/// Statement letting the warehouse's assumed-role session invoke POST methods
pub fn warehouse_invoke_statement(stage: &str) -> Value {
    json!({
        "Sid": WAREHOUSE_INVOKE_SID,
        "Effect": "Allow",
        "Principal": {
            "AWS": {
                "Fn::Join": ["", [
                    "arn:", {"Ref": "AWS::Partition"},
                    ":sts::", {"Ref": "AWS::AccountId"},
                    ":assumed-role/", {"Ref": EXECUTION_ROLE_RESOURCE},
                    format!("/{}", WAREHOUSE_SESSION_NAME),
                ]]
            }
        },
        "Action": "execute-api:Invoke",
        "Resource": {
            "Fn::Join": ["", [
                "arn:", {"Ref": "AWS::Partition"},
                ":execute-api:", {"Ref": "AWS::Region"},
                ":", {"Ref": "AWS::AccountId"},
                format!(":*/{}/POST/*", stage),
            ]]
        }
    })
}

/// Grant the warehouse invoke access on every RestApi and export the role ARN.
///
/// Existing policy statements are kept; a previous warehouse statement is
/// replaced in place, so patching twice yields the same template.
pub fn patch_template(template: &mut Value, stage: &str) -> Result<TemplatePatch, SyncError> {
    if stage.trim().is_empty() {
        return Err(SyncError::Validation("Stage cannot be empty".to_string()));
    }
    let root = template
        .as_object_mut()
        .ok_or_else(|| SyncError::Validation("Template must be a JSON object".to_string()))?;

    let statement = warehouse_invoke_statement(stage.trim());
    let mut rest_apis = Vec::new();

    if let Some(resources) = root.get_mut("Resources").and_then(Value::as_object_mut) {
        for (logical_id, resource) in resources.iter_mut() {
            if resource.get("Type").and_then(Value::as_str) != Some(REST_API_TYPE) {
                continue;
            }
            let policy = policy_of(logical_id, resource)?;
            upsert_statement(logical_id, policy, statement.clone())?;
            rest_apis.push(logical_id.clone());
        }
    }

    if rest_apis.is_empty() {
        warn!("Template has no {} resource, only the role output is added", REST_API_TYPE);
    } else {
        info!(rest_apis = ?rest_apis, stage = stage, "Granted warehouse invoke permission");
    }

    let outputs = object_entry(root, "Outputs")
        .ok_or_else(|| SyncError::Validation("Template Outputs must be an object".to_string()))?;
    outputs.insert(
        EXECUTION_ROLE_OUTPUT.to_string(),
        json!({ "Value": { "Fn::GetAtt": [EXECUTION_ROLE_RESOURCE, "Arn"] } }),
    );

    Ok(TemplatePatch {
        rest_apis,
        output: EXECUTION_ROLE_OUTPUT.to_string(),
    })
}

/// Patch a template file, writing back in place unless `output` is given
pub fn patch_template_file(
    input: &Path,
    output: Option<&Path>,
    stage: &str,
) -> Result<TemplatePatch, SyncError> {
    let raw = fs::read_to_string(input)?;
    let mut template: Value = serde_json::from_str(&raw)?;
    let patch = patch_template(&mut template, stage)?;

    let target = output.unwrap_or(input);
    fs::write(target, serde_json::to_string_pretty(&template)?)?;
    info!(template = %target.display(), "Wrote patched template");
    Ok(patch)
}

fn object_entry<'a>(parent: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

fn policy_of<'a>(logical_id: &str, resource: &'a mut Value) -> Result<&'a mut Map<String, Value>, SyncError> {
    let invalid = || SyncError::Validation(format!("RestApi {} has a malformed Policy", logical_id));

    let properties = resource
        .as_object_mut()
        .and_then(|r| object_entry(r, "Properties"))
        .ok_or_else(invalid)?;
    let policy = object_entry(properties, "Policy").ok_or_else(invalid)?;
    policy
        .entry("Version".to_string())
        .or_insert_with(|| Value::String(POLICY_VERSION.to_string()));
    Ok(policy)
}

fn upsert_statement(
    logical_id: &str,
    policy: &mut Map<String, Value>,
    statement: Value,
) -> Result<(), SyncError> {
    let statements = policy
        .entry("Statement".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    // A lone statement object is valid policy grammar
    if statements.is_object() {
        let single = statements.take();
        *statements = Value::Array(vec![single]);
    }
    let statements = statements.as_array_mut().ok_or_else(|| {
        SyncError::Validation(format!("RestApi {} policy Statement must be a list", logical_id))
    })?;

    match statements
        .iter_mut()
        .find(|s| s.get("Sid").and_then(Value::as_str) == Some(WAREHOUSE_INVOKE_SID))
    {
        Some(existing) => *existing = statement,
        None => statements.push(statement),
    }
    Ok(())
}
