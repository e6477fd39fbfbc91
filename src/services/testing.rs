// In-memory doubles for the warehouse session and the cloud control plane
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::SyncError;
use crate::models::{StackOutputs, TrustPolicyDocument};
use crate::services::cloud::CloudControlPlane;
use crate::services::warehouse::{Statement, StatementKind, StatementResult, WarehouseSession};

type Scripted = Result<Vec<Value>, (String, String)>;

#[derive(Default)]
struct SessionLog {
    responses: HashMap<(StatementKind, String), VecDeque<Scripted>>,
    executed: Vec<Statement>,
}

/// Warehouse session answering from a per-(kind, object) script.
///
/// Unscripted statements succeed with no rows. Clones share the same log.
#[derive(Clone, Default)]
pub struct ScriptedSession {
    log: Arc<Mutex<SessionLog>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, kind: StatementKind, object: &str, rows: Vec<Value>) -> &Self {
        self.push(kind, object, Ok(rows))
    }

    pub fn fail(&self, kind: StatementKind, object: &str, code: &str, message: &str) -> &Self {
        self.push(kind, object, Err((code.to_string(), message.to_string())))
    }

    fn push(&self, kind: StatementKind, object: &str, response: Scripted) -> &Self {
        self.log
            .lock()
            .unwrap()
            .responses
            .entry((kind, object.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.log.lock().unwrap().executed.clone()
    }

    pub fn count(&self, kind: StatementKind) -> usize {
        self.executed().iter().filter(|s| s.kind == kind).count()
    }

    pub fn kinds(&self) -> Vec<StatementKind> {
        self.executed().iter().map(|s| s.kind).collect()
    }
}

#[async_trait::async_trait]
impl WarehouseSession for ScriptedSession {
    async fn execute(&self, statement: &Statement) -> Result<StatementResult, SyncError> {
        let mut log = self.log.lock().unwrap();
        log.executed.push(statement.clone());
        let scripted = log
            .responses
            .get_mut(&(statement.kind, statement.object.clone()))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()));

        match scripted {
            Ok(rows) => Ok(StatementResult {
                rows,
                ..StatementResult::default()
            }),
            Err((code, message)) => Err(statement.rejected(code, message)),
        }
    }
}

/// DESCRIBE INTEGRATION rows carrying the trust-bootstrap properties
pub fn describe_rows(iam_user_arn: &str, external_id: &str) -> Vec<Value> {
    vec![
        json!({"property": "ENABLED", "property_type": "Boolean", "property_value": "true", "property_default": "false"}),
        json!({"property": "API_AWS_IAM_USER_ARN", "property_type": "String", "property_value": iam_user_arn, "property_default": ""}),
        json!({"property": "API_AWS_EXTERNAL_ID", "property_type": "String", "property_value": external_id, "property_default": ""}),
    ]
}

/// Control plane keeping one role's trust policy in memory
pub struct MockControlPlane {
    outputs: StackOutputs,
    policy: Mutex<TrustPolicyDocument>,
    updates: Mutex<Vec<(String, TrustPolicyDocument)>>,
    fail_updates: bool,
}

impl MockControlPlane {
    pub fn new(outputs: StackOutputs, policy: TrustPolicyDocument) -> Self {
        Self {
            outputs,
            policy: Mutex::new(policy),
            updates: Mutex::new(Vec::new()),
            fail_updates: false,
        }
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    pub fn updates(&self) -> Vec<(String, TrustPolicyDocument)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn policy(&self) -> TrustPolicyDocument {
        self.policy.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CloudControlPlane for MockControlPlane {
    async fn describe_stack_outputs(&self, stack_name: &str) -> Result<StackOutputs, SyncError> {
        if stack_name != self.outputs.stack_name {
            return Err(SyncError::StackOutputs {
                stack: stack_name.to_string(),
                message: "stack not found".to_string(),
            });
        }
        Ok(self.outputs.clone())
    }

    async fn get_role_trust_policy(&self, _role_name: &str) -> Result<TrustPolicyDocument, SyncError> {
        Ok(self.policy())
    }

    async fn update_role_trust_policy(
        &self,
        role_name: &str,
        document: &TrustPolicyDocument,
    ) -> Result<(), SyncError> {
        if self.fail_updates {
            return Err(SyncError::PolicyUpdate(format!(
                "AccessDenied: not authorized to update role {}",
                role_name
            )));
        }
        *self.policy.lock().unwrap() = document.clone();
        self.updates
            .lock()
            .unwrap()
            .push((role_name.to_string(), document.clone()));
        Ok(())
    }
}
