use tracing::info;

use crate::error::SyncError;
use crate::models::{role_name_from_arn, IntegrationDescriptor, PolicyStatement, PolicySyncOutcome};
use crate::services::cloud::CloudControlPlane;

/// Grants the warehouse and the compute service trust on the execution role
pub struct TrustPolicySynchronizer {
    compute_service_principal: String,
}

impl TrustPolicySynchronizer {
    pub fn new(compute_service_principal: impl Into<String>) -> Self {
        Self {
            compute_service_principal: compute_service_principal.into(),
        }
    }

    /// Merge the warehouse identity from `descriptor` into the role's trust policy.
    ///
    /// The existing policy is fetched first and merged by principal, so grantees
    /// unrelated to the warehouse or the compute service survive. No update is
    /// sent when the merged policy is identical to the current one.
    pub async fn sync_trust_policy(
        &self,
        provider: &dyn CloudControlPlane,
        descriptor: &IntegrationDescriptor,
        execution_role_arn: &str,
    ) -> Result<PolicySyncOutcome, SyncError> {
        let iam_user_arn = descriptor.iam_user_arn()?;
        let external_id = descriptor.external_id()?;
        let role_name = role_name_from_arn(execution_role_arn)?;

        let desired = [
            PolicyStatement::warehouse_trust(iam_user_arn, external_id),
            PolicyStatement::compute_service_trust(&self.compute_service_principal),
        ];

        let mut document = provider.get_role_trust_policy(&role_name).await?;
        let existing = document.statements.len();
        if !document.merge_by_principal(&desired) {
            info!(role = %role_name, "Trust policy already grants the warehouse, no update needed");
            return Ok(PolicySyncOutcome::Unchanged);
        }

        provider.update_role_trust_policy(&role_name, &document).await?;
        info!(
            role = %role_name,
            principal = iam_user_arn,
            previous_statements = existing,
            statements = document.statements.len(),
            "Updated trust policy"
        );
        Ok(PolicySyncOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        StackOutputs, TrustPolicyDocument, COMPUTE_SERVICE_TRUST_SID, WAREHOUSE_TRUST_SID,
    };
    use crate::services::testing::{describe_rows, MockControlPlane};
    use serde_json::json;

    const ROLE_ARN: &str =
        "arn:aws:iam::123456789012:role/snowflake-aws-nodejs-dev-us-west-2-lambdaRole";

    fn descriptor() -> IntegrationDescriptor {
        IntegrationDescriptor::from_rows(
            "MY_API",
            &describe_rows("arn:aws:iam::111:user/sf", "ACME_SFCRole=2_abc="),
        )
    }

    fn synchronizer() -> TrustPolicySynchronizer {
        TrustPolicySynchronizer::new("lambda.amazonaws.com")
    }

    fn existing_policy() -> TrustPolicyDocument {
        TrustPolicyDocument::parse(
            r#"{"Version":"2012-10-17","Statement":[
                {"Sid":"Ops","Effect":"Allow","Principal":{"AWS":"arn:aws:iam::999:role/ops"},"Action":"sts:AssumeRole"},
                {"Effect":"Allow","Principal":{"Service":["lambda.amazonaws.com"]},"Action":["sts:AssumeRole"]}
            ]}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sync_merges_and_updates_role() {
        let provider = MockControlPlane::new(StackOutputs::new("my-api"), existing_policy());

        let outcome = synchronizer()
            .sync_trust_policy(&provider, &descriptor(), ROLE_ARN)
            .await
            .unwrap();

        assert_eq!(outcome, PolicySyncOutcome::Updated);
        let updates = provider.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "snowflake-aws-nodejs-dev-us-west-2-lambdaRole");

        let policy = &updates[0].1;
        assert!(policy.find_by_sid("Ops").is_some());
        let warehouse = policy.find_by_sid(WAREHOUSE_TRUST_SID).unwrap();
        assert_eq!(warehouse.principal, Some(json!({"AWS": "arn:aws:iam::111:user/sf"})));
        assert_eq!(
            warehouse.condition,
            Some(json!({"StringEquals": {"sts:ExternalId": "ACME_SFCRole=2_abc="}}))
        );
        let compute = policy.find_by_sid(COMPUTE_SERVICE_TRUST_SID).unwrap();
        assert!(compute.condition.is_none());
        assert_eq!(policy.statements.len(), 3);
    }

    #[tokio::test]
    async fn test_second_sync_is_unchanged() {
        let provider = MockControlPlane::new(StackOutputs::new("my-api"), existing_policy());

        synchronizer()
            .sync_trust_policy(&provider, &descriptor(), ROLE_ARN)
            .await
            .unwrap();
        let outcome = synchronizer()
            .sync_trust_policy(&provider, &descriptor(), ROLE_ARN)
            .await
            .unwrap();

        assert_eq!(outcome, PolicySyncOutcome::Unchanged);
        assert_eq!(provider.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_descriptor_sends_nothing() {
        let provider = MockControlPlane::new(StackOutputs::new("my-api"), existing_policy());
        let descriptor = IntegrationDescriptor::from_rows(
            "MY_API",
            &[json!({"property": "API_AWS_IAM_USER_ARN", "property_value": "arn:aws:iam::111:user/sf"})],
        );

        let result = synchronizer()
            .sync_trust_policy(&provider, &descriptor, ROLE_ARN)
            .await;

        assert!(matches!(result, Err(SyncError::MalformedDescriptor { .. })));
        assert!(provider.updates().is_empty());
    }

    #[tokio::test]
    async fn test_update_failure_is_policy_error() {
        let provider =
            MockControlPlane::new(StackOutputs::new("my-api"), existing_policy()).failing_updates();

        let result = synchronizer()
            .sync_trust_policy(&provider, &descriptor(), ROLE_ARN)
            .await;

        assert!(matches!(result, Err(SyncError::PolicyUpdate(_))));
    }

    #[tokio::test]
    async fn test_invalid_role_arn_is_rejected() {
        let provider = MockControlPlane::new(StackOutputs::new("my-api"), existing_policy());

        let result = synchronizer()
            .sync_trust_policy(&provider, &descriptor(), "lambdaRole")
            .await;

        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert!(provider.updates().is_empty());
    }
}
