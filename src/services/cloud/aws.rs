// AWS control plane: CloudFormation for stack outputs, IAM for role trust policies
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudformation::error::DisplayErrorContext;
use std::future::Future;
use std::time::Duration;

use crate::config::AwsConfig;
use crate::error::SyncError;
use crate::models::{StackOutputs, TrustPolicyDocument};
use crate::services::cloud::CloudControlPlane;

pub struct AwsControlPlane {
    cloudformation: aws_sdk_cloudformation::Client,
    iam: aws_sdk_iam::Client,
    request_timeout: Duration,
}

impl AwsControlPlane {
    /// Load shared AWS configuration (environment, profile, region chain)
    pub async fn from_config(config: &AwsConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        Self {
            cloudformation: aws_sdk_cloudformation::Client::new(&shared_config),
            iam: aws_sdk_iam::Client::new(&shared_config),
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        }
    }

    async fn bounded<T, F>(&self, operation: &str, request: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, SyncError>>,
    {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| SyncError::Timeout {
                operation: operation.to_string(),
                seconds: self.request_timeout.as_secs(),
            })?
    }
}

#[async_trait::async_trait]
impl CloudControlPlane for AwsControlPlane {
    async fn describe_stack_outputs(&self, stack_name: &str) -> Result<StackOutputs, SyncError> {
        self.bounded("cloudformation:DescribeStacks", async {
            let output = self
                .cloudformation
                .describe_stacks()
                .stack_name(stack_name)
                .send()
                .await
                .map_err(|e| SyncError::StackOutputs {
                    stack: stack_name.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                })?;

            let stack = output.stacks().first().ok_or_else(|| SyncError::StackOutputs {
                stack: stack_name.to_string(),
                message: "stack not found".to_string(),
            })?;

            let mut outputs = StackOutputs::new(stack_name);
            for item in stack.outputs() {
                if let (Some(key), Some(value)) = (item.output_key(), item.output_value()) {
                    outputs = outputs.with_output(key, value);
                }
            }
            tracing::debug!(
                "Stack {} exposes outputs {:?}",
                stack_name,
                outputs.outputs.keys().collect::<Vec<_>>()
            );
            Ok(outputs)
        })
        .await
    }

    async fn get_role_trust_policy(&self, role_name: &str) -> Result<TrustPolicyDocument, SyncError> {
        self.bounded("iam:GetRole", async {
            let output = self
                .iam
                .get_role()
                .role_name(role_name)
                .send()
                .await
                .map_err(|e| {
                    SyncError::PolicyUpdate(format!(
                        "Failed to read role {}: {}",
                        role_name,
                        aws_sdk_iam::error::DisplayErrorContext(&e)
                    ))
                })?;

            match output
                .role()
                .and_then(|role| role.assume_role_policy_document())
            {
                Some(document) => TrustPolicyDocument::parse(document),
                None => {
                    tracing::warn!("Role {} has no trust policy, starting from an empty one", role_name);
                    Ok(TrustPolicyDocument::empty())
                }
            }
        })
        .await
    }

    async fn update_role_trust_policy(
        &self,
        role_name: &str,
        document: &TrustPolicyDocument,
    ) -> Result<(), SyncError> {
        let policy_document = document.to_json()?;
        self.bounded("iam:UpdateAssumeRolePolicy", async {
            self.iam
                .update_assume_role_policy()
                .role_name(role_name)
                .policy_document(policy_document)
                .send()
                .await
                .map_err(|e| {
                    SyncError::PolicyUpdate(format!(
                        "Failed to update trust policy of role {}: {}",
                        role_name,
                        aws_sdk_iam::error::DisplayErrorContext(&e)
                    ))
                })?;
            Ok(())
        })
        .await
    }
}
