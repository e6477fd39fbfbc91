// Cloud control plane abstraction
pub mod aws;

pub use aws::AwsControlPlane;

use crate::error::SyncError;
use crate::models::{StackOutputs, TrustPolicyDocument};

/// The cloud requests the reconciliation core depends on
#[async_trait::async_trait]
pub trait CloudControlPlane: Send + Sync {
    /// Read the key/value outputs of a deployed stack
    async fn describe_stack_outputs(&self, stack_name: &str) -> Result<StackOutputs, SyncError>;

    /// Fetch the current trust policy of a role
    async fn get_role_trust_policy(&self, role_name: &str) -> Result<TrustPolicyDocument, SyncError>;

    /// Replace the trust policy of a role
    async fn update_role_trust_policy(
        &self,
        role_name: &str,
        document: &TrustPolicyDocument,
    ) -> Result<(), SyncError>;
}
