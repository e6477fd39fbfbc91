use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::error::SyncError;
use crate::models::{DeployReport, ReconciliationState, TeardownReport};
use crate::services::cloud::CloudControlPlane;
use crate::services::function_registrar::FunctionRegistrar;
use crate::services::integration::IntegrationReconciler;
use crate::services::teardown::TeardownOrchestrator;
use crate::services::trust_policy::TrustPolicySynchronizer;
use crate::services::warehouse;

/// Runs the deploy and remove lifecycles for one stack
pub struct ReconciliationService {
    config: Config,
    integrations: IntegrationReconciler,
    trust: TrustPolicySynchronizer,
}

impl ReconciliationService {
    pub fn new(config: Config) -> Self {
        let integrations = IntegrationReconciler::new(config.warehouse.not_found_code.clone());
        let trust = TrustPolicySynchronizer::new(config.aws.compute_service_principal.clone());
        Self {
            config,
            integrations,
            trust,
        }
    }

    /// Resolve stack outputs and the HTTP functions for a deploy run
    pub async fn prepare_deploy(
        &self,
        provider: Arc<dyn CloudControlPlane>,
    ) -> Result<ReconciliationState, SyncError> {
        let stack_name = self.config.stack_name();
        let outputs = provider.describe_stack_outputs(&stack_name).await?;
        let endpoint = outputs.require(&self.config.deployment.endpoint_output_key)?;
        let role_arn = outputs.require(&self.config.deployment.role_output_key)?;

        let mut state = ReconciliationState::new(stack_name, provider);
        state.attach_outputs(endpoint, role_arn)?;
        state.attach_functions(FunctionRegistrar::enumerate_http_functions(
            &self.config.functions,
        ));

        info!(
            run_id = %state.run_id,
            stack = %state.stack_name,
            endpoint = endpoint,
            functions = state.functions.len(),
            "Resolved stack outputs"
        );
        Ok(state)
    }

    /// Ensure the integration, trust it on the execution role, then register functions.
    ///
    /// Functions are only registered once the trust policy is confirmed.
    pub async fn reconcile(&self, state: &ReconciliationState) -> Result<DeployReport, SyncError> {
        let session = state.session()?;
        let endpoint = state.endpoint()?;
        let role_arn = state.execution_role_arn()?;

        let descriptor = self
            .integrations
            .ensure_integration(session, &state.stack_name, endpoint, role_arn)
            .await?;

        let policy = self
            .trust
            .sync_trust_policy(state.provider.as_ref(), &descriptor, role_arn)
            .await?;

        let functions = FunctionRegistrar::register_functions(
            session,
            &state.stack_name,
            endpoint,
            &state.functions,
        )
        .await?;

        Ok(DeployReport {
            run_id: state.run_id.clone(),
            stack_name: state.stack_name.clone(),
            integration: descriptor.name,
            endpoint: endpoint.to_string(),
            policy,
            functions,
            started_at: state.started_at,
            completed_at: Utc::now(),
        })
    }

    /// Full deploy run: outputs, warehouse connection, reconciliation
    pub async fn deploy(&self, provider: Arc<dyn CloudControlPlane>) -> Result<DeployReport, SyncError> {
        let stack_name = self.config.stack_name();
        let report = self.run_deploy(provider).await.map_err(|e| {
            error!(stack = %stack_name, "Deploy failed: {}", e);
            e.in_stack(&stack_name)
        })?;

        info!(
            run_id = %report.run_id,
            stack = %report.stack_name,
            functions = report.functions.len(),
            "Deploy reconciliation complete"
        );
        Ok(report)
    }

    async fn run_deploy(&self, provider: Arc<dyn CloudControlPlane>) -> Result<DeployReport, SyncError> {
        let mut state = self.prepare_deploy(provider).await?;
        state.attach_session(warehouse::connect(&self.config.warehouse).await?);
        self.reconcile(&state).await
    }

    /// State for a remove run; stack outputs are not needed to tear down
    pub fn prepare_remove(&self, provider: Arc<dyn CloudControlPlane>) -> ReconciliationState {
        let mut state = ReconciliationState::new(self.config.stack_name(), provider);
        state.attach_functions(FunctionRegistrar::enumerate_http_functions(
            &self.config.functions,
        ));
        state
    }

    pub async fn teardown(&self, state: &ReconciliationState) -> Result<TeardownReport, SyncError> {
        let mut report =
            TeardownOrchestrator::teardown(state.session()?, &state.stack_name, &state.functions)
                .await?;
        report.run_id = state.run_id.clone();
        report.started_at = state.started_at;
        Ok(report)
    }

    /// Full remove run: warehouse connection, teardown
    pub async fn remove(&self, provider: Arc<dyn CloudControlPlane>) -> Result<TeardownReport, SyncError> {
        let stack_name = self.config.stack_name();
        let report = self.run_remove(provider).await.map_err(|e| {
            error!(stack = %stack_name, "Teardown failed: {}", e);
            e.in_stack(&stack_name)
        })?;

        info!(
            run_id = %report.run_id,
            stack = %report.stack_name,
            dropped = report.dropped_functions.len(),
            failed = report.failed_drops.len(),
            "Teardown complete"
        );
        Ok(report)
    }

    async fn run_remove(&self, provider: Arc<dyn CloudControlPlane>) -> Result<TeardownReport, SyncError> {
        let mut state = self.prepare_remove(provider);
        state.attach_session(warehouse::connect(&self.config.warehouse).await?);
        self.teardown(&state).await
    }
}
