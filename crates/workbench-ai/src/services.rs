//! HTTP implementations of the workbench service contracts.

use std::sync::Arc;

use workbench_core::ServiceError;
use workbench_core::WorkbenchConfig;
use workbench_core::services::{
    AgentOrchestrator, DeploymentReceipt, DeploymentRequest, DeploymentService,
    GenerationRequest, GenerationResponse, GenerationService, IntegrationReceipt,
    IntegrationRequest, IntegrationService, OrchestrationRequest, OrchestrationResponse,
    ProposalStore, ValidationReport, ValidationRequest, ValidationService, WorkbenchServices,
};

use crate::errors::ConfigError;
use crate::http::ServiceClient;

/// One client for every hosted workbench service.
#[derive(Clone, Debug)]
pub struct HttpServices {
    client: ServiceClient,
}

impl HttpServices {
    pub fn new(config: &WorkbenchConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_client(ServiceClient::new(config)?))
    }

    pub fn with_client(client: ServiceClient) -> Self {
        Self { client }
    }

    /// Bundles this client as the collaborators of a lifecycle controller.
    pub fn into_workbench_services(self, store: Option<Arc<dyn ProposalStore>>) -> WorkbenchServices {
        let shared = Arc::new(self);
        WorkbenchServices {
            generation: shared.clone(),
            validation: shared.clone(),
            integration: shared.clone(),
            deployment: shared,
            store,
        }
    }
}

#[async_trait::async_trait]
impl GenerationService for HttpServices {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        self.client.post_json("generation", "/generate", &request).await
    }
}

#[async_trait::async_trait]
impl ValidationService for HttpServices {
    async fn validate(&self, request: ValidationRequest) -> Result<ValidationReport, ServiceError> {
        self.client.post_json("validation", "/validate", &request).await
    }
}

#[async_trait::async_trait]
impl IntegrationService for HttpServices {
    async fn integrate(&self, request: IntegrationRequest) -> Result<IntegrationReceipt, ServiceError> {
        self.client.post_json("integration", "/integrate", &request).await
    }
}

#[async_trait::async_trait]
impl DeploymentService for HttpServices {
    async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentReceipt, ServiceError> {
        self.client.post_json("deployment", "/deploy", &request).await
    }
}

#[async_trait::async_trait]
impl AgentOrchestrator for HttpServices {
    async fn orchestrate(
        &self,
        request: OrchestrationRequest,
    ) -> Result<OrchestrationResponse, ServiceError> {
        self.client
            .post_json("agents", "/agents/orchestrate", &request)
            .await
    }
}
