//! Contracts of the external collaborators. The core only talks to them
//! through these traits; `workbench-ai` provides HTTP implementations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agents::AgentResponse;
use crate::errors::ServiceError;
use crate::proposal::{Artifacts, Proposal, ProposalId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub title: String,
    pub description: String,
}

/// Generated code. A missing field keeps the previous artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl GenerationResponse {
    /// Overwrites only the artifacts this response carries.
    pub fn apply_to(self, artifacts: &mut Artifacts) {
        if let Some(frontend) = self.frontend {
            artifacts.frontend = frontend;
        }
        if let Some(backend) = self.backend {
            artifacts.backend = backend;
        }
        if let Some(database) = self.database {
            artifacts.database = database;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub proposal_id: Option<ProposalId>,
    pub code: Artifacts,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub score: f64,
    pub passed: bool,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    /// Score rounded and clamped into 0..=100.
    pub fn score_percent(&self) -> u8 {
        if self.score.is_nan() {
            return 0;
        }
        self.score.round().clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationRequest {
    pub proposal_id: Option<ProposalId>,
    pub title: String,
    pub description: String,
    pub code: Artifacts,
}

/// Reference to the merge/pull request created by the integration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationReceipt {
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub proposal_id: Option<ProposalId>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReceipt {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationContext {
    pub code: Artifacts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRequest {
    pub message: String,
    pub context: OrchestrationContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_agents: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResponse {
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub responses: Vec<AgentResponse>,
    #[serde(default)]
    pub total_agents: usize,
    #[serde(default)]
    pub total_processing_time_ms: u64,
    #[serde(default)]
    pub summary: String,
}

#[async_trait::async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: GenerationRequest)
    -> Result<GenerationResponse, ServiceError>;
}

#[async_trait::async_trait]
pub trait ValidationService: Send + Sync {
    async fn validate(&self, request: ValidationRequest) -> Result<ValidationReport, ServiceError>;
}

#[async_trait::async_trait]
pub trait IntegrationService: Send + Sync {
    async fn integrate(
        &self,
        request: IntegrationRequest,
    ) -> Result<IntegrationReceipt, ServiceError>;
}

#[async_trait::async_trait]
pub trait DeploymentService: Send + Sync {
    async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentReceipt, ServiceError>;
}

/// Persistence of proposals. Conflicts between concurrent editors are the
/// store's concern.
#[async_trait::async_trait]
pub trait ProposalStore: Send + Sync {
    /// Inserts or updates the proposal and returns its id.
    async fn save(&self, proposal: &Proposal) -> Result<ProposalId, ServiceError>;
}

/// Single call that fans one message out to several agents server-side.
#[async_trait::async_trait]
pub trait AgentOrchestrator: Send + Sync {
    async fn orchestrate(
        &self,
        request: OrchestrationRequest,
    ) -> Result<OrchestrationResponse, ServiceError>;
}

/// The collaborators a lifecycle controller needs.
#[derive(Clone)]
pub struct WorkbenchServices {
    pub generation: Arc<dyn GenerationService>,
    pub validation: Arc<dyn ValidationService>,
    pub integration: Arc<dyn IntegrationService>,
    pub deployment: Arc<dyn DeploymentService>,
    pub store: Option<Arc<dyn ProposalStore>>,
}
