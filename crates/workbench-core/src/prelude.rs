pub use crate::agents::{AgentActivity, AgentRegistry, CollaborativeResult, MultiAgentAggregator};
pub use crate::config::WorkbenchConfig;
pub use crate::errors::{AggregationError, ServiceError};
pub use crate::intent::{Intent, IntentKind, classify};
pub use crate::lifecycle::{LifecycleController, LifecyclePolicy, Outcome};
pub use crate::notice::{Notice, NoticeLevel};
pub use crate::proposal::{ArtifactKind, Artifacts, Proposal, Stage};
pub use crate::services::{
    AgentOrchestrator, DeploymentService, GenerationService, IntegrationService, ProposalStore,
    ValidationService, WorkbenchServices,
};
