//! Core of the code-generation workbench: the proposal lifecycle, multi-agent
//! sessions and the contracts of the external services they drive.
//!
//! ```no_run
//! use workbench_core::prelude::*;
//!
//! # async fn run(services: WorkbenchServices) {
//! let controller = LifecycleController::new(Proposal::new("", ""), services);
//! let outcome = controller
//!     .start_generation(Intent::from_message("crea un botón que cuente clics"))
//!     .await;
//! println!("{} -> {}", outcome.from, outcome.to);
//! # }
//! ```

/// Multi-agent collaborative sessions.
pub mod agents;
/// Environment-driven runtime configuration.
pub mod config;
/// Error types shared by the workbench crates.
pub mod errors;
/// Classification of free-form user messages.
pub mod intent;
/// Proposal lifecycle controller.
pub mod lifecycle;
/// User-visible notices.
pub mod notice;
/// Process-wide logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Proposal data model.
pub mod proposal;
/// External service contracts.
pub mod services;

pub use agents::{
    AgentActivity, AgentProfile, AgentRegistry, AgentResponse, CollaborativeResult,
    MultiAgentAggregator,
};
pub use config::WorkbenchConfig;
pub use errors::{AggregationError, ConfigError, ServiceError};
pub use intent::{Intent, IntentKind, classify};
pub use lifecycle::{LifecycleController, LifecyclePolicy, Operation, Outcome, Snapshot};
pub use notice::{NOTICE_CAPACITY, Notice, NoticeBoard, NoticeLevel};
pub use observability::{LogTarget, init_observability};
pub use proposal::{ArtifactKind, Artifacts, Proposal, ProposalId, Stage};
pub use services::WorkbenchServices;
