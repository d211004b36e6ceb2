//! Multi-agent collaborative sessions: one intent fanned out to several named
//! responders by an external orchestration service.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::AggregationError;
use crate::proposal::Artifacts;
use crate::services::{AgentOrchestrator, OrchestrationContext, OrchestrationRequest};

/// A registered responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub role: String,
}

impl AgentProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
        }
    }
}

/// Ordered set of responders available to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRegistry {
    agents: Vec<AgentProfile>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<AgentProfile>) -> Self {
        Self { agents }
    }

    /// The five built-in responders.
    pub fn default_roster() -> Self {
        Self::new(vec![
            AgentProfile::new("architect", "Architect", "System design and data flow"),
            AgentProfile::new("frontend", "Frontend Engineer", "UI components and interaction"),
            AgentProfile::new("backend", "Backend Engineer", "APIs and persistence"),
            AgentProfile::new("reviewer", "Code Reviewer", "Quality, security and maintainability"),
            AgentProfile::new("tester", "QA Engineer", "Test plans and edge cases"),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn all(&self) -> &[AgentProfile] {
        &self.agents
    }

    /// Active set for a session: every registered agent when `requested` is
    /// `None`, otherwise the requested ids that are registered, in request order.
    pub fn select(&self, requested: Option<&[String]>) -> Vec<AgentProfile> {
        let Some(requested) = requested else {
            return self.agents.clone();
        };
        let mut selected: Vec<AgentProfile> = Vec::with_capacity(requested.len());
        for id in requested {
            match self.get(id) {
                Some(agent) if !selected.iter().any(|s| s.id == agent.id) => {
                    selected.push(agent.clone())
                }
                Some(_) => {}
                None => warn!(agent = %id, "ignoring unknown agent id"),
            }
        }
        selected
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::default_roster()
    }
}

/// One responder's contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub agent_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub role: String,
    pub text: String,
    #[serde(default)]
    pub elapsed_ms: u64,
}

/// Aggregated outcome of a successful collaborative session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborativeResult {
    pub session_id: Option<String>,
    pub responses: Vec<AgentResponse>,
    pub total_elapsed_ms: u64,
    pub summary: String,
}

/// Activation feed of the current session, for progress display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentActivity {
    /// Agents marked active so far, in activation order.
    pub activated: Vec<String>,
    /// Agents of the session not yet marked active.
    pub pending: Vec<String>,
    pub in_progress: bool,
}

pub const DEFAULT_AGENT_STAGGER: Duration = Duration::from_millis(300);

/// Runs collaborative sessions and keeps the last successful result.
pub struct MultiAgentAggregator {
    orchestrator: Arc<dyn AgentOrchestrator>,
    registry: AgentRegistry,
    stagger: Duration,
    activity: watch::Sender<AgentActivity>,
    last_result: Option<CollaborativeResult>,
}

impl MultiAgentAggregator {
    pub fn new(orchestrator: Arc<dyn AgentOrchestrator>) -> Self {
        let (activity, _) = watch::channel(AgentActivity::default());
        Self {
            orchestrator,
            registry: AgentRegistry::default_roster(),
            stagger: DEFAULT_AGENT_STAGGER,
            activity,
            last_result: None,
        }
    }

    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentActivity> {
        self.activity.subscribe()
    }

    pub fn last_result(&self) -> Option<&CollaborativeResult> {
        self.last_result.as_ref()
    }

    /// Sends `message` with the current artifacts to the selected agents.
    ///
    /// On failure the previously stored result is left untouched and no
    /// partial result is returned.
    pub async fn collaborate(
        &mut self,
        message: &str,
        context: &Artifacts,
        requested: Option<&[String]>,
    ) -> Result<CollaborativeResult, AggregationError> {
        let agents = self.registry.select(requested);
        if agents.is_empty() {
            warn!("collaborative session has no registered agents");
            return Err(AggregationError::NoAgents);
        }
        let ids: Vec<String> = agents.iter().map(|a| a.id.clone()).collect();
        info!(agents = ?ids, "collaborative session started");

        let request = OrchestrationRequest {
            message: message.to_string(),
            context: OrchestrationContext {
                code: context.clone(),
            },
            requested_agents: Some(ids.clone()),
        };
        self.activity.send_replace(AgentActivity {
            activated: Vec::new(),
            pending: ids.clone(),
            in_progress: true,
        });

        let started = Instant::now();
        let result = {
            let call = self.orchestrator.orchestrate(request);
            let activation = activate(&self.activity, &ids, self.stagger);
            tokio::pin!(call, activation);
            let mut activation_done = false;
            loop {
                tokio::select! {
                    result = &mut call => break result,
                    () = &mut activation, if !activation_done => activation_done = true,
                }
            }
        };
        self.activity.send_modify(|a| a.in_progress = false);

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "collaborative session failed");
                return Err(err.into());
            }
        };
        if !response.success {
            let reason = if response.summary.trim().is_empty() {
                "orchestration service reported failure".to_string()
            } else {
                response.summary
            };
            warn!(reason = %reason, "collaborative session rejected");
            return Err(AggregationError::Rejected(reason));
        }

        let total_elapsed_ms = if response.total_processing_time_ms > 0 {
            response.total_processing_time_ms
        } else {
            started.elapsed().as_millis() as u64
        };
        let summary = if response.summary.trim().is_empty() {
            synthesize_summary(&response.responses, total_elapsed_ms)
        } else {
            response.summary
        };
        let result = CollaborativeResult {
            session_id: response.session_id,
            responses: response.responses,
            total_elapsed_ms,
            summary,
        };
        info!(
            responses = result.responses.len(),
            total_elapsed_ms, "collaborative session finished"
        );
        self.last_result = Some(result.clone());
        Ok(result)
    }
}

async fn activate(activity: &watch::Sender<AgentActivity>, ids: &[String], stagger: Duration) {
    for (index, id) in ids.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(stagger).await;
        }
        activity.send_modify(|a| {
            a.pending.retain(|p| p != id);
            a.activated.push(id.clone());
        });
        debug!(agent = %id, "agent activated");
    }
}

fn synthesize_summary(responses: &[AgentResponse], total_elapsed_ms: u64) -> String {
    let names: Vec<&str> = responses.iter().map(|r| r.agent_name.as_str()).collect();
    format!(
        "{} agents responded in {} ms: {}",
        responses.len(),
        total_elapsed_ms,
        names.join(", ")
    )
}
