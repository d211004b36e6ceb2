//! End-to-end run against in-memory services: generation, validation,
//! sandbox preview, integration and deployment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use workbench_core::services::{
    DeploymentReceipt, DeploymentRequest, DeploymentService, GenerationRequest,
    GenerationResponse, GenerationService, IntegrationReceipt, IntegrationRequest,
    IntegrationService, ProposalStore, ValidationReport, ValidationRequest, ValidationService,
    WorkbenchServices,
};
use workbench_core::{
    Intent, IntentKind, LifecycleController, LifecyclePolicy, Outcome, Proposal, ProposalId,
    ServiceError, Stage, WorkbenchConfig, classify,
};
use workbench_sandbox::{
    BridgeRealmFactory, ConsoleEntry, ConsoleLevel, SandboxExecutionHarness, SandboxMessage,
    SandboxState,
};

const COUNTER_COMPONENT: &str = r#"import { useState } from 'react';
import { Button } from '@/components/ui/button';

interface CounterProps {
  label?: string;
}

export default function Counter({ label = 'Clicks' }: CounterProps): JSX.Element {
  const [count, setCount] = useState<number>(0);
  console.log('counter mounted');
  return <Button onClick={() => setCount(count + 1)}>{label}: {count}</Button>;
}
"#;

struct ScriptedGeneration;

#[async_trait]
impl GenerationService for ScriptedGeneration {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        info!(title = %request.title, "scripted generation");
        Ok(GenerationResponse {
            frontend: Some(COUNTER_COMPONENT.to_string()),
            backend: None,
            database: None,
        })
    }
}

/// Gives any non-empty code 82 and an empty proposal 10.
struct ScriptedValidation;

#[async_trait]
impl ValidationService for ScriptedValidation {
    async fn validate(&self, request: ValidationRequest) -> Result<ValidationReport, ServiceError> {
        let score = if request.code.is_empty() { 10.0 } else { 82.0 };
        Ok(ValidationReport {
            score,
            passed: score >= 70.0,
            summary: Some("Scripted review".into()),
            recommendations: vec!["Add an accessible label".into()],
        })
    }
}

struct InMemoryDelivery;

#[async_trait]
impl IntegrationService for InMemoryDelivery {
    async fn integrate(&self, request: IntegrationRequest) -> Result<IntegrationReceipt, ServiceError> {
        Ok(IntegrationReceipt {
            reference: format!("PR-{}", request.title.len()),
        })
    }
}

#[async_trait]
impl DeploymentService for InMemoryDelivery {
    async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentReceipt, ServiceError> {
        let reference = request.reference.unwrap_or_else(|| "local".into());
        Ok(DeploymentReceipt {
            url: format!("https://preview.local/{}", reference.to_lowercase()),
        })
    }
}

struct InMemoryStore;

#[async_trait]
impl ProposalStore for InMemoryStore {
    async fn save(&self, proposal: &Proposal) -> Result<ProposalId, ServiceError> {
        Ok(proposal.id.unwrap_or_else(ProposalId::new))
    }
}

pub fn in_memory_services() -> WorkbenchServices {
    let delivery = Arc::new(InMemoryDelivery);
    WorkbenchServices {
        generation: Arc::new(ScriptedGeneration),
        validation: Arc::new(ScriptedValidation),
        integration: delivery.clone(),
        deployment: delivery,
        store: Some(Arc::new(InMemoryStore)),
    }
}

#[derive(Debug)]
pub struct DemoReport {
    pub kind: IntentKind,
    pub outcomes: Vec<Outcome>,
    pub proposal: Proposal,
    pub sandbox: Option<SandboxState>,
    pub console: Vec<ConsoleEntry>,
}

/// Drives one message through the whole workbench.
pub async fn run_demo(message: &str, config: &WorkbenchConfig) -> DemoReport {
    let kind = classify(message);
    let controller = LifecycleController::new(Proposal::new("", ""), in_memory_services())
        .with_policy(LifecyclePolicy {
            pass_threshold: config.pass_threshold,
        });
    if kind == IntentKind::Conversation {
        return DemoReport {
            kind,
            outcomes: Vec::new(),
            proposal: controller.proposal(),
            sandbox: None,
            console: Vec::new(),
        };
    }

    let mut outcomes = vec![
        controller
            .start_generation(Intent::from_message(message))
            .await,
    ];

    let (sandbox, console) =
        preview(&controller.proposal().artifacts.frontend, config.console_capacity).await;

    if controller.stage() == Stage::PendingApproval {
        outcomes.push(controller.mark_approved().await);
        outcomes.push(controller.create_integration_request().await);
        outcomes.push(controller.deploy().await);
    }

    DemoReport {
        kind,
        outcomes,
        proposal: controller.proposal(),
        sandbox: Some(sandbox),
        console,
    }
}

/// Loads `source` into a headless realm that acknowledges every document.
async fn preview(source: &str, console_capacity: usize) -> (SandboxState, Vec<ConsoleEntry>) {
    let (factory, mut launches) = BridgeRealmFactory::new();
    let host = tokio::spawn(async move {
        while let Some(mut launch) = launches.recv().await {
            let _ = launch.port.post(SandboxMessage::Console(ConsoleEntry::new(
                ConsoleLevel::Info,
                format!("document rendered ({} bytes)", launch.document.len()),
            )));
            let _ = launch.port.post(SandboxMessage::Ready);
            launch.torn_down().await;
        }
    });

    let mut sandbox =
        SandboxExecutionHarness::new(Arc::new(factory)).console_capacity(console_capacity);
    let state = match sandbox.load(source).await {
        Ok(_) => sandbox.wait_settled(Duration::from_secs(2)).await,
        Err(_) => sandbox.state(),
    };
    let console = sandbox.console().entries().cloned().collect();
    sandbox.shutdown().await;
    drop(sandbox);
    let _ = host.await;
    (state, console)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counter_request_runs_to_deployment() {
        let report = run_demo("crea un botón que cuente clics", &WorkbenchConfig::default()).await;

        assert_eq!(report.kind, IntentKind::CodeGeneration);
        assert_eq!(report.outcomes[0].from, Stage::Draft);
        assert_eq!(report.outcomes[0].to, Stage::PendingApproval);
        assert_eq!(report.proposal.validation_score, Some(82));
        assert_eq!(report.proposal.stage, Stage::Deployed);
        assert!(report.proposal.id.is_some());
        assert_eq!(
            report.proposal.deployment_url.as_deref(),
            report
                .proposal
                .integration_ref
                .as_ref()
                .map(|r| format!("https://preview.local/{}", r.to_lowercase()))
                .as_deref()
        );
        assert_eq!(report.sandbox, Some(SandboxState::Ready));
        assert!(report.console[0].text.starts_with("document rendered"));
    }

    #[tokio::test]
    async fn stricter_threshold_stops_before_approval() {
        let config = WorkbenchConfig {
            pass_threshold: 90,
            ..WorkbenchConfig::default()
        };
        let report = run_demo("create a signup form", &config).await;
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].to, Stage::Draft);
        assert_eq!(report.proposal.validation_score, Some(82));
        assert_eq!(report.sandbox, Some(SandboxState::Ready));
    }

    #[tokio::test]
    async fn conversation_does_not_touch_the_lifecycle() {
        let report = run_demo("¿qué hora es?", &WorkbenchConfig::default()).await;
        assert_eq!(report.kind, IntentKind::Conversation);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.proposal.stage, Stage::Draft);
        assert_eq!(report.sandbox, None);
    }
}
