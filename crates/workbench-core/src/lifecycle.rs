//! Lifecycle of one proposal:
//!
//! ```text
//!   draft -> generating -> validating -> pending_approval -> approved -> merged -> deployed
//!                              |                |
//!                              +-----> draft <--+   (validation failure only)
//! ```
//!
//! Every operation resolves to an [`Outcome`]. Operations invoked from a stage
//! that does not allow them are no-ops that carry a warning notice.

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::intent::Intent;
use crate::notice::{Notice, NoticeBoard};
use crate::proposal::{ArtifactKind, Proposal, Stage};
use crate::services::{
    DeploymentRequest, GenerationRequest, IntegrationRequest, ValidationReport, ValidationRequest,
    WorkbenchServices,
};

/// Validation policy applied by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Minimum score (inclusive) for a passing validation.
    pub pass_threshold: u8,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self { pass_threshold: 70 }
    }
}

/// Operations that move a proposal through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Generation,
    Validation,
    Integration,
    Approval,
    Deployment,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Generation,
        Operation::Validation,
        Operation::Integration,
        Operation::Approval,
        Operation::Deployment,
    ];

    /// Stages from which the operation may start.
    pub fn allowed_from(self, stage: Stage) -> bool {
        match self {
            Operation::Generation => stage == Stage::Draft,
            Operation::Validation => matches!(
                stage,
                Stage::Draft | Stage::Validating | Stage::PendingApproval
            ),
            Operation::Integration => matches!(stage, Stage::PendingApproval | Stage::Approved),
            Operation::Approval => stage == Stage::PendingApproval,
            Operation::Deployment => stage == Stage::Merged,
        }
    }

    fn calls_service(self) -> bool {
        !matches!(self, Operation::Approval)
    }

    fn verb(self) -> &'static str {
        match self {
            Operation::Generation => "generate code for",
            Operation::Validation => "validate",
            Operation::Integration => "open an integration request for",
            Operation::Approval => "approve",
            Operation::Deployment => "deploy",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Operation::Generation => "generation",
            Operation::Validation => "validation",
            Operation::Integration => "integration",
            Operation::Approval => "approval",
            Operation::Deployment => "deployment",
        }
    }
}

/// Everything a host needs to render the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub proposal: Proposal,
    /// Service call currently awaiting a response, if any.
    pub in_flight: Option<Operation>,
    pub notices: NoticeBoard,
}

impl Snapshot {
    /// Check-and-move step of an operation. Runs under the state lock.
    fn begin<R>(
        &mut self,
        op: Operation,
        prepare: impl FnOnce(&mut Proposal) -> R,
    ) -> Result<(Stage, R), Outcome> {
        let stage = self.proposal.stage;
        let rejection = if let Some(busy) = self.in_flight {
            Some(format!(
                "Cannot {} this proposal while {} is in progress",
                op.verb(),
                busy.noun()
            ))
        } else if !op.allowed_from(stage) {
            Some(format!("Cannot {} a proposal in stage {stage}", op.verb()))
        } else {
            None
        };

        if let Some(text) = rejection {
            warn!(operation = op.noun(), %stage, "lifecycle operation rejected");
            let notice = Notice::warning(text);
            self.notices.push(notice.clone());
            return Err(Outcome {
                from: stage,
                to: stage,
                notice: Some(notice),
            });
        }

        if op.calls_service() {
            self.in_flight = Some(op);
        }
        Ok((stage, prepare(&mut self.proposal)))
    }

    /// Clears the in-flight marker, moves to `to` and records the notice.
    fn complete(&mut self, to: Stage, notice: &Notice) {
        self.in_flight = None;
        self.proposal.move_to(to);
        self.notices.push(notice.clone());
    }
}

/// Result of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub from: Stage,
    pub to: Stage,
    pub notice: Option<Notice>,
}

impl Outcome {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Owns one proposal for one workbench session.
///
/// State lives in a watch channel: every transition is a single synchronous
/// modification, and service calls happen between modifications, so artifacts
/// can be edited while a call is in flight.
pub struct LifecycleController {
    state: watch::Sender<Snapshot>,
    services: WorkbenchServices,
    policy: LifecyclePolicy,
}

impl LifecycleController {
    pub fn new(proposal: Proposal, services: WorkbenchServices) -> Self {
        let (state, _) = watch::channel(Snapshot {
            proposal,
            in_flight: None,
            notices: NoticeBoard::default(),
        });
        Self {
            state,
            services,
            policy: LifecyclePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LifecyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn proposal(&self) -> Proposal {
        self.state.borrow().proposal.clone()
    }

    pub fn stage(&self) -> Stage {
        self.state.borrow().proposal.stage
    }

    pub fn dismiss_notice(&self, id: Uuid) -> bool {
        self.update(|s| s.notices.dismiss(id))
    }

    /// Rewrites one artifact. Valid in every stage, never changes the stage.
    pub fn edit_artifact(&self, kind: ArtifactKind, content: impl Into<String>) {
        let content = content.into();
        debug!(artifact = %kind, bytes = content.len(), "artifact edited");
        self.update(|s| s.proposal.artifacts.set(kind, content));
    }

    /// Generates code for `intent`, then validates it immediately.
    pub async fn start_generation(&self, intent: Intent) -> Outcome {
        let begun = self.update(|s| {
            s.begin(Operation::Generation, |p| {
                p.title = intent.title;
                p.description = intent.description;
                p.move_to(Stage::Generating);
                GenerationRequest {
                    title: p.title.clone(),
                    description: p.description.clone(),
                }
            })
        });
        let (from, request) = match begun {
            Ok(begun) => begun,
            Err(rejected) => return rejected,
        };
        info!(title = %request.title, "generation started");
        self.persist().await;

        match self.services.generation.generate(request).await {
            Ok(response) => {
                let request = self.update(|s| {
                    response.apply_to(&mut s.proposal.artifacts);
                    s.proposal.move_to(Stage::Validating);
                    s.in_flight = Some(Operation::Validation);
                    validation_request(&s.proposal)
                });
                info!(from = %Stage::Generating, to = %Stage::Validating, "lifecycle transition");
                self.persist().await;
                self.finish_validation(from, request).await
            }
            Err(err) => {
                warn!(error = %err, "generation failed");
                let notice = Notice::error(format!("Code generation failed: {err}"));
                self.update(|s| s.complete(Stage::Draft, &notice));
                self.persist().await;
                Outcome {
                    from,
                    to: Stage::Draft,
                    notice: Some(notice),
                }
            }
        }
    }

    /// Manual validation of the current artifacts.
    ///
    /// From `draft` the proposal moves to `validating` first; from
    /// `pending_approval` it stays there until the result is known.
    pub async fn request_validation(&self) -> Outcome {
        let begun = self.update(|s| {
            s.begin(Operation::Validation, |p| {
                if p.stage == Stage::Draft {
                    p.move_to(Stage::Validating);
                }
                validation_request(p)
            })
        });
        let (from, request) = match begun {
            Ok(begun) => begun,
            Err(rejected) => return rejected,
        };
        if from == Stage::Draft {
            self.persist().await;
        }
        self.finish_validation(from, request).await
    }

    /// Forwards all artifacts to the integration service.
    pub async fn create_integration_request(&self) -> Outcome {
        let begun = self.update(|s| {
            s.begin(Operation::Integration, |p| IntegrationRequest {
                proposal_id: p.id,
                title: p.title.clone(),
                description: p.description.clone(),
                code: p.artifacts.clone(),
            })
        });
        let (from, request) = match begun {
            Ok(begun) => begun,
            Err(rejected) => return rejected,
        };

        let result = self.services.integration.integrate(request).await;
        let outcome = self.update(|s| match result {
            Ok(receipt) => {
                let notice =
                    Notice::info(format!("Integration request {} created", receipt.reference));
                s.proposal.integration_ref = Some(receipt.reference);
                s.complete(Stage::Merged, &notice);
                Outcome {
                    from,
                    to: Stage::Merged,
                    notice: Some(notice),
                }
            }
            Err(err) => {
                warn!(error = %err, "integration request failed");
                let notice = Notice::error(format!("Integration request failed: {err}"));
                s.complete(from, &notice);
                Outcome {
                    from,
                    to: from,
                    notice: Some(notice),
                }
            }
        });
        self.log_outcome(&outcome);
        self.persist().await;
        outcome
    }

    /// Records an approval reached outside the core (vote tally).
    pub async fn mark_approved(&self) -> Outcome {
        let begun = self.update(|s| {
            s.begin(Operation::Approval, |p| p.move_to(Stage::Approved))
        });
        let outcome = match begun {
            Ok((from, ())) => Outcome {
                from,
                to: Stage::Approved,
                notice: None,
            },
            Err(rejected) => return rejected,
        };
        self.log_outcome(&outcome);
        self.persist().await;
        outcome
    }

    /// Deploys a merged proposal.
    pub async fn deploy(&self) -> Outcome {
        let begun = self.update(|s| {
            s.begin(Operation::Deployment, |p| DeploymentRequest {
                proposal_id: p.id,
                reference: p.integration_ref.clone(),
            })
        });
        let (from, request) = match begun {
            Ok(begun) => begun,
            Err(rejected) => return rejected,
        };

        let result = self.services.deployment.deploy(request).await;
        let outcome = self.update(|s| match result {
            Ok(receipt) => {
                let notice = Notice::info(format!("Deployed to {}", receipt.url));
                s.proposal.deployment_url = Some(receipt.url);
                s.complete(Stage::Deployed, &notice);
                Outcome {
                    from,
                    to: Stage::Deployed,
                    notice: Some(notice),
                }
            }
            Err(err) => {
                warn!(error = %err, "deployment failed");
                let notice = Notice::error(format!("Deployment failed: {err}"));
                s.complete(from, &notice);
                Outcome {
                    from,
                    to: from,
                    notice: Some(notice),
                }
            }
        });
        self.log_outcome(&outcome);
        self.persist().await;
        outcome
    }

    /// Saves the proposal to the store, if one is configured.
    pub async fn save(&self) {
        self.persist().await;
    }

    async fn finish_validation(&self, from: Stage, request: ValidationRequest) -> Outcome {
        let threshold = self.policy.pass_threshold;
        let result = self.services.validation.validate(request).await;
        let outcome = self.update(|s| {
            let (to, notice) = match result {
                Ok(report) => {
                    let score = report.score_percent();
                    let passed = report.passed && score >= threshold;
                    let notice = if passed {
                        Notice::info(format!("Validation passed with score {score}"))
                    } else {
                        Notice::warning(failure_text(score, threshold, &report))
                    };
                    s.proposal.validation_score = Some(score);
                    s.proposal.recommendations = report.recommendations;
                    let to = if passed {
                        Stage::PendingApproval
                    } else {
                        Stage::Draft
                    };
                    (to, notice)
                }
                Err(err) => {
                    warn!(error = %err, "validation call failed");
                    (
                        Stage::Draft,
                        Notice::error(format!("Validation could not run: {err}")),
                    )
                }
            };
            s.complete(to, &notice);
            Outcome {
                from,
                to,
                notice: Some(notice),
            }
        });
        self.log_outcome(&outcome);
        self.persist().await;
        outcome
    }

    async fn persist(&self) {
        let Some(store) = self.services.store.as_ref() else {
            return;
        };
        let proposal = self.state.borrow().proposal.clone();
        match store.save(&proposal).await {
            Ok(id) => {
                self.update(|s| {
                    if s.proposal.id.is_none() {
                        s.proposal.id = Some(id);
                    }
                });
            }
            Err(err) => {
                warn!(error = %err, "saving proposal failed");
                let notice = Notice::warning(format!("Could not save the proposal: {err}"));
                self.update(|s| s.notices.push(notice));
            }
        }
    }

    fn log_outcome(&self, outcome: &Outcome) {
        if outcome.changed() {
            info!(from = %outcome.from, to = %outcome.to, "lifecycle transition");
        } else {
            debug!(stage = %outcome.to, "lifecycle operation finished without stage change");
        }
    }

    fn update<T>(&self, f: impl FnOnce(&mut Snapshot) -> T) -> T {
        let mut out = None;
        self.state.send_modify(|snapshot| out = Some(f(snapshot)));
        out.expect("send_modify runs the closure synchronously")
    }
}

fn validation_request(proposal: &Proposal) -> ValidationRequest {
    ValidationRequest {
        proposal_id: proposal.id,
        code: proposal.artifacts.clone(),
        title: proposal.title.clone(),
        description: proposal.description.clone(),
    }
}

fn failure_text(score: u8, threshold: u8, report: &ValidationReport) -> String {
    let mut text = format!("Validation scored {score} (needs {threshold})");
    if let Some(summary) = report.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        text.push_str(". ");
        text.push_str(summary.trim());
    }
    if !report.recommendations.is_empty() {
        text.push_str(". Recommendations: ");
        text.push_str(&report.recommendations.join("; "));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use crate::notice::NoticeLevel;
    use crate::proposal::{Artifacts, ProposalId};
    use crate::services::{
        DeploymentReceipt, DeploymentService, GenerationResponse, GenerationService,
        IntegrationReceipt, IntegrationService, ProposalStore, ValidationService,
    };
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    const COUNTER_SOURCE: &str = "export default function Counter() {\n  const [count, setCount] = useState(0);\n  return <Button onClick={() => setCount(count + 1)}>Clicks: {count}</Button>;\n}";

    #[derive(Default)]
    struct FakeGeneration {
        calls: AtomicUsize,
        result: Mutex<Option<Result<GenerationResponse, ServiceError>>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait::async_trait]
    impl GenerationService for FakeGeneration {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(GenerationResponse::default()))
        }
    }

    #[derive(Default)]
    struct FakeValidation {
        calls: AtomicUsize,
        results: Mutex<VecDeque<Result<ValidationReport, ServiceError>>>,
        requests: Mutex<Vec<ValidationRequest>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait::async_trait]
    impl ValidationService for FakeValidation {
        async fn validate(
            &self,
            request: ValidationRequest,
        ) -> Result<ValidationReport, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::transport("validation", "no scripted result")))
        }
    }

    #[derive(Default)]
    struct FakeIntegration {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl IntegrationService for FakeIntegration {
        async fn integrate(
            &self,
            request: IntegrationRequest,
        ) -> Result<IntegrationReceipt, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::status("integration", 503, "unavailable"));
            }
            assert!(!request.code.frontend.is_empty());
            Ok(IntegrationReceipt {
                reference: "PR-7".into(),
            })
        }
    }

    #[derive(Default)]
    struct FakeDeployment {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DeploymentService for FakeDeployment {
        async fn deploy(
            &self,
            request: DeploymentRequest,
        ) -> Result<DeploymentReceipt, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.reference.as_deref(), Some("PR-7"));
            Ok(DeploymentReceipt {
                url: "https://preview.example.test/p/7".into(),
            })
        }
    }

    struct FakeStore {
        id: ProposalId,
        saves: AtomicUsize,
        stages: Mutex<Vec<Stage>>,
        fail: bool,
    }

    impl FakeStore {
        fn new(fail: bool) -> Self {
            Self {
                id: ProposalId::new(),
                saves: AtomicUsize::new(0),
                stages: Mutex::default(),
                fail,
            }
        }

        fn saved_stages(&self) -> Vec<Stage> {
            self.stages.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ProposalStore for FakeStore {
        async fn save(&self, proposal: &Proposal) -> Result<ProposalId, ServiceError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.stages.lock().unwrap().push(proposal.stage);
            if self.fail {
                Err(ServiceError::transport("store", "offline"))
            } else {
                Ok(self.id)
            }
        }
    }

    struct Fakes {
        generation: Arc<FakeGeneration>,
        validation: Arc<FakeValidation>,
        integration: Arc<FakeIntegration>,
        deployment: Arc<FakeDeployment>,
    }

    impl Fakes {
        fn new(generation: FakeGeneration, validation: FakeValidation) -> Self {
            Self {
                generation: Arc::new(generation),
                validation: Arc::new(validation),
                integration: Arc::new(FakeIntegration::default()),
                deployment: Arc::new(FakeDeployment::default()),
            }
        }

        fn services(&self, store: Option<Arc<dyn ProposalStore>>) -> WorkbenchServices {
            WorkbenchServices {
                generation: self.generation.clone(),
                validation: self.validation.clone(),
                integration: self.integration.clone(),
                deployment: self.deployment.clone(),
                store,
            }
        }

        fn service_calls(&self) -> usize {
            self.generation.calls.load(Ordering::SeqCst)
                + self.validation.calls.load(Ordering::SeqCst)
                + self.integration.calls.load(Ordering::SeqCst)
                + self.deployment.calls.load(Ordering::SeqCst)
        }
    }

    fn generation_returning(frontend: &str) -> FakeGeneration {
        FakeGeneration {
            result: Mutex::new(Some(Ok(GenerationResponse {
                frontend: Some(frontend.into()),
                ..GenerationResponse::default()
            }))),
            ..FakeGeneration::default()
        }
    }

    fn validation_returning(reports: Vec<Result<ValidationReport, ServiceError>>) -> FakeValidation {
        FakeValidation {
            results: Mutex::new(reports.into()),
            ..FakeValidation::default()
        }
    }

    fn report(score: f64, passed: bool) -> ValidationReport {
        ValidationReport {
            score,
            passed,
            summary: None,
            recommendations: vec![],
        }
    }

    fn proposal_at(stage: Stage) -> Proposal {
        let mut proposal = Proposal::new("Counter", "crea un botón que cuente clics");
        proposal.artifacts = Artifacts {
            frontend: COUNTER_SOURCE.into(),
            backend: String::new(),
            database: String::new(),
        };
        proposal.stage = stage;
        proposal.integration_ref = Some("PR-7".into());
        proposal
    }

    #[tokio::test]
    async fn counter_request_reaches_pending_approval_with_score() {
        let fakes = Fakes::new(
            generation_returning(COUNTER_SOURCE),
            validation_returning(vec![Ok(report(82.0, true))]),
        );
        let controller = LifecycleController::new(Proposal::new("", ""), fakes.services(None));

        let outcome = controller
            .start_generation(Intent::from_message("crea un botón que cuente clics"))
            .await;

        assert_eq!(outcome.from, Stage::Draft);
        assert_eq!(outcome.to, Stage::PendingApproval);
        let proposal = controller.proposal();
        assert_eq!(proposal.stage, Stage::PendingApproval);
        assert_eq!(proposal.validation_score, Some(82));
        assert_eq!(proposal.artifacts.frontend, COUNTER_SOURCE);
        assert_eq!(proposal.title, "crea un botón que cuente clics");

        let validated = fakes.validation.requests.lock().unwrap();
        assert_eq!(validated.len(), 1);
        assert_eq!(validated[0].code.frontend, COUNTER_SOURCE);
        assert_eq!(controller.snapshot().in_flight, None);
    }

    #[tokio::test]
    async fn failing_validation_returns_to_draft_with_score_and_guidance() {
        let fakes = Fakes::new(
            generation_returning(COUNTER_SOURCE),
            validation_returning(vec![Ok(ValidationReport {
                score: 41.0,
                passed: false,
                summary: Some("Missing accessibility labels".into()),
                recommendations: vec!["Add aria-label".into(), "Handle overflow".into()],
            })]),
        );
        let controller = LifecycleController::new(Proposal::new("", ""), fakes.services(None));

        let outcome = controller
            .start_generation(Intent::new("Counter", "a click counter"))
            .await;

        assert_eq!(outcome.to, Stage::Draft);
        let proposal = controller.proposal();
        assert_eq!(proposal.validation_score, Some(41));
        assert_eq!(proposal.recommendations.len(), 2);
        let notice = outcome.notice.unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(notice.text.contains("Add aria-label; Handle overflow"));
        assert!(notice.text.contains("needs 70"));
    }

    #[tokio::test]
    async fn passed_flag_below_threshold_still_fails() {
        let fakes = Fakes::new(
            generation_returning(COUNTER_SOURCE),
            validation_returning(vec![Ok(report(69.0, true))]),
        );
        let controller = LifecycleController::new(Proposal::new("", ""), fakes.services(None));
        let outcome = controller
            .start_generation(Intent::new("Counter", "a click counter"))
            .await;
        assert_eq!(outcome.to, Stage::Draft);
        assert_eq!(controller.proposal().validation_score, Some(69));
    }

    #[tokio::test]
    async fn custom_threshold_is_honoured() {
        let fakes = Fakes::new(
            generation_returning(COUNTER_SOURCE),
            validation_returning(vec![Ok(report(60.0, true))]),
        );
        let controller = LifecycleController::new(Proposal::new("", ""), fakes.services(None))
            .with_policy(LifecyclePolicy { pass_threshold: 50 });
        let outcome = controller
            .start_generation(Intent::new("Counter", "a click counter"))
            .await;
        assert_eq!(outcome.to, Stage::PendingApproval);
    }

    #[tokio::test]
    async fn validation_transport_failure_returns_to_draft_without_new_score() {
        let fakes = Fakes::new(
            generation_returning(COUNTER_SOURCE),
            validation_returning(vec![Err(ServiceError::transport(
                "validation",
                "connection refused",
            ))]),
        );
        let mut proposal = Proposal::new("", "");
        proposal.validation_score = Some(55);
        let controller = LifecycleController::new(proposal, fakes.services(None));

        let outcome = controller
            .start_generation(Intent::new("Counter", "a click counter"))
            .await;

        assert_eq!(outcome.to, Stage::Draft);
        assert_eq!(outcome.notice.unwrap().level, NoticeLevel::Error);
        let proposal = controller.proposal();
        assert_eq!(proposal.validation_score, Some(55));
        assert_eq!(proposal.artifacts.frontend, COUNTER_SOURCE);
    }

    #[tokio::test]
    async fn generation_failure_stays_in_draft_and_keeps_artifacts() {
        let fakes = Fakes::new(
            FakeGeneration {
                result: Mutex::new(Some(Err(ServiceError::unauthorized("generation")))),
                ..FakeGeneration::default()
            },
            FakeValidation::default(),
        );
        let controller =
            LifecycleController::new(proposal_at(Stage::Draft), fakes.services(None));

        let outcome = controller
            .start_generation(Intent::new("Counter", "again"))
            .await;

        assert_eq!(outcome.from, Stage::Draft);
        assert_eq!(outcome.to, Stage::Draft);
        assert_eq!(controller.proposal().artifacts.frontend, COUNTER_SOURCE);
        assert_eq!(fakes.validation.calls.load(Ordering::SeqCst), 0);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.in_flight, None);
        assert_eq!(snapshot.notices.active().len(), 1);
    }

    #[tokio::test]
    async fn disallowed_operations_leave_stage_and_artifacts_untouched() {
        for stage in Stage::ALL {
            for op in Operation::ALL {
                if op.allowed_from(stage) {
                    continue;
                }
                let fakes = Fakes::new(
                    generation_returning("replaced"),
                    validation_returning(vec![Ok(report(90.0, true))]),
                );
                let controller =
                    LifecycleController::new(proposal_at(stage), fakes.services(None));
                let before = controller.proposal();

                let outcome = match op {
                    Operation::Generation => {
                        controller.start_generation(Intent::new("x", "y")).await
                    }
                    Operation::Validation => controller.request_validation().await,
                    Operation::Integration => controller.create_integration_request().await,
                    Operation::Approval => controller.mark_approved().await,
                    Operation::Deployment => controller.deploy().await,
                };

                assert!(!outcome.changed(), "{op:?} from {stage}");
                assert_eq!(outcome.notice.unwrap().level, NoticeLevel::Warning);
                assert_eq!(controller.proposal(), before, "{op:?} from {stage}");
                assert_eq!(fakes.service_calls(), 0, "{op:?} from {stage}");
            }
        }
    }

    #[tokio::test]
    async fn second_generation_while_first_in_flight_is_rejected() {
        let gate = Arc::new(Notify::new());
        let fakes = Fakes::new(
            FakeGeneration {
                gate: Some(gate.clone()),
                ..generation_returning(COUNTER_SOURCE)
            },
            validation_returning(vec![Ok(report(90.0, true))]),
        );
        let controller = Arc::new(LifecycleController::new(
            Proposal::new("", ""),
            fakes.services(None),
        ));
        let mut rx = controller.subscribe();

        let first = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .start_generation(Intent::new("Counter", "first"))
                    .await
            }
        });
        rx.wait_for(|s| s.in_flight == Some(Operation::Generation))
            .await
            .unwrap();

        let second = controller
            .start_generation(Intent::new("Counter", "second"))
            .await;
        assert!(!second.changed());
        assert_eq!(second.from, Stage::Generating);
        assert_eq!(controller.proposal().description, "first");

        gate.notify_one();
        let first = first.await.unwrap();
        assert_eq!(first.to, Stage::PendingApproval);
        assert_eq!(fakes.generation.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn editing_while_validation_is_in_flight_is_allowed() {
        let gate = Arc::new(Notify::new());
        let fakes = Fakes::new(
            FakeGeneration::default(),
            FakeValidation {
                gate: Some(gate.clone()),
                ..validation_returning(vec![Ok(report(75.0, true))])
            },
        );
        let controller = Arc::new(LifecycleController::new(
            proposal_at(Stage::Draft),
            fakes.services(None),
        ));
        let mut rx = controller.subscribe();

        let validation = tokio::spawn({
            let controller = controller.clone();
            async move { controller.request_validation().await }
        });
        rx.wait_for(|s| s.in_flight == Some(Operation::Validation))
            .await
            .unwrap();
        assert_eq!(controller.stage(), Stage::Validating);

        controller.edit_artifact(ArtifactKind::Backend, "app.get('/clicks')");
        assert_eq!(controller.stage(), Stage::Validating);

        gate.notify_one();
        let outcome = validation.await.unwrap();
        assert_eq!(outcome.from, Stage::Draft);
        assert_eq!(outcome.to, Stage::PendingApproval);
        assert_eq!(
            controller.proposal().artifacts.backend,
            "app.get('/clicks')"
        );
    }

    #[tokio::test]
    async fn manual_revalidation_from_pending_approval_can_fail_back_to_draft() {
        let fakes = Fakes::new(
            FakeGeneration::default(),
            validation_returning(vec![Ok(report(30.0, false))]),
        );
        let controller =
            LifecycleController::new(proposal_at(Stage::PendingApproval), fakes.services(None));

        let outcome = controller.request_validation().await;

        assert_eq!(outcome.from, Stage::PendingApproval);
        assert_eq!(outcome.to, Stage::Draft);
        assert_eq!(controller.proposal().validation_score, Some(30));
    }

    #[tokio::test]
    async fn approved_proposal_merges_and_deploys() {
        let fakes = Fakes::new(FakeGeneration::default(), FakeValidation::default());
        let controller =
            LifecycleController::new(proposal_at(Stage::PendingApproval), fakes.services(None));

        assert_eq!(controller.mark_approved().await.to, Stage::Approved);
        assert_eq!(
            controller.create_integration_request().await.to,
            Stage::Merged
        );
        let deployed = controller.deploy().await;
        assert_eq!(deployed.to, Stage::Deployed);

        let proposal = controller.proposal();
        assert_eq!(proposal.integration_ref.as_deref(), Some("PR-7"));
        assert_eq!(
            proposal.deployment_url.as_deref(),
            Some("https://preview.example.test/p/7")
        );
    }

    #[tokio::test]
    async fn failed_integration_keeps_stage() {
        let mut fakes = Fakes::new(FakeGeneration::default(), FakeValidation::default());
        fakes.integration = Arc::new(FakeIntegration {
            fail: true,
            ..FakeIntegration::default()
        });
        let controller =
            LifecycleController::new(proposal_at(Stage::PendingApproval), fakes.services(None));

        let outcome = controller.create_integration_request().await;

        assert_eq!(outcome.to, Stage::PendingApproval);
        assert_eq!(outcome.notice.unwrap().level, NoticeLevel::Error);
        assert_eq!(controller.snapshot().in_flight, None);
    }

    #[tokio::test]
    async fn store_assigns_id_once_and_failures_become_notices() {
        let store = Arc::new(FakeStore::new(false));
        let id = store.id;
        let fakes = Fakes::new(
            generation_returning(COUNTER_SOURCE),
            validation_returning(vec![Ok(report(90.0, true))]),
        );
        let controller =
            LifecycleController::new(Proposal::new("", ""), fakes.services(Some(store.clone())));
        controller
            .start_generation(Intent::new("Counter", "a click counter"))
            .await;
        assert_eq!(controller.proposal().id, Some(id));
        assert!(store.saves.load(Ordering::SeqCst) >= 2);

        let failing = Arc::new(FakeStore::new(true));
        let fakes = Fakes::new(FakeGeneration::default(), FakeValidation::default());
        let controller =
            LifecycleController::new(proposal_at(Stage::PendingApproval), fakes.services(Some(failing)));
        let outcome = controller.mark_approved().await;
        assert_eq!(outcome.to, Stage::Approved);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.proposal.id, None);
        assert!(
            snapshot
                .notices
                .latest()
                .is_some_and(|n| n.text.contains("offline"))
        );
    }

    #[tokio::test]
    async fn every_stage_change_is_saved() {
        let store = Arc::new(FakeStore::new(false));
        let fakes = Fakes::new(
            FakeGeneration {
                result: Mutex::new(Some(Err(ServiceError::transport("generation", "reset")))),
                ..FakeGeneration::default()
            },
            validation_returning(vec![Ok(report(82.0, true))]),
        );
        let controller =
            LifecycleController::new(Proposal::new("", ""), fakes.services(Some(store.clone())));
        controller
            .start_generation(Intent::new("Counter", "a click counter"))
            .await;
        assert_eq!(store.saved_stages(), [Stage::Generating, Stage::Draft]);

        let store = Arc::new(FakeStore::new(false));
        let fakes = Fakes::new(
            FakeGeneration::default(),
            validation_returning(vec![Ok(report(82.0, true))]),
        );
        let controller =
            LifecycleController::new(proposal_at(Stage::Draft), fakes.services(Some(store.clone())));
        controller.request_validation().await;
        assert_eq!(
            store.saved_stages(),
            [Stage::Validating, Stage::PendingApproval]
        );
    }

    #[tokio::test]
    async fn dismissing_a_notice_removes_it() {
        let fakes = Fakes::new(FakeGeneration::default(), FakeValidation::default());
        let controller = LifecycleController::new(proposal_at(Stage::Draft), fakes.services(None));
        let outcome = controller.deploy().await;
        let id = outcome.notice.unwrap().id;
        assert!(controller.dismiss_notice(id));
        assert!(controller.snapshot().notices.is_empty());
    }
}
