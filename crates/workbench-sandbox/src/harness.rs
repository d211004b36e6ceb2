use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::console::{ConsoleBuffer, DEFAULT_CONSOLE_CAPACITY};
use crate::document::{HandlebarsTemplateRenderer, SandboxDocument, TemplateRenderer};
use crate::errors::SandboxError;
use crate::message::{ConsoleEntry, ConsoleLevel, Envelope, Generation, MessagePort, SandboxMessage};
use crate::realm::{RealmFactory, RealmLaunch, SandboxRealm};
use crate::transform::transform;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxState {
    Idle,
    Loading,
    Ready,
    Error(String),
}

impl SandboxState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// Runs generated UI source in an isolated realm and relays what happens
/// there back to the host.
///
/// Each load gets a fresh realm, a fresh message channel and a new
/// [`Generation`]. The previous realm is torn down (awaited) before the next
/// one is created, and anything still tagged with an older generation is
/// dropped.
pub struct SandboxExecutionHarness {
    factory: Arc<dyn RealmFactory>,
    renderer: Arc<dyn TemplateRenderer>,
    realm: Option<Box<dyn SandboxRealm>>,
    inbox: Option<mpsc::UnboundedReceiver<Envelope>>,
    generation: Generation,
    console: ConsoleBuffer,
    stale: u64,
    state: watch::Sender<SandboxState>,
}

impl SandboxExecutionHarness {
    pub fn new(factory: Arc<dyn RealmFactory>) -> Self {
        Self {
            factory,
            renderer: Arc::new(HandlebarsTemplateRenderer),
            realm: None,
            inbox: None,
            generation: Generation::default(),
            console: ConsoleBuffer::new(DEFAULT_CONSOLE_CAPACITY),
            stale: 0,
            state: watch::Sender::new(SandboxState::Idle),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn console_capacity(mut self, capacity: usize) -> Self {
        self.console = ConsoleBuffer::new(capacity);
        self
    }

    pub fn state(&self) -> SandboxState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SandboxState> {
        self.state.subscribe()
    }

    pub fn console(&self) -> &ConsoleBuffer {
        &self.console
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Messages discarded because they belonged to an older load.
    pub fn stale_messages(&self) -> u64 {
        self.stale
    }

    /// Loads `source` into a fresh realm.
    ///
    /// Failures leave the harness in [`SandboxState::Error`] with no realm
    /// and are returned for display; they never poison later loads.
    pub async fn load(&mut self, source: &str) -> Result<Generation, SandboxError> {
        self.teardown_current().await;
        self.generation = self.generation.next();
        let generation = self.generation;

        match self.launch(generation, source).await {
            Ok(()) => {
                self.set_state(SandboxState::Loading);
                info!(%generation, "sandbox load started");
                Ok(generation)
            }
            Err(err) => {
                warn!(%generation, error = %err, "sandbox load failed");
                self.set_state(SandboxState::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Same as [`SandboxExecutionHarness::load`]; named for call sites that
    /// replace code already running.
    pub async fn reload(&mut self, source: &str) -> Result<Generation, SandboxError> {
        self.load(source).await
    }

    async fn launch(&mut self, generation: Generation, source: &str) -> Result<(), SandboxError> {
        let transformed = transform(source)?;
        let document = SandboxDocument::new(generation, transformed).render(self.renderer.as_ref())?;
        let (tx, rx) = mpsc::unbounded_channel();
        let realm = self
            .factory
            .create(RealmLaunch {
                generation,
                document,
                port: MessagePort::new(generation, tx),
            })
            .await?;
        self.realm = Some(realm);
        self.inbox = Some(rx);
        Ok(())
    }

    /// Applies one message. Returns `false` when it was stale and dropped.
    pub fn handle(&mut self, envelope: Envelope) -> bool {
        if envelope.generation != self.generation {
            self.stale += 1;
            debug!(
                current = %self.generation,
                received = %envelope.generation,
                "dropping stale sandbox message"
            );
            return false;
        }
        match envelope.message {
            SandboxMessage::Ready => {
                debug!(generation = %self.generation, "sandbox ready");
                self.set_state(SandboxState::Ready);
            }
            SandboxMessage::Error(error) => {
                warn!(generation = %self.generation, error = %error, "sandbox reported an error");
                self.console
                    .push(ConsoleEntry::new(ConsoleLevel::Error, error.clone()));
                self.set_state(SandboxState::Error(error));
            }
            SandboxMessage::Console(entry) => self.console.push(entry),
        }
        true
    }

    /// Waits for the next accepted message of the current load.
    ///
    /// Returns `None` when there is no realm or every port has been released.
    pub async fn next_message(&mut self) -> Option<SandboxMessage> {
        loop {
            let envelope = self.inbox.as_mut()?.recv().await?;
            let message = envelope.message.clone();
            if self.handle(envelope) {
                return Some(message);
            }
        }
    }

    /// Applies every message already queued. Returns how many were accepted.
    pub fn drain(&mut self) -> usize {
        let mut accepted = 0;
        while let Some(envelope) = self.inbox.as_mut().and_then(|inbox| inbox.try_recv().ok()) {
            if self.handle(envelope) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Processes messages until the load is no longer `Loading` or `limit`
    /// elapses, then returns the state.
    pub async fn wait_settled(&mut self, limit: Duration) -> SandboxState {
        let settle = async {
            while !self.state.borrow().is_settled() {
                if self.next_message().await.is_none() {
                    break;
                }
            }
        };
        if tokio::time::timeout(limit, settle).await.is_err() {
            debug!(generation = %self.generation, "sandbox still loading");
        }
        self.state()
    }

    /// Tears down the current realm and returns to `Idle`.
    pub async fn shutdown(&mut self) {
        self.teardown_current().await;
        self.set_state(SandboxState::Idle);
    }

    async fn teardown_current(&mut self) {
        // Dropping the inbox first makes every old port refuse further posts.
        self.inbox = None;
        self.console.clear();
        if let Some(realm) = self.realm.take() {
            let generation = realm.generation();
            if let Err(err) = realm.teardown().await {
                warn!(%generation, error = %err, "realm teardown incomplete");
            }
        }
    }

    fn set_state(&self, state: SandboxState) {
        self.state.send_replace(state);
    }
}
