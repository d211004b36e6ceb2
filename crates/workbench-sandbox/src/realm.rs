//! Execution realms: where a rendered document actually runs.
//!
//! The harness only talks to a realm through [`RealmFactory`] and
//! [`SandboxRealm`]; everything the document does comes back over its
//! [`MessagePort`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::errors::SandboxError;
use crate::message::{Generation, MessagePort};

pub const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything a realm needs to run one load.
#[derive(Debug)]
pub struct RealmLaunch {
    pub generation: Generation,
    pub document: String,
    pub port: MessagePort,
}

/// A running realm. Dropping the box without `teardown` leaks nothing on
/// the host side, but callers are expected to tear down explicitly.
#[async_trait]
pub trait SandboxRealm: Send + Sync {
    fn generation(&self) -> Generation;

    /// Destroys the realm. Resolves once it can no longer run code.
    async fn teardown(self: Box<Self>) -> Result<(), SandboxError>;
}

#[async_trait]
pub trait RealmFactory: Send + Sync {
    async fn create(&self, launch: RealmLaunch) -> Result<Box<dyn SandboxRealm>, SandboxError>;
}

/// A launch handed to an embedding host (a webview, a headless browser).
///
/// The host must release the launch (drop it) once [`BridgeLaunch::torn_down`]
/// resolves; that drop is what completes the harness-side teardown.
#[derive(Debug)]
pub struct BridgeLaunch {
    pub generation: Generation,
    pub document: String,
    pub port: MessagePort,
    teardown: watch::Receiver<bool>,
}

impl BridgeLaunch {
    pub fn teardown_requested(&self) -> bool {
        *self.teardown.borrow()
    }

    /// Waits until the harness asks for this realm to go away.
    pub async fn torn_down(&mut self) {
        // A dropped sender means the harness is gone, which is a teardown too.
        let _ = self.teardown.wait_for(|requested| *requested).await;
    }
}

/// Realm factory that forwards launches to a host over a channel.
#[derive(Debug, Clone)]
pub struct BridgeRealmFactory {
    launches: mpsc::UnboundedSender<BridgeLaunch>,
    grace: Duration,
}

impl BridgeRealmFactory {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeLaunch>) {
        let (launches, rx) = mpsc::unbounded_channel();
        (
            Self {
                launches,
                grace: DEFAULT_TEARDOWN_GRACE,
            },
            rx,
        )
    }

    /// How long a teardown waits for the host to release the launch.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

#[async_trait]
impl RealmFactory for BridgeRealmFactory {
    async fn create(&self, launch: RealmLaunch) -> Result<Box<dyn SandboxRealm>, SandboxError> {
        let (teardown_tx, teardown_rx) = watch::channel(false);
        let generation = launch.generation;
        self.launches
            .send(BridgeLaunch {
                generation,
                document: launch.document,
                port: launch.port,
                teardown: teardown_rx,
            })
            .map_err(|_| SandboxError::Realm("realm host is not listening".into()))?;
        debug!(%generation, "realm launch handed to host");
        Ok(Box::new(BridgeRealm {
            generation,
            teardown: teardown_tx,
            grace: self.grace,
        }))
    }
}

struct BridgeRealm {
    generation: Generation,
    teardown: watch::Sender<bool>,
    grace: Duration,
}

#[async_trait]
impl SandboxRealm for BridgeRealm {
    fn generation(&self) -> Generation {
        self.generation
    }

    async fn teardown(self: Box<Self>) -> Result<(), SandboxError> {
        let _ = self.teardown.send(true);
        if tokio::time::timeout(self.grace, self.teardown.closed())
            .await
            .is_err()
        {
            warn!(generation = %self.generation, grace = ?self.grace, "host did not release realm in time");
            return Err(SandboxError::Realm(format!(
                "generation {} was not released within {:?}",
                self.generation, self.grace
            )));
        }
        debug!(generation = %self.generation, "realm released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SandboxMessage;

    fn launch(generation: u64) -> (RealmLaunch, mpsc::UnboundedReceiver<crate::message::Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RealmLaunch {
                generation: Generation(generation),
                document: "<html></html>".into(),
                port: MessagePort::new(Generation(generation), tx),
            },
            rx,
        )
    }

    #[tokio::test]
    async fn host_receives_launch_and_teardown_waits_for_release() {
        let (factory, mut host) = BridgeRealmFactory::new();
        let (realm_launch, mut inbox) = launch(1);
        let realm = factory.create(realm_launch).await.unwrap();
        assert_eq!(realm.generation(), Generation(1));

        let mut bridged = host.recv().await.unwrap();
        assert_eq!(bridged.document, "<html></html>");
        bridged.port.post(SandboxMessage::Ready).unwrap();
        assert_eq!(inbox.recv().await.unwrap().message, SandboxMessage::Ready);

        let hosted = tokio::spawn(async move {
            bridged.torn_down().await;
            assert!(bridged.teardown_requested());
        });
        realm.teardown().await.unwrap();
        hosted.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_gives_up_after_grace() {
        let (factory, mut host) = BridgeRealmFactory::new();
        let factory = factory.grace(Duration::from_millis(50));
        let (realm_launch, _inbox) = launch(2);
        let realm = factory.create(realm_launch).await.unwrap();
        let _held = host.recv().await.unwrap();

        let err = realm.teardown().await.unwrap_err();
        assert!(matches!(err, SandboxError::Realm(_)));
    }

    #[tokio::test]
    async fn create_fails_without_a_host() {
        let (factory, host) = BridgeRealmFactory::new();
        drop(host);
        let (realm_launch, _inbox) = launch(1);
        assert!(matches!(
            factory.create(realm_launch).await,
            Err(SandboxError::Realm(_))
        ));
    }
}
