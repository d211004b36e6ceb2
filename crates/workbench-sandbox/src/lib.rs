//! Isolated execution of generated UI code.
//!
//! Source goes through a best-effort TSX transform, is rendered into a
//! self-contained HTML document and loaded into a realm supplied by the
//! embedding host. The realm talks back only through typed messages.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use workbench_sandbox::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), SandboxError> {
//! let (factory, mut launches) = BridgeRealmFactory::new();
//! tokio::spawn(async move {
//!     while let Some(launch) = launches.recv().await {
//!         // Hand `launch.document` to a webview and forward its posts.
//!         launch.port.post(SandboxMessage::Ready)?;
//!     }
//!     Ok::<_, SandboxError>(())
//! });
//! let mut sandbox = SandboxExecutionHarness::new(Arc::new(factory));
//! sandbox.load("export default () => <p>hola</p>;").await?;
//! println!("{:?}", sandbox.wait_settled(Duration::from_secs(5)).await);
//! # Ok(())
//! # }
//! ```

/// Bounded console history.
pub mod console;
/// HTML document rendering.
pub mod document;
/// Error types of this crate.
pub mod errors;
/// Load orchestration and message dispatch.
pub mod harness;
/// Messages crossing the sandbox boundary.
pub mod message;
/// Common imports for typical usage.
pub mod prelude;
/// Realm traits and the channel-bridged realm.
pub mod realm;
/// TSX to JSX source transform.
pub mod transform;

pub use console::ConsoleBuffer;
pub use document::{HandlebarsTemplateRenderer, SandboxDocument, TemplateRenderer};
pub use errors::{SandboxError, TransformError};
pub use harness::{SandboxExecutionHarness, SandboxState};
pub use message::{ConsoleEntry, ConsoleLevel, Envelope, Generation, MessagePort, SandboxMessage};
pub use realm::{BridgeLaunch, BridgeRealmFactory, RealmFactory, RealmLaunch, SandboxRealm};
pub use transform::{TransformedSource, transform};
