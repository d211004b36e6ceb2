//! Streaming reply decoding and HTTP clients for the hosted workbench services.
//!
//! ```no_run
//! use workbench_ai::prelude::*;
//! use workbench_core::WorkbenchConfig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let chat = ChatClient::new(&WorkbenchConfig::from_env()?)?;
//! let mut reply = chat.stream_reply(&[ChatMessage::user("hola")]).await?;
//! while let Some(fragment) = reply.next_fragment().await {
//!     print!("{}", fragment?);
//! }
//! # Ok(())
//! # }
//! ```

/// Conversational client.
pub mod chat;
/// Error types of this crate.
pub mod errors;
/// Frame reassembly for streamed replies.
pub mod frame;
/// Shared HTTP plumbing.
pub mod http;
/// Common imports for typical usage.
pub mod prelude;
/// Async stream of reply fragments.
pub mod reply;
/// HTTP implementations of the service contracts.
pub mod services;

pub use chat::{ChatClient, ChatMessage, ChatRole};
pub use errors::{ConfigError, StreamError};
pub use frame::{FrameConfig, StreamEvent, StreamFrameReader, StreamPayload};
pub use http::ServiceClient;
pub use reply::ReplyStream;
pub use services::HttpServices;
