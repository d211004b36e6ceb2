use serde::{Deserialize, Serialize};
use tracing::info;
use workbench_core::{ServiceError, WorkbenchConfig};

use crate::errors::ConfigError;
use crate::frame::FrameConfig;
use crate::http::ServiceClient;
use crate::reply::ReplyStream;

const CHAT_SERVICE: &str = "chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Conversational client: one streamed reply per call.
#[derive(Clone, Debug)]
pub struct ChatClient {
    client: ServiceClient,
    model: String,
    frames: FrameConfig,
}

impl ChatClient {
    pub fn new(config: &WorkbenchConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_client(ServiceClient::new(config)?, &config.chat_model))
    }

    pub fn with_client(client: ServiceClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            frames: FrameConfig::default(),
        }
    }

    /// Overrides the stream markers.
    pub fn frame_config(mut self, frames: FrameConfig) -> Self {
        self.frames = frames;
        self
    }

    /// Starts a streamed reply to `messages`.
    pub async fn stream_reply(&self, messages: &[ChatMessage]) -> Result<ReplyStream, ServiceError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };
        info!(model = %self.model, messages = messages.len(), "starting chat reply stream");
        let response = self
            .client
            .send(CHAT_SERVICE, "/chat/completions", &body)
            .await?;
        Ok(ReplyStream::with_config(
            response.bytes_stream(),
            self.frames.clone(),
        ))
    }
}
