//! Messages crossing the sandbox boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::SandboxError;

/// Identifies one load of the harness. Every message is stamped with the
/// generation of the document that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
    Info,
}

impl ConsoleLevel {
    /// Unknown console methods are recorded as plain logs.
    pub fn parse(method: &str) -> Self {
        match method {
            "warn" => Self::Warn,
            "error" => Self::Error,
            "info" => Self::Info,
            _ => Self::Log,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub text: String,
}

impl ConsoleEntry {
    pub fn new(level: ConsoleLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxMessage {
    Ready,
    Error(String),
    Console(ConsoleEntry),
}

/// A message plus the generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub generation: Generation,
    pub message: SandboxMessage,
}

impl Envelope {
    pub fn new(generation: Generation, message: SandboxMessage) -> Self {
        Self {
            generation,
            message,
        }
    }

    /// Decodes a message as posted by the sandbox document.
    ///
    /// `fallback` is used only when the payload carries no `generation`.
    pub fn from_wire(value: &Value, fallback: Generation) -> Result<Self, SandboxError> {
        let generation = match value.get("generation") {
            None | Some(Value::Null) => fallback,
            Some(tag) => tag
                .as_u64()
                .map(Generation)
                .ok_or_else(|| SandboxError::Message(format!("bad generation tag: {tag}")))?,
        };
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SandboxError::Message("missing `type`".into()))?;
        let message = match kind {
            "sandbox-ready" => SandboxMessage::Ready,
            "sandbox-error" => SandboxMessage::Error(text_field(value, "error")),
            "console" => {
                let level = value
                    .get("method")
                    .and_then(Value::as_str)
                    .map(ConsoleLevel::parse)
                    .unwrap_or(ConsoleLevel::Log);
                SandboxMessage::Console(ConsoleEntry::new(level, text_field(value, "message")))
            }
            other => return Err(SandboxError::Message(format!("unknown type `{other}`"))),
        };
        Ok(Self::new(generation, message))
    }
}

fn text_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// The realm's end of one load's message channel.
///
/// A port stops delivering once the harness moves to a newer load.
#[derive(Debug, Clone)]
pub struct MessagePort {
    generation: Generation,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl MessagePort {
    pub(crate) fn new(generation: Generation, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Posts a message stamped with this port's generation.
    pub fn post(&self, message: SandboxMessage) -> Result<(), SandboxError> {
        self.deliver(Envelope::new(self.generation, message))
    }

    /// Posts raw JSON exactly as the document sent it. The document's own
    /// generation tag is kept.
    pub fn post_raw(&self, value: &Value) -> Result<(), SandboxError> {
        self.deliver(Envelope::from_wire(value, self.generation)?)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn deliver(&self, envelope: Envelope) -> Result<(), SandboxError> {
        self.tx
            .send(envelope)
            .map_err(|_| SandboxError::Realm(format!("port for generation {} is closed", self.generation)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_messages_decode() {
        let ready = Envelope::from_wire(&json!({"type": "sandbox-ready", "generation": 3}), Generation(9)).unwrap();
        assert_eq!(ready, Envelope::new(Generation(3), SandboxMessage::Ready));

        let error = Envelope::from_wire(
            &json!({"type": "sandbox-error", "error": "boom", "generation": 3}),
            Generation(3),
        )
        .unwrap();
        assert_eq!(error.message, SandboxMessage::Error("boom".into()));

        let console = Envelope::from_wire(
            &json!({"type": "console", "method": "table", "message": "row"}),
            Generation(4),
        )
        .unwrap();
        assert_eq!(console.generation, Generation(4));
        assert_eq!(
            console.message,
            SandboxMessage::Console(ConsoleEntry::new(ConsoleLevel::Log, "row"))
        );
    }

    #[test]
    fn malformed_wire_messages_are_rejected() {
        assert!(matches!(
            Envelope::from_wire(&json!({"generation": 1}), Generation(1)),
            Err(SandboxError::Message(_))
        ));
        assert!(matches!(
            Envelope::from_wire(&json!({"type": "resize"}), Generation(1)),
            Err(SandboxError::Message(_))
        ));
        assert!(matches!(
            Envelope::from_wire(&json!({"type": "sandbox-ready", "generation": "two"}), Generation(1)),
            Err(SandboxError::Message(_))
        ));
    }

    #[tokio::test]
    async fn port_stamps_its_generation_and_keeps_raw_tags() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let port = MessagePort::new(Generation(5), tx);

        port.post(SandboxMessage::Ready).unwrap();
        port.post_raw(&json!({"type": "sandbox-ready", "generation": 4})).unwrap();

        assert_eq!(rx.recv().await.unwrap().generation, Generation(5));
        assert_eq!(rx.recv().await.unwrap().generation, Generation(4));

        drop(rx);
        assert!(port.is_closed());
        assert!(matches!(port.post(SandboxMessage::Ready), Err(SandboxError::Realm(_))));
    }
}
