//! Routing of free-form user messages: code-generation requests drive the
//! lifecycle, everything else is a conversational exchange.

use serde::{Deserialize, Serialize};

const TITLE_MAX_CHARS: usize = 60;

const BUILD_VERBS: &[&str] = &[
    "crea", "crear", "genera", "generar", "construye", "haz", "create", "generate", "build",
    "make", "implement", "implementa",
];

const BUILD_TARGETS: &[&str] = &[
    "botón", "boton", "button", "componente", "component", "formulario", "form", "página",
    "pagina", "page", "app", "aplicación", "aplicacion", "tabla", "table", "api", "endpoint",
    "dashboard", "widget",
];

/// How a message should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    CodeGeneration,
    Conversation,
}

/// A user request as the lifecycle sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub title: String,
    pub description: String,
}

impl Intent {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// Derives a title from the first line of the message (truncated) and
    /// keeps the full message as the description.
    pub fn from_message(message: &str) -> Self {
        let message = message.trim();
        let first_line = message.lines().next().unwrap_or_default().trim();
        let mut title: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
        if first_line.chars().count() > TITLE_MAX_CHARS {
            title.push('…');
        }
        Self::new(title, message)
    }
}

/// Keyword heuristic: a build verb together with a build target means code
/// generation.
pub fn classify(message: &str) -> IntentKind {
    let lowered = message.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has_verb = words.iter().any(|w| BUILD_VERBS.contains(w));
    let has_target = words.iter().any(|w| BUILD_TARGETS.contains(w));
    if has_verb && has_target {
        IntentKind::CodeGeneration
    } else {
        IntentKind::Conversation
    }
}
