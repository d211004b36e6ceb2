use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "workbench.logs.jsonl";

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Disabled,
    /// Compact human-readable lines on stderr.
    Stderr,
    /// One JSON object per line in this file.
    JsonFile(PathBuf),
}

impl LogTarget {
    /// Resolves the target from `WORKBENCH_OBSERVABILITY` and
    /// `WORKBENCH_JSON_LOG_PATH`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("WORKBENCH_OBSERVABILITY")
            .and_then(|v| switch(&v))
            .unwrap_or(true);
        if !enabled {
            return Self::Disabled;
        }
        match lookup("WORKBENCH_JSON_LOG_PATH").filter(|p| !p.trim().is_empty()) {
            Some(path) => Self::JsonFile(PathBuf::from(path)),
            None => Self::Stderr,
        }
    }
}

fn switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// `WORKBENCH_LOG_LEVEL` wins over `RUST_LOG`; `info` otherwise.
fn env_filter(lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
    lookup("WORKBENCH_LOG_LEVEL")
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| lookup("RUST_LOG").and_then(|level| EnvFilter::try_new(level).ok()))
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir, file)
}

/// Installs the global subscriber once per process; later calls are no-ops.
///
/// - `WORKBENCH_OBSERVABILITY`: on/off switch, on by default.
/// - `WORKBENCH_LOG_LEVEL`: filter directive (`debug`, `workbench_sandbox=trace`, ...).
/// - `WORKBENCH_JSON_LOG_PATH`: write JSONL to this file instead of stderr.
/// - `RUST_LOG`: fallback filter.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let lookup = |key: &str| std::env::var(key).ok();
        let filter = env_filter(lookup);
        match LogTarget::from_lookup(lookup) {
            LogTarget::Disabled => {}
            LogTarget::Stderr => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
            LogTarget::JsonFile(path) => {
                let (dir, file) = split_log_path(&path);
                let _ = std::fs::create_dir_all(dir);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(tracing_appender::rolling::never(dir, file));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}
