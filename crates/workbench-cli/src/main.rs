//! Command-line driver for the workbench components.

mod demo;
mod render;
mod replay;

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use workbench_ai::{ChatClient, ChatMessage, FrameConfig, HttpServices};
use workbench_core::{Artifacts, MultiAgentAggregator, WorkbenchConfig, init_observability};

#[derive(Debug, Parser)]
#[command(name = "workbench", version, about = "AI code-generation workbench")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one request end to end against in-memory services.
    Demo {
        #[arg(default_value = "crea un botón que cuente clics")]
        message: String,
    },
    /// Decode a recorded event-stream transcript.
    Replay {
        path: PathBuf,
        /// Bytes fed to the reader per chunk.
        #[arg(short, long, default_value = "16")]
        chunk_size: usize,
    },
    /// Render a component into a standalone sandbox document.
    Render {
        input: PathBuf,
        #[arg(short, long, default_value = "sandbox-preview.html")]
        output: PathBuf,
    },
    /// Ask several agents at once through the configured service.
    Agents {
        message: String,
        /// Agent ids to involve; all registered agents when omitted.
        #[arg(short, long = "agent")]
        agents: Vec<String>,
        /// Frontend code sent as context.
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Stream a conversational reply from the configured service.
    Chat { message: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    init_observability();

    match Cli::parse().command {
        Command::Demo { message } => {
            let config = WorkbenchConfig::from_env()?;
            let report = demo::run_demo(&message, &config).await;
            println!("intent: {:?}", report.kind);
            for outcome in &report.outcomes {
                let notice = outcome.notice.as_ref().map(|n| n.text.as_str()).unwrap_or("");
                println!("{} -> {}  {}", outcome.from, outcome.to, notice);
            }
            if let Some(state) = &report.sandbox {
                println!("sandbox: {state:?}");
            }
            for entry in &report.console {
                println!("  [{:?}] {}", entry.level, entry.text);
            }
            println!("{}", serde_json::to_string_pretty(&report.proposal)?);
        }
        Command::Replay { path, chunk_size } => {
            let report = replay::replay_file(&path, chunk_size, FrameConfig::default())?;
            println!("{}", report.text);
            eprintln!(
                "events: {}, dropped frames: {}, terminated: {}",
                report.events, report.dropped_frames, report.terminated
            );
        }
        Command::Render { input, output } => {
            let bytes = render::render_file(&input, &output)?;
            println!("wrote {} ({bytes} bytes)", output.display());
        }
        Command::Agents {
            message,
            agents,
            context,
        } => {
            let config = WorkbenchConfig::from_env()?;
            let services = HttpServices::new(&config)?;
            let mut aggregator =
                MultiAgentAggregator::new(Arc::new(services)).with_stagger(config.agent_stagger);
            let context = Artifacts {
                frontend: match context {
                    Some(path) => std::fs::read_to_string(path)?,
                    None => String::new(),
                },
                ..Artifacts::default()
            };
            let requested = (!agents.is_empty()).then_some(agents.as_slice());
            let result = aggregator.collaborate(&message, &context, requested).await?;
            for response in &result.responses {
                println!(
                    "## {} ({} ms)\n{}\n",
                    response.agent_name, response.elapsed_ms, response.text
                );
            }
            println!("{}", result.summary);
        }
        Command::Chat { message } => {
            let config = WorkbenchConfig::from_env()?;
            let client = ChatClient::new(&config)?;
            let mut reply = client.stream_reply(&[ChatMessage::user(message)]).await?;
            let mut stdout = std::io::stdout();
            while let Some(fragment) = reply.next_fragment().await {
                write!(stdout, "{}", fragment?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
    }
    Ok(())
}
