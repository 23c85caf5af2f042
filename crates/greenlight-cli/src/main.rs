mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use greenlight::{
    AnthropicEngine, ApprovalGate, ChatMessage, ChatRole, GreenlightConfig,
    InMemoryConversationStore, research_actions,
};

#[derive(Parser)]
#[command(name = "greenlight", version, about = "Approval-gated research agent")]
struct Cli {
    /// Path to greenlight.toml (defaults apply when absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve {
        /// Override the bind address from config
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run a single request from the terminal
    Ask {
        /// The message to send
        message: String,
        /// Conversation thread id (defaults to the configured one)
        #[arg(long)]
        thread: Option<String>,
        /// Role of the message
        #[arg(long, default_value = "user")]
        role: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GreenlightConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => GreenlightConfig::default(),
    };

    let gate = build_gate(&config)?;

    match cli.command {
        Command::Serve { bind } => serve::run_server(gate, config, bind.as_deref()).await,
        Command::Ask {
            message,
            thread,
            role,
        } => ask(gate, config, &message, thread.as_deref(), &role).await,
    }
}

/// Construct the approval gate once at startup: engine, action registry, and
/// store are injected here and shared by every request handler.
fn build_gate(config: &GreenlightConfig) -> Result<Arc<ApprovalGate>> {
    let api_key = std::env::var(&config.engine.api_key_env)
        .with_context(|| format!("{} env var required", config.engine.api_key_env))?;

    let actions = research_actions();
    let definitions = actions.iter().map(|a| a.definition()).collect();

    let mut engine = AnthropicEngine::new(api_key, &config.engine.model)
        .with_max_tokens(config.engine.max_tokens)
        .with_actions(definitions);
    if let Some(prompt) = &config.engine.system_prompt {
        engine = engine.with_system_prompt(prompt);
    }

    Ok(Arc::new(
        ApprovalGate::builder(Arc::new(engine))
            .store(Arc::new(InMemoryConversationStore::new()))
            .actions(actions)
            .build(),
    ))
}

async fn ask(
    gate: Arc<ApprovalGate>,
    config: GreenlightConfig,
    message: &str,
    thread: Option<&str>,
    role: &str,
) -> Result<()> {
    let thread = thread.unwrap_or(&config.gate.default_thread).to_string();
    let max_hops = config.gate.max_hops;
    let policy = config.policy.into_ruleset().into_policy();

    let run = gate
        .run_to_completion(
            &thread,
            ChatMessage::new(ChatRole::parse(role), message),
            &*policy,
            max_hops,
        )
        .await?;

    println!("{}", run.final_text);
    if run.pending {
        eprintln!("\n---\nStill suspended after {max_hops} hops; a decision is outstanding.");
    } else {
        eprintln!("\n---\nStages: {}", run.stages.len());
    }

    Ok(())
}
