//! miniclaw CLI — entry point.
//!
//! # Commands
//!
//! - `miniclaw ask <QUESTION> [-s SESSION] [-m MODEL]` — one turn, print the answer
//! - `miniclaw chat [-s SESSION] [-m MODEL]` — interactive REPL
//! - `miniclaw memory ...` / `miniclaw session ...` — stored state
//! - `miniclaw skill ...` — skills
//! - `miniclaw tool list` — enabled tools
//! - `miniclaw config init` — write a starter config

mod config_cmd;
mod helpers;
mod memory_cmd;
mod repl;
mod skill_cmd;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use miniclaw_agent::tools::builtin_registry;
use miniclaw_agent::{Agent, AgentError, RunOptions, SkillsLoader};
use miniclaw_core::config::{load_config, Config, LoggingConfig};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// 🦀 miniclaw — a minimal conversational agent
#[derive(Parser)]
#[command(name = "miniclaw", version, about, long_about = None)]
struct Cli {
    /// Path to config.yaml (otherwise ./config.yaml, then ~/.miniclaw/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        question: String,

        /// Session to record the exchange in
        #[arg(short, long)]
        session: Option<String>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Start an interactive chat
    Chat {
        #[arg(short, long)]
        session: Option<String>,

        #[arg(short, long)]
        model: Option<String>,
    },

    /// Inspect or edit agent memory
    Memory {
        #[command(subcommand)]
        action: memory_cmd::MemoryCommands,
    },

    /// Manage stored sessions
    Session {
        #[command(subcommand)]
        action: memory_cmd::SessionCommands,
    },

    /// Manage skills
    Skill {
        #[command(subcommand)]
        action: skill_cmd::SkillCommands,
    },

    /// Inspect tools
    Tool {
        #[command(subcommand)]
        action: ToolCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: config_cmd::ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ToolCommands {
    /// List the tools enabled in config
    List,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `config init` must work before any config exists.
    if let Commands::Config { action } = cli.command {
        init_logging(&LoggingConfig::default(), cli.logs)?;
        return config_cmd::dispatch(action);
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging, cli.logs)?;
    debug!(provider = %config.llm.provider, "configuration ready");

    match cli.command {
        Commands::Ask {
            question,
            session,
            model,
        } => run_ask(&config, &question, session, model).await,
        Commands::Chat { session, model } => {
            let agent = build_agent(&config)?;
            let session_id = session.unwrap_or_else(|| agent.config().default_session.clone());
            repl::run(&agent, &session_id, model).await
        }
        Commands::Memory { action } => memory_cmd::dispatch_memory(action, &config),
        Commands::Session { action } => memory_cmd::dispatch_session(action, &config),
        Commands::Skill { action } => {
            skill_cmd::dispatch(action, &SkillsLoader::from_config(&config))
        }
        Commands::Tool {
            action: ToolCommands::List,
        } => {
            list_tools(&config);
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

// ─────────────────────────────────────────────
// Agent commands
// ─────────────────────────────────────────────

/// Build an [`Agent`] from config. Skills are loaded (and reported) when
/// `skills.auto_load` is set, but nothing feeds them into prompts.
fn build_agent(config: &Config) -> Result<Agent> {
    let agent = Agent::from_config(config).context("failed to create agent")?;

    if config.skills.auto_load {
        let skills = SkillsLoader::from_config(config).load_all();
        info!(count = skills.len(), "skills available");
    }

    Ok(agent)
}

async fn run_ask(
    config: &Config,
    question: &str,
    session: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let agent = build_agent(config)?;
    let mut options = RunOptions::new();
    options.session_id = session;
    options.model = model;

    let result = match helpers::run_cancellable(&agent, question, options).await {
        Ok(result) => result,
        Err(AgentError::Cancelled) => anyhow::bail!("cancelled"),
        Err(e) => return Err(e).context("agent turn failed"),
    };

    println!("{}", result.response.content);
    if let Some(tool_results) = &result.tool_results {
        helpers::print_tool_results(tool_results);
    }
    Ok(())
}

fn list_tools(config: &Config) {
    let registry = builtin_registry(&config.tools);
    println!("Available tools:");
    for tool in registry.list() {
        println!("  - {}: {}", tool.name, tool.description);
    }
}

// ─────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────

/// Install the global subscriber. `RUST_LOG` wins over `--logs`, which wins
/// over `logging.level`.
fn init_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    match &logging.file {
        Some(file) => {
            let path = miniclaw_core::utils::expand_home(file);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create log dir {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Apply `level` to miniclaw's own crates; keep dependencies at `warn`.
fn filter_directives(level: &str) -> String {
    ["miniclaw", "miniclaw_core", "miniclaw_providers", "miniclaw_agent"]
        .iter()
        .fold(String::from("warn"), |mut acc, target| {
            acc.push_str(&format!(",{target}={level}"));
            acc
        })
}
