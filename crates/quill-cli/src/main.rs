//! Quill CLI — entry point.
//!
//! # Commands
//!
//! - `quill agent [-m MESSAGE] [--mode M] [--intent I] [--workspace DIR]` — run a task or the REPL
//! - `quill modes` — list the built-in modes and their tools
//! - `quill status` — show configuration and provider status
//! - `quill onboard` — write a default config and create the workspace

mod helpers;
mod onboard;
mod repl;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use quill_agent::tools::note_tools;
use quill_agent::{AgentLoop, AgentMode, LoopSettings, TaskIntent};
use quill_core::config::{load_config, Config};
use quill_providers::HttpProvider;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Quill — an AI agent for your Markdown notes
#[derive(Parser)]
#[command(name = "quill", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task against the notes workspace (single-shot or interactive REPL)
    Agent {
        /// Single task (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Mode slug: editor, researcher, writer, organizer
        #[arg(long)]
        mode: Option<String>,

        /// Task intent: chat, edit, create, organize, search, complex
        #[arg(long)]
        intent: Option<String>,

        /// Notes workspace (overrides the config)
        #[arg(short, long)]
        workspace: Option<String>,

        /// Approve every gated tool call without asking
        #[arg(short = 'y', long, default_value_t = false)]
        yes: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// List the built-in modes
    Modes,

    /// Show configuration and provider status
    Status,

    /// Write a default config and create the workspace
    Onboard,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Agent {
            message,
            mode,
            intent,
            workspace,
            yes,
            logs,
        } => {
            init_logging(logs);
            let config = load_config(None);
            let options = AgentOptions::resolve(&config, mode, intent, workspace, yes)?;
            run_agent(&config, options, message).await
        }
        Commands::Modes => {
            print_modes();
            Ok(())
        }
        Commands::Status => status::run(),
        Commands::Onboard => onboard::run(),
    }
}

// ─────────────────────────────────────────────
// Agent command
// ─────────────────────────────────────────────

/// Command-line choices merged with the config.
#[derive(Debug)]
pub struct AgentOptions {
    pub workspace: PathBuf,
    pub mode: AgentMode,
    pub intent: Option<TaskIntent>,
    pub auto_approve: bool,
}

impl AgentOptions {
    fn resolve(
        config: &Config,
        mode: Option<String>,
        intent: Option<String>,
        workspace: Option<String>,
        yes: bool,
    ) -> Result<Self> {
        let slug = mode.unwrap_or_else(|| config.agent.mode.clone());
        let mode = AgentMode::by_slug(&slug).with_context(|| {
            let known: Vec<String> = AgentMode::builtin().into_iter().map(|m| m.slug).collect();
            format!("unknown mode '{slug}' (available: {})", known.join(", "))
        })?;

        let intent = intent
            .map(|s| s.parse::<TaskIntent>().map_err(anyhow::Error::msg))
            .transpose()?;

        let workspace = helpers::expand_tilde(workspace.as_deref().unwrap_or(&config.agent.workspace));

        Ok(Self {
            workspace,
            mode,
            intent,
            auto_approve: yes || config.tools.auto_approve,
        })
    }
}

async fn run_agent(config: &Config, options: AgentOptions, message: Option<String>) -> Result<()> {
    std::fs::create_dir_all(&options.workspace).with_context(|| {
        format!("failed to create workspace: {}", options.workspace.display())
    })?;

    let agent = Arc::new(build_agent_loop(config)?);
    let mut session = repl::Session::new(agent, options);

    match message {
        Some(msg) => {
            info!("processing single task");
            let state = session.run_task(msg).await?;
            helpers::print_outcome(&state);
        }
        None => repl::run(session).await?,
    }

    Ok(())
}

/// Build an `AgentLoop` from the loaded configuration.
pub fn build_agent_loop(config: &Config) -> Result<AgentLoop> {
    let provider = HttpProvider::new(&config.provider, &config.agent.model)
        .context("failed to create LLM provider")?;

    let agent = AgentLoop::new(Arc::new(provider), note_tools())
        .with_settings(LoopSettings::from(&config.agent));

    Ok(agent)
}

fn print_modes() {
    println!();
    for mode in AgentMode::builtin() {
        let marker = if mode.is_action_oriented() { " (action)" } else { "" };
        println!("  {}{}", mode.slug.cyan().bold(), marker.dimmed());
        println!("    {}", mode.role_definition);
        println!("    {} {}", "tools:".dimmed(), mode.tools.join(", "));
        println!();
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("quill=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
