//! `quill status` — show configuration and provider status.

use anyhow::Result;
use colored::Colorize;

use quill_core::config::{get_config_path, load_config};

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "Quill Status".cyan().bold());
    println!();

    println!(
        "  {:<14} {} {}",
        "Config:".bold(),
        config_path.display(),
        found_marker(config_path.exists())
    );

    let workspace = crate::helpers::expand_tilde(&config.agent.workspace);
    println!(
        "  {:<14} {} {}",
        "Workspace:".bold(),
        workspace.display(),
        found_marker(workspace.exists())
    );

    println!("  {:<14} {}", "Mode:".bold(), config.agent.mode);
    println!("  {:<14} {}", "Model:".bold(), config.agent.model);
    println!(
        "  {:<14} {} | max_tokens: {}",
        "Parameters:".bold(),
        format!("temp: {}", config.agent.temperature).dimmed(),
        format!("{}", config.agent.max_tokens).dimmed(),
    );

    println!();
    let endpoint = config
        .provider
        .api_base
        .as_deref()
        .unwrap_or("https://api.openai.com/v1");
    let key_status = if config.provider.api_key.is_empty() {
        format!("{}", "· no API key".dimmed())
    } else {
        format!("{} (key set)", "✓".green())
    };
    println!("  {:<14} {} {}", "Provider:".bold(), endpoint, key_status);
    println!(
        "  {:<14} {}",
        "Approvals:".bold(),
        if config.tools.auto_approve {
            "automatic".yellow().to_string()
        } else {
            "ask".to_string()
        }
    );
    println!();

    Ok(())
}

fn found_marker(exists: bool) -> String {
    if exists {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}
