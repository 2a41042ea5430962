//! `quill onboard` — write a default config and create the notes workspace.

use anyhow::{Context, Result};
use colored::Colorize;

use quill_core::config::{get_config_path, load_config, save_config};

use crate::helpers::expand_tilde;

/// Run the onboard command.
pub fn run() -> Result<()> {
    println!();
    println!("{}", "Quill — Setup".cyan().bold());
    println!();

    let config_path = get_config_path();
    let config = load_config(None);

    if config_path.exists() {
        println!("  {} config already exists at {}", "✓".green(), config_path.display());
    } else {
        save_config(&config, Some(&config_path))?;
        println!("  {} created config at {}", "✓".green(), config_path.display());
    }

    let workspace = expand_tilde(&config.agent.workspace);
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("failed to create workspace: {}", workspace.display()))?;
    println!("  {} workspace at {}", "✓".green(), workspace.display());

    create_welcome_note(&workspace.join("Welcome.md"))?;

    println!();
    println!(
        "{}",
        "  Setup complete! Set your API key in the config, then run `quill agent`.".green()
    );
    println!();

    Ok(())
}

/// Write the welcome note unless one exists.
fn create_welcome_note(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        println!("  {} Welcome.md already exists", "✓".green());
    } else {
        std::fs::write(path, WELCOME_NOTE)?;
        println!("  {} created Welcome.md", "✓".green());
    }
    Ok(())
}

const WELCOME_NOTE: &str = r#"# Welcome to Quill

This folder is your notes workspace. Quill can read, list, create and edit
the Markdown notes in it.

## Try

- `quill agent -m "summarize Welcome.md"`
- `quill agent --mode writer` and ask for a new note
- `quill modes` to see what each mode may do

Edits and new notes are only written after you approve them.
"#;
