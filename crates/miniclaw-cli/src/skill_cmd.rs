//! `miniclaw skill` — list, show, and scaffold skills.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use miniclaw_agent::{Skill, SkillsLoader};

/// Shown for skills that do not declare an emoji.
const DEFAULT_EMOJI: &str = "📦";

#[derive(Subcommand)]
pub enum SkillCommands {
    /// List loadable skills
    List,

    /// Show one skill's metadata and body
    Show {
        name: String,
    },

    /// Create a starter SKILL.md in the first skills directory
    New {
        name: String,
    },
}

pub fn dispatch(cmd: SkillCommands, loader: &SkillsLoader) -> Result<()> {
    match cmd {
        SkillCommands::List => {
            let skills = loader.load_all();
            if skills.is_empty() {
                println!("{}", "No skills found.".dimmed());
                return Ok(());
            }
            println!("Available skills:");
            for skill in &skills {
                println!("  {}", format_list_line(skill));
            }
        }
        SkillCommands::Show { name } => {
            let skill = loader.find(&name)?;
            println!("{}", format_skill(&skill));
        }
        SkillCommands::New { name } => {
            let (created, path) = loader.create(&name)?;
            if created {
                println!("  {} created {}", "✓".green(), path.display());
            } else {
                println!("  {} {} already exists", "·".dimmed(), path.display());
            }
        }
    }
    Ok(())
}

fn emoji(skill: &Skill) -> &str {
    skill.emoji.as_deref().unwrap_or(DEFAULT_EMOJI)
}

fn format_list_line(skill: &Skill) -> String {
    format!("{} {} - {}", emoji(skill), skill.name, skill.description)
}

fn format_skill(skill: &Skill) -> String {
    let mut lines = vec![
        format!("\n{} {}", emoji(skill), skill.name),
        "=".repeat(40),
        format!("\nDescription: {}", skill.description),
    ];
    if !skill.requires.bins.is_empty() {
        lines.push(format!("\nRequired commands: {}", skill.requires.bins.join(", ")));
    }
    if !skill.requires.env.is_empty() {
        lines.push(format!("\nRequired env vars: {}", skill.requires.env.join(", ")));
    }
    lines.push(format!("\n{}", skill.content));
    lines.join("\n")
}
