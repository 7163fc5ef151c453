//! CLI entry point for hostpilot.

pub mod demo;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// hostpilot demo CLI
#[derive(Parser, Debug)]
#[command(name = "hostpilot", version, about = "Chat with an agent driving a simulated host")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive chat against the in-memory demo document
    Chat(ChatArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Model to use (format: provider:model, e.g. anthropic:claude-sonnet-4-5).
    /// Overrides the settings file and HOSTPILOT_MODEL.
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Settings file (TOML); defaults to the per-user config directory
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Max tokens per provider round
    #[arg(long)]
    pub max_tokens: Option<u32>,
}
