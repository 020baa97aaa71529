//! Token Server CLI for minting tokens and managing configuration.
//!
//! This tool provides commands for:
//! - Minting RTC, RTM, Chat and whiteboard tokens offline
//! - Inspecting and verifying existing tokens
//! - Validating configuration files
//! - Computing configuration hashes

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod config;
mod error;
mod hash;
mod inspect;
mod token;

use error::CliError;
use token::TokenAction;

#[derive(Parser)]
#[command(name = "tokencli")]
#[command(about = "Token Server CLI for token and config management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Decode a token and optionally verify its signature
    Inspect {
        /// Token to decode
        token: String,

        /// App certificate or whiteboard secret key used to verify the signature
        #[arg(long, env = "TOKEN_VERIFY_KEY", hide_env_values = true)]
        key: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config against settings validation
    Validate {
        /// Path to the TOML configuration file
        #[arg(long, short)]
        file: PathBuf,
    },

    /// Compute and display config hash (SHA-256)
    Hash {
        /// Path to the TOML configuration file
        #[arg(long, short)]
        file: PathBuf,

        /// Output format
        #[arg(long, default_value = "text")]
        format: HashFormat,

        /// Hash the raw file without applying environment overrides
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Clone, ValueEnum, Debug)]
pub enum HashFormat {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Token { action } => {
            let token = token::mint(action)?;
            println!("{}", token);
            Ok(())
        }
        Commands::Inspect { token, key } => {
            let report = inspect::inspect(&token, key.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { file } => config::validate(file, cli.verbose),
            ConfigAction::Hash { file, format, raw } => {
                hash::compute_and_display(file, format, raw, cli.verbose)
            }
        },
    }
}
