//! Configuration management commands.
//!
//! Configuration is loaded from TOML files and merged with environment variables
//! prefixed with `TOKEN_SERVER__`. For example, `TOKEN_SERVER__TOKENS__MAX_EXPIRE_SECS`
//! will override `tokens.max_expire_secs` in the TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use token_server_common::settings::{compute_settings_hash, Settings};
use validator::Validate;

use crate::error::CliError;

/// Load and merge configuration from TOML file with environment variables.
///
/// Returns the validated settings together with their canonical TOML rendering.
pub(crate) fn load_and_merge_config(
    file: &Path,
    verbose: bool,
) -> Result<(Settings, String), CliError> {
    let content = fs::read_to_string(file)?;

    if verbose {
        println!("Loading config from: {}", file.display());
        println!("Environment variables with TOKEN_SERVER__ prefix will be merged");
    }

    let settings = Settings::from_toml(&content)?;

    settings
        .validate()
        .map_err(|e| CliError::Config(format!("Settings validation failed: {e}")))?;

    let merged_toml = settings.to_canonical_toml()?;

    Ok((settings, merged_toml))
}

/// Validate configuration file.
///
/// Checks TOML syntax, field types and the settings validation rules after
/// environment overrides are applied.
pub fn validate(file: PathBuf, verbose: bool) -> Result<(), CliError> {
    let (settings, merged_toml) = load_and_merge_config(&file, verbose)?;
    let hash = compute_settings_hash(&merged_toml);

    println!("Configuration is valid");
    println!("  File: {}", file.display());
    println!("  Hash: {}", hash);
    println!(
        "  Token expiry: default {}s, max {}s",
        settings.tokens.default_expire_secs, settings.tokens.max_expire_secs
    );

    if verbose {
        let value: toml::Value = toml::from_str(&merged_toml)?;
        if let Some(table) = value.as_table() {
            println!("\nSections found:");
            for key in table.keys() {
                println!("  - [{}]", key);
            }
        }

        println!("\nGuarded paths:");
        if settings.handlers.is_empty() {
            println!("  (none)");
        }
        for handler in &settings.handlers {
            println!("  - {} (user {})", handler.path, handler.username);
        }
    }

    Ok(())
}
