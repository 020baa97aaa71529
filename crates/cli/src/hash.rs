//! Hash computation for configuration files.

use std::fs;
use std::path::{Path, PathBuf};

use token_server_common::settings::compute_settings_hash;

use crate::config::load_and_merge_config;
use crate::error::CliError;
use crate::HashFormat;

/// Compute SHA-256 hash of a configuration file as written.
///
/// Line endings are normalized to LF for consistent hashing across platforms.
pub fn compute_file_hash(path: &Path) -> Result<String, CliError> {
    let content = fs::read_to_string(path)?;
    Ok(compute_settings_hash(&content))
}

/// Compute and display the hash of a configuration file.
pub fn compute_and_display(
    path: PathBuf,
    format: HashFormat,
    raw: bool,
    verbose: bool,
) -> Result<(), CliError> {
    let hash = if raw {
        compute_file_hash(&path)?
    } else {
        let (_settings, merged_toml) = load_and_merge_config(&path, verbose)?;
        compute_settings_hash(&merged_toml)
    };

    match format {
        HashFormat::Text => {
            println!("{}", hash);
        }
        HashFormat::Json => {
            let output = serde_json::json!({
                "file": path.display().to_string(),
                "hash": hash,
                "algorithm": "sha256"
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
