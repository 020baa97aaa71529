#![allow(clippy::unwrap_used, clippy::panic)]

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};

const ENVIRONMENT_VARIABLE_PREFIX: &str = "TOKEN_SERVER";
const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

const TOKEN_SERVER_INIT_CONFIG_PATH: &str = "../../token-server.toml";
const TOKEN_SERVER_OUTPUT_CONFIG_PATH: &str = "../../target/token-server-out.toml";

// Keys that may be overridden even when the TOML file leaves them out.
const KNOWN_KEYS: &[&str] = &[
    "logging.endpoint",
    "logging.level",
    "tokens.default_expire_secs",
    "tokens.max_expire_secs",
    "whiteboard.default_lifespan_ms",
];

fn main() {
    let toml_content = fs::read_to_string(TOKEN_SERVER_INIT_CONFIG_PATH)
        .unwrap_or_else(|_| panic!("Failed to read {TOKEN_SERVER_INIT_CONFIG_PATH}"));

    merge_toml(&toml_content);
    rerun_if_changed(&toml_content);
}

fn rerun_if_changed(toml_content: &str) {
    println!("cargo:rerun-if-changed={TOKEN_SERVER_INIT_CONFIG_PATH}");

    let mut keys: BTreeSet<String> = KNOWN_KEYS.iter().map(|k| (*k).to_string()).collect();
    if let Ok(table) = toml_content.parse::<toml::Table>() {
        collect_keys(&table, "", &mut keys);
    }

    for key in keys {
        let env_var = format!(
            "{}{}{}",
            ENVIRONMENT_VARIABLE_PREFIX,
            ENVIRONMENT_VARIABLE_SEPARATOR,
            key.to_uppercase().replace('.', ENVIRONMENT_VARIABLE_SEPARATOR)
        );
        println!("cargo:rerun-if-env-changed={env_var}");
    }
}

// Fastly Compute has no access to the deploy environment, so overrides are
// resolved here and the merged file is what gets embedded.
fn merge_toml(toml_content: &str) {
    let environment = Environment::default()
        .prefix(ENVIRONMENT_VARIABLE_PREFIX)
        .separator(ENVIRONMENT_VARIABLE_SEPARATOR);
    let merged: toml::Table = Config::builder()
        .add_source(File::from_str(toml_content, FileFormat::Toml))
        .add_source(environment)
        .build()
        .expect("Failed to build configuration at build time")
        .try_deserialize()
        .expect("Failed to deserialize configuration at build time");

    let merged_toml = toml::to_string_pretty(&merged).expect("Failed to serialize merged TOML");

    let dest_path = Path::new(TOKEN_SERVER_OUTPUT_CONFIG_PATH);
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).unwrap_or_else(|_| panic!("Failed to create {parent:?}"));
    }
    fs::write(dest_path, merged_toml).unwrap_or_else(|_| panic!("Failed to write {dest_path:?}"));
}

fn collect_keys(table: &toml::Table, prefix: &str, keys: &mut BTreeSet<String>) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => collect_keys(nested, &path, keys),
            toml::Value::Array(_) => {}
            _ => {
                keys.insert(path);
            }
        }
    }
}
