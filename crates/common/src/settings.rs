use std::sync::OnceLock;

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use validator::{Validate, ValidationError};

use crate::error::TokenServerError;

pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "TOKEN_SERVER";
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

/// One day, the expiry used when a request does not ask for one.
pub const DEFAULT_EXPIRE_SECS: u32 = 86_400;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct Logging {
    #[validate(length(min = 1))]
    pub endpoint: String,
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            endpoint: "tokenlog".to_string(),
            level: "info".to_string(),
        }
    }
}

/// Expiry policy for RTC, RTM and Chat tokens, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_token_expiry"))]
pub struct Tokens {
    #[validate(range(min = 1))]
    pub default_expire_secs: u32,
    #[validate(range(min = 1))]
    pub max_expire_secs: u32,
}

impl Default for Tokens {
    fn default() -> Self {
        Self {
            default_expire_secs: DEFAULT_EXPIRE_SECS,
            max_expire_secs: DEFAULT_EXPIRE_SECS,
        }
    }
}

/// Whiteboard token lifespan in milliseconds. `0` never expires.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct Whiteboard {
    pub default_lifespan_ms: u64,
}

/// Basic-auth credentials guarding every path that matches `path`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Handler {
    #[validate(custom(function = "validate_path_pattern"))]
    pub path: String,
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[serde(skip)]
    regex: OnceLock<Regex>,
}

impl Handler {
    fn matches(&self, path: &str) -> bool {
        match self.regex.get() {
            Some(regex) => regex.is_match(path),
            None => match Regex::new(&self.path) {
                Ok(regex) => self.regex.get_or_init(|| regex).is_match(path),
                Err(e) => {
                    log::warn!("Ignoring handler with invalid path {:?}: {}", self.path, e);
                    false
                }
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[serde(default)]
    #[validate(nested)]
    pub logging: Logging,
    #[serde(default)]
    #[validate(nested)]
    pub tokens: Tokens,
    #[serde(default)]
    #[validate(nested)]
    pub whiteboard: Whiteboard,
    #[serde(default)]
    #[validate(nested)]
    pub handlers: Vec<Handler>,
}

impl Settings {
    /// Loads the settings merged and embedded at build time.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the embedded TOML or an override is invalid.
    pub fn new() -> Result<Self, Report<TokenServerError>> {
        let settings = Self::from_toml(include_str!("../../../target/token-server-out.toml"))?;
        settings
            .validate()
            .change_context(TokenServerError::Configuration {
                message: "Settings failed validation".to_string(),
            })?;
        Ok(settings)
    }

    /// Parses `toml_str` and applies `TOKEN_SERVER__*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TOML cannot be parsed or deserialized.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<TokenServerError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(TokenServerError::Configuration {
                message: "Failed to build configuration".to_string(),
            })?;

        config
            .try_deserialize()
            .change_context(TokenServerError::Configuration {
                message: "Failed to deserialize configuration".to_string(),
            })
    }

    /// Settings rendered back to TOML, the form that gets hashed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if serialization fails.
    pub fn to_canonical_toml(&self) -> Result<String, Report<TokenServerError>> {
        toml::to_string(self).change_context(TokenServerError::Configuration {
            message: "Failed to serialize settings".to_string(),
        })
    }

    /// First basic-auth handler whose pattern matches `path`.
    #[must_use]
    pub fn handler_for_path(&self, path: &str) -> Option<&Handler> {
        self.handlers.iter().find(|handler| handler.matches(path))
    }

    #[must_use]
    pub fn log_level(&self) -> log::LevelFilter {
        self.logging
            .level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }

    /// Expiry in seconds for an RTC, RTM or Chat token.
    ///
    /// A missing or zero request uses the default; anything above the maximum is clamped.
    #[must_use]
    pub fn resolve_expire_secs(&self, requested: Option<u32>) -> u32 {
        match requested {
            None | Some(0) => self.tokens.default_expire_secs,
            Some(secs) => secs.min(self.tokens.max_expire_secs),
        }
    }

    /// Lifespan in milliseconds for a whiteboard token.
    #[must_use]
    pub fn resolve_lifespan_ms(&self, requested: Option<u64>) -> u64 {
        match requested {
            None | Some(0) => self.whiteboard.default_lifespan_ms,
            Some(ms) => ms,
        }
    }
}

/// SHA-256 of the settings text as `sha256:<hex>`, with line endings normalized.
#[must_use]
pub fn compute_settings_hash(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    let hash = Sha256::digest(normalized.as_bytes());
    format!("sha256:{}", hex::encode(hash))
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    level
        .parse::<log::LevelFilter>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_log_level"))
}

fn validate_path_pattern(path: &str) -> Result<(), ValidationError> {
    Regex::new(path)
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_path_regex"))
}

fn validate_token_expiry(tokens: &Tokens) -> Result<(), ValidationError> {
    if tokens.default_expire_secs > tokens.max_expire_secs {
        return Err(ValidationError::new("default_expire_exceeds_max"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_new() {
        let settings = Settings::new().expect("should load embedded settings");

        assert!(settings.validate().is_ok());
        assert_eq!(settings.tokens.default_expire_secs, DEFAULT_EXPIRE_SECS);
        assert!(!settings.logging.endpoint.is_empty());
    }

    #[test]
    fn test_settings_from_valid_toml() {
        let toml_str = r#"
            [logging]
            endpoint = "custom"
            level = "debug"

            [tokens]
            default_expire_secs = 3600
            max_expire_secs = 7200

            [whiteboard]
            default_lifespan_ms = 60000

            [[handlers]]
            path = "^/whiteboard"
            username = "admin"
            password = "secret"
            "#;

        let settings = Settings::from_toml(toml_str).expect("should parse settings");

        assert_eq!(settings.logging.endpoint, "custom");
        assert_eq!(settings.log_level(), log::LevelFilter::Debug);
        assert_eq!(settings.tokens.default_expire_secs, 3600);
        assert_eq!(settings.tokens.max_expire_secs, 7200);
        assert_eq!(settings.whiteboard.default_lifespan_ms, 60_000);
        assert_eq!(settings.handlers.len(), 1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_empty_toml_uses_defaults() {
        let settings = Settings::from_toml("").expect("should parse empty settings");

        assert_eq!(settings.tokens.default_expire_secs, DEFAULT_EXPIRE_SECS);
        assert_eq!(settings.whiteboard.default_lifespan_ms, 0);
        assert!(settings.handlers.is_empty());
    }

    #[test]
    fn test_settings_invalid_toml_syntax() {
        let toml_str = r#"
            [tokens
            default_expire_secs = 10
            "#;

        assert!(Settings::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_settings_wrong_type_is_rejected() {
        let toml_str = r#"
            [tokens]
            default_expire_secs = "soon"
            max_expire_secs = 10
            "#;

        assert!(Settings::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_validation_rejects_default_above_max() {
        let toml_str = r#"
            [tokens]
            default_expire_secs = 7200
            max_expire_secs = 3600
            "#;

        let settings = Settings::from_toml(toml_str).expect("should parse settings");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_handler_regex_and_level() {
        let toml_str = r#"
            [logging]
            endpoint = "tokenlog"
            level = "loud"

            [[handlers]]
            path = "^/(rtc"
            username = "admin"
            password = "secret"
            "#;

        let settings = Settings::from_toml(toml_str).expect("should parse settings");
        let errors = settings.validate().expect_err("should fail validation");
        assert!(errors.errors().contains_key("logging"));
        assert!(errors.errors().contains_key("handlers"));
    }

    #[test]
    fn test_handler_for_path() {
        let toml_str = r#"
            [[handlers]]
            path = "^/whiteboard"
            username = "admin"
            password = "secret"
            "#;
        let settings = Settings::from_toml(toml_str).expect("should parse settings");

        assert!(settings.handler_for_path("/whiteboard/room").is_some());
        assert!(settings.handler_for_path("/rtc").is_none());
    }

    #[test]
    fn test_resolve_expire_secs() {
        let settings = Settings::default();

        assert_eq!(settings.resolve_expire_secs(None), DEFAULT_EXPIRE_SECS);
        assert_eq!(settings.resolve_expire_secs(Some(0)), DEFAULT_EXPIRE_SECS);
        assert_eq!(settings.resolve_expire_secs(Some(600)), 600);
        assert_eq!(
            settings.resolve_expire_secs(Some(DEFAULT_EXPIRE_SECS * 30)),
            DEFAULT_EXPIRE_SECS
        );
    }

    #[test]
    fn test_resolve_lifespan_ms() {
        let mut settings = Settings::default();
        assert_eq!(settings.resolve_lifespan_ms(None), 0);
        assert_eq!(settings.resolve_lifespan_ms(Some(5_000)), 5_000);

        settings.whiteboard.default_lifespan_ms = 1_000;
        assert_eq!(settings.resolve_lifespan_ms(Some(0)), 1_000);
    }

    #[test]
    fn test_set_env() {
        temp_env::with_var(
            "TOKEN_SERVER__TOKENS__DEFAULT_EXPIRE_SECS",
            Some("3600"),
            || {
                let settings = Settings::from_toml("").expect("should apply env override");
                assert_eq!(settings.tokens.default_expire_secs, 3600);
            },
        );
    }

    #[test]
    fn test_override_env() {
        let toml_str = r#"
            [logging]
            endpoint = "tokenlog"
            level = "info"
            "#;

        temp_env::with_var("TOKEN_SERVER__LOGGING__LEVEL", Some("warn"), || {
            let settings = Settings::from_toml(toml_str).expect("should apply env override");
            assert_eq!(settings.log_level(), log::LevelFilter::Warn);
        });
    }

    #[test]
    fn test_canonical_toml_hash_is_stable() {
        let settings = Settings::default();
        let canonical = settings
            .to_canonical_toml()
            .expect("should serialize settings");

        let hash = compute_settings_hash(&canonical);
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), 7 + 64);
        assert_eq!(hash, compute_settings_hash(&canonical.replace('\n', "\r\n")));
    }
}
