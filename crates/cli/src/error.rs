//! CLI error types.

use std::fmt;

use error_stack::Report;

use token_server_common::error::TokenServerError;
use token_server_common::token::TokenError;

#[derive(Debug)]
pub enum CliError {
    /// Configuration file error
    Config(String),
    /// A token could not be minted or decoded
    Token(TokenError),
    /// Command-line input that makes no sense together
    Usage(String),
    /// IO error
    Io(std::io::Error),
    /// TOML parsing error
    Toml(String),
    /// JSON rendering error
    Json(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Token(err) => write!(f, "Token error: {}", err),
            CliError::Usage(msg) => write!(f, "Usage error: {}", msg),
            CliError::Io(err) => write!(f, "IO error: {}", err),
            CliError::Toml(msg) => write!(f, "TOML error: {}", msg),
            CliError::Json(msg) => write!(f, "JSON error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(err) => Some(err),
            CliError::Token(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Toml(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Json(err.to_string())
    }
}

impl From<Report<TokenServerError>> for CliError {
    fn from(report: Report<TokenServerError>) -> Self {
        CliError::Config(format!("{report:?}"))
    }
}

impl From<TokenError> for CliError {
    fn from(err: TokenError) -> Self {
        CliError::Token(err)
    }
}
