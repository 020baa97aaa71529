//! Error types for the token server.
//!
//! Service-level failures are carried as [`error_stack::Report`]s of
//! [`TokenServerError`]. Each variant knows which HTTP status it maps to and
//! what message is safe to show to a client.

use derive_more::{Display, Error};
use http::StatusCode;

use crate::token::TokenError;

/// Errors raised while serving token requests.
#[derive(Debug, Display, Error)]
pub enum TokenServerError {
    /// Settings could not be loaded, parsed or validated.
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// The request body or one of its fields is not acceptable.
    #[display("Bad request: {message}")]
    BadRequest { message: String },

    /// A token builder rejected its input.
    #[display("Error generating {flavor} token: {source}")]
    TokenGeneration {
        flavor: &'static str,
        source: TokenError,
    },
}

/// Maps an error onto the HTTP response that should be sent for it.
pub trait IntoHttpResponse {
    /// HTTP status code for this error.
    fn status_code(&self) -> StatusCode;

    /// Message safe to send to clients. Never contains secrets.
    fn user_message(&self) -> String;
}

impl IntoHttpResponse for TokenServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest { .. } | Self::TokenGeneration { .. } => StatusCode::BAD_REQUEST,
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Configuration { .. } => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}
