//! Token inspection.
//!
//! Decodes an AccessToken2 or whiteboard token into JSON. With a key the
//! signature is checked as well.

use chrono::DateTime;
use serde_json::{json, Value};

use token_server_common::token::{DecodedToken, VERSION};
use token_server_common::whiteboard::decode_whiteboard_token;

use crate::error::CliError;

/// Decodes `token`. `key` is the app certificate or the whiteboard secret key.
pub fn inspect(token: &str, key: Option<&str>) -> Result<Value, CliError> {
    let token = token.trim();

    let report = if token.starts_with(VERSION) {
        let decoded = DecodedToken::parse(token)?;
        let verified = key.map(|certificate| decoded.verify(certificate));
        json!({
            "format": "AccessToken2",
            "issuedAt": format_unix_secs(u64::from(decoded.issue_ts)),
            "expiresAt": format_unix_secs(decoded.expires_at()),
            "expired": decoded.is_expired(now_secs()),
            "verified": verified,
            "token": decoded,
        })
    } else {
        let decoded = decode_whiteboard_token(token)?;
        let verified = key.map(|secret_key| decoded.verify(secret_key));
        let expire_at_ms = decoded.expire_at_ms();
        json!({
            "format": "Netless",
            "expiresAt": expire_at_ms.and_then(format_unix_millis),
            "expired": expire_at_ms.is_some_and(|at| at <= now_millis()),
            "verified": verified,
            "token": decoded,
        })
    };

    Ok(report)
}

fn format_unix_secs(secs: u64) -> Option<String> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|at| at.to_rfc3339())
}

fn format_unix_millis(millis: u64) -> Option<String> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|at| at.to_rfc3339())
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
