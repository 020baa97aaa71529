//! Netless whiteboard tokens.
//!
//! A whiteboard token is a prefixed, URL-safe base64 query string. The query
//! holds the content fields, the access key, a nonce, an optional absolute
//! expiry in milliseconds and `sig`, a hex HMAC-SHA256 over the sorted fields
//! rendered as compact JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::token::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Access level inside a whiteboard resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteboardRole {
    Admin,
    Writer,
    Reader,
}

impl WhiteboardRole {
    /// Numeric code carried in the token.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Admin => "0",
            Self::Writer => "1",
            Self::Reader => "2",
        }
    }
}

impl FromStr for WhiteboardRole {
    type Err = TokenError;

    fn from_str(role: &str) -> Result<Self, Self::Err> {
        match role.trim().to_ascii_lowercase().as_str() {
            "0" | "admin" => Ok(Self::Admin),
            "1" | "writer" => Ok(Self::Writer),
            "2" | "reader" => Ok(Self::Reader),
            _ => Err(TokenError::UnknownRole {
                role: role.to_string(),
            }),
        }
    }
}

/// The three whiteboard token flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteboardTokenKind {
    Sdk,
    Room,
    Task,
}

impl WhiteboardTokenKind {
    const ALL: [Self; 3] = [Self::Sdk, Self::Room, Self::Task];

    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Sdk => "NETLESSSDK_",
            Self::Room => "NETLESSROOM_",
            Self::Task => "NETLESSTASK_",
        }
    }
}

impl fmt::Display for WhiteboardTokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sdk => write!(f, "SDK"),
            Self::Room => write!(f, "room"),
            Self::Task => write!(f, "task"),
        }
    }
}

/// Builds whiteboard tokens for one access key pair.
///
/// The clock and nonce default to the system time and a random UUID; both can
/// be pinned for reproducible output.
#[derive(Debug, Clone)]
pub struct WhiteboardTokenBuilder {
    access_key: String,
    secret_key: String,
    now_ms: Option<u64>,
    nonce: Option<String>,
}

impl WhiteboardTokenBuilder {
    /// # Errors
    ///
    /// Returns [`TokenError::EmptyField`] when either key is empty.
    pub fn new(access_key: &str, secret_key: &str) -> Result<Self, TokenError> {
        if access_key.is_empty() {
            return Err(TokenError::EmptyField {
                field: "accessKey",
            });
        }
        if secret_key.is_empty() {
            return Err(TokenError::EmptyField {
                field: "SecretKey",
            });
        }
        Ok(Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            now_ms: None,
            nonce: None,
        })
    }

    #[must_use]
    pub fn with_time(mut self, now_ms: u64) -> Self {
        self.now_ms = Some(now_ms);
        self
    }

    #[must_use]
    pub fn with_nonce(mut self, nonce: &str) -> Self {
        self.nonce = Some(nonce.to_string());
        self
    }

    /// SDK token. A `lifespan_ms` of `0` never expires.
    #[must_use]
    pub fn sdk(&self, role: WhiteboardRole, lifespan_ms: u64) -> String {
        let mut content = BTreeMap::new();
        content.insert("role".to_string(), role.code().to_string());
        self.sign(WhiteboardTokenKind::Sdk, content, lifespan_ms)
    }

    /// # Errors
    ///
    /// Returns [`TokenError::EmptyField`] when `room_uuid` is empty.
    pub fn room(
        &self,
        role: WhiteboardRole,
        room_uuid: &str,
        lifespan_ms: u64,
    ) -> Result<String, TokenError> {
        let content = scoped_content(role, room_uuid, "roomuuid")?;
        Ok(self.sign(WhiteboardTokenKind::Room, content, lifespan_ms))
    }

    /// # Errors
    ///
    /// Returns [`TokenError::EmptyField`] when `task_uuid` is empty.
    pub fn task(
        &self,
        role: WhiteboardRole,
        task_uuid: &str,
        lifespan_ms: u64,
    ) -> Result<String, TokenError> {
        let content = scoped_content(role, task_uuid, "taskuuid")?;
        Ok(self.sign(WhiteboardTokenKind::Task, content, lifespan_ms))
    }

    fn sign(
        &self,
        kind: WhiteboardTokenKind,
        mut fields: BTreeMap<String, String>,
        lifespan_ms: u64,
    ) -> String {
        fields.insert("ak".to_string(), self.access_key.clone());
        fields.insert(
            "nonce".to_string(),
            self.nonce
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        );
        if lifespan_ms > 0 {
            let now_ms = self.now_ms.unwrap_or_else(current_time_ms);
            fields.insert(
                "expireAt".to_string(),
                now_ms.saturating_add(lifespan_ms).to_string(),
            );
        }

        let information = serde_json::to_string(&fields).expect("string map serializes");
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(information.as_bytes());
        fields.insert("sig".to_string(), hex::encode(mac.finalize().into_bytes()));

        format!(
            "{}{}",
            kind.prefix(),
            URL_SAFE_NO_PAD.encode(to_query(&fields))
        )
    }
}

/// SDK token signed with `secret_key`.
///
/// # Errors
///
/// Returns [`TokenError::EmptyField`] when a key is empty.
pub fn sdk_token(
    access_key: &str,
    secret_key: &str,
    lifespan_ms: u64,
    role: WhiteboardRole,
) -> Result<String, TokenError> {
    WhiteboardTokenBuilder::new(access_key, secret_key)
        .map(|builder| builder.sdk(role, lifespan_ms))
}

/// Room token for `room_uuid`.
///
/// # Errors
///
/// Returns [`TokenError::EmptyField`] when a key or the uuid is empty.
pub fn room_token(
    access_key: &str,
    secret_key: &str,
    lifespan_ms: u64,
    role: WhiteboardRole,
    room_uuid: &str,
) -> Result<String, TokenError> {
    WhiteboardTokenBuilder::new(access_key, secret_key)?.room(role, room_uuid, lifespan_ms)
}

/// Task token for `task_uuid`.
///
/// # Errors
///
/// Returns [`TokenError::EmptyField`] when a key or the uuid is empty.
pub fn task_token(
    access_key: &str,
    secret_key: &str,
    lifespan_ms: u64,
    role: WhiteboardRole,
    task_uuid: &str,
) -> Result<String, TokenError> {
    WhiteboardTokenBuilder::new(access_key, secret_key)?.task(role, task_uuid, lifespan_ms)
}

/// A whiteboard token split back into its kind and fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedWhiteboardToken {
    pub kind: WhiteboardTokenKind,
    pub fields: BTreeMap<String, String>,
}

impl DecodedWhiteboardToken {
    /// Recomputes `sig` with `secret_key`.
    #[must_use]
    pub fn verify(&self, secret_key: &str) -> bool {
        let Some(signature) = self.fields.get("sig").and_then(|s| hex::decode(s).ok()) else {
            return false;
        };
        let mut unsigned = self.fields.clone();
        unsigned.remove("sig");
        let information = serde_json::to_string(&unsigned).expect("string map serializes");

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(information.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }

    /// Absolute expiry in Unix milliseconds, if the token has one.
    #[must_use]
    pub fn expire_at_ms(&self) -> Option<u64> {
        self.fields.get("expireAt").and_then(|v| v.parse().ok())
    }
}

/// Reads a whiteboard token without checking its signature.
///
/// # Errors
///
/// Returns [`TokenError::UnsupportedVersion`] for an unknown prefix and
/// [`TokenError::Malformed`] when the payload is not a valid query string.
pub fn decode_whiteboard_token(token: &str) -> Result<DecodedWhiteboardToken, TokenError> {
    let (kind, encoded) = WhiteboardTokenKind::ALL
        .iter()
        .find_map(|kind| token.strip_prefix(kind.prefix()).map(|rest| (*kind, rest)))
        .ok_or_else(|| TokenError::UnsupportedVersion {
            found: token.split('_').next().unwrap_or_default().to_string(),
        })?;

    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| TokenError::Malformed {
            message: format!("invalid base64: {e}"),
        })?;
    let query = String::from_utf8(raw).map_err(|e| TokenError::Malformed {
        message: format!("query is not UTF-8: {e}"),
    })?;

    let mut fields = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| TokenError::Malformed {
            message: format!("query pair without '=': {pair}"),
        })?;
        fields.insert(decode_component(key)?, decode_component(value)?);
    }

    Ok(DecodedWhiteboardToken { kind, fields })
}

fn scoped_content(
    role: WhiteboardRole,
    uuid: &str,
    field: &'static str,
) -> Result<BTreeMap<String, String>, TokenError> {
    if uuid.is_empty() {
        return Err(TokenError::EmptyField { field });
    }
    let mut content = BTreeMap::new();
    content.insert("role".to_string(), role.code().to_string());
    content.insert("uuid".to_string(), uuid.to_string());
    Ok(content)
}

fn current_time_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

fn to_query(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encodes like JavaScript's `encodeURIComponent`.
fn encode_component(value: &str) -> String {
    urlencoding::encode(value)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}

fn decode_component(value: &str) -> Result<String, TokenError> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| TokenError::Malformed {
            message: format!("invalid percent-encoding: {e}"),
        })
}
