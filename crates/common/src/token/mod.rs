//! Signed access tokens for real-time sessions.
//!
//! Tokens are produced in the AccessToken2 layout (version prefix `007`): a
//! little-endian packed body listing the app, issue time, salt and one entry
//! per service with its privilege expirations, signed with HMAC-SHA256 and
//! shipped zlib-compressed and base64 encoded.
//!
//! - [`packer`]: binary primitives used by the layout
//! - [`access_token`]: the token container, signing, parsing and verification
//! - [`builders`]: RTC, RTM and Chat builders on top of [`AccessToken`]

use derive_more::{Display, Error};

pub mod access_token;
pub mod builders;
pub mod packer;

pub use access_token::{
    AccessToken, ChatPrivilege, DecodedToken, RtcPrivilege, RtmPrivilege, Service, ServiceScope,
    ServiceType, VERSION,
};
pub use builders::{
    build_chat_app_token, build_chat_user_token, build_rtc_token_with_account,
    build_rtc_token_with_privileges, build_rtc_token_with_uid, build_rtm_token, parse_uid,
    RtcPrivilegeExpiry, RtcRole,
};

/// Errors produced while building or decoding tokens.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// App id or app certificate is not 32 hexadecimal characters.
    #[display("check appId or appCertificate")]
    InvalidCredentials,

    /// A length-prefixed field does not fit in a `u16`.
    #[display("field of {len} bytes exceeds the 65535 byte limit")]
    FieldTooLong { len: usize },

    /// Input ended before a field could be read.
    #[display("token data is truncated")]
    Truncated,

    /// Input could be read but is not a valid token.
    #[display("malformed token: {message}")]
    Malformed { message: String },

    /// The token does not start with a supported version prefix.
    #[display("unsupported token version {found:?}")]
    UnsupportedVersion { found: String },

    /// A service type the decoder does not know.
    #[display("unknown service type {service_type}")]
    UnknownService { service_type: u16 },

    /// A required input was empty.
    #[display("{field} must not be empty")]
    EmptyField { field: &'static str },

    /// Role string not understood by the builder.
    #[display("unknown role {role:?}")]
    UnknownRole { role: String },
}
