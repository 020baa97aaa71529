//! Token minting commands.
//!
//! Each command builds exactly the token the service would return for the same
//! input, so the CLI can stand in for the HTTP endpoints during development.

use clap::{Args, Subcommand, ValueEnum};

use token_server_common::settings::DEFAULT_EXPIRE_SECS;
use token_server_common::token::{
    build_chat_app_token, build_chat_user_token, build_rtc_token_with_account,
    build_rtc_token_with_uid, build_rtm_token, parse_uid, RtcRole,
};
use token_server_common::whiteboard::{WhiteboardRole, WhiteboardTokenBuilder};

use crate::error::CliError;

#[derive(Args, Debug)]
pub struct Credentials {
    /// Agora app id (32 hex characters)
    #[arg(long, env = "TOKEN_APP_ID")]
    pub app_id: String,

    /// Agora app certificate (32 hex characters)
    #[arg(long, env = "TOKEN_APP_CERTIFICATE", hide_env_values = true)]
    pub certificate: String,
}

#[derive(Clone, Copy, ValueEnum, Debug, Default)]
pub enum RoleArg {
    Publisher,
    #[default]
    Subscriber,
}

impl From<RoleArg> for RtcRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Publisher => RtcRole::Publisher,
            RoleArg::Subscriber => RtcRole::Subscriber,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum WhiteboardKindArg {
    Sdk,
    Room,
    Task,
}

#[derive(Subcommand, Debug)]
pub enum TokenAction {
    /// Mint an RTC token for a channel
    Rtc {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        channel: String,

        /// Numeric uid or string account; 0 admits any user
        #[arg(long, default_value = "0")]
        uid: String,

        #[arg(long, value_enum, default_value_t)]
        role: RoleArg,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = DEFAULT_EXPIRE_SECS)]
        expire: u32,

        /// Privilege lifetime in seconds, defaults to the token lifetime
        #[arg(long)]
        privilege_expire: Option<u32>,
    },

    /// Mint an RTM login token
    Rtm {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        uid: String,

        #[arg(long, default_value_t = DEFAULT_EXPIRE_SECS)]
        expire: u32,
    },

    /// Mint a Chat token; without --uid an app token is minted
    Chat {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        uid: Option<String>,

        #[arg(long, default_value_t = DEFAULT_EXPIRE_SECS)]
        expire: u32,
    },

    /// Mint a whiteboard SDK, room or task token
    Whiteboard {
        #[arg(long, value_enum)]
        kind: WhiteboardKindArg,

        #[arg(long, env = "TOKEN_WHITEBOARD_ACCESS_KEY")]
        access_key: String,

        #[arg(long, env = "TOKEN_WHITEBOARD_SECRET_KEY", hide_env_values = true)]
        secret_key: String,

        /// admin, writer or reader (or 0, 1, 2)
        #[arg(long)]
        role: WhiteboardRole,

        /// Room or task uuid
        #[arg(long)]
        uuid: Option<String>,

        /// Lifespan in milliseconds; 0 never expires
        #[arg(long, default_value_t = 0)]
        lifespan_ms: u64,
    },
}

/// Builds the token described by `action`.
pub fn mint(action: TokenAction) -> Result<String, CliError> {
    let token = match action {
        TokenAction::Rtc {
            credentials,
            channel,
            uid,
            role,
            expire,
            privilege_expire,
        } => {
            let privilege_expire = privilege_expire.unwrap_or(expire);
            match parse_uid(&uid) {
                Some(uid) => build_rtc_token_with_uid(
                    &credentials.app_id,
                    &credentials.certificate,
                    &channel,
                    uid,
                    role.into(),
                    expire,
                    privilege_expire,
                )?,
                None => build_rtc_token_with_account(
                    &credentials.app_id,
                    &credentials.certificate,
                    &channel,
                    &uid,
                    role.into(),
                    expire,
                    privilege_expire,
                )?,
            }
        }
        TokenAction::Rtm {
            credentials,
            uid,
            expire,
        } => build_rtm_token(&credentials.app_id, &credentials.certificate, &uid, expire)?,
        TokenAction::Chat {
            credentials,
            uid,
            expire,
        } => match uid.filter(|uid| !uid.is_empty()) {
            Some(uid) => {
                build_chat_user_token(&credentials.app_id, &credentials.certificate, &uid, expire)?
            }
            None => build_chat_app_token(&credentials.app_id, &credentials.certificate, expire)?,
        },
        TokenAction::Whiteboard {
            kind,
            access_key,
            secret_key,
            role,
            uuid,
            lifespan_ms,
        } => {
            let builder = WhiteboardTokenBuilder::new(&access_key, &secret_key)?;
            let uuid = uuid.unwrap_or_default();
            match kind {
                WhiteboardKindArg::Sdk => {
                    if !uuid.is_empty() {
                        return Err(CliError::Usage(
                            "--uuid only applies to room and task tokens".to_string(),
                        ));
                    }
                    builder.sdk(role, lifespan_ms)
                }
                WhiteboardKindArg::Room => builder.room(role, &uuid, lifespan_ms)?,
                WhiteboardKindArg::Task => builder.task(role, &uuid, lifespan_ms)?,
            }
        }
    };

    Ok(token)
}
