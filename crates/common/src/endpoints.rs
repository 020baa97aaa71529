//! HTTP endpoint handlers for token issuance.
//!
//! Every handler reads a JSON body, mints one token and answers with a JSON
//! object holding it. A body that cannot be parsed is reported as an error so
//! the caller renders a plain-text `400`. A token the builders refuse is
//! answered here with a JSON `400` naming the token flavor.

use std::str::FromStr;

use error_stack::{Report, ResultExt};
use fastly::http::StatusCode;
use fastly::{Request, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TokenServerError;
use crate::request_id::get_or_generate_request_id;
use crate::settings::Settings;
use crate::token::{
    build_chat_app_token, build_chat_user_token, build_rtc_token_with_account,
    build_rtc_token_with_uid, build_rtm_token, parse_uid, RtcRole, TokenError,
};
use crate::whiteboard::{room_token, sdk_token, task_token, WhiteboardRole};

/// A user id as clients send it: either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(u64),
    Text(String),
}

impl Default for UserId {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl UserId {
    /// Numeric uid when the value fits a `u32`.
    #[must_use]
    pub fn as_uid(&self) -> Option<u32> {
        match self {
            Self::Number(n) => u32::try_from(*n).ok(),
            Self::Text(s) => parse_uid(s),
        }
    }

    #[must_use]
    pub fn as_account(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RtcTokenRequest {
    #[serde(rename = "appId")]
    pub app_id: String,
    pub certificate: String,
    pub channel: String,
    #[serde(default)]
    pub uid: UserId,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub expire: Option<u32>,
    #[serde(default, rename = "privilegeExpire")]
    pub privilege_expire: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RtmTokenRequest {
    #[serde(rename = "appId")]
    pub app_id: String,
    pub certificate: String,
    pub uid: UserId,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub expire: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChatTokenRequest {
    #[serde(rename = "appId")]
    pub app_id: String,
    pub certificate: String,
    #[serde(default)]
    pub uid: Option<UserId>,
    #[serde(default)]
    pub expire: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WhiteboardTokenRequest {
    pub role: String,
    #[serde(rename = "accessKey")]
    pub access_key: String,
    #[serde(rename = "SecretKey")]
    pub secret_key: String,
    #[serde(default)]
    pub expire: Option<u64>,
    #[serde(default, rename = "roomuuid")]
    pub room_uuid: Option<String>,
    #[serde(default, rename = "taskuuid")]
    pub task_uuid: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenErrorBody {
    status: u16,
    error: String,
}

/// Mints an RTC token. Answers `{"rtcToken": ...}`.
///
/// # Errors
///
/// Returns a bad-request error if the body is not a valid RTC request.
pub fn handle_rtc_token(
    settings: &Settings,
    mut req: Request,
) -> Result<Response, Report<TokenServerError>> {
    let request_id = get_or_generate_request_id(&req);
    let body: RtcTokenRequest = parse_body(&mut req)?;

    let role = body.role.as_deref().map(RtcRole::from).unwrap_or_default();
    let expire = settings.resolve_expire_secs(body.expire);
    let privilege_expire = body
        .privilege_expire
        .map_or(expire, |secs| settings.resolve_expire_secs(Some(secs)));

    log::info!(
        "[{}] RTC token for channel {:?} uid {:?} role {:?} expire {}",
        request_id,
        body.channel,
        body.uid.as_account(),
        role,
        expire
    );

    let result = match body.uid.as_uid() {
        Some(uid) => build_rtc_token_with_uid(
            &body.app_id,
            &body.certificate,
            &body.channel,
            uid,
            role,
            expire,
            privilege_expire,
        ),
        None => build_rtc_token_with_account(
            &body.app_id,
            &body.certificate,
            &body.channel,
            &body.uid.as_account(),
            role,
            expire,
            privilege_expire,
        ),
    };

    token_response(&request_id, "RTC", "rtcToken", result)
}

/// Mints an RTM login token. Answers `{"rtmToken": ...}`.
///
/// # Errors
///
/// Returns a bad-request error if the body is not a valid RTM request.
pub fn handle_rtm_token(
    settings: &Settings,
    mut req: Request,
) -> Result<Response, Report<TokenServerError>> {
    let request_id = get_or_generate_request_id(&req);
    let body: RtmTokenRequest = parse_body(&mut req)?;
    let expire = settings.resolve_expire_secs(body.expire);
    let user_id = body.uid.as_account();

    log::info!(
        "[{}] RTM token for user {:?} channel {:?} expire {}",
        request_id,
        user_id,
        body.channel.as_deref().unwrap_or_default(),
        expire
    );

    let result = build_rtm_token(&body.app_id, &body.certificate, &user_id, expire);
    token_response(&request_id, "RTM", "rtmToken", result)
}

/// Mints a Chat token. Without a uid the token is an app token.
///
/// # Errors
///
/// Returns a bad-request error if the body is not a valid Chat request.
pub fn handle_chat_token(
    settings: &Settings,
    mut req: Request,
) -> Result<Response, Report<TokenServerError>> {
    let request_id = get_or_generate_request_id(&req);
    let body: ChatTokenRequest = parse_body(&mut req)?;
    let expire = settings.resolve_expire_secs(body.expire);

    let user_id = body
        .uid
        .as_ref()
        .map(UserId::as_account)
        .filter(|user_id| !user_id.is_empty());

    let result = match user_id {
        Some(user_id) => {
            log::info!(
                "[{}] Chat user token for {:?} expire {}",
                request_id,
                user_id,
                expire
            );
            build_chat_user_token(&body.app_id, &body.certificate, &user_id, expire)
        }
        None => {
            log::info!("[{}] Chat app token expire {}", request_id, expire);
            build_chat_app_token(&body.app_id, &body.certificate, expire)
        }
    };

    token_response(&request_id, "Chat", "chatToken", result)
}

/// Mints a whiteboard SDK token. Answers `{"sdkToken": ...}`.
///
/// # Errors
///
/// Returns a bad-request error if the body is not a valid whiteboard request.
pub fn handle_whiteboard_sdk_token(
    settings: &Settings,
    mut req: Request,
) -> Result<Response, Report<TokenServerError>> {
    let request_id = get_or_generate_request_id(&req);
    let body: WhiteboardTokenRequest = parse_body(&mut req)?;
    let lifespan_ms = settings.resolve_lifespan_ms(body.expire);

    log::info!(
        "[{}] Whiteboard SDK token role {:?} lifespan {}ms",
        request_id,
        body.role,
        lifespan_ms
    );

    let result = WhiteboardRole::from_str(&body.role).and_then(|role| {
        sdk_token(&body.access_key, &body.secret_key, lifespan_ms, role)
    });
    token_response(&request_id, "SDK", "sdkToken", result)
}

/// Mints a whiteboard room token. Answers `{"roomToken": ...}`.
///
/// # Errors
///
/// Returns a bad-request error if the body is not a valid whiteboard request.
pub fn handle_whiteboard_room_token(
    settings: &Settings,
    mut req: Request,
) -> Result<Response, Report<TokenServerError>> {
    let request_id = get_or_generate_request_id(&req);
    let body: WhiteboardTokenRequest = parse_body(&mut req)?;
    let lifespan_ms = settings.resolve_lifespan_ms(body.expire);
    let room_uuid = body.room_uuid.as_deref().unwrap_or_default();

    log::info!(
        "[{}] Whiteboard room token for {:?} role {:?} lifespan {}ms",
        request_id,
        room_uuid,
        body.role,
        lifespan_ms
    );

    let result = WhiteboardRole::from_str(&body.role).and_then(|role| {
        room_token(
            &body.access_key,
            &body.secret_key,
            lifespan_ms,
            role,
            room_uuid,
        )
    });
    token_response(&request_id, "room", "roomToken", result)
}

/// Mints a whiteboard task token. Answers `{"taskToken": ...}`.
///
/// # Errors
///
/// Returns a bad-request error if the body is not a valid whiteboard request.
pub fn handle_whiteboard_task_token(
    settings: &Settings,
    mut req: Request,
) -> Result<Response, Report<TokenServerError>> {
    let request_id = get_or_generate_request_id(&req);
    let body: WhiteboardTokenRequest = parse_body(&mut req)?;
    let lifespan_ms = settings.resolve_lifespan_ms(body.expire);
    let task_uuid = body.task_uuid.as_deref().unwrap_or_default();

    log::info!(
        "[{}] Whiteboard task token for {:?} role {:?} lifespan {}ms",
        request_id,
        task_uuid,
        body.role,
        lifespan_ms
    );

    let result = WhiteboardRole::from_str(&body.role).and_then(|role| {
        task_token(
            &body.access_key,
            &body.secret_key,
            lifespan_ms,
            role,
            task_uuid,
        )
    });
    token_response(&request_id, "task", "taskToken", result)
}

/// Path as the router sees it: trailing slashes removed, root kept as `/`.
#[must_use]
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Liveness probe.
#[must_use]
pub fn handle_health() -> Response {
    json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
}

fn parse_body<T: DeserializeOwned>(req: &mut Request) -> Result<T, Report<TokenServerError>> {
    let body = req.take_body_str();
    serde_json::from_str(&body).change_context(TokenServerError::BadRequest {
        message: "Invalid JSON request body".to_string(),
    })
}

fn token_response(
    request_id: &str,
    flavor: &'static str,
    key: &str,
    result: Result<String, TokenError>,
) -> Result<Response, Report<TokenServerError>> {
    match result {
        Ok(token) => {
            let mut body = serde_json::Map::new();
            body.insert(key.to_string(), serde_json::Value::String(token));
            Ok(json_response(StatusCode::OK, &body))
        }
        Err(source) => {
            let error = TokenServerError::TokenGeneration { flavor, source };
            log::warn!("[{}] {}", request_id, error);
            Ok(json_response(
                StatusCode::BAD_REQUEST,
                &TokenErrorBody {
                    status: StatusCode::BAD_REQUEST.as_u16(),
                    error: error.to_string(),
                },
            ))
        }
    }
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_string(body) {
        Ok(json) => Response::from_status(status)
            .with_content_type(fastly::mime::APPLICATION_JSON)
            .with_body(json),
        Err(e) => {
            log::error!("Failed to serialize response body: {}", e);
            Response::from_status(StatusCode::INTERNAL_SERVER_ERROR)
                .with_body_text_plain("Internal server error")
        }
    }
}
