use base64::{engine::general_purpose::STANDARD, Engine as _};
use fastly::http::{header, StatusCode};
use fastly::{Request, Response};
use sha2::{Digest, Sha256};

use crate::endpoints::normalize_path;
use crate::settings::{Handler, Settings};

const BASIC_AUTH_REALM: &str = r#"Basic realm="Token Server""#;

/// Checks basic-auth credentials for routes covered by a configured handler.
///
/// The path is matched both as sent and as the router sees it, without
/// trailing slashes. Returns `None` when the request may proceed and a `401`
/// response otherwise.
pub fn enforce_basic_auth(settings: &Settings, req: &Request) -> Option<Response> {
    let path = req.get_path();
    let handler = settings
        .handler_for_path(normalize_path(path))
        .or_else(|| settings.handler_for_path(path))?;

    match extract_credentials(req) {
        Some((username, password)) if credentials_match(handler, &username, &password) => None,
        Some((username, _)) => {
            log::warn!(
                "Rejected credentials for user {:?} on {}",
                username,
                req.get_path()
            );
            Some(unauthorized_response())
        }
        None => Some(unauthorized_response()),
    }
}

// Digests keep the comparison independent of where the first mismatch is.
fn credentials_match(handler: &Handler, username: &str, password: &str) -> bool {
    let expected = Sha256::new()
        .chain_update(handler.username.as_bytes())
        .chain_update([0u8])
        .chain_update(handler.password.as_bytes())
        .finalize();
    let given = Sha256::new()
        .chain_update(username.as_bytes())
        .chain_update([0u8])
        .chain_update(password.as_bytes())
        .finalize();
    expected == given
}

fn extract_credentials(req: &Request) -> Option<(String, String)> {
    let value = req
        .get_header(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(token.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (username, password) = credentials.split_once(':')?;

    Some((username.to_string(), password.to_string()))
}

fn unauthorized_response() -> Response {
    Response::from_status(StatusCode::UNAUTHORIZED)
        .with_header(header::WWW_AUTHENTICATE, BASIC_AUTH_REALM)
        .with_header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .with_body_text_plain("Unauthorized")
}
