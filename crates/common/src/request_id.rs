use fastly::{Request, Response};
use uuid::Uuid;

use crate::constants::HEADER_X_REQUEST_ID;

/// Fresh request id, a UUID v4.
#[must_use]
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Request id supplied by the client, or a fresh one.
#[must_use]
pub fn get_or_generate_request_id(req: &Request) -> String {
    req.get_header(HEADER_X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map_or_else(generate_request_id, str::to_string)
}

/// Makes sure the request carries an id so every handler logs the same one.
pub fn ensure_request_id(req: &mut Request) -> String {
    let request_id = get_or_generate_request_id(req);
    req.set_header(HEADER_X_REQUEST_ID, &request_id);
    request_id
}

pub fn add_request_id_to_response(response: &mut Response, request_id: &str) {
    response.set_header(HEADER_X_REQUEST_ID, request_id);
}
