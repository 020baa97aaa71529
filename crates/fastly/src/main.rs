use fastly::http::{header, Method, StatusCode};
use fastly::{Error, Request, Response};
use log_fastly::Logger;

use token_server_common::auth::enforce_basic_auth;
use token_server_common::constants::{METHOD_NOT_ALLOWED_MESSAGE, NOT_FOUND_MESSAGE};
use token_server_common::endpoints::{
    handle_chat_token, handle_health, handle_rtc_token, handle_rtm_token,
    handle_whiteboard_room_token, handle_whiteboard_sdk_token, handle_whiteboard_task_token,
    normalize_path,
};
use token_server_common::request_id::{add_request_id_to_response, ensure_request_id};
use token_server_common::settings::Settings;

mod error;
use crate::error::to_error_response;

#[fastly::main]
fn main(req: Request) -> Result<Response, Error> {
    let settings = Settings::new();
    match &settings {
        Ok(s) => init_logger(&s.logging.endpoint, s.log_level()),
        Err(_) => init_logger("tokenlog", log::LevelFilter::Info),
    }

    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to load settings: {:?}", e);
            return Ok(to_error_response(&e));
        }
    };

    Ok(route_request(&settings, req))
}

/// Routes incoming requests to the token handlers.
///
/// Paths match with or without a trailing slash. A known path called with
/// another method answers `405`, anything else `404`.
fn route_request(settings: &Settings, mut req: Request) -> Response {
    let request_id = ensure_request_id(&mut req);
    let method = req.get_method().clone();
    let path = normalize_path(req.get_path()).to_string();

    log::info!("[{}] {} {}", request_id, method, path);

    let mut response = if let Some(challenge) = enforce_basic_auth(settings, &req) {
        challenge
    } else {
        let result = match (&method, path.as_str()) {
            (&Method::POST, "/rtc") => handle_rtc_token(settings, req),
            (&Method::POST, "/rtm") => handle_rtm_token(settings, req),
            (&Method::POST, "/chat") => handle_chat_token(settings, req),
            (&Method::POST, "/whiteboard/sdk") => handle_whiteboard_sdk_token(settings, req),
            (&Method::POST, "/whiteboard/room") => handle_whiteboard_room_token(settings, req),
            (&Method::POST, "/whiteboard/task") => handle_whiteboard_task_token(settings, req),
            (&Method::GET, "/health") => Ok(handle_health()),
            (_, route) if is_known_route(route) => Ok(method_not_allowed(route)),
            _ => {
                log::info!("[{}] No route matched for path: {}", request_id, path);
                Ok(text_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE))
            }
        };

        // Convert any errors to HTTP error responses
        result.unwrap_or_else(|e| to_error_response(&e))
    };

    log::info!(
        "[{}] {} {} -> {}",
        request_id,
        method,
        path,
        response.get_status().as_u16()
    );
    add_request_id_to_response(&mut response, &request_id);
    response
}

fn is_known_route(path: &str) -> bool {
    matches!(
        path,
        "/rtc" | "/rtm" | "/chat" | "/whiteboard/sdk" | "/whiteboard/room" | "/whiteboard/task"
            | "/health"
    )
}

fn method_not_allowed(path: &str) -> Response {
    let allow = if path == "/health" { "GET" } else { "POST" };
    text_response(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_MESSAGE)
        .with_header(header::ALLOW, allow)
}

fn text_response(status: StatusCode, body: &str) -> Response {
    Response::from_status(status)
        .with_header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .with_body(body)
}

fn init_logger(endpoint: &str, level: log::LevelFilter) {
    let logger = match Logger::builder()
        .default_endpoint(endpoint)
        .max_level(level)
        .build()
    {
        Ok(logger) => logger,
        Err(_) => return,
    };

    // A second init in the same instance keeps the first logger.
    let _ = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(Box::new(logger) as Box<dyn log::Log>)
        .apply();
}
