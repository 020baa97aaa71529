use error_stack::Report;
use fastly::http::header;
use fastly::Response;

use token_server_common::error::{IntoHttpResponse, TokenServerError};

/// Renders a report as a plain-text response with the status its error maps to.
pub fn to_error_response(report: &Report<TokenServerError>) -> Response {
    let error = report.current_context();
    let status = error.status_code();

    if status.is_server_error() {
        log::error!("{:?}", report);
    } else {
        log::warn!("{}", error);
    }

    Response::from_status(status)
        .with_header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .with_body(error.user_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastly::http::StatusCode;

    #[test]
    fn bad_request_shows_its_message() {
        let report = Report::new(TokenServerError::BadRequest {
            message: "Invalid JSON request body".to_string(),
        });

        let mut resp = to_error_response(&report);
        assert_eq!(resp.get_status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.take_body_str(), "Bad request: Invalid JSON request body");
    }

    #[test]
    fn configuration_error_hides_details() {
        let report = Report::new(TokenServerError::Configuration {
            message: "secret path".to_string(),
        });

        let mut resp = to_error_response(&report);
        assert_eq!(resp.get_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.take_body_str(), "Internal server error");
    }
}
