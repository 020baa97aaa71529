use http::header::HeaderName;

pub const HEADER_X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub const NOT_FOUND_MESSAGE: &str = "Not Found";
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method Not Allowed";
