//! HTTP response building helpers
//!
//! Validation errors are rendered field-keyed, `{"target_ct": ["..."]}`, so
//! clients can attach messages to form fields. Every other error is
//! `{"error": "..."}`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::BinderError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// Build an empty response with 204 No Content status
pub fn no_content() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn error_body(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    error_body(StatusCode::NOT_FOUND, message)
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Field-level 400 Bad Request
pub fn validation_error(field: &str, message: &str) -> Response<Full<Bytes>> {
    let mut body = serde_json::Map::new();
    body.insert(field.to_string(), serde_json::json!([message]));
    json_response(StatusCode::BAD_REQUEST, &body)
}

/// Convert a BinderError to an appropriate HTTP response
pub fn error_response(error: BinderError) -> Response<Full<Bytes>> {
    match &error {
        BinderError::Validation { field, message } => validation_error(field, message),
        BinderError::TypeNotFound(type_id) => validation_error(
            "target_ct",
            &format!("Content type with model={} does not exist.", type_id),
        ),
        BinderError::Json(e) => error_body(StatusCode::BAD_REQUEST, &format!("JSON parse error - {}", e)),
        BinderError::Conflict(msg) => error_body(StatusCode::CONFLICT, msg),
        BinderError::DuplicateBind { .. } => error_body(StatusCode::CONFLICT, &error.to_string()),
        BinderError::NotFound(msg) => not_found(msg),
        BinderError::Unauthorized(msg) => error_body(StatusCode::UNAUTHORIZED, msg),
        _ => {
            error!(error = %error, "Request failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}
