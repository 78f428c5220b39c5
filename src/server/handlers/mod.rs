//! HTTP handlers for the server.

pub mod cards;
pub mod drop;
pub mod elements;
pub mod records;
pub mod rules;
pub mod template;

use axum::http::StatusCode;

use crate::error::CardpressError;

/// Error half of every handler result.
pub type ApiError = (StatusCode, String);

/// Map a crate error to a status code and message.
///
/// Bad input is a 400, unknown ids and indices a 404, anything else a 500.
pub fn api_error(e: CardpressError) -> ApiError {
    let status = match &e {
        CardpressError::NotFound(_) => StatusCode::NOT_FOUND,
        CardpressError::Image(_) => StatusCode::BAD_REQUEST,
        e if e.is_malformed_input() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}
