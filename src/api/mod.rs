//! REST API module.
//!
//! Handlers extract parameters, delegate to a store and return its result as JSON.
//! Every failure becomes an [`AppError`] response with a matching status code.

mod projects;
mod threads;
mod users;

pub use projects::*;
pub use threads::*;
pub use users::*;

use axum::{extract::FromRequest, Json};

use crate::errors::AppError;

/// Response type shared by all handlers.
pub type ApiResult<T> = Result<Json<T>, AppError>;

/// JSON request body whose rejections render as [`AppError::BadRequest`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Reject blank required text fields.
fn require_text(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
