use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::config::categories::CatalogError;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

/// Unknown ids are 404; a missing mandatory subcategory is a bad request.
impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        if err.is_not_found() {
            Self::not_found(err.to_string())
        } else {
            Self::bad_request(err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Submission rejected by validation; echoes the input so the form can be re-rendered.
#[derive(Debug, Serialize)]
pub struct ValidationFailure<T: Serialize> {
    pub errors: Vec<String>,
    pub form: T,
}

impl<T: Serialize> IntoResponse for ValidationFailure<T> {
    fn into_response(self) -> Response {
        (StatusCode::UNPROCESSABLE_ENTITY, Json(self)).into_response()
    }
}
