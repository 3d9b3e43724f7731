use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

mod error;
mod handlers;
mod routes;
pub mod views;

pub use error::{AppError, ValidationFailure};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::categories())
        .merge(routes::reports())
        .merge(routes::engagement())
        .merge(routes::verification())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES)),
        )
        .with_state(state)
}
