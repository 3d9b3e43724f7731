use axum::{routing::get, routing::post, Router};

use crate::AppState;
use crate::http::handlers;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn categories() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(handlers::list_categories))
        .route("/api/categories/:id", get(handlers::get_category))
        .route(
            "/api/categories/:id/subcategories",
            get(handlers::list_subcategories),
        )
        .route("/api/categories/:id/form", get(handlers::category_form))
        .route(
            "/api/categories/:id/location",
            post(handlers::check_location),
        )
}

pub fn reports() -> Router<AppState> {
    Router::new()
        .route(
            "/api/reports",
            get(handlers::list_reports).post(handlers::create_report),
        )
        .route("/api/reports/map", get(handlers::map_reports))
        .route("/api/reports/cities", get(handlers::list_cities))
        .route("/api/reports/:id", get(handlers::get_report))
        .route("/api/stats", get(handlers::stats))
}

pub fn engagement() -> Router<AppState> {
    Router::new()
        .route("/api/vote", post(handlers::vote))
        .route(
            "/api/comments",
            get(handlers::list_comments).post(handlers::create_comment),
        )
}

pub fn verification() -> Router<AppState> {
    Router::new().route("/api/verify-cpf", post(handlers::verify_cpf))
}
