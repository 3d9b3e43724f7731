use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::app::engagement::{CommentOutcome, CommentPage, EngagementService, VoteOutcome};
use crate::app::reports::{FeedQuery, ReportService, ReportStats, ReportSubmission, SubmitOutcome};
use crate::app::validation::convert_birth_date_to_iso;
use crate::app::verification::Verification;
use crate::config::categories::{Category, CategorySettings, SelectOption};
use crate::domain::engagement::CommentDisplay;
use crate::domain::report::ReportStatus;
use crate::http::views::{self, FeedPage, MapReport, ReportDetailPage};
use crate::http::{AppError, ValidationFailure};
use crate::infra::store::{CommentSort, ReportFilter, ReportSort};
use crate::AppState;

const DETAIL_COMMENT_LIMIT: i64 = 10;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.store.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

fn report_service(state: &AppState) -> ReportService {
    ReportService::new(
        state.store.clone(),
        state.catalog.clone(),
        state.verifier.clone(),
        state.notifier.clone(),
    )
}

fn engagement_service(state: &AppState) -> EngagementService {
    EngagementService::new(
        state.store.clone(),
        state.verifier.clone(),
        state.notifier.clone(),
    )
}

#[derive(Serialize)]
pub struct CategoriesResponse<'a> {
    pub categories: &'a [Category],
    pub options: Vec<SelectOption>,
    pub settings: &'a CategorySettings,
}

pub async fn list_categories(State(state): State<AppState>) -> Response {
    let catalog = &state.catalog;
    Json(CategoriesResponse {
        categories: catalog.categories(),
        options: catalog.category_options(),
        settings: catalog.settings(),
    })
    .into_response()
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Category>, AppError> {
    let category = state.catalog.category(&id)?;
    Ok(Json(category.clone()))
}

pub async fn list_subcategories(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SelectOption>>, AppError> {
    Ok(Json(state.catalog.subcategory_options(&id)?))
}

pub async fn category_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let catalog = &state.catalog;
    let category = catalog.category(&id)?;
    Ok(Json(views::form_page(catalog, category)).into_response())
}

#[derive(Deserialize)]
pub struct LocationCheckRequest {
    #[serde(default)]
    pub has_location: bool,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Serialize)]
pub struct LocationCheckResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub show_on_public_map: bool,
}

pub async fn check_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<LocationCheckRequest>,
) -> Result<Json<LocationCheckResponse>, AppError> {
    let catalog = &state.catalog;
    catalog.category(&id)?;

    let result = catalog.validate_location_data(
        &id,
        payload.has_location,
        payload.latitude,
        payload.longitude,
    );
    Ok(Json(LocationCheckResponse {
        valid: result.is_ok(),
        error: result.err().map(|err| err.to_string()),
        show_on_public_map: catalog.should_show_on_public_map(&id, payload.has_location),
    }))
}

#[derive(Serialize)]
pub struct CreatedReport {
    pub id: i64,
}

pub async fn create_report(
    State(state): State<AppState>,
    Json(submission): Json<ReportSubmission>,
) -> Result<Response, AppError> {
    let echo = form_echo(&submission);
    let outcome = report_service(&state)
        .submit(submission)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to create report");
            AppError::internal("failed to create report")
        })?;

    match outcome {
        SubmitOutcome::Created { id } => {
            Ok((StatusCode::CREATED, Json(CreatedReport { id })).into_response())
        }
        SubmitOutcome::Invalid { errors } => {
            Ok(ValidationFailure { errors, form: echo }.into_response())
        }
        SubmitOutcome::NotFound(err) => Err(err.into()),
    }
}

/// Submitted fields without the CPF.
fn form_echo(submission: &ReportSubmission) -> serde_json::Value {
    let mut echo = serde_json::to_value(submission).unwrap_or_default();
    if let Some(fields) = echo.as_object_mut() {
        fields.remove("cpf");
    }
    echo
}

#[derive(Deserialize, Default)]
pub struct ReportListQuery {
    pub category: Option<String>,
    pub status: Option<String>,
    pub city: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
}

impl ReportListQuery {
    fn filter(&self) -> ReportFilter {
        ReportFilter {
            category: non_empty(self.category.as_deref()),
            status: self.status.as_deref().and_then(ReportStatus::from_db),
            city: non_empty(self.city.as_deref()),
        }
    }

    fn sort(&self) -> ReportSort {
        self.sort
            .as_deref()
            .map(ReportSort::parse)
            .unwrap_or_default()
    }

    fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|page| page.trim().parse::<i64>().ok())
            .filter(|page| *page >= 1)
            .unwrap_or(1)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<FeedPage>, AppError> {
    let filter = query.filter();
    let sort = query.sort();
    let feed = report_service(&state)
        .feed(
            FeedQuery {
                filter: filter.clone(),
                sort,
                page: query.page(),
            },
            state.reports_per_page,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list reports");
            AppError::internal("failed to list reports")
        })?;

    Ok(Json(views::feed_page(&state.catalog, &feed, filter, sort)))
}

pub async fn map_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<Vec<MapReport>>, AppError> {
    let reports = report_service(&state)
        .map(&query.filter())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to load map reports");
            AppError::internal("failed to load map reports")
        })?;

    Ok(Json(
        reports
            .iter()
            .map(|report| views::map_report(&state.catalog, report))
            .collect(),
    ))
}

#[derive(Serialize)]
pub struct CitiesResponse {
    pub cities: Vec<String>,
}

pub async fn list_cities(State(state): State<AppState>) -> Result<Json<CitiesResponse>, AppError> {
    let cities = report_service(&state).cities().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list cities");
        AppError::internal("failed to list cities")
    })?;

    Ok(Json(CitiesResponse { cities }))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReportDetailPage>, AppError> {
    let report = report_service(&state)
        .get(id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id = id, "failed to load report");
            AppError::internal("failed to load report")
        })?
        .ok_or_else(|| AppError::not_found("report not found"))?;

    let comments = engagement_service(&state)
        .list_comments(id, CommentSort::Recent, Some(DETAIL_COMMENT_LIMIT), Some(0))
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id = id, "failed to load comments");
            AppError::internal("failed to load comments")
        })?
        .map(|page| page.comments)
        .unwrap_or_default();

    Ok(Json(views::report_detail(&state.catalog, &report, comments)))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<ReportStats>, AppError> {
    let stats = report_service(&state).stats().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to load statistics");
        AppError::internal("failed to load statistics")
    })?;

    Ok(Json(stats))
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub report_id: i64,
    #[serde(default)]
    pub cpf: String,
    #[serde(default)]
    pub birth_date: String,
}

#[derive(Serialize)]
pub struct VoteResponse {
    pub status: &'static str,
    pub vote_count: i64,
}

pub async fn vote(
    State(state): State<AppState>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let outcome = engagement_service(&state)
        .vote(payload.report_id, &payload.cpf, &payload.birth_date)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id = payload.report_id, "failed to register vote");
            AppError::internal("failed to register vote")
        })?;

    match outcome {
        VoteOutcome::Registered { vote_count } => Ok(Json(VoteResponse {
            status: "success",
            vote_count,
        })),
        VoteOutcome::AlreadyVoted { vote_count } => Ok(Json(VoteResponse {
            status: "already_voted",
            vote_count,
        })),
        VoteOutcome::IdentityRejected(message) => Err(AppError::bad_request(message)),
        VoteOutcome::ReportNotFound => Err(AppError::not_found("report not found")),
    }
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub report_id: i64,
    #[serde(default)]
    pub cpf: String,
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub content: String,
}

pub async fn create_comment(
    State(state): State<AppState>,
    Json(payload): Json<CommentRequest>,
) -> Result<(StatusCode, Json<CommentDisplay>), AppError> {
    let outcome = engagement_service(&state)
        .comment(
            payload.report_id,
            &payload.cpf,
            &payload.birth_date,
            &payload.content,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id = payload.report_id, "failed to create comment");
            AppError::internal("failed to create comment")
        })?;

    match outcome {
        CommentOutcome::Created(comment) => {
            Ok((StatusCode::CREATED, Json(CommentDisplay::from(&comment))))
        }
        CommentOutcome::Invalid(message) | CommentOutcome::IdentityRejected(message) => {
            Err(AppError::bad_request(message))
        }
        CommentOutcome::ReportNotFound => Err(AppError::not_found("report not found")),
    }
}

#[derive(Deserialize, Default)]
pub struct CommentListQuery {
    pub report_id: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub sort: Option<String>,
}

impl CommentListQuery {
    fn report_id(&self) -> Result<i64, AppError> {
        let raw = non_empty(self.report_id.as_deref())
            .ok_or_else(|| AppError::bad_request("report_id is required"))?;
        raw.parse::<i64>()
            .map_err(|_| AppError::bad_request("report_id must be an integer"))
    }

    fn sort(&self) -> CommentSort {
        self.sort
            .as_deref()
            .map(CommentSort::parse)
            .unwrap_or_default()
    }
}

/// Unparsable paging values fall back to the service defaults.
fn lenient_number(value: Option<&str>) -> Option<i64> {
    value.and_then(|value| value.trim().parse::<i64>().ok())
}

pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentListQuery>,
) -> Result<Json<CommentPage>, AppError> {
    let report_id = query.report_id()?;

    engagement_service(&state)
        .list_comments(
            report_id,
            query.sort(),
            lenient_number(query.limit.as_deref()),
            lenient_number(query.offset.as_deref()),
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id, "failed to list comments");
            AppError::internal("failed to list comments")
        })?
        .map(Json)
        .ok_or_else(|| AppError::not_found("report not found"))
}

#[derive(Deserialize)]
pub struct VerifyCpfRequest {
    #[serde(default)]
    pub cpf: String,
    #[serde(default)]
    pub birth_date: String,
}

pub async fn verify_cpf(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCpfRequest>,
) -> Result<Json<Verification>, AppError> {
    if payload.cpf.trim().is_empty() || payload.birth_date.trim().is_empty() {
        return Err(AppError::bad_request("CPF and birth date are required"));
    }

    let birth_date = convert_birth_date_to_iso(payload.birth_date.trim())
        .map_err(|err| AppError::bad_request(format!("Data de nascimento: {}", err)))?;

    let verification = state
        .verifier
        .verify(&payload.cpf, &birth_date)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to verify CPF");
            AppError::internal("failed to verify CPF")
        })?;

    Ok(Json(verification))
}
