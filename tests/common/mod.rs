#![allow(dead_code)]

use anyhow::{anyhow, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;
use tower::ServiceExt;
use url::Url;

use olhourbano::app::notifications::Notifier;
use olhourbano::app::verification::{IdentityVerifier, Verification};
use olhourbano::config::categories::CategoryCatalog;
use olhourbano::domain::engagement::{Comment, CommentDisplay};
use olhourbano::domain::report::{NewReport, Report, ReportStatus};
use olhourbano::infra::mailer::EmailMessage;
use olhourbano::infra::queue::MailQueue;
use olhourbano::infra::store::{
    CommentSort, ReportCounts, ReportFilter, ReportSort, ReportStore, StoredLocation, VoteWrite,
};
use olhourbano::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const CATALOG_PATH: &str = "config/categories.toml";
pub const VALID_CPF: &str = "529.982.247-25";
pub const OTHER_VALID_CPF: &str = "111.444.777-35";
pub const THIRD_VALID_CPF: &str = "123.456.789-09";
pub const BIRTH_DATE: &str = "15/03/1990";
pub const BIRTH_DATE_ISO: &str = "1990-03-15";
pub const REPORTER_EMAIL: &str = "cidada@example.com";
pub const BASE_URL: &str = "https://olhourbano.com.br";
pub const PER_PAGE: i64 = 9;

pub fn catalog() -> Arc<CategoryCatalog> {
    Arc::new(CategoryCatalog::load(CATALOG_PATH).expect("default catalog must load"))
}

// ---------------------------------------------------------------------------
// In-memory persistence gateway
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    reports: Vec<Report>,
    votes: HashSet<(i64, String)>,
    comments: Vec<Comment>,
    next_report_id: i64,
    next_comment_id: i64,
}

/// Same uniqueness and recompute semantics as the Postgres gateway.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    pub fail_pings: bool,
}

fn matches_filter(report: &Report, filter: &ReportFilter) -> bool {
    if let Some(category) = &filter.category {
        if &report.problem_type != category {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if report.status != status {
            return false;
        }
    }
    if let Some(city) = &filter.city {
        if !report.city.to_lowercase().contains(&city.to_lowercase()) {
            return false;
        }
    }
    true
}

fn sort_reports(reports: &mut [Report], sort: ReportSort) {
    match sort {
        ReportSort::Recent => {
            reports.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
        }
        ReportSort::Oldest => {
            reports.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)))
        }
        ReportSort::Votes => reports.sort_by(|a, b| {
            (b.vote_count, b.created_at, b.id).cmp(&(a.vote_count, a.created_at, a.id))
        }),
    }
}

impl InMemoryStore {
    pub fn unavailable() -> Self {
        Self {
            fail_pings: true,
            ..Self::default()
        }
    }

    pub fn set_status(&self, report_id: i64, status: ReportStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(report) = state.reports.iter_mut().find(|r| r.id == report_id) {
            report.status = status;
        }
    }

    pub fn set_created_at(&self, report_id: i64, created_at: OffsetDateTime) {
        let mut state = self.state.lock().unwrap();
        if let Some(report) = state.reports.iter_mut().find(|r| r.id == report_id) {
            report.created_at = created_at;
        }
    }

    /// Overwrites the cached counter without touching vote rows.
    pub fn corrupt_vote_count(&self, report_id: i64, vote_count: i64) {
        let mut state = self.state.lock().unwrap();
        if let Some(report) = state.reports.iter_mut().find(|r| r.id == report_id) {
            report.vote_count = vote_count;
        }
    }

    pub fn vote_rows(&self, report_id: i64) -> usize {
        let state = self.state.lock().unwrap();
        state.votes.iter().filter(|(id, _)| *id == report_id).count()
    }

    pub fn report(&self, report_id: i64) -> Option<Report> {
        let state = self.state.lock().unwrap();
        state.reports.iter().find(|r| r.id == report_id).cloned()
    }

    pub fn report_count(&self) -> usize {
        self.state.lock().unwrap().reports.len()
    }
}

#[axum::async_trait]
impl ReportStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        if self.fail_pings {
            return Err(anyhow!("store unavailable"));
        }
        Ok(())
    }

    async fn insert_report(&self, report: NewReport) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        state.next_report_id += 1;
        let id = state.next_report_id;
        let created_at = OffsetDateTime::now_utc() + Duration::milliseconds(id);
        state.reports.push(report.into_report(id, created_at));
        Ok(id)
    }

    async fn find_report(&self, id: i64) -> Result<Option<Report>> {
        Ok(self.report(id))
    }

    async fn list_reports(
        &self,
        filter: &ReportFilter,
        sort: ReportSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Report>> {
        let state = self.state.lock().unwrap();
        let mut reports: Vec<Report> = state
            .reports
            .iter()
            .filter(|report| matches_filter(report, filter))
            .cloned()
            .collect();
        sort_reports(&mut reports, sort);
        Ok(reports
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_reports(&self, filter: &ReportFilter) -> Result<i64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .reports
            .iter()
            .filter(|report| matches_filter(report, filter))
            .count() as i64)
    }

    async fn map_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        let state = self.state.lock().unwrap();
        let mut reports: Vec<Report> = state
            .reports
            .iter()
            .filter(|report| report.latitude != 0.0 && report.longitude != 0.0)
            .filter(|report| matches_filter(report, filter))
            .cloned()
            .collect();
        sort_reports(&mut reports, ReportSort::Recent);
        Ok(reports)
    }

    async fn report_counts(&self) -> Result<ReportCounts> {
        let state = self.state.lock().unwrap();
        let today = OffsetDateTime::now_utc().date();
        let this_month = state
            .reports
            .iter()
            .filter(|report| {
                let date = report.created_at.date();
                date.year() == today.year() && date.month() == today.month()
            })
            .count() as i64;
        Ok(ReportCounts {
            total: state.reports.len() as i64,
            this_month,
            resolved: state
                .reports
                .iter()
                .filter(|report| report.status == ReportStatus::Approved)
                .count() as i64,
        })
    }

    async fn has_voted(&self, report_id: i64, hashed_cpf: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.votes.contains(&(report_id, hashed_cpf.to_string())))
    }

    async fn insert_vote(&self, report_id: i64, hashed_cpf: &str) -> Result<VoteWrite> {
        let mut state = self.state.lock().unwrap();
        if state.votes.insert((report_id, hashed_cpf.to_string())) {
            Ok(VoteWrite::Inserted)
        } else {
            Ok(VoteWrite::AlreadyExists)
        }
    }

    async fn recompute_vote_count(&self, report_id: i64) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let count = state.votes.iter().filter(|(id, _)| *id == report_id).count() as i64;
        let report = state
            .reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .ok_or_else(|| anyhow!("report {} not found", report_id))?;
        report.vote_count = count;
        Ok(count)
    }

    async fn insert_comment(
        &self,
        report_id: i64,
        hashed_cpf: &str,
        content: &str,
    ) -> Result<Comment> {
        let mut state = self.state.lock().unwrap();
        state.next_comment_id += 1;
        let id = state.next_comment_id;
        let comment = Comment {
            id,
            report_id,
            hashed_cpf: hashed_cpf.to_string(),
            content: content.to_string(),
            created_at: OffsetDateTime::now_utc() + Duration::milliseconds(id),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }

    async fn recompute_comment_count(&self, report_id: i64) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let count = state
            .comments
            .iter()
            .filter(|c| c.report_id == report_id)
            .count() as i64;
        let report = state
            .reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .ok_or_else(|| anyhow!("report {} not found", report_id))?;
        report.comment_count = count;
        Ok(count)
    }

    async fn list_comments(
        &self,
        report_id: i64,
        sort: CommentSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CommentDisplay>> {
        let state = self.state.lock().unwrap();
        let mut comments: Vec<&Comment> = state
            .comments
            .iter()
            .filter(|c| c.report_id == report_id)
            .collect();
        match sort {
            CommentSort::Recent => {
                comments.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
            }
            CommentSort::Oldest => {
                comments.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)))
            }
        }
        Ok(comments
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(CommentDisplay::from)
            .collect())
    }

    async fn count_comments(&self, report_id: i64) -> Result<i64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .comments
            .iter()
            .filter(|c| c.report_id == report_id)
            .count() as i64)
    }

    async fn distinct_cities(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut cities: Vec<String> = state
            .reports
            .iter()
            .map(|r| r.city.clone())
            .filter(|city| !city.is_empty())
            .collect();
        cities.sort();
        cities.dedup();
        Ok(cities)
    }

    async fn stored_locations(&self) -> Result<Vec<StoredLocation>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .reports
            .iter()
            .map(|r| StoredLocation {
                report_id: r.id,
                location: r.location.clone(),
                city: r.city.clone(),
            })
            .collect())
    }

    async fn update_city(&self, report_id: i64, city: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let report = state
            .reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .ok_or_else(|| anyhow!("report {} not found", report_id))?;
        report.city = city.to_string();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stub identity verifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierMode {
    Valid,
    Invalid,
    Unavailable,
}

pub struct StubVerifier {
    mode: VerifierMode,
    calls: AtomicUsize,
}

impl StubVerifier {
    pub fn new(mode: VerifierMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[axum::async_trait]
impl IdentityVerifier for StubVerifier {
    async fn verify(&self, _cpf: &str, _birth_date_iso: &str) -> Result<Verification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            VerifierMode::Valid => Ok(Verification {
                success: true,
                valid: true,
                message: "Status: Regular - REGULAR".to_string(),
            }),
            VerifierMode::Invalid => Ok(Verification {
                success: false,
                valid: false,
                message: "CPF verification failed".to_string(),
            }),
            VerifierMode::Unavailable => Err(anyhow!("verification service unreachable")),
        }
    }
}

// ---------------------------------------------------------------------------
// TestApp: one fresh in-memory instance per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub verifier: Arc<StubVerifier>,
    mail: Mutex<mpsc::Receiver<EmailMessage>>,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    pub fn errors(&self) -> Vec<String> {
        self.json()["errors"]
            .as_array()
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(InMemoryStore::default(), VerifierMode::Valid, 32)
    }

    pub fn with_verifier(mode: VerifierMode) -> Self {
        Self::build(InMemoryStore::default(), mode, 32)
    }

    pub fn with_store(store: InMemoryStore) -> Self {
        Self::build(store, VerifierMode::Valid, 32)
    }

    pub fn with_mail_capacity(capacity: usize) -> Self {
        Self::build(InMemoryStore::default(), VerifierMode::Valid, capacity)
    }

    fn build(store: InMemoryStore, mode: VerifierMode, mail_capacity: usize) -> Self {
        let store = Arc::new(store);
        let verifier = Arc::new(StubVerifier::new(mode));
        let (queue, receiver) = MailQueue::bounded(mail_capacity);

        let state = AppState {
            store: store.clone(),
            catalog: catalog(),
            verifier: verifier.clone(),
            notifier: Notifier::new(queue, Url::parse(BASE_URL).unwrap()),
            reports_per_page: PER_PAGE,
        };
        let router = olhourbano::http::router(state.clone());

        TestApp {
            router,
            state,
            store,
            verifier,
            mail: Mutex::new(receiver),
        }
    }

    /// Drains everything queued for delivery so far.
    pub fn sent_mail(&self) -> Vec<EmailMessage> {
        let mut receiver = self.mail.lock().unwrap();
        let mut messages = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            messages.push(message);
        }
        messages
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::POST, path, Some(body)).await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// Submits a valid report through the API and returns its id.
    pub async fn create_report(&self, overrides: Value) -> i64 {
        let resp = self
            .post_json("/api/reports", submission(overrides))
            .await;
        assert_eq!(
            resp.status,
            StatusCode::CREATED,
            "report creation failed: {:?}",
            resp.json()
        );
        resp.json()["id"].as_i64().expect("id in response")
    }
}

/// A submission that passes every check, with `overrides` merged on top.
pub fn submission(overrides: Value) -> Value {
    let mut body = json!({
        "category": "iluminacao_publica",
        "cpf": VALID_CPF,
        "birth_date": BIRTH_DATE,
        "email": REPORTER_EMAIL,
        "email_confirmation": REPORTER_EMAIL,
        "location": "Rua das Flores, 123, Centro, Campinas - SP, Brasil",
        "description": "Poste apagado há mais de uma semana na esquina.",
        "latitude": -22.9056,
        "longitude": -47.0608,
        "files": [
            { "path": "uploads/poste.jpg", "content_type": "image/jpeg" }
        ]
    });
    if let (Some(base), Some(extra)) = (body.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    body
}

/// A stored-report fixture for inserting straight into the gateway.
pub fn new_report(category: &str, location: &str, latitude: f64, longitude: f64) -> NewReport {
    NewReport {
        problem_type: category.to_string(),
        hashed_cpf: olhourbano::domain::identity::hash(VALID_CPF),
        birth_date: BIRTH_DATE_ISO.to_string(),
        email: REPORTER_EMAIL.to_string(),
        location: location.to_string(),
        city: olhourbano::domain::city::extract_city(location),
        latitude,
        longitude,
        description: "Relato inserido diretamente para teste.".to_string(),
        photo_path: "uploads/a.jpg, uploads/b.jpg".to_string(),
        transport_type: None,
        transport_data: None,
    }
}
