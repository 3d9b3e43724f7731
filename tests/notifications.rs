//! Notification and Verification Tests
//!
//! Covers email templates, the mail queue and dispatcher, and the identity
//! verifiers including the CPFHub client against a local fake service.

mod common;

use anyhow::{anyhow, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use common::{new_report, InMemoryStore, StubVerifier, VerifierMode, BIRTH_DATE, BIRTH_DATE_ISO, VALID_CPF};
use olhourbano::app::notifications::{
    comment_preview, comment_template, confirmation_template, report_link, should_notify_owner,
};
use olhourbano::app::verification::{
    check_identity, CpfHubVerifier, FallbackVerifier, IdentityCheck, IdentityVerifier,
    LocalVerifier, Verification, IDENTITY_MISMATCH_MESSAGE,
};
use olhourbano::domain::identity;
use olhourbano::infra::mailer::{EmailMessage, Mailer};
use olhourbano::infra::queue::MailQueue;
use olhourbano::infra::store::ReportStore;
use olhourbano::jobs::mail_dispatcher::MailDispatcher;

fn base_url() -> Url {
    Url::parse(common::BASE_URL).unwrap()
}

fn message(subject: &str) -> EmailMessage {
    EmailMessage {
        to: common::REPORTER_EMAIL.to_string(),
        subject: subject.to_string(),
        body: "corpo".to_string(),
    }
}

// ===========================================================================
// Templates
// ===========================================================================

#[test]
fn report_link_ignores_trailing_slash() {
    assert_eq!(
        report_link(&base_url(), 7),
        "https://olhourbano.com.br/report/7"
    );

    let nested = Url::parse("https://example.org/cidade/").unwrap();
    assert_eq!(report_link(&nested, 7), "https://example.org/cidade/report/7");
}

#[test]
fn confirmation_template_content() {
    let template = confirmation_template(&base_url(), 42, "Iluminação Pública");

    assert_eq!(template.subject, "Olho Urbano - Denúncia #42 Recebida");
    assert!(template.body.contains("- Número: #42"));
    assert!(template.body.contains("- Categoria: Iluminação Pública"));
    assert!(template.body.contains("- Status: Pendente de Análise"));
    assert!(template.body.contains("https://olhourbano.com.br/report/42"));
}

#[test]
fn comment_template_content() {
    let template = comment_template(&base_url(), 9, "7281dfb5", "Também vi isso");

    assert_eq!(
        template.subject,
        "Olho Urbano - Novo Comentário na Denúncia #9"
    );
    assert!(template.body.contains("- Comentário de: 7281dfb5"));
    assert!(template.body.contains("- Conteúdo: \"Também vi isso\""));
    assert!(template.body.contains("https://olhourbano.com.br/report/9"));
}

#[test]
fn comment_preview_truncates_long_content() {
    let exact = "a".repeat(100);
    assert_eq!(comment_preview(&exact), exact);

    let long = "b".repeat(101);
    let preview = comment_preview(&long);
    assert_eq!(preview, format!("{}...", "b".repeat(97)));
    assert_eq!(preview.chars().count(), 100);
}

#[test]
fn comment_preview_counts_characters() {
    let accented = "ç".repeat(150);

    let preview = comment_preview(&accented);

    assert_eq!(preview.chars().count(), 100);
    assert!(preview.ends_with("ç..."));
}

#[tokio::test]
async fn owner_notification_rules() {
    let store = InMemoryStore::default();
    let id = store
        .insert_report(new_report("obras", "Rua A, 1, Centro, Campinas - SP", -22.9, -47.06))
        .await
        .unwrap();
    let report = store.find_report(id).await.unwrap().unwrap();

    assert!(should_notify_owner(&report, &identity::hash(common::OTHER_VALID_CPF)));
    assert!(!should_notify_owner(&report, &identity::hash(VALID_CPF)));

    let mut without_email = report.clone();
    without_email.email = "  ".to_string();
    assert!(!should_notify_owner(&without_email, &identity::hash(common::OTHER_VALID_CPF)));
}

// ===========================================================================
// Mail Queue
// ===========================================================================

#[tokio::test]
async fn full_queue_drops_message() {
    let (queue, mut receiver) = MailQueue::bounded(1);

    assert!(queue.enqueue(message("primeiro")));
    assert!(!queue.enqueue(message("segundo")));

    assert_eq!(receiver.recv().await.unwrap().subject, "primeiro");
    assert!(receiver.try_recv().is_err());
}

#[tokio::test]
async fn closed_queue_drops_message() {
    let (queue, receiver) = MailQueue::bounded(4);
    drop(receiver);

    assert!(!queue.enqueue(message("perdido")));
}

#[tokio::test]
async fn zero_capacity_still_accepts_one() {
    let (queue, _receiver) = MailQueue::bounded(0);

    assert!(queue.enqueue(message("único")));
}

// ===========================================================================
// Mail Dispatcher
// ===========================================================================

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

#[axum::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FailingMailer {
    attempts: AtomicUsize,
}

#[axum::async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _message: &EmailMessage) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("relay refused connection"))
    }
}

#[tokio::test]
async fn dispatcher_delivers_in_order_and_drains_on_shutdown() {
    let mailer = Arc::new(RecordingMailer::default());
    let (queue, receiver) = MailQueue::bounded(8);
    let dispatcher = MailDispatcher::spawn(receiver, mailer.clone());

    for subject in ["um", "dois", "três"] {
        assert!(queue.enqueue(message(subject)));
    }
    drop(queue);
    dispatcher.shutdown().await;

    let subjects: Vec<String> = mailer
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|message| message.subject.clone())
        .collect();
    assert_eq!(subjects, vec!["um", "dois", "três"]);
}

#[tokio::test]
async fn dispatcher_keeps_going_after_failures() {
    let mailer = Arc::new(FailingMailer::default());
    let (queue, receiver) = MailQueue::bounded(8);
    let dispatcher = MailDispatcher::spawn(receiver, mailer.clone());

    assert!(queue.enqueue(message("falha 1")));
    assert!(queue.enqueue(message("falha 2")));
    drop(queue);
    dispatcher.shutdown().await;

    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 2);
}

// ===========================================================================
// Local and Fallback Verification
// ===========================================================================

#[tokio::test]
async fn local_verifier_checks_format_and_date() {
    let verifier = LocalVerifier;

    let ok = verifier.verify(VALID_CPF, BIRTH_DATE_ISO).await.unwrap();
    assert!(ok.valid);
    assert!(ok.success);
    assert_eq!(ok.message, "CPF validated locally");

    let bad_cpf = verifier.verify("111.111.111-11", BIRTH_DATE_ISO).await.unwrap();
    assert!(!bad_cpf.valid);
    assert_eq!(bad_cpf.message, "CPF format is invalid");

    let bad_date = verifier.verify(VALID_CPF, BIRTH_DATE).await.unwrap();
    assert!(!bad_date.valid);
    assert_eq!(bad_date.message, "Invalid birth date format");
}

#[tokio::test]
async fn fallback_used_only_when_primary_cannot_decide() {
    let fallback = Arc::new(StubVerifier::new(VerifierMode::Valid));

    let unavailable = FallbackVerifier::new(
        Arc::new(StubVerifier::new(VerifierMode::Unavailable)),
        fallback.clone(),
    );
    let result = unavailable.verify(VALID_CPF, BIRTH_DATE_ISO).await.unwrap();
    assert!(result.valid);
    assert_eq!(fallback.calls(), 1);

    let rejecting = FallbackVerifier::new(
        Arc::new(StubVerifier::new(VerifierMode::Invalid)),
        fallback.clone(),
    );
    let result = rejecting.verify(VALID_CPF, BIRTH_DATE_ISO).await.unwrap();
    assert!(!result.valid);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn check_identity_outcomes() {
    let valid = StubVerifier::new(VerifierMode::Valid);

    assert_eq!(
        check_identity(&valid, "123.456.789-00", BIRTH_DATE).await,
        IdentityCheck::Rejected("CPF inválido".to_string())
    );
    assert_eq!(
        check_identity(&valid, VALID_CPF, "1990").await,
        IdentityCheck::Rejected("Data de nascimento: formato inválido, use dd/mm/aaaa".to_string())
    );
    assert_eq!(valid.calls(), 0);

    assert_eq!(
        check_identity(&valid, VALID_CPF, BIRTH_DATE).await,
        IdentityCheck::Verified {
            hashed_cpf: identity::hash(VALID_CPF),
            birth_date: BIRTH_DATE_ISO.to_string(),
        }
    );

    let invalid = StubVerifier::new(VerifierMode::Invalid);
    assert_eq!(
        check_identity(&invalid, VALID_CPF, BIRTH_DATE).await,
        IdentityCheck::Rejected(IDENTITY_MISMATCH_MESSAGE.to_string())
    );
}

#[tokio::test]
async fn check_identity_accepts_when_verifier_unavailable() {
    let verifier = StubVerifier::new(VerifierMode::Unavailable);

    let check = check_identity(&verifier, "52998224725", BIRTH_DATE_ISO).await;

    assert_eq!(
        check,
        IdentityCheck::Verified {
            hashed_cpf: identity::hash(VALID_CPF),
            birth_date: BIRTH_DATE_ISO.to_string(),
        }
    );
    assert_eq!(verifier.calls(), 1);
}

// ===========================================================================
// CPFHub Client
// ===========================================================================

const API_KEY: &str = "chave-de-teste";

#[derive(Clone, Default)]
struct FakeCpfHub {
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn lookup(
    State(hub): State<FakeCpfHub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let cpf = body["cpf"].as_str().unwrap_or_default().to_string();
    hub.requests.lock().unwrap().push((api_key, body));

    let data = match cpf.as_str() {
        "11144477735" => json!({ "status": "Rejeitado", "situation": "REGULAR" }),
        "12345678909" => json!({ "status": "Regular", "situation": "CPF CANCELADO" }),
        _ => json!({ "status": "Regular", "situation": "REGULAR" }),
    };
    Json(json!({ "success": true, "data": data }))
}

async fn unsuccessful() -> impl IntoResponse {
    Json(json!({ "success": false }))
}

async fn bad_request() -> impl IntoResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": "Data de nascimento divergente" })),
    )
}

async fn server_error() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream failure")
}

async fn throttled() -> impl IntoResponse {
    (StatusCode::TOO_MANY_REQUESTS, "slow down")
}

async fn spawn_cpfhub() -> (SocketAddr, FakeCpfHub) {
    let hub = FakeCpfHub::default();
    let app = Router::new()
        .route("/cpf", post(lookup))
        .route("/unsuccessful", post(unsuccessful))
        .route("/bad-request", post(bad_request))
        .route("/down", post(server_error))
        .route("/throttled", post(throttled))
        .with_state(hub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hub)
}

fn cpfhub(addr: SocketAddr, path: &str) -> CpfHubVerifier {
    let endpoint = Url::parse(&format!("http://{}{}", addr, path)).unwrap();
    CpfHubVerifier::new(endpoint, API_KEY.to_string(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn cpfhub_regular_cpf() {
    let (addr, hub) = spawn_cpfhub().await;

    let result = cpfhub(addr, "/cpf")
        .verify(VALID_CPF, BIRTH_DATE_ISO)
        .await
        .unwrap();

    assert_eq!(
        result,
        Verification {
            success: true,
            valid: true,
            message: "Status: Regular - REGULAR".to_string(),
        }
    );

    let requests = hub.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (api_key, body) = &requests[0];
    assert_eq!(api_key.as_deref(), Some(API_KEY));
    assert_eq!(body["cpf"], "52998224725");
    assert_eq!(body["birthDate"], BIRTH_DATE);
}

#[tokio::test]
async fn cpfhub_rejected_status() {
    let (addr, _hub) = spawn_cpfhub().await;

    let result = cpfhub(addr, "/cpf")
        .verify(common::OTHER_VALID_CPF, BIRTH_DATE_ISO)
        .await
        .unwrap();

    assert!(result.success);
    assert!(!result.valid);
}

#[tokio::test]
async fn cpfhub_inactive_situation() {
    let (addr, _hub) = spawn_cpfhub().await;

    let result = cpfhub(addr, "/cpf")
        .verify(common::THIRD_VALID_CPF, BIRTH_DATE_ISO)
        .await
        .unwrap();

    assert!(!result.valid);
    assert_eq!(result.message, "Status: Regular - CPF CANCELADO");
}

#[tokio::test]
async fn cpfhub_skips_request_for_malformed_input() {
    let (addr, hub) = spawn_cpfhub().await;
    let verifier = cpfhub(addr, "/cpf");

    let bad_cpf = verifier.verify("529.982.247-24", BIRTH_DATE_ISO).await.unwrap();
    assert_eq!(bad_cpf.message, "CPF format is invalid");

    let bad_date = verifier.verify(VALID_CPF, "1990-13-40").await.unwrap();
    assert_eq!(bad_date.message, "Invalid birth date format");

    assert!(hub.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cpfhub_unsuccessful_answer() {
    let (addr, _hub) = spawn_cpfhub().await;

    let result = cpfhub(addr, "/unsuccessful")
        .verify(VALID_CPF, BIRTH_DATE_ISO)
        .await
        .unwrap();

    assert!(!result.valid);
    assert_eq!(result.message, "CPF verification failed");
}

#[tokio::test]
async fn cpfhub_client_error_is_a_negative_answer() {
    let (addr, _hub) = spawn_cpfhub().await;

    let result = cpfhub(addr, "/bad-request")
        .verify(VALID_CPF, BIRTH_DATE_ISO)
        .await
        .unwrap();

    assert!(!result.valid);
    assert_eq!(
        result.message,
        "CPF verification failed (HTTP 400): Data de nascimento divergente"
    );
}

#[tokio::test]
async fn cpfhub_outages_are_errors() {
    let (addr, _hub) = spawn_cpfhub().await;

    assert!(cpfhub(addr, "/down").verify(VALID_CPF, BIRTH_DATE_ISO).await.is_err());
    assert!(cpfhub(addr, "/throttled")
        .verify(VALID_CPF, BIRTH_DATE_ISO)
        .await
        .is_err());
}

#[tokio::test]
async fn cpfhub_unreachable_falls_back_to_local_check() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let verifier = FallbackVerifier::new(Arc::new(cpfhub(addr, "/cpf")), Arc::new(LocalVerifier));
    let result = verifier.verify(VALID_CPF, BIRTH_DATE_ISO).await.unwrap();

    assert!(result.valid);
    assert_eq!(result.message, "CPF validated locally");
}
