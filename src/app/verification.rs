use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use time::macros::format_description;
use time::Date;
use tracing::warn;
use url::Url;

use crate::app::validation::convert_birth_date_to_iso;
use crate::config::AppConfig;
use crate::domain::identity;

const INACTIVE_SITUATIONS: [&str; 3] = ["TITULAR FALECIDO", "CPF CANCELADO", "CPF SUSPENSO"];
const REJECTED_STATUS: &str = "Rejeitado";
pub const IDENTITY_MISMATCH_MESSAGE: &str = "CPF e data de nascimento não conferem";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub success: bool,
    pub valid: bool,
    pub message: String,
}

impl Verification {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            success: false,
            valid: false,
            message: message.into(),
        }
    }
}

/// Checks a CPF against a birth date given in ISO form.
///
/// `Err` means the verifier could not reach a decision; an explicit negative answer
/// is `Ok` with `valid == false`.
#[axum::async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, cpf: &str, birth_date_iso: &str) -> Result<Verification>;
}

fn parse_iso_date(value: &str) -> Option<Date> {
    Date::parse(value, format_description!("[year]-[month]-[day]")).ok()
}

/// Format and check-digit validation only.
#[derive(Clone, Default)]
pub struct LocalVerifier;

#[axum::async_trait]
impl IdentityVerifier for LocalVerifier {
    async fn verify(&self, cpf: &str, birth_date_iso: &str) -> Result<Verification> {
        if !identity::is_valid(cpf) {
            return Ok(Verification::invalid("CPF format is invalid"));
        }
        if parse_iso_date(birth_date_iso).is_none() {
            return Ok(Verification::invalid("Invalid birth date format"));
        }
        Ok(Verification {
            success: true,
            valid: true,
            message: "CPF validated locally".to_string(),
        })
    }
}

#[derive(Serialize)]
struct CpfHubRequest<'a> {
    cpf: &'a str,
    #[serde(rename = "birthDate")]
    birth_date: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct CpfHubResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: String,
    #[serde(default)]
    data: CpfHubData,
}

#[derive(Debug, Default, Deserialize)]
struct CpfHubData {
    #[serde(default)]
    status: String,
    #[serde(default)]
    situation: String,
}

/// Remote lookup against the CPFHub API.
#[derive(Clone)]
pub struct CpfHubVerifier {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl CpfHubVerifier {
    pub fn new(endpoint: Url, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build CPFHub client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

/// Statuses that say nothing about the CPF itself.
fn is_unavailable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::TOO_MANY_REQUESTS
}

#[axum::async_trait]
impl IdentityVerifier for CpfHubVerifier {
    async fn verify(&self, cpf: &str, birth_date_iso: &str) -> Result<Verification> {
        if !identity::is_valid(cpf) {
            return Ok(Verification::invalid("CPF format is invalid"));
        }
        let Some(birth_date) = parse_iso_date(birth_date_iso) else {
            return Ok(Verification::invalid("Invalid birth date format"));
        };
        let birth_date = birth_date
            .format(format_description!("[day]/[month]/[year]"))
            .context("failed to format birth date")?;

        let normalized = identity::normalize(cpf);
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-api-key", &self.api_key)
            .json(&CpfHubRequest {
                cpf: &normalized,
                birth_date: &birth_date,
            })
            .send()
            .await
            .context("failed to reach CPFHub")?;

        let status = response.status();
        if is_unavailable(status) {
            return Err(anyhow!("CPFHub unavailable: HTTP {}", status.as_u16()));
        }

        let body: CpfHubResponse = response
            .json()
            .await
            .context("failed to decode CPFHub response")?;

        if status != StatusCode::OK {
            return Ok(Verification::invalid(format!(
                "CPF verification failed (HTTP {}): {}",
                status.as_u16(),
                body.error
            )));
        }
        if !body.success {
            return Ok(Verification::invalid("CPF verification failed"));
        }

        let valid = body.data.status != REJECTED_STATUS
            && !INACTIVE_SITUATIONS.contains(&body.data.situation.as_str());
        Ok(Verification {
            success: true,
            valid,
            message: format!("Status: {} - {}", body.data.status, body.data.situation),
        })
    }
}

/// Primary verifier with a local fallback when the primary cannot decide.
#[derive(Clone)]
pub struct FallbackVerifier {
    primary: Arc<dyn IdentityVerifier>,
    fallback: Arc<dyn IdentityVerifier>,
}

impl FallbackVerifier {
    pub fn new(primary: Arc<dyn IdentityVerifier>, fallback: Arc<dyn IdentityVerifier>) -> Self {
        Self { primary, fallback }
    }
}

#[axum::async_trait]
impl IdentityVerifier for FallbackVerifier {
    async fn verify(&self, cpf: &str, birth_date_iso: &str) -> Result<Verification> {
        match self.primary.verify(cpf, birth_date_iso).await {
            Ok(verification) => Ok(verification),
            Err(err) => {
                warn!(error = ?err, "identity verification unavailable, using local check");
                self.fallback.verify(cpf, birth_date_iso).await
            }
        }
    }
}

pub fn from_config(config: &AppConfig) -> Result<Arc<dyn IdentityVerifier>> {
    let local: Arc<dyn IdentityVerifier> = Arc::new(LocalVerifier);
    match &config.cpfhub_api_key {
        Some(api_key) => {
            let remote = CpfHubVerifier::new(
                config.cpfhub_api_url.clone(),
                api_key.clone(),
                Duration::from_secs(config.cpfhub_timeout_seconds),
            )?;
            Ok(Arc::new(FallbackVerifier::new(Arc::new(remote), local)))
        }
        None => Ok(local),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityCheck {
    Verified { hashed_cpf: String, birth_date: String },
    Rejected(String),
}

/// Local validation, then the verifier. A verifier that cannot decide does not block a
/// locally valid identity.
pub async fn check_identity(
    verifier: &dyn IdentityVerifier,
    cpf: &str,
    birth_date: &str,
) -> IdentityCheck {
    if !identity::is_valid(cpf) {
        return IdentityCheck::Rejected("CPF inválido".to_string());
    }
    let birth_date = match convert_birth_date_to_iso(birth_date.trim()) {
        Ok(iso) => iso,
        Err(err) => return IdentityCheck::Rejected(format!("Data de nascimento: {}", err)),
    };

    match verifier.verify(cpf, &birth_date).await {
        Ok(verification) if !verification.valid => {
            IdentityCheck::Rejected(IDENTITY_MISMATCH_MESSAGE.to_string())
        }
        Ok(_) => IdentityCheck::Verified {
            hashed_cpf: identity::hash(cpf),
            birth_date,
        },
        Err(err) => {
            warn!(error = ?err, "identity verifier failed, accepting locally valid CPF");
            IdentityCheck::Verified {
                hashed_cpf: identity::hash(cpf),
                birth_date,
            }
        }
    }
}
