pub mod categories;

use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

const DOCKER_SECRETS_DIR: &str = "/run/secrets/";
const LOCAL_SECRETS_DIR: &str = "./secrets/";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub categories_path: PathBuf,
    pub cpfhub_api_url: Url,
    pub cpfhub_api_key: Option<String>,
    pub cpfhub_timeout_seconds: u64,
    pub mail_relay_url: Option<Url>,
    pub mail_relay_token: Option<String>,
    pub mail_from: String,
    pub mail_queue_capacity: usize,
    pub public_base_url: Url,
    pub reports_per_page: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        let mail_relay_url = match std::env::var("MAIL_RELAY_URL") {
            Ok(value) if !value.trim().is_empty() => Some(parse_url("MAIL_RELAY_URL", &value)?),
            _ => None,
        };

        let reports_per_page: i64 = env_or_parse("REPORTS_PER_PAGE", "9")?;
        if reports_per_page < 1 {
            return Err(anyhow!("invalid REPORTS_PER_PAGE: must be at least 1"));
        }

        Ok(Self {
            http_addr,
            app_mode,
            database_url: env_or_err("DATABASE_URL")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            categories_path: PathBuf::from(env_or("CATEGORIES_PATH", "config/categories.toml")),
            cpfhub_api_url: parse_url(
                "CPFHUB_API_URL",
                &env_or("CPFHUB_API_URL", "https://api.cpfhub.io/api/cpf"),
            )?,
            cpfhub_api_key: env_secret("CPFHUB_API_KEY")?,
            cpfhub_timeout_seconds: env_or_parse("CPFHUB_TIMEOUT_SECONDS", "10")?,
            mail_relay_url,
            mail_relay_token: env_secret("MAIL_RELAY_TOKEN")?,
            mail_from: env_or("MAIL_FROM", "olhourbano.contato@gmail.com"),
            mail_queue_capacity: env_or_parse("MAIL_QUEUE_CAPACITY", "256")?,
            public_base_url: parse_url(
                "PUBLIC_BASE_URL",
                &env_or("PUBLIC_BASE_URL", "https://olhourbano.com.br"),
            )?,
            reports_per_page,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn parse_url(key: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|err| anyhow!("invalid {}: {}", key, err))
}

/// Reads an optional secret either inline from `KEY` or from the file named by `KEY_FILE`.
fn env_secret(key: &str) -> Result<Option<String>> {
    if let Ok(value) = std::env::var(key) {
        let value = value.trim().to_string();
        return Ok((!value.is_empty()).then_some(value));
    }

    let file_key = format!("{}_FILE", key);
    match std::env::var(&file_key) {
        Ok(path) if !path.trim().is_empty() => {
            let value = read_secret_file(Path::new(path.trim()))
                .map_err(|err| anyhow!("invalid {}: {}", file_key, err))?;
            Ok((!value.is_empty()).then_some(value))
        }
        _ => Ok(None),
    }
}

/// Docker secrets live under `/run/secrets/`; local runs keep the same files under `./secrets/`.
pub fn read_secret_file(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(err) => {
            let relative = path
                .to_str()
                .and_then(|path| path.strip_prefix(DOCKER_SECRETS_DIR));
            match relative {
                Some(relative) => {
                    let local = Path::new(LOCAL_SECRETS_DIR).join(relative);
                    let content = std::fs::read_to_string(&local)
                        .map_err(|err| anyhow!("failed to read secret file: {}", err))?;
                    Ok(content.trim().to_string())
                }
                None => Err(anyhow!("failed to read secret file: {}", err)),
            }
        }
    }
}
