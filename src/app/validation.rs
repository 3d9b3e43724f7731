use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Date, Month, OffsetDateTime};

use crate::config::categories::CategoryCatalog;
use crate::domain::identity;
use crate::domain::report::{MAX_DESCRIPTION_CHARS, MIN_DESCRIPTION_CHARS};

pub const MIN_AGE_YEARS: i32 = 16;
const MIN_BIRTH_YEAR: i32 = 1900;

pub const MISSING_FILES_MESSAGE: &str =
    "Pelo menos um arquivo (foto, vídeo ou documento) é obrigatório para comprovar a denúncia";

/// Fields of a report submission that go through validation. Files are checked separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportForm {
    pub category: String,
    #[serde(default)]
    pub cpf: String,
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_confirmation: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachedFile {
    pub path: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BirthDateError {
    #[error("formato inválido, use dd/mm/aaaa")]
    Format,
    #[error("dia inválido")]
    Day,
    #[error("mês inválido")]
    Month,
    #[error("ano inválido")]
    Year,
    #[error("data inválida")]
    Calendar,
    #[error("data não pode ser no futuro")]
    Future,
    #[error("idade mínima: {} anos", MIN_AGE_YEARS)]
    Underage,
}

/// Converts `dd/mm/aaaa` to ISO `yyyy-mm-dd`. ISO input is checked the same way and
/// returned unchanged.
pub fn convert_birth_date_to_iso(raw: &str) -> Result<String, BirthDateError> {
    convert_birth_date_to_iso_at(raw, OffsetDateTime::now_utc().date())
}

pub fn convert_birth_date_to_iso_at(raw: &str, today: Date) -> Result<String, BirthDateError> {
    let bytes = raw.as_bytes();
    if bytes.len() != 10 || !raw.is_ascii() {
        return Err(BirthDateError::Format);
    }

    let (day, month, year) = if bytes[4] == b'-' && bytes[7] == b'-' {
        (&raw[8..10], &raw[5..7], &raw[0..4])
    } else if bytes[2] == b'/' && bytes[5] == b'/' {
        (&raw[0..2], &raw[3..5], &raw[6..10])
    } else {
        return Err(BirthDateError::Format);
    };

    let day = parse_number(day)
        .filter(|day| (1..=31).contains(day))
        .ok_or(BirthDateError::Day)?;
    let month = parse_number(month)
        .filter(|month| (1..=12).contains(month))
        .ok_or(BirthDateError::Month)?;
    let year = parse_number(year)
        .map(|year| year as i32)
        .filter(|year| (MIN_BIRTH_YEAR..=today.year()).contains(year))
        .ok_or(BirthDateError::Year)?;

    let month = Month::try_from(month as u8).map_err(|_| BirthDateError::Month)?;
    let date =
        Date::from_calendar_date(year, month, day as u8).map_err(|_| BirthDateError::Calendar)?;

    if date > today {
        return Err(BirthDateError::Future);
    }
    if date > minimum_age_cutoff(today)? {
        return Err(BirthDateError::Underage);
    }

    Ok(format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    ))
}

/// Same day `MIN_AGE_YEARS` ago; 29 February rolls over to 1 March.
fn minimum_age_cutoff(today: Date) -> Result<Date, BirthDateError> {
    let year = today.year() - MIN_AGE_YEARS;
    match today.replace_year(year) {
        Ok(date) => Ok(date),
        Err(_) => Date::from_calendar_date(year, Month::March, 1).map_err(|_| BirthDateError::Year),
    }
}

fn parse_number(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// `local@domain.tld`: local part of letters, digits and `._%+-`, dotted domain,
/// alphabetic TLD of at least two letters.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty()
        || !local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c))
    {
        return false;
    }
    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }

    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

#[derive(Clone)]
pub struct FormValidator {
    catalog: Arc<CategoryCatalog>,
}

impl FormValidator {
    pub fn new(catalog: Arc<CategoryCatalog>) -> Self {
        Self { catalog }
    }

    /// Runs every check and collects all failures in a fixed order.
    pub fn validate(&self, form: &ReportForm) -> Vec<String> {
        self.validate_at(form, OffsetDateTime::now_utc().date())
    }

    pub fn validate_at(&self, form: &ReportForm, today: Date) -> Vec<String> {
        let mut errors = Vec::new();

        if !identity::is_valid(&form.cpf) {
            errors.push("CPF inválido".to_string());
        }

        if form.birth_date.trim().is_empty() {
            errors.push("Data de nascimento é obrigatória".to_string());
        } else if let Err(err) = convert_birth_date_to_iso_at(form.birth_date.trim(), today) {
            errors.push(format!("Data de nascimento: {}", err));
        }

        if !is_valid_email(&form.email) {
            errors.push("Email inválido".to_string());
        }

        if form.email.to_lowercase() != form.email_confirmation.to_lowercase() {
            errors.push("Confirmação de email não confere".to_string());
        }

        if form.location.trim().is_empty() {
            errors.push("Localização é obrigatória".to_string());
        }

        if form.latitude == 0.0 && form.longitude == 0.0 {
            errors.push("Coordenadas de localização são obrigatórias".to_string());
        }
        if !(-90.0..=90.0).contains(&form.latitude) {
            errors.push("Latitude inválida".to_string());
        }
        if !(-180.0..=180.0).contains(&form.longitude) {
            errors.push("Longitude inválida".to_string());
        }

        let description_chars = form.description.trim().chars().count();
        if description_chars < MIN_DESCRIPTION_CHARS {
            errors.push(format!(
                "Descrição deve ter pelo menos {} caracteres",
                MIN_DESCRIPTION_CHARS
            ));
        }
        if description_chars > MAX_DESCRIPTION_CHARS {
            errors.push(format!(
                "Descrição deve ter no máximo {} caracteres",
                MAX_DESCRIPTION_CHARS
            ));
        }

        errors
    }

    /// Evidence check: at least one file, within the category's count and type policy.
    pub fn validate_files(&self, category_id: &str, files: &[AttachedFile]) -> Vec<String> {
        let mut errors = Vec::new();
        if files.is_empty() {
            errors.push(MISSING_FILES_MESSAGE.to_string());
            return errors;
        }

        let policy = self.catalog.upload_policy(category_id);
        if files.len() > policy.max_files {
            errors.push(format!(
                "Máximo de {} arquivos permitidos para esta categoria",
                policy.max_files
            ));
        }
        for file in files {
            if !policy.allows(&file.content_type) {
                errors.push(format!(
                    "Tipo de arquivo não permitido: {}",
                    file.content_type
                ));
            }
        }

        errors
    }
}
