use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

use crate::domain::identity;

pub const MIN_DESCRIPTION_CHARS: usize = 10;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;
pub const DEFAULT_TRANSPORT_NAME: &str = "Transporte";

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: i64,
    pub problem_type: String,
    #[serde(skip_serializing)]
    pub hashed_cpf: String,
    #[serde(skip_serializing)]
    pub birth_date: String,
    #[serde(skip_serializing)]
    pub email: String,
    pub location: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub photo_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_data: Option<TransportData>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub vote_count: i64,
    pub comment_count: i64,
    pub status: ReportStatus,
}

impl Report {
    /// Comma-joined upload paths, trimmed, empty segments dropped.
    pub fn photos(&self) -> Vec<String> {
        split_photo_paths(&self.photo_path)
    }

    pub fn status_text(&self) -> &'static str {
        self.status.display_text()
    }

    pub fn identity_display(&self) -> String {
        identity::display_hash(&self.hashed_cpf)
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0
    }
}

pub fn split_photo_paths(photo_path: &str) -> Vec<String> {
    photo_path
        .split(',')
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}

/// A report ready to be persisted. Status starts as pending and counters at zero.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub problem_type: String,
    pub hashed_cpf: String,
    pub birth_date: String,
    pub email: String,
    pub location: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub photo_path: String,
    pub transport_type: Option<String>,
    pub transport_data: Option<TransportData>,
}

impl NewReport {
    pub fn into_report(self, id: i64, created_at: OffsetDateTime) -> Report {
        Report {
            id,
            problem_type: self.problem_type,
            hashed_cpf: self.hashed_cpf,
            birth_date: self.birth_date,
            email: self.email,
            location: self.location,
            city: self.city,
            latitude: self.latitude,
            longitude: self.longitude,
            description: self.description,
            photo_path: self.photo_path,
            transport_type: self.transport_type,
            transport_data: self.transport_data,
            created_at,
            vote_count: 0,
            comment_count: 0,
            status: ReportStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    InReview,
}

impl ReportStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "in_review" => Some(Self::InReview),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InReview => "in_review",
        }
    }

    pub fn display_text(&self) -> &'static str {
        match self {
            Self::Approved => "Resolvida",
            _ => "Pendente",
        }
    }
}

/// Sparse transport fields keyed by field name. Never holds blank values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportData(BTreeMap<String, String>);

impl TransportData {
    /// Trims every value and drops blanks; `None` when nothing is left.
    pub fn from_fields<I, K, V>(fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let values: BTreeMap<String, String> = fields
            .into_iter()
            .filter_map(|(name, value)| {
                let value = value.as_ref().trim();
                (!value.is_empty()).then(|| (name.into(), value.to_string()))
            })
            .collect();

        (!values.is_empty()).then_some(Self(values))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
