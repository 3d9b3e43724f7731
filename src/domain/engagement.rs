use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::identity;

pub const MAX_COMMENT_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub report_id: i64,
    #[serde(skip_serializing)]
    pub hashed_cpf: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentDisplay {
    pub id: i64,
    pub report_id: i64,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub hashed_cpf_display: String,
}

impl From<&Comment> for CommentDisplay {
    fn from(comment: &Comment) -> Self {
        Self {
            id: comment.id,
            report_id: comment.report_id,
            content: comment.content.clone(),
            created_at: comment.created_at,
            hashed_cpf_display: identity::display_hash(&comment.hashed_cpf),
        }
    }
}
