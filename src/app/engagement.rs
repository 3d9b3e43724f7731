use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::app::notifications::Notifier;
use crate::app::verification::{check_identity, IdentityCheck, IdentityVerifier};
use crate::domain::engagement::{Comment, CommentDisplay, MAX_COMMENT_CHARS};
use crate::domain::identity;
use crate::infra::store::{CommentSort, ReportStore, VoteWrite};

pub const DEFAULT_COMMENT_LIMIT: i64 = 20;
pub const MAX_COMMENT_LIMIT: i64 = 100;
pub const COMMENT_TOO_LONG_MESSAGE: &str = "comment content exceeds 500 character limit";
pub const COMMENT_EMPTY_MESSAGE: &str = "comment content is required";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Registered { vote_count: i64 },
    AlreadyVoted { vote_count: i64 },
    IdentityRejected(String),
    ReportNotFound,
}

#[derive(Debug, Clone)]
pub enum CommentOutcome {
    Created(Comment),
    Invalid(String),
    IdentityRejected(String),
    ReportNotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentPage {
    pub comments: Vec<CommentDisplay>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

pub fn clamp_comment_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_COMMENT_LIMIT)
        .clamp(1, MAX_COMMENT_LIMIT)
}

#[derive(Clone)]
pub struct EngagementService {
    store: Arc<dyn ReportStore>,
    verifier: Arc<dyn IdentityVerifier>,
    notifier: Notifier,
}

impl EngagementService {
    pub fn new(
        store: Arc<dyn ReportStore>,
        verifier: Arc<dyn IdentityVerifier>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            verifier,
            notifier,
        }
    }

    /// One vote per identity per report. The returned count is always recomputed from
    /// stored votes.
    pub async fn vote(&self, report_id: i64, cpf: &str, birth_date: &str) -> Result<VoteOutcome> {
        if self.store.find_report(report_id).await?.is_none() {
            return Ok(VoteOutcome::ReportNotFound);
        }

        let hashed_cpf = match check_identity(self.verifier.as_ref(), cpf, birth_date).await {
            IdentityCheck::Verified { hashed_cpf, .. } => hashed_cpf,
            IdentityCheck::Rejected(message) => return Ok(VoteOutcome::IdentityRejected(message)),
        };

        if self.store.has_voted(report_id, &hashed_cpf).await? {
            let vote_count = self.store.recompute_vote_count(report_id).await?;
            return Ok(VoteOutcome::AlreadyVoted { vote_count });
        }

        let write = self.store.insert_vote(report_id, &hashed_cpf).await?;
        let vote_count = self.store.recompute_vote_count(report_id).await?;

        match write {
            VoteWrite::Inserted => {
                info!(
                    report_id,
                    voter = %identity::display_hash(&hashed_cpf),
                    vote_count,
                    "vote registered"
                );
                Ok(VoteOutcome::Registered { vote_count })
            }
            VoteWrite::AlreadyExists => {
                debug!(report_id, "concurrent duplicate vote ignored");
                Ok(VoteOutcome::AlreadyVoted { vote_count })
            }
        }
    }

    pub async fn comment(
        &self,
        report_id: i64,
        cpf: &str,
        birth_date: &str,
        content: &str,
    ) -> Result<CommentOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(CommentOutcome::Invalid(COMMENT_EMPTY_MESSAGE.to_string()));
        }
        if content.chars().count() > MAX_COMMENT_CHARS {
            return Ok(CommentOutcome::Invalid(COMMENT_TOO_LONG_MESSAGE.to_string()));
        }

        let Some(report) = self.store.find_report(report_id).await? else {
            return Ok(CommentOutcome::ReportNotFound);
        };

        let hashed_cpf = match check_identity(self.verifier.as_ref(), cpf, birth_date).await {
            IdentityCheck::Verified { hashed_cpf, .. } => hashed_cpf,
            IdentityCheck::Rejected(message) => {
                return Ok(CommentOutcome::IdentityRejected(message))
            }
        };

        let comment = self
            .store
            .insert_comment(report_id, &hashed_cpf, content)
            .await?;
        let comment_count = self.store.recompute_comment_count(report_id).await?;
        info!(
            report_id,
            comment_id = comment.id,
            comment_count,
            "comment created"
        );

        if self
            .notifier
            .send_comment_notification(&report, &hashed_cpf, content)
        {
            debug!(report_id, "comment notification queued");
        }

        Ok(CommentOutcome::Created(comment))
    }

    pub async fn list_comments(
        &self,
        report_id: i64,
        sort: CommentSort,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Option<CommentPage>> {
        if self.store.find_report(report_id).await?.is_none() {
            return Ok(None);
        }

        let limit = clamp_comment_limit(limit);
        let offset = offset.unwrap_or(0).max(0);
        let comments = self
            .store
            .list_comments(report_id, sort, limit, offset)
            .await?;
        let total = self.store.count_comments(report_id).await?;

        Ok(Some(CommentPage {
            comments,
            total,
            limit,
            offset,
        }))
    }
}
