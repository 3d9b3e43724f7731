use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;

use crate::domain::engagement::{Comment, CommentDisplay};
use crate::domain::report::{NewReport, Report, ReportStatus, TransportData};
use crate::infra::db::Db;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub category: Option<String>,
    pub status: Option<ReportStatus>,
    /// Case-insensitive substring match.
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSort {
    #[default]
    Recent,
    Oldest,
    Votes,
}

impl ReportSort {
    /// Unknown values sort by most recent.
    pub fn parse(value: &str) -> Self {
        match value {
            "oldest" => Self::Oldest,
            "votes" => Self::Votes,
            _ => Self::Recent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recent => "recent",
            Self::Oldest => "oldest",
            Self::Votes => "votes",
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            Self::Recent => "created_at DESC, id DESC",
            Self::Oldest => "created_at ASC, id ASC",
            Self::Votes => "vote_count DESC, created_at DESC, id DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentSort {
    #[default]
    Recent,
    Oldest,
}

impl CommentSort {
    pub fn parse(value: &str) -> Self {
        match value {
            "oldest" => Self::Oldest,
            _ => Self::Recent,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            Self::Recent => "created_at DESC, id DESC",
            Self::Oldest => "created_at ASC, id ASC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteWrite {
    Inserted,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub total: i64,
    pub this_month: i64,
    pub resolved: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLocation {
    pub report_id: i64,
    pub location: String,
    pub city: String,
}

/// Persistence gateway for reports, votes and comments.
///
/// Implementations must enforce one vote per `(report, identity hash)` pair and
/// recompute cached counters from the underlying rows rather than incrementing.
#[axum::async_trait]
pub trait ReportStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn insert_report(&self, report: NewReport) -> Result<i64>;

    async fn find_report(&self, id: i64) -> Result<Option<Report>>;

    async fn list_reports(
        &self,
        filter: &ReportFilter,
        sort: ReportSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Report>>;

    async fn count_reports(&self, filter: &ReportFilter) -> Result<i64>;

    /// Reports with both coordinates non-zero, newest first.
    async fn map_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>>;

    async fn report_counts(&self) -> Result<ReportCounts>;

    async fn has_voted(&self, report_id: i64, hashed_cpf: &str) -> Result<bool>;

    async fn insert_vote(&self, report_id: i64, hashed_cpf: &str) -> Result<VoteWrite>;

    async fn recompute_vote_count(&self, report_id: i64) -> Result<i64>;

    async fn insert_comment(&self, report_id: i64, hashed_cpf: &str, content: &str)
        -> Result<Comment>;

    async fn recompute_comment_count(&self, report_id: i64) -> Result<i64>;

    async fn list_comments(
        &self,
        report_id: i64,
        sort: CommentSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CommentDisplay>>;

    async fn count_comments(&self, report_id: i64) -> Result<i64>;

    async fn distinct_cities(&self) -> Result<Vec<String>>;

    async fn stored_locations(&self) -> Result<Vec<StoredLocation>>;

    async fn update_city(&self, report_id: i64, city: &str) -> Result<()>;
}

const REPORT_COLUMNS: &str = "id, problem_type, hashed_cpf, birth_date, email, location, city, \
     latitude, longitude, description, photo_path, transport_type, transport_data, \
     created_at, vote_count, comment_count, status";

const FILTER_CLAUSE: &str = "($1::text IS NULL OR problem_type = $1) \
     AND ($2::text IS NULL OR status = $2) \
     AND ($3::text IS NULL OR strpos(lower(city), lower($3)) > 0)";

#[derive(Clone)]
pub struct PgReportStore {
    db: Db,
}

impl PgReportStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn report_from_row(row: &PgRow) -> Report {
    let status: String = row.get("status");
    let transport_data: Option<Json<TransportData>> = row.get("transport_data");

    Report {
        id: row.get("id"),
        problem_type: row.get("problem_type"),
        hashed_cpf: row.get("hashed_cpf"),
        birth_date: row.get("birth_date"),
        email: row.get("email"),
        location: row.get("location"),
        city: row.get("city"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        description: row.get("description"),
        photo_path: row.get("photo_path"),
        transport_type: row.get("transport_type"),
        transport_data: transport_data.map(|Json(data)| data),
        created_at: row.get("created_at"),
        vote_count: row.get("vote_count"),
        comment_count: row.get("comment_count"),
        status: ReportStatus::from_db(&status).unwrap_or_default(),
    }
}

#[axum::async_trait]
impl ReportStore for PgReportStore {
    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    async fn insert_report(&self, report: NewReport) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO reports \
             (problem_type, hashed_cpf, birth_date, email, location, city, latitude, longitude, \
              description, photo_path, transport_type, transport_data, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING id",
        )
        .bind(&report.problem_type)
        .bind(&report.hashed_cpf)
        .bind(&report.birth_date)
        .bind(&report.email)
        .bind(&report.location)
        .bind(&report.city)
        .bind(report.latitude)
        .bind(report.longitude)
        .bind(&report.description)
        .bind(&report.photo_path)
        .bind(&report.transport_type)
        .bind(report.transport_data.map(Json))
        .bind(ReportStatus::Pending.as_db())
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get("id"))
    }

    async fn find_report(&self, id: i64) -> Result<Option<Report>> {
        let query = format!("SELECT {} FROM reports WHERE id = $1", REPORT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(report_from_row))
    }

    async fn list_reports(
        &self,
        filter: &ReportFilter,
        sort: ReportSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Report>> {
        let query = format!(
            "SELECT {} FROM reports WHERE {} ORDER BY {} LIMIT $4 OFFSET $5",
            REPORT_COLUMNS,
            FILTER_CLAUSE,
            sort.order_by()
        );
        let rows = sqlx::query(&query)
            .bind(filter.category.as_deref())
            .bind(filter.status.map(|status| status.as_db()))
            .bind(filter.city.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.iter().map(report_from_row).collect())
    }

    async fn count_reports(&self, filter: &ReportFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) AS total FROM reports WHERE {}", FILTER_CLAUSE);
        let row = sqlx::query(&query)
            .bind(filter.category.as_deref())
            .bind(filter.status.map(|status| status.as_db()))
            .bind(filter.city.as_deref())
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("total"))
    }

    async fn map_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        let query = format!(
            "SELECT {} FROM reports \
             WHERE latitude IS NOT NULL AND longitude IS NOT NULL \
               AND latitude <> 0 AND longitude <> 0 \
               AND {} \
             ORDER BY created_at DESC, id DESC",
            REPORT_COLUMNS, FILTER_CLAUSE
        );
        let rows = sqlx::query(&query)
            .bind(filter.category.as_deref())
            .bind(filter.status.map(|status| status.as_db()))
            .bind(filter.city.as_deref())
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.iter().map(report_from_row).collect())
    }

    async fn report_counts(&self) -> Result<ReportCounts> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE created_at >= date_trunc('month', CURRENT_DATE)) AS this_month, \
                    COUNT(*) FILTER (WHERE status = 'approved') AS resolved \
             FROM reports",
        )
        .fetch_one(self.db.pool())
        .await?;

        Ok(ReportCounts {
            total: row.get("total"),
            this_month: row.get("this_month"),
            resolved: row.get("resolved"),
        })
    }

    async fn has_voted(&self, report_id: i64, hashed_cpf: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM votes WHERE report_id = $1 AND vote_hashed_cpf = $2) AS voted",
        )
        .bind(report_id)
        .bind(hashed_cpf)
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get("voted"))
    }

    async fn insert_vote(&self, report_id: i64, hashed_cpf: &str) -> Result<VoteWrite> {
        let result = sqlx::query(
            "INSERT INTO votes (report_id, vote_hashed_cpf) VALUES ($1, $2) \
             ON CONFLICT (vote_hashed_cpf, report_id) DO NOTHING",
        )
        .bind(report_id)
        .bind(hashed_cpf)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            Ok(VoteWrite::Inserted)
        } else {
            Ok(VoteWrite::AlreadyExists)
        }
    }

    async fn recompute_vote_count(&self, report_id: i64) -> Result<i64> {
        let row = sqlx::query(
            "UPDATE reports \
             SET vote_count = (SELECT COUNT(*) FROM votes WHERE report_id = $1) \
             WHERE id = $1 \
             RETURNING vote_count",
        )
        .bind(report_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| row.get("vote_count"))
            .ok_or_else(|| anyhow!("report {} not found", report_id))
    }

    async fn insert_comment(
        &self,
        report_id: i64,
        hashed_cpf: &str,
        content: &str,
    ) -> Result<Comment> {
        let row = sqlx::query(
            "INSERT INTO comments (report_id, hashed_cpf, content) VALUES ($1, $2, $3) \
             RETURNING id, report_id, hashed_cpf, content, created_at",
        )
        .bind(report_id)
        .bind(hashed_cpf)
        .bind(content)
        .fetch_one(self.db.pool())
        .await?;

        Ok(Comment {
            id: row.get("id"),
            report_id: row.get("report_id"),
            hashed_cpf: row.get("hashed_cpf"),
            content: row.get("content"),
            created_at: row.get("created_at"),
        })
    }

    async fn recompute_comment_count(&self, report_id: i64) -> Result<i64> {
        let row = sqlx::query(
            "UPDATE reports \
             SET comment_count = (SELECT COUNT(*) FROM comments WHERE report_id = $1) \
             WHERE id = $1 \
             RETURNING comment_count",
        )
        .bind(report_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| row.get("comment_count"))
            .ok_or_else(|| anyhow!("report {} not found", report_id))
    }

    async fn list_comments(
        &self,
        report_id: i64,
        sort: CommentSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CommentDisplay>> {
        let query = format!(
            "SELECT id, report_id, hashed_cpf, content, created_at \
             FROM comments \
             WHERE report_id = $1 \
             ORDER BY {} \
             LIMIT $2 OFFSET $3",
            sort.order_by()
        );
        let rows = sqlx::query(&query)
            .bind(report_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db.pool())
            .await?;

        let mut comments = Vec::with_capacity(rows.len());
        for row in rows {
            let comment = Comment {
                id: row.get("id"),
                report_id: row.get("report_id"),
                hashed_cpf: row.get("hashed_cpf"),
                content: row.get("content"),
                created_at: row.get("created_at"),
            };
            comments.push(CommentDisplay::from(&comment));
        }

        Ok(comments)
    }

    async fn count_comments(&self, report_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM comments WHERE report_id = $1")
            .bind(report_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("total"))
    }

    async fn distinct_cities(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT city FROM reports \
             WHERE city IS NOT NULL AND city <> '' \
             ORDER BY city",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(|row| row.get("city")).collect())
    }

    async fn stored_locations(&self) -> Result<Vec<StoredLocation>> {
        let rows = sqlx::query("SELECT id, location, city FROM reports ORDER BY id")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows
            .iter()
            .map(|row| StoredLocation {
                report_id: row.get("id"),
                location: row.get("location"),
                city: row.get("city"),
            })
            .collect())
    }

    async fn update_city(&self, report_id: i64, city: &str) -> Result<()> {
        sqlx::query("UPDATE reports SET city = $1 WHERE id = $2")
            .bind(city)
            .bind(report_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}
