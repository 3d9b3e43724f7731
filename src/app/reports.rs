use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::notifications::Notifier;
use crate::app::validation::{convert_birth_date_to_iso, AttachedFile, FormValidator, ReportForm};
use crate::app::verification::{IdentityVerifier, IDENTITY_MISMATCH_MESSAGE};
use crate::config::categories::{CatalogError, CategoryCatalog};
use crate::domain::city;
use crate::domain::identity;
use crate::domain::report::{NewReport, Report, TransportData};
use crate::infra::store::{ReportFilter, ReportSort, ReportStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSubmission {
    #[serde(flatten)]
    pub form: ReportForm,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub transport_type: Option<String>,
    /// Raw transport inputs keyed by field name; only the selected type's fields are kept.
    #[serde(default)]
    pub transport_fields: HashMap<String, String>,
    #[serde(default)]
    pub files: Vec<AttachedFile>,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Created { id: i64 },
    Invalid { errors: Vec<String> },
    NotFound(CatalogError),
}

#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    pub filter: ReportFilter,
    pub sort: ReportSort,
    pub page: i64,
}

#[derive(Debug, Clone)]
pub struct FeedResult {
    pub reports: Vec<Report>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportStats {
    pub total: i64,
    pub this_month: i64,
    pub resolved: i64,
    pub pending: i64,
    pub resolution_rate: i64,
}

impl ReportStats {
    pub fn from_counts(total: i64, this_month: i64, resolved: i64) -> Self {
        let resolution_rate = if total > 0 { resolved * 100 / total } else { 0 };
        Self {
            total,
            this_month,
            resolved,
            pending: total - resolved,
            resolution_rate,
        }
    }
}

/// Transport fields of the selected type, trimmed; `None` when every field is blank.
pub fn collect_transport_data(
    catalog: &CategoryCatalog,
    transport_type: &str,
    fields: &HashMap<String, String>,
) -> Result<Option<TransportData>, CatalogError> {
    let schema = catalog.transport_type(transport_type)?;
    Ok(TransportData::from_fields(schema.fields.iter().map(|field| {
        let value = fields.get(&field.name).map(String::as_str).unwrap_or("");
        (field.name.clone(), value)
    })))
}

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn ReportStore>,
    catalog: Arc<CategoryCatalog>,
    verifier: Arc<dyn IdentityVerifier>,
    notifier: Notifier,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn ReportStore>,
        catalog: Arc<CategoryCatalog>,
        verifier: Arc<dyn IdentityVerifier>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            catalog,
            verifier,
            notifier,
        }
    }

    pub async fn submit(&self, submission: ReportSubmission) -> Result<SubmitOutcome> {
        let form = &submission.form;
        let mut errors = Vec::new();

        match self
            .catalog
            .validate_category(&form.category, submission.subcategory.as_deref())
        {
            Ok(()) => {}
            Err(CatalogError::SubcategoryRequired(_)) => {
                errors.push("Subcategoria é obrigatória".to_string());
            }
            Err(err) => return Ok(SubmitOutcome::NotFound(err)),
        }

        let validator = FormValidator::new(self.catalog.clone());
        errors.extend(validator.validate(form));
        errors.extend(validator.validate_files(&form.category, &submission.files));

        let (transport_type, transport_data) = self.resolve_transport(&submission, &mut errors);

        if errors.is_empty() {
            if let Some(message) = self.verify_identity(form).await {
                errors.push(message);
            }
        }
        if !errors.is_empty() {
            return Ok(SubmitOutcome::Invalid { errors });
        }

        let birth_date =
            convert_birth_date_to_iso(form.birth_date.trim()).unwrap_or_else(|_| form.birth_date.clone());
        let photo_path = submission
            .files
            .iter()
            .map(|file| file.path.trim())
            .filter(|path| !path.is_empty())
            .collect::<Vec<_>>()
            .join(",");

        let hashed_cpf = identity::hash(&form.cpf);
        let reporter = identity::display_hash(&hashed_cpf);
        let report = NewReport {
            problem_type: form.category.clone(),
            hashed_cpf,
            birth_date,
            email: form.email.trim().to_string(),
            location: form.location.trim().to_string(),
            city: city::extract_city(&form.location),
            latitude: form.latitude,
            longitude: form.longitude,
            description: form.description.trim().to_string(),
            photo_path,
            transport_type,
            transport_data,
        };

        let id = self.store.insert_report(report).await?;
        info!(
            report_id = id,
            category = %form.category,
            reporter = %reporter,
            "report created"
        );

        let category_name = self.catalog.category_name(&form.category);
        if !self
            .notifier
            .send_confirmation(form.email.trim(), id, &category_name)
        {
            warn!(report_id = id, "confirmation email not queued");
        }

        Ok(SubmitOutcome::Created { id })
    }

    fn resolve_transport(
        &self,
        submission: &ReportSubmission,
        errors: &mut Vec<String>,
    ) -> (Option<String>, Option<TransportData>) {
        let category = &submission.form.category;
        if !self.catalog.is_transport_required(category) {
            return (None, None);
        }

        let Some(transport_type) = submission
            .transport_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return (None, None);
        };

        let schema = match self.catalog.transport_type(transport_type) {
            Ok(schema) => schema,
            Err(_) => {
                errors.push("Tipo de transporte inválido".to_string());
                return (None, None);
            }
        };

        for field in schema.fields.iter().filter(|field| field.required) {
            let provided = submission
                .transport_fields
                .get(&field.name)
                .is_some_and(|value| !value.trim().is_empty());
            if !provided {
                errors.push(format!("{} é obrigatório", field.label));
            }
        }

        let data = collect_transport_data(&self.catalog, transport_type, &submission.transport_fields)
            .unwrap_or_default();
        (Some(transport_type.to_string()), data)
    }

    /// Only an explicit negative answer blocks the submission.
    async fn verify_identity(&self, form: &ReportForm) -> Option<String> {
        let birth_date = convert_birth_date_to_iso(form.birth_date.trim()).ok()?;
        match self.verifier.verify(&form.cpf, &birth_date).await {
            Ok(verification) if !verification.valid => Some(IDENTITY_MISMATCH_MESSAGE.to_string()),
            Ok(_) => None,
            Err(err) => {
                warn!(error = ?err, "identity verifier failed during submission");
                None
            }
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<Report>> {
        self.store.find_report(id).await
    }

    pub async fn feed(&self, query: FeedQuery, per_page: i64) -> Result<FeedResult> {
        let per_page = per_page.max(1);
        let page = query.page.max(1);
        let offset = (page - 1).saturating_mul(per_page);

        let total = self.store.count_reports(&query.filter).await?;
        let reports = if offset >= total {
            Vec::new()
        } else {
            self.store
                .list_reports(&query.filter, query.sort, per_page, offset)
                .await?
        };
        let total_pages = if total == 0 { 0 } else { (total - 1) / per_page + 1 };

        Ok(FeedResult {
            reports,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    /// Located reports whose category may appear on the public map.
    pub async fn map(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        let reports = self.store.map_reports(filter).await?;
        Ok(reports
            .into_iter()
            .filter(|report| {
                self.catalog
                    .should_show_on_public_map(&report.problem_type, true)
            })
            .collect())
    }

    pub async fn cities(&self) -> Result<Vec<String>> {
        self.store.distinct_cities().await
    }

    pub async fn stats(&self) -> Result<ReportStats> {
        let counts = self.store.report_counts().await?;
        Ok(ReportStats::from_counts(
            counts.total,
            counts.this_month,
            counts.resolved,
        ))
    }
}
