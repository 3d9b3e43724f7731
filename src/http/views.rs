use serde::Serialize;
use time::macros::{format_description, offset};
use time::OffsetDateTime;

use crate::app::reports::FeedResult;
use crate::config::categories::{
    Category, CategoryCatalog, FieldKind, FormConfiguration, LocationRequirement, SelectOption,
    SensitivityLevel, TransportType,
};
use crate::domain::engagement::CommentDisplay;
use crate::domain::report::{Report, ReportStatus, DEFAULT_TRANSPORT_NAME};
use crate::infra::store::{ReportFilter, ReportSort};

const UNKNOWN_CARD_ICON: &str = "❓";
const UNKNOWN_CARD_NAME: &str = "Desconhecida";
const TRANSPORT_DETAIL_SEPARATOR: &str = " • ";

#[derive(Debug, Serialize)]
pub struct ReportCard {
    pub id: i64,
    pub category: String,
    pub category_icon: String,
    pub category_name: String,
    pub status: ReportStatus,
    pub status_text: &'static str,
    pub location: String,
    pub city: String,
    pub description: String,
    pub photos: Vec<String>,
    pub transport_type: Option<String>,
    pub transport_type_name: Option<String>,
    pub created_at: String,
    pub vote_count: i64,
    pub comment_count: i64,
    pub hashed_cpf_display: String,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
}

#[derive(Debug, Serialize)]
pub struct AppliedFilters {
    pub category: Option<String>,
    pub status: Option<ReportStatus>,
    pub city: Option<String>,
    pub sort: ReportSort,
}

#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub reports: Vec<ReportCard>,
    pub pagination: Pagination,
    pub filters: AppliedFilters,
    pub categories: Vec<SelectOption>,
}

#[derive(Debug, Serialize)]
pub struct ReportDetailPage {
    pub report: ReportCard,
    pub full_category: String,
    pub latitude: f64,
    pub longitude: f64,
    pub show_on_map: bool,
    pub transport_details: String,
    pub comments: Vec<CommentDisplay>,
}

#[derive(Debug, Serialize)]
pub struct MapReport {
    pub id: i64,
    pub category: String,
    pub category_name: String,
    pub category_icon: String,
    pub description: String,
    pub address: String,
    pub status: ReportStatus,
    pub status_text: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct FormPage<'a> {
    pub category: &'a Category,
    pub location_requirement: LocationRequirement,
    pub form: FormConfiguration,
    pub transport_required: bool,
    pub transport_types: &'a [TransportType],
    pub max_files: usize,
    pub allowed_types: &'a [String],
    pub sensitivity: SensitivityLevel,
    pub anonymous_allowed: bool,
    pub identification_required: bool,
    pub subcategories: Vec<SelectOption>,
}

/// `dd/mm/yyyy às HH:MM` in Brasília time.
pub fn format_created_at(created_at: OffsetDateTime) -> String {
    let local = created_at.to_offset(offset!(-3));
    let date = local
        .format(format_description!("[day]/[month]/[year]"))
        .unwrap_or_default();
    let time = local
        .format(format_description!("[hour]:[minute]"))
        .unwrap_or_default();
    format!("{} às {}", date, time)
}

pub fn transport_type_name(catalog: &CategoryCatalog, key: &str) -> String {
    catalog
        .transport_type(key)
        .map(|transport_type| transport_type.name.clone())
        .unwrap_or_else(|_| DEFAULT_TRANSPORT_NAME.to_string())
}

/// Labelled values of the selected transport type, in schema order.
pub fn transport_details(catalog: &CategoryCatalog, report: &Report) -> String {
    let (Some(key), Some(data)) = (&report.transport_type, &report.transport_data) else {
        return String::new();
    };
    let Ok(schema) = catalog.transport_type(key) else {
        return String::new();
    };

    schema
        .fields
        .iter()
        .filter_map(|field| {
            let value = data.get(&field.name)?;
            Some(match field.kind {
                FieldKind::Textarea => value.to_string(),
                _ => format!("{}: {}", field.label, value),
            })
        })
        .collect::<Vec<_>>()
        .join(TRANSPORT_DETAIL_SEPARATOR)
}

pub fn report_card(catalog: &CategoryCatalog, report: &Report) -> ReportCard {
    let (category_icon, category_name) = match catalog.category(&report.problem_type) {
        Ok(category) => (category.icon.clone(), category.name.clone()),
        Err(_) => (UNKNOWN_CARD_ICON.to_string(), UNKNOWN_CARD_NAME.to_string()),
    };

    ReportCard {
        id: report.id,
        category: report.problem_type.clone(),
        category_icon,
        category_name,
        status: report.status,
        status_text: report.status_text(),
        location: report.location.clone(),
        city: report.city.clone(),
        description: report.description.clone(),
        photos: report.photos(),
        transport_type: report.transport_type.clone(),
        transport_type_name: report
            .transport_type
            .as_deref()
            .map(|key| transport_type_name(catalog, key)),
        created_at: format_created_at(report.created_at),
        vote_count: report.vote_count,
        comment_count: report.comment_count,
        hashed_cpf_display: report.identity_display(),
    }
}

pub fn feed_page(
    catalog: &CategoryCatalog,
    feed: &FeedResult,
    filter: ReportFilter,
    sort: ReportSort,
) -> FeedPage {
    FeedPage {
        reports: feed
            .reports
            .iter()
            .map(|report| report_card(catalog, report))
            .collect(),
        pagination: Pagination {
            page: feed.page,
            per_page: feed.per_page,
            total: feed.total,
            total_pages: feed.total_pages,
            has_prev: feed.page > 1,
            has_next: feed.page < feed.total_pages,
        },
        filters: AppliedFilters {
            category: filter.category,
            status: filter.status,
            city: filter.city,
            sort,
        },
        categories: catalog.category_options(),
    }
}

pub fn report_detail(
    catalog: &CategoryCatalog,
    report: &Report,
    comments: Vec<CommentDisplay>,
) -> ReportDetailPage {
    ReportDetailPage {
        report: report_card(catalog, report),
        full_category: catalog.full_category_path(&report.problem_type, None),
        latitude: report.latitude,
        longitude: report.longitude,
        show_on_map: catalog
            .should_show_on_public_map(&report.problem_type, report.has_coordinates()),
        transport_details: transport_details(catalog, report),
        comments,
    }
}

pub fn map_report(catalog: &CategoryCatalog, report: &Report) -> MapReport {
    let card = report_card(catalog, report);
    MapReport {
        id: report.id,
        category: card.category,
        category_name: card.category_name,
        category_icon: card.category_icon,
        description: card.description,
        address: card.location,
        status: card.status,
        status_text: card.status_text,
        latitude: report.latitude,
        longitude: report.longitude,
    }
}

pub fn form_page<'a>(catalog: &'a CategoryCatalog, category: &'a Category) -> FormPage<'a> {
    let policy = catalog.upload_policy(&category.id);
    FormPage {
        category,
        location_requirement: catalog.location_requirement(&category.id),
        form: catalog.form_configuration(&category.id),
        transport_required: catalog.is_transport_required(&category.id),
        transport_types: catalog.transport_types(),
        max_files: policy.max_files,
        allowed_types: &policy.allowed_types,
        sensitivity: catalog.sensitivity(&category.id),
        anonymous_allowed: catalog.is_anonymous_allowed(&category.id),
        identification_required: catalog.is_identification_required(&category.id),
        subcategories: catalog.subcategory_options(&category.id).unwrap_or_default(),
    }
}
