pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::sync::Arc;

use crate::app::notifications::Notifier;
use crate::app::verification::IdentityVerifier;
use crate::config::categories::CategoryCatalog;
use crate::infra::store::ReportStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReportStore>,
    pub catalog: Arc<CategoryCatalog>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub notifier: Notifier,
    pub reports_per_page: i64,
}
