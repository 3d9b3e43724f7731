use anyhow::Result;
use tracing::{info, warn};

use crate::domain::city;
use crate::infra::store::ReportStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub scanned: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Re-derives the `city` column of every stored report from its free-form location.
pub async fn run(store: &dyn ReportStore) -> Result<BackfillSummary> {
    let locations = store.stored_locations().await?;
    let mut summary = BackfillSummary {
        scanned: locations.len(),
        ..BackfillSummary::default()
    };

    for stored in locations {
        let extracted = city::extract_city(&stored.location);
        if extracted == stored.city {
            continue;
        }

        match store.update_city(stored.report_id, &extracted).await {
            Ok(()) => summary.updated += 1,
            Err(err) => {
                summary.failed += 1;
                warn!(error = ?err, report_id = stored.report_id, "failed to update report city");
            }
        }
    }

    info!(
        scanned = summary.scanned,
        updated = summary.updated,
        failed = summary.failed,
        "city backfill finished"
    );
    Ok(summary)
}
