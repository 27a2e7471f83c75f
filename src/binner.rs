//! Fixed-window binning of aggregated rows.

use crate::logging::{self, Component};
use crate::model::{BucketedSeries, BuildingId, StoreError};
use crate::planner::QueryPlan;
use crate::store::ReadingStore;

/// Runs `plan` for `building` and folds the rows into a series of exactly
/// `plan.bucket_count` slots.
///
/// Buckets without rows stay empty. A row whose position falls outside the
/// window is discarded; a later row for the same position overwrites an
/// earlier one.
pub fn bin(
    store: &dyn ReadingStore,
    plan: &QueryPlan,
    building: BuildingId,
) -> Result<BucketedSeries, StoreError> {
    let mut series = BucketedSeries::empty(plan.bucket_count);

    for row in store.bucket_rows(plan, building)? {
        if !series.place(&row) {
            logging::debug(
                Component::Planner,
                Some(&building.to_string()),
                &format!(
                    "discarded row at position {} outside {} buckets ({:?})",
                    row.position, plan.bucket_count, plan.granularity
                ),
            );
        }
    }

    Ok(series)
}
