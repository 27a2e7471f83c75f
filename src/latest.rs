//! Latest-reading lookup for the live feed.

use crate::model::{BuildingId, LatestSnapshot, StoreError};
use crate::store::ReadingStore;

/// The most recent reading of `building`, or the empty snapshot when the
/// building has never reported. Only store failures are errors.
pub fn fetch_latest(store: &dyn ReadingStore, building: BuildingId) -> Result<LatestSnapshot, StoreError> {
    Ok(store
        .latest_reading(building)?
        .map(LatestSnapshot::from)
        .unwrap_or_else(LatestSnapshot::empty))
}
