/// Reading stores.
///
/// A store answers the two questions the service asks about
/// `donnees_capteurs`: the aggregated rows of a [`QueryPlan`] for a
/// building, and the most recent reading of a building.
///
/// Submodules:
/// - `pool`   — bounded pool of blocking PostgreSQL clients.
/// - `pg`     — the PostgreSQL store used in production.
/// - `memory` — an in-memory store with the same semantics, used by the tests.

pub mod memory;
pub mod pg;
pub mod pool;

pub use memory::MemoryStore;
pub use pg::PgStore;

use crate::model::{BucketRow, BuildingId, Reading, StoreError};
use crate::planner::QueryPlan;

/// Blocking access to the readings table.
///
/// Implementations may block on I/O; async callers run them through
/// `tokio::task::spawn_blocking`.
pub trait ReadingStore: Send + Sync {
    /// Runs `plan` for `building` and returns one row per non-empty bucket,
    /// ordered by position.
    fn bucket_rows(&self, plan: &QueryPlan, building: BuildingId) -> Result<Vec<BucketRow>, StoreError>;

    /// The reading with the greatest timestamp for `building`, if any.
    fn latest_reading(&self, building: BuildingId) -> Result<Option<Reading>, StoreError>;
}
