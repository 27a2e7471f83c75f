//! PostgreSQL reading store.
//!
//! Runs the planner's fixed statements against `donnees_capteurs` through a
//! [`ClientPool`]. Request data only ever reaches the database as bound
//! parameters.

use chrono::NaiveDateTime;
use postgres::types::ToSql;
use std::time::Duration;

use super::pool::{ClientPool, PoolConfig};
use super::ReadingStore;
use crate::config::DatabaseConfig;
use crate::model::{BucketRow, BuildingId, Reading, StoreError};
use crate::planner::{DateFilter, QueryPlan};

const LATEST_READING_QUERY: &str = "
    SELECT temperature, pression, humidite, date_mesure
    FROM donnees_capteurs
    WHERE id_immeuble = $1
    ORDER BY date_mesure DESC
    LIMIT 1
";

/// Tables every deployment must have. Only `donnees_capteurs` is read here;
/// the location tables are checked because readings reference them.
const REQUIRED_TABLES: &[&str] = &["regions", "departements", "villes", "immeubles", "donnees_capteurs"];

pub struct PgStore {
    pool: ClientPool,
}

impl PgStore {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            pool: ClientPool::new(PoolConfig {
                url: config.url.clone(),
                max_size: config.pool_size,
                acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
            }),
        }
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    /// Connects once and checks that the expected tables exist.
    ///
    /// Returns the names of missing tables as a `Query` error.
    pub fn verify_schema(&self) -> Result<(), StoreError> {
        let mut client = self.pool.get()?;
        let mut missing = Vec::new();

        for table in REQUIRED_TABLES {
            let row = client.query_one(
                "SELECT EXISTS (
                     SELECT 1 FROM information_schema.tables
                     WHERE table_schema = current_schema() AND table_name = $1
                 )",
                &[table],
            )?;
            if !row.get::<_, bool>(0) {
                missing.push(*table);
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Query(format!(
                "missing tables: {} (apply sql/001_base_schema.sql)",
                missing.join(", ")
            )))
        }
    }
}

impl ReadingStore for PgStore {
    fn bucket_rows(&self, plan: &QueryPlan, building: BuildingId) -> Result<Vec<BucketRow>, StoreError> {
        let building_id = building.get();
        let pattern: String;
        let start: NaiveDateTime;
        let end: NaiveDateTime;

        let params: Vec<&(dyn ToSql + Sync)> = match &plan.filter {
            DateFilter::Prefix(prefix) => {
                pattern = DateFilter::like_pattern(prefix);
                vec![&building_id, &pattern]
            }
            DateFilter::Range { start: s, end: e } => {
                start = *s;
                end = *e;
                vec![&building_id, &start, &end]
            }
        };

        let mut client = self.pool.get()?;
        let rows = client.query(plan.sql, &params)?;

        rows.iter()
            .map(|row| -> Result<BucketRow, StoreError> {
                Ok(BucketRow {
                    position: i64::from(row.try_get::<_, i32>("pos")?),
                    temperature: row.try_get("temp")?,
                    pressure: row.try_get("press")?,
                    humidity: row.try_get("hum")?,
                })
            })
            .collect()
    }

    fn latest_reading(&self, building: BuildingId) -> Result<Option<Reading>, StoreError> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(LATEST_READING_QUERY, &[&building.get()])?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Reading {
            building_id: building,
            temperature: row.try_get("temperature")?,
            pressure: row.try_get("pression")?,
            humidity: row.try_get("humidite")?,
            measured_at: row.try_get("date_mesure")?,
        }))
    }
}
