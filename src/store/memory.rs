//! In-memory reading store.
//!
//! Holds a fixed set of readings and evaluates plans in Rust with the same
//! bucket positions, filters and reductions as the PostgreSQL statements.
//! Used by the tests in place of PostgreSQL.

use chrono::{Datelike, Timelike};
use std::collections::BTreeMap;

use super::ReadingStore;
use crate::model::{BucketRow, BuildingId, Reading, StoreError, TIMESTAMP_FORMAT};
use crate::planner::{AggregationKind, DateFilter, Granularity, QueryPlan};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    readings: Vec<Reading>,
}

impl MemoryStore {
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings }
    }

    fn readings_of(&self, building: BuildingId) -> impl Iterator<Item = &Reading> {
        self.readings.iter().filter(move |r| r.building_id == building)
    }
}

impl ReadingStore for MemoryStore {
    fn bucket_rows(&self, plan: &QueryPlan, building: BuildingId) -> Result<Vec<BucketRow>, StoreError> {
        let mut buckets: BTreeMap<i64, Vec<&Reading>> = BTreeMap::new();

        for reading in self.readings_of(building).filter(|r| matches_filter(r, &plan.filter)) {
            buckets
                .entry(bucket_position(reading, plan.granularity))
                .or_default()
                .push(reading);
        }

        Ok(buckets
            .into_iter()
            .map(|(position, readings)| BucketRow {
                position,
                temperature: reduce(plan.kind, readings.iter().filter_map(|r| r.temperature)),
                pressure: reduce(plan.kind, readings.iter().filter_map(|r| r.pressure)),
                humidity: reduce(plan.kind, readings.iter().filter_map(|r| r.humidity)),
            })
            .collect())
    }

    fn latest_reading(&self, building: BuildingId) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .readings_of(building)
            .max_by_key(|r| r.measured_at)
            .cloned())
    }
}

fn matches_filter(reading: &Reading, filter: &DateFilter) -> bool {
    match filter {
        DateFilter::Prefix(prefix) => reading
            .measured_at
            .format(TIMESTAMP_FORMAT)
            .to_string()
            .starts_with(prefix.as_str()),
        DateFilter::Range { start, end } => (*start..=*end).contains(&reading.measured_at),
    }
}

fn bucket_position(reading: &Reading, granularity: Granularity) -> i64 {
    let ts = reading.measured_at;
    let position = match granularity {
        Granularity::Year => ts.month0(),
        Granularity::Month => ts.day0(),
        Granularity::Week => ts.weekday().num_days_from_monday(),
        Granularity::Day => ts.hour(),
    };
    i64::from(position)
}

/// SQL aggregate semantics: NULLs are skipped, an all-NULL group gives NULL.
fn reduce(kind: AggregationKind, values: impl Iterator<Item = f64>) -> Option<f64> {
    match kind {
        AggregationKind::Maximum => values.reduce(f64::max),
        AggregationKind::Minimum => values.reduce(f64::min),
        AggregationKind::Average => {
            let (sum, count) = values.fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
            (count > 0).then(|| sum / f64::from(count))
        }
    }
}
