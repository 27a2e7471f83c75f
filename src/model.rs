/// Core data types for the weather station read service.
///
/// This module defines the shared domain model imported by all other modules:
/// raw readings, the aggregated rows returned by a store, the two response
/// payloads (bucketed series and latest snapshot), and the error types.
/// It contains no I/O.

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

/// Timestamp format used by the `donnees_capteurs.date_mesure` column and
/// by every JSON payload sent to clients, e.g. "2020-01-01 12:15:00".
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a building (`immeubles.id_immeuble`). Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildingId(i32);

impl BuildingId {
    /// Returns `None` for zero, negative, or out-of-range values.
    pub fn new(raw: i64) -> Option<Self> {
        i32::try_from(raw).ok().filter(|id| *id > 0).map(BuildingId)
    }

    /// Parses a bare textual id such as `"7"` or `" 7\n"`.
    ///
    /// Anything that is not a plain positive integer yields `None`:
    /// `"abc"`, `"-3"`, `"0"`, `"7abc"`, `""`.
    pub fn parse(text: &str) -> Option<Self> {
        text.trim().parse::<i64>().ok().and_then(Self::new)
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for BuildingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// One sensor transmission, as stored in `donnees_capteurs`.
///
/// Readings are written by the ingestion path and never mutated here.
/// Any measurement column may be NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub building_id: BuildingId,
    pub measured_at: NaiveDateTime,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
}

/// One aggregated row produced by a bucket query: the bucket position and
/// the reduced value of each measurement within that bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRow {
    pub position: i64,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Three parallel fixed-length series, one slot per time bucket.
///
/// The three vectors always have the same length; a bucket with no
/// contributing reading is `None` in all of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketedSeries {
    #[serde(rename = "temperatures")]
    temperature: Vec<Option<f64>>,
    #[serde(rename = "pressions")]
    pressure: Vec<Option<f64>>,
    #[serde(rename = "humidites")]
    humidity: Vec<Option<f64>>,
}

impl BucketedSeries {
    /// A series of `bucket_count` empty slots.
    pub fn empty(bucket_count: usize) -> Self {
        Self {
            temperature: vec![None; bucket_count],
            pressure: vec![None; bucket_count],
            humidity: vec![None; bucket_count],
        }
    }

    /// Writes `row` into its bucket, overwriting whatever was there.
    ///
    /// Returns `false`, leaving the series untouched, when the row's
    /// position is negative or past the last bucket.
    pub fn place(&mut self, row: &BucketRow) -> bool {
        let index = match usize::try_from(row.position) {
            Ok(index) if index < self.len() => index,
            _ => return false,
        };

        self.temperature[index] = row.temperature;
        self.pressure[index] = row.pressure;
        self.humidity[index] = row.humidity;
        true
    }

    pub fn len(&self) -> usize {
        self.temperature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_empty()
    }

    pub fn temperature(&self) -> &[Option<f64>] {
        &self.temperature
    }

    pub fn pressure(&self) -> &[Option<f64>] {
        &self.pressure
    }

    pub fn humidity(&self) -> &[Option<f64>] {
        &self.humidity
    }
}

/// The most recent reading of a building, or all-`None` if it has none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestSnapshot {
    pub temperature: Option<f64>,
    #[serde(rename = "pression")]
    pub pressure: Option<f64>,
    #[serde(rename = "humidite")]
    pub humidity: Option<f64>,
    #[serde(rename = "timestamp", serialize_with = "serialize_timestamp")]
    pub measured_at: Option<NaiveDateTime>,
}

impl LatestSnapshot {
    /// The "no data" snapshot sent for a building without readings.
    pub fn empty() -> Self {
        Self {
            temperature: None,
            pressure: None,
            humidity: None,
            measured_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.measured_at.is_none()
    }
}

impl From<Reading> for LatestSnapshot {
    fn from(reading: Reading) -> Self {
        Self {
            temperature: reading.temperature,
            pressure: reading.pressure,
            humidity: reading.humidity,
            measured_at: Some(reading.measured_at),
        }
    }
}

fn serialize_timestamp<S: Serializer>(
    value: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(ts) => serializer.collect_str(&ts.format(TIMESTAMP_FORMAT)),
        None => serializer.serialize_none(),
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A request that cannot be planned. Fatal for that request; never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The period is not one of `annee`, `mois`, `semaine`, `jour`.
    UnknownGranularity(String),
    /// The aggregation type is not one of `max`, `moy`, `min`.
    UnknownAggregation(String),
    /// The reference date does not have the shape the period needs.
    InvalidReferenceDate { date: String, expected: &'static str },
    /// The building id is missing, zero, or negative.
    InvalidBuilding(String),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::UnknownGranularity(p) => write!(f, "Invalid period: {}", p),
            RequestError::UnknownAggregation(t) => write!(f, "Invalid data type: {}", t),
            RequestError::InvalidReferenceDate { date, expected } => {
                write!(f, "Invalid reference date {:?}: expected {}", date, expected)
            }
            RequestError::InvalidBuilding(id) => write!(f, "Invalid building id: {}", id),
        }
    }
}

impl std::error::Error for RequestError {}

/// Errors raised while talking to a reading store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A new database session could not be opened.
    Connect(String),
    /// The query itself failed (syntax, missing table, broken connection...).
    Query(String),
    /// Every pooled connection stayed busy for the whole acquire timeout.
    PoolTimeout { waited_secs: u64 },
    /// The blocking task running the query panicked or was cancelled.
    Task(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Connect(msg) => write!(f, "Connection error: {}", msg),
            StoreError::Query(msg) => write!(f, "Query error: {}", msg),
            StoreError::PoolTimeout { waited_secs } => {
                write!(f, "No database connection available after {}s timeout", waited_secs)
            }
            StoreError::Task(msg) => write!(f, "Store task failed: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<postgres::Error> for StoreError {
    fn from(err: postgres::Error) -> Self {
        StoreError::Query(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
