/// Integration tests for the HTTP read API
///
/// Serves the axum router on an ephemeral local port, backed by an
/// in-memory store, and queries it with reqwest:
/// 1. Bucketed series have the window length and nulls for empty buckets
/// 2. The week view starts on Monday
/// 3. Latest snapshot endpoint mirrors the push payload
/// 4. Invalid period, type, date or building id is a 400
/// 5. A failing store is a 500 on both endpoints
///
/// Run with: cargo test --test http_api

use chrono::NaiveDateTime;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

use meteo_service::http;
use meteo_service::model::{BucketRow, BuildingId, Reading, StoreError, TIMESTAMP_FORMAT};
use meteo_service::planner::QueryPlan;
use meteo_service::store::{MemoryStore, ReadingStore};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn reading(ts: &str, t: f64, p: f64, h: f64) -> Reading {
    Reading {
        building_id: BuildingId::new(3).unwrap(),
        measured_at: NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).unwrap(),
        temperature: Some(t),
        pressure: Some(p),
        humidity: Some(h),
    }
}

/// A store whose database is gone.
struct UnreachableStore;

impl ReadingStore for UnreachableStore {
    fn bucket_rows(&self, _plan: &QueryPlan, _building: BuildingId) -> Result<Vec<BucketRow>, StoreError> {
        Err(StoreError::Connect("connection refused".to_string()))
    }

    fn latest_reading(&self, _building: BuildingId) -> Result<Option<Reading>, StoreError> {
        Err(StoreError::Connect("connection refused".to_string()))
    }
}

async fn serve(store: Arc<dyn ReadingStore>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(http::serve_http(listener, store));
    format!("http://{}", addr)
}

async fn start_server() -> String {
    let store = MemoryStore::new(vec![
        reading("2020-01-06 08:00:00", 10.0, 1000.0, 50.0),
        reading("2020-01-06 08:40:00", 12.0, 1002.0, 70.0),
        reading("2020-01-08 14:00:00", 4.0, 990.0, 80.0),
        reading("2020-03-15 09:00:00", 18.0, 1015.0, 40.0),
    ]);
    serve(Arc::new(store)).await
}

async fn get(url: &str) -> (u16, String) {
    let response = reqwest::get(url).await.expect("request sent");
    let status = response.status().as_u16();
    let body = response.text().await.expect("body read");
    (status, body)
}

async fn get_json(url: &str) -> Value {
    let (status, body) = get(url).await;
    assert_eq!(status, 200, "unexpected status for {}: {}", url, body);
    serde_json::from_str(&body).expect("JSON body")
}

// ---------------------------------------------------------------------------
// Bucketed series
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_day_average_series() {
    let base = start_server().await;
    let body = get_json(&format!(
        "{}/api/donnees?periode=jour&type=moy&idImmeuble=3&date=2020-01-06",
        base
    ))
    .await;

    for key in ["temperatures", "pressions", "humidites"] {
        assert_eq!(body[key].as_array().unwrap().len(), 24, "{} length", key);
    }
    assert_eq!(body["temperatures"][8], json!(11.0));
    assert_eq!(body["humidites"][8], json!(60.0));
    assert_eq!(body["temperatures"][7], Value::Null);
    assert_eq!(body["temperatures"][9], Value::Null);
}

#[tokio::test]
async fn test_week_series_starts_on_monday() {
    let base = start_server().await;
    let body = get_json(&format!(
        "{}/api/donnees?period=semaine&type=min&idImmeuble=3&date=2020-01-06",
        base
    ))
    .await;

    assert_eq!(
        body["temperatures"],
        json!([10.0, null, 4.0, null, null, null, null])
    );
}

#[tokio::test]
async fn test_year_and_month_windows() {
    let base = start_server().await;

    let year = get_json(&format!(
        "{}/api/donnees?periode=annee&type=max&idImmeuble=3&date=2020",
        base
    ))
    .await;
    assert_eq!(year["temperatures"].as_array().unwrap().len(), 12);
    assert_eq!(year["temperatures"][0], json!(12.0));
    assert_eq!(year["temperatures"][2], json!(18.0));
    assert_eq!(year["temperatures"][1], Value::Null);

    let february = get_json(&format!(
        "{}/api/donnees?periode=mois&type=max&idImmeuble=3&date=2020-02",
        base
    ))
    .await;
    let days = february["pressions"].as_array().unwrap();
    assert_eq!(days.len(), 29);
    assert!(days.iter().all(Value::is_null));
}

// ---------------------------------------------------------------------------
// Latest snapshot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_latest_snapshot() {
    let base = start_server().await;

    let body = get_json(&format!("{}/api/dernieres-donnees?idImmeuble=3", base)).await;
    assert_eq!(
        body,
        json!({
            "temperature": 18.0,
            "pression": 1015.0,
            "humidite": 40.0,
            "timestamp": "2020-03-15 09:00:00",
        })
    );

    let empty = get_json(&format!("{}/api/dernieres-donnees?idImmeuble=4", base)).await;
    assert_eq!(empty["timestamp"], Value::Null);
}

// ---------------------------------------------------------------------------
// Rejected requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_invalid_requests_are_bad_requests() {
    let base = start_server().await;

    for query in [
        "periode=decennie&type=max&idImmeuble=3&date=2020",
        "periode=annee&type=median&idImmeuble=3&date=2020",
        "periode=mois&type=max&idImmeuble=3&date=2020-13",
        "periode=semaine&type=max&idImmeuble=3&date=lundi",
        "periode=annee&type=max&idImmeuble=-3&date=2020",
    ] {
        let (status, body) = get(&format!("{}/api/donnees?{}", base, query)).await;
        assert_eq!(status, 400, "{} should be rejected, got body {}", query, body);
    }

    let (status, _) = get(&format!("{}/api/dernieres-donnees?idImmeuble=0", base)).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_store_failure_is_server_error() {
    let base = serve(Arc::new(UnreachableStore)).await;

    let (status, body) = get(&format!(
        "{}/api/donnees?periode=jour&type=moy&idImmeuble=3&date=2020-01-06",
        base
    ))
    .await;
    assert_eq!(status, 500);
    assert!(!body.contains("connection refused"), "store detail leaked: {}", body);

    let (status, _) = get(&format!("{}/api/dernieres-donnees?idImmeuble=3", base)).await;
    assert_eq!(status, 500);

    // Request validation still runs before the store is touched
    let (status, _) = get(&format!("{}/api/dernieres-donnees?idImmeuble=0", base)).await;
    assert_eq!(status, 400);
}
