//! Weather station read service.
//!
//! Serves sensor readings (temperature, pressure, humidity) recorded per
//! building in two shapes:
//! - historical aggregates binned into fixed time buckets
//!   (`planner` + `binner`), over HTTP (`http`);
//! - the latest reading of a building, pushed over WebSocket on request
//!   (`latest` + `push`).

pub mod binner;
pub mod config;
pub mod http;
pub mod latest;
pub mod logging;
pub mod model;
pub mod planner;
pub mod push;
pub mod store;
