//! Visit counter service: every `GET /` adds one to a counter kept under the
//! `visits` key of a Redis store and reports it back.

pub mod prelude {
    pub use super::counter::{CounterService, IncrementStrategy, InitPolicy, Visit, VISITS_KEY};
    pub use super::metrics::{metric_counter, metric_gauge, metric_histogram};
    pub use super::store::{KeyValueStore, MemoryStore, RedisStore, StoreError};
    pub use super::visits::{Report, ResponseFormat, VisitsView};
    pub use super::App;
    pub use super::AppError;
    pub use super::AppResult;
    pub use axum::extract::Json;
    pub use axum::response::IntoResponse;
    pub use axum::routing::get;
    pub use axum::{Extension, Router};
    pub use tracing::{debug, error, info, trace, warn};
}

mod app;
pub mod config;
pub mod counter;
mod errors;
pub mod metrics;
pub mod store;
pub mod visits;

pub use app::App;
pub use errors::{AppError, AppResult, FAILURE_BODY};
