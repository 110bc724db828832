//! The `GET /` visit endpoint.

use std::{str::FromStr, time::Instant};

use axum::{
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json,
};
use serde::Serialize;
use tracing::error;

use crate::{
    counter::{CounterService, InitPolicy, Visit},
    metrics::{record_store_error, record_visit},
    App, AppResult,
};

/// Body shape of a successful visit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// `Number of visits is N`
    #[default]
    Text,
    /// `{"message": "...", "visits": N}`
    Json,
}

/// Which side of the increment is shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Previous,
    Current,
}

impl Report {
    /// Text responses historically showed the count before the visit, json
    /// ones the count after it.
    pub fn default_for(format: ResponseFormat) -> Self {
        match format {
            ResponseFormat::Text => Self::Previous,
            ResponseFormat::Json => Self::Current,
        }
    }

    pub fn pick(self, visit: Visit) -> u64 {
        match self {
            Self::Previous => visit.previous,
            Self::Current => visit.current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitsView {
    pub format: ResponseFormat,
    pub report: Report,
}

impl Default for VisitsView {
    fn default() -> Self {
        Self {
            format: ResponseFormat::Text,
            report: Report::Previous,
        }
    }
}

#[derive(Serialize)]
struct VisitBody {
    message: &'static str,
    visits: u64,
}

impl VisitsView {
    pub fn render(self, visit: Visit) -> Response {
        let visits = self.report.pick(visit);
        match self.format {
            ResponseFormat::Text => format!("Number of visits is {visits}").into_response(),
            ResponseFormat::Json => Json(VisitBody {
                message: "Visit recorded",
                visits,
            })
            .into_response(),
        }
    }
}

/// Initializes the counter, then mounts `GET /` on `app`.
///
/// A failed initialization is logged and the route is mounted anyway, so the
/// service answers (with errors) while the store is down.
pub async fn mount(app: App, counter: CounterService, init: InitPolicy, view: VisitsView) -> App {
    if let Err(e) = counter.initialize(init).await {
        error!("Error initializing redis: {e:#}");
    }
    app.route("/", get(index)).inject(counter).inject(view)
}

pub async fn index(
    Extension(counter): Extension<CounterService>,
    Extension(view): Extension<VisitsView>,
) -> AppResult<Response> {
    let started = Instant::now();
    match counter.increment_and_get().await {
        Ok(visit) => {
            record_visit(&visit, started.elapsed());
            Ok(view.render(visit))
        }
        Err(e) => {
            record_store_error(started.elapsed());
            Err(e.into())
        }
    }
}

impl FromStr for ResponseFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("unknown response format {other:?}, expected text or json"),
        }
    }
}

impl FromStr for Report {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "previous" => Ok(Self::Previous),
            "current" => Ok(Self::Current),
            other => anyhow::bail!("unknown report {other:?}, expected previous or current"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VISIT: Visit = Visit {
        previous: 4,
        current: 5,
    };

    #[test]
    fn picks_side_of_increment() {
        assert_eq!(Report::Previous.pick(VISIT), 4);
        assert_eq!(Report::Current.pick(VISIT), 5);
        assert_eq!(Report::default_for(ResponseFormat::Json), Report::Current);
        assert_eq!(Report::default_for(ResponseFormat::Text), Report::Previous);
    }

    #[test]
    fn parses_names() {
        assert_eq!("JSON".parse::<ResponseFormat>().unwrap(), ResponseFormat::Json);
        assert_eq!("current".parse::<Report>().unwrap(), Report::Current);
        assert!("xml".parse::<ResponseFormat>().is_err());
    }
}
