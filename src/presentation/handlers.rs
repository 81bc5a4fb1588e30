// HTTP request handlers
use crate::application::monitor_service::{ChartOutcome, LoadingStatus, MarkerView};
use crate::application::registry::Bounds;
use crate::domain::chart::{compute_segments, ChartDataPoint};
use crate::domain::color::Color;
use crate::domain::date_range::DateRange;
use crate::domain::subscription::{AlertLevel, SubscriptionLevel};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ChartQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ChartQuery {
    fn date_range(&self) -> Option<DateRange> {
        match (self.start, self.end) {
            (None, None) => None,
            (start, end) => {
                let start = start.or(end)?;
                let end = end.unwrap_or(start);
                Some(DateRange::from_local_dates(start, end))
            }
        }
    }
}

#[derive(Serialize)]
pub struct MarkersResponse {
    pub loading: LoadingStatus,
    pub markers: Vec<MarkerView>,
    pub bounds: Option<Bounds>,
}

#[derive(Serialize)]
pub struct SeriesView {
    pub field: String,
    pub label: String,
    pub color: Option<Color>,
    pub points: Vec<ChartDataPoint>,
    /// Outages the line should not be drawn across.
    pub gaps: Vec<(DateTime<FixedOffset>, DateTime<FixedOffset>)>,
}

#[derive(Serialize)]
pub struct ChartResponse {
    pub monitor_id: String,
    pub name: String,
    pub date_range: DateRange,
    pub csv_url: Option<String>,
    pub series: Vec<SeriesView>,
}

#[derive(Serialize)]
pub struct SubscriptionView {
    pub monitor: String,
    pub level: AlertLevel,
    pub display: String,
    pub bg_color: Color,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Visible monitors with their marker parameters
pub async fn list_markers(State(state): State<Arc<AppState>>) -> Json<MarkersResponse> {
    let service = &state.monitor_service;
    Json(MarkersResponse {
        loading: service.loading(),
        markers: service.markers(),
        bounds: service.bounds(),
    })
}

/// Activate a monitor and return its chart
pub async fn monitor_chart(
    Path(id): Path<String>,
    Query(query): Query<ChartQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let service = &state.monitor_service;

    let chart = match service.open_chart(&id, query.date_range()).await {
        Ok(ChartOutcome::Ready(chart)) => chart,
        Ok(ChartOutcome::NotFound) => {
            return error_response(StatusCode::NOT_FOUND, format!("Monitor {} not found", id));
        }
        Ok(ChartOutcome::Deferred) => {
            return (StatusCode::ACCEPTED, Json(json!({ "status": "loading" }))).into_response();
        }
        Err(e) => {
            tracing::error!(monitor = %id, "Error building chart: {:#}", e);
            return error_response(StatusCode::BAD_GATEWAY, "Unable to fetch monitor entries");
        }
    };

    let Some(monitor) = service.monitor(&chart.monitor_id) else {
        return error_response(StatusCode::NOT_FOUND, format!("Monitor {} not found", id));
    };
    let max_gap = monitor.data.last_active_limit.unwrap_or(i64::MAX);

    let series = chart
        .data
        .into_iter()
        .filter_map(|points| {
            let first = points.first()?;
            let field = first.field_name.clone();
            let color = Some(first.field_color);
            let gaps = compute_segments(&points, max_gap).gaps;
            Some(SeriesView {
                label: monitor.field(&field).map(|f| f.label.to_string()).unwrap_or_else(|| field.clone()),
                field,
                color,
                points,
                gaps,
            })
        })
        .collect();

    Json(ChartResponse {
        monitor_id: chart.monitor_id,
        name: monitor.data.name.clone(),
        date_range: chart.date_range,
        csv_url: Some(service.entries_csv_url_for(&monitor, &chart.date_range)),
        series,
    })
    .into_response()
}

/// Alert levels for one monitor, flagged where the user is subscribed
pub async fn monitor_subscriptions(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SubscriptionLevel>>, Response> {
    if state.monitor_service.monitor(&id).is_none() {
        return Err(error_response(StatusCode::NOT_FOUND, format!("Monitor {} not found", id)));
    }
    Ok(Json(state.monitor_service.subscription_levels(&id)))
}

/// The user's alert subscriptions
pub async fn list_subscriptions(State(state): State<Arc<AppState>>) -> Response {
    match state.monitor_service.load_subscriptions().await {
        Ok(subscriptions) => Json(
            subscriptions
                .into_iter()
                .map(|s| SubscriptionView {
                    monitor: s.monitor,
                    level: s.level,
                    display: s.level.display_name(),
                    bg_color: s.level.color(),
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => {
            tracing::error!("Error loading subscriptions: {:#}", e);
            error_response(StatusCode::BAD_GATEWAY, "Unable to load subscriptions")
        }
    }
}
