// Chart series built from raw monitor entries
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::color::Color;
use super::date_range::DISPLAY_TZ;
use super::monitor::Monitor;

/// One entry row as served by the entries endpoint.
pub type RawEntry = serde_json::Map<String, Value>;

/// One ascending series per charted field.
pub type ChartDataArray = Vec<Vec<ChartDataPoint>>;

/// Fields that can be plotted, with their line colors.
pub const CHART_FIELDS: [(&str, Color); 3] = [
    ("pm25", Color::new(0x00, 0xcc, 0xff)),
    ("pm25_avg_15", Color::new(0x00, 0x66, 0x99)),
    ("pm25_avg_60", Color::new(0x00, 0x00, 0x33)),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataPoint {
    pub field_color: Color,
    pub field_name: String,
    pub x: DateTime<FixedOffset>,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub timestamp: DateTime<Utc>,
    pub data: BTreeMap<String, Value>,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Split the timestamp out of a raw entry and drop the sensor id and empty
/// readings. Entries without a usable timestamp yield `None`.
pub fn parse_entry(entry: &RawEntry) -> Option<ParsedEntry> {
    let timestamp = entry.get("timestamp").and_then(Value::as_str).and_then(parse_timestamp)?;
    let data = entry
        .iter()
        .filter(|(key, value)| key.as_str() != "sensor" && key.as_str() != "timestamp" && !is_empty_value(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Some(ParsedEntry { timestamp, data })
}

/// Build per-field series for `monitor`. Entries arrive newest first; every
/// returned series is ascending in time. Fields without points are omitted.
pub fn build_chart_data(monitor: &Monitor, entries: &[RawEntry]) -> ChartDataArray {
    let mut series: HashMap<&str, Vec<ChartDataPoint>> = HashMap::new();
    let mut skipped = 0usize;

    for raw in entries.iter().rev() {
        let Some(entry) = parse_entry(raw) else {
            skipped += 1;
            continue;
        };
        let x = entry.timestamp.with_timezone(&DISPLAY_TZ).fixed_offset();

        for (field, color) in CHART_FIELDS.iter() {
            if !monitor.has_field(field) {
                continue;
            }
            let Some(y) = entry.data.get(*field).and_then(numeric) else {
                continue;
            };
            series.entry(*field).or_default().push(ChartDataPoint {
                field_color: *color,
                field_name: field.to_string(),
                x,
                y,
            });
        }
    }

    if skipped > 0 {
        tracing::debug!(monitor = %monitor.id(), skipped, "skipped entries without a timestamp");
    }

    monitor
        .data_fields
        .iter()
        .filter_map(|field| series.remove(field.as_str()))
        .map(|mut points| {
            points.sort_by_key(|p| p.x);
            points
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segments {
    /// Runs of points with no gap of `max_gap_secs` or more between neighbours.
    pub segments: Vec<Vec<ChartDataPoint>>,
    /// `(last point before, first point after)` for every break.
    pub gaps: Vec<(DateTime<FixedOffset>, DateTime<FixedOffset>)>,
}

/// Break an ascending series wherever the monitor went quiet for at least
/// `max_gap_secs`, so the chart does not draw lines across outages.
pub fn compute_segments(points: &[ChartDataPoint], max_gap_secs: i64) -> Segments {
    let mut segments: Vec<Vec<ChartDataPoint>> = Vec::new();
    let mut gaps = Vec::new();

    for point in points {
        let prev_x = segments.last().and_then(|s| s.last()).map(|p| p.x);
        match prev_x {
            Some(prev) if (point.x - prev).num_seconds() < max_gap_secs => {
                if let Some(segment) = segments.last_mut() {
                    segment.push(point.clone());
                }
            }
            Some(prev) => {
                gaps.push((prev, point.x));
                segments.push(vec![point.clone()]);
            }
            None => segments.push(vec![point.clone()]),
        }
    }

    Segments { segments, gaps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::classifier::MonitorClassifier;
    use crate::domain::monitor::fixtures::record;
    use crate::domain::monitor::Device;
    use serde_json::json;

    fn entry(value: Value) -> RawEntry {
        match value {
            Value::Object(map) => map,
            _ => panic!("entry fixture must be an object"),
        }
    }

    fn purple_monitor() -> Monitor {
        Monitor::new(record("m1", Device::PurpleAir), &MonitorClassifier::default())
    }

    #[test]
    fn test_parse_entry_drops_sensor_and_empty_fields() {
        let raw = entry(json!({
            "timestamp": "2024-01-01T10:00:00Z",
            "sensor": "a",
            "pm25": "10.5",
            "pm10": "",
            "pm25_avg_60": null,
            "celcius": "0"
        }));
        let parsed = parse_entry(&raw).unwrap();

        assert_eq!(parsed.timestamp.to_rfc3339(), "2024-01-01T10:00:00+00:00");
        assert_eq!(parsed.data.keys().collect::<Vec<_>>(), vec!["celcius", "pm25"]);
    }

    #[test]
    fn test_descending_entries_produce_ascending_series() {
        let entries = vec![
            entry(json!({"timestamp": "2024-01-01T12:00:00Z", "sensor": "a", "pm25": "3", "pm25_avg_15": "30"})),
            entry(json!({"timestamp": "2024-01-01T11:00:00Z", "sensor": "a", "pm25": "2", "pm25_avg_15": "20"})),
            entry(json!({"timestamp": "2024-01-01T10:00:00Z", "sensor": "a", "pm25": "1", "pm25_avg_15": "10"})),
        ];
        let chart = build_chart_data(&purple_monitor(), &entries);

        assert_eq!(chart.len(), 2);
        for series in &chart {
            let times: Vec<_> = series.iter().map(|p| p.x).collect();
            let mut sorted = times.clone();
            sorted.sort();
            assert_eq!(times, sorted);
        }
        assert_eq!(chart[0][0].field_name, "pm25");
        assert_eq!(chart[0].iter().map(|p| p.y).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
        assert_eq!(chart[1][0].field_color, Color::new(0x00, 0x66, 0x99));
    }

    #[test]
    fn test_x_axis_uses_display_timezone() {
        let entries = vec![entry(json!({"timestamp": "2024-01-01T10:00:00Z", "pm25": "1"}))];
        let chart = build_chart_data(&purple_monitor(), &entries);
        assert_eq!(chart[0][0].x.to_rfc3339(), "2024-01-01T02:00:00-08:00");
    }

    #[test]
    fn test_fields_without_points_are_omitted() {
        let entries = vec![entry(json!({"timestamp": "2024-01-01T10:00:00Z", "pm25": "4", "pm25_avg_60": ""}))];
        let chart = build_chart_data(&purple_monitor(), &entries);

        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0][0].field_name, "pm25");
        assert!(chart.iter().all(|series| !series.is_empty()));
    }

    #[test]
    fn test_only_known_fields_the_monitor_has() {
        let airnow = Monitor::new(record("m2", Device::AirNow), &MonitorClassifier::default());
        let entries = vec![entry(json!({
            "timestamp": "2024-01-01T10:00:00Z",
            "pm25": "4",
            "pm25_avg_15": "5",
            "pm10": "6"
        }))];
        let chart = build_chart_data(&airnow, &entries);

        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0][0].field_name, "pm25");
    }

    #[test]
    fn test_no_entries_yields_empty_array() {
        assert!(build_chart_data(&purple_monitor(), &[]).is_empty());
    }

    #[test]
    fn test_segments_break_on_gaps() {
        let entries: Vec<RawEntry> = ["12:40", "12:30", "10:20", "10:10", "10:00"]
            .iter()
            .map(|t| entry(json!({"timestamp": format!("2024-01-01T{}:00Z", t), "pm25": "1"})))
            .collect();
        let chart = build_chart_data(&purple_monitor(), &entries);
        let result = compute_segments(&chart[0], 15 * 60);

        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[0].len(), 3);
        assert_eq!(result.segments[1].len(), 2);
        assert_eq!(result.gaps.len(), 1);
        assert_eq!(result.gaps[0].0, result.segments[0][2].x);
    }
}
