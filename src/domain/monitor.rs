// Monitor domain model
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::classifier::{MarkerParams, MonitorClassifier};

pub type MonitorId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Device {
    AirNow,
    BAM1022,
    PurpleAir,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Inside,
    #[default]
    Outside,
}

/// GeoJSON point as served by the API: coordinates are `[lon, lat]`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    #[serde(rename = "type", default = "point_type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

fn point_type() -> String {
    "Point".to_string()
}

impl Position {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            kind: point_type(),
            coordinates: [lon, lat],
        }
    }

    pub fn lon(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

/// A monitor as returned by `GET /monitors`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitorRecord {
    pub id: MonitorId,
    pub name: String,
    pub device: Device,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_sjvair: bool,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub latest: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub last_active_limit: Option<i64>,
    #[serde(default)]
    pub purple_id: Option<i64>,
}

impl MonitorRecord {
    /// Latest reading for `field`, accepting numeric strings and JSON numbers.
    pub fn latest_value(&self, field: &str) -> Option<f64> {
        let value = self.latest.as_ref()?.get(field)?;
        match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn latest_timestamp(&self) -> Option<&str> {
        self.latest.as_ref()?.get("timestamp")?.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorField {
    pub name: &'static str,
    pub label: &'static str,
    pub update_duration: &'static str,
}

const fn field(name: &'static str, label: &'static str, update_duration: &'static str) -> MonitorField {
    MonitorField {
        name,
        label,
        update_duration,
    }
}

static AIRNOW_FIELDS: [MonitorField; 1] = [field("pm25", "PM 2.5", "60m")];
static BAM1022_FIELDS: [MonitorField; 1] = [field("pm25", "PM 2.5", "60m")];
static PURPLEAIR_FIELDS: [MonitorField; 4] = [
    field("pm10", "PM 1.0", ""),
    field("pm25", "PM 2.5", "2m"),
    field("pm25_avg_15", "PM 2.5", "15m"),
    field("pm25_avg_60", "PM 2.5", "60m"),
];

impl Device {
    /// Fields the entries endpoint can serve for this kind of device.
    pub fn fields(&self) -> &'static [MonitorField] {
        match self {
            Device::AirNow => &AIRNOW_FIELDS,
            Device::BAM1022 => &BAM1022_FIELDS,
            Device::PurpleAir => &PURPLEAIR_FIELDS,
            Device::Unknown => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub data: MonitorRecord,
    pub data_fields: Vec<String>,
    pub marker_params: MarkerParams,
}

impl Monitor {
    pub fn new(data: MonitorRecord, classifier: &MonitorClassifier) -> Self {
        let data_fields = data
            .device
            .fields()
            .iter()
            .map(|f| f.name.to_string())
            .collect();
        let marker_params = classifier.classify(&data);
        Self {
            data,
            data_fields,
            marker_params,
        }
    }

    pub fn id(&self) -> &str {
        &self.data.id
    }

    /// Replace the underlying record, keeping this instance. Field metadata is
    /// resolved again only if the device changed.
    pub fn update(&mut self, data: MonitorRecord, classifier: &MonitorClassifier) {
        if data.device != self.data.device {
            self.data_fields = data
                .device
                .fields()
                .iter()
                .map(|f| f.name.to_string())
                .collect();
        }
        self.marker_params = classifier.classify(&data);
        self.data = data;
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.data_fields.iter().any(|f| f == name)
    }

    pub fn field(&self, name: &str) -> Option<&'static MonitorField> {
        self.data.device.fields().iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn record(id: &str, device: Device) -> MonitorRecord {
        MonitorRecord {
            id: id.to_string(),
            name: format!("Monitor {}", id),
            device,
            is_active: true,
            is_sjvair: false,
            location: Location::Outside,
            position: Some(Position::new(-119.77, 36.74)),
            county: Some("Fresno".to_string()),
            latest: None,
            last_active_limit: Some(3600),
            purple_id: None,
        }
    }

    pub fn with_latest(mut record: MonitorRecord, field: &str, value: &str) -> MonitorRecord {
        let mut latest = HashMap::new();
        latest.insert(field.to_string(), serde_json::Value::String(value.to_string()));
        record.latest = Some(latest);
        record
    }
}
