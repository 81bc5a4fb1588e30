// Marker classification and visibility rules
use serde::{Deserialize, Serialize};

use super::color::{BlendMode, Color, ColorScale};
use super::monitor::{Device, Location, MonitorRecord};

pub const DEFAULT_DISPLAY_FIELD: &str = "pm25_avg_15";

const INACTIVE_SIZE: u32 = 16;
const ACTIVE_SIZE: u32 = 24;
const SJVAIR_ACTIVE_SIZE: u32 = 28;
const TRIANGLE_ACTIVE_SIZE: u32 = 32;
const BORDER_DARKEN_PERCENT: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Circle,
    Square,
    Triangle,
    Diamond,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerParams {
    pub shape: Shape,
    pub size: u32,
    pub fill_color: Color,
    pub border_color: Color,
    pub border_size: u32,
    pub text_color: Color,
    /// Rounded display reading, absent for inactive monitors.
    pub label: Option<String>,
}

/// Derives marker visuals from a monitor record.
#[derive(Debug, Clone)]
pub struct MonitorClassifier {
    scale: ColorScale,
    blend: BlendMode,
    display_field: String,
}

impl Default for MonitorClassifier {
    fn default() -> Self {
        Self::new(ColorScale::pm25(), BlendMode::Continuous, DEFAULT_DISPLAY_FIELD)
    }
}

impl MonitorClassifier {
    pub fn new(scale: ColorScale, blend: BlendMode, display_field: impl Into<String>) -> Self {
        Self {
            scale,
            blend,
            display_field: display_field.into(),
        }
    }

    pub fn display_field(&self) -> &str {
        &self.display_field
    }

    pub fn scale(&self) -> &ColorScale {
        &self.scale
    }

    /// Reading used to color the marker. Devices that do not report the
    /// display field fall back to their primary field.
    pub fn display_value(&self, record: &MonitorRecord) -> Option<f64> {
        let fields = record.device.fields();
        if fields.is_empty() || fields.iter().any(|f| f.name == self.display_field) {
            return record.latest_value(&self.display_field);
        }
        fields
            .iter()
            .find(|f| f.name == "pm25")
            .or_else(|| fields.first())
            .and_then(|f| record.latest_value(f.name))
    }

    pub fn classify(&self, record: &MonitorRecord) -> MarkerParams {
        let shape = match record.device {
            Device::AirNow | Device::BAM1022 => Shape::Triangle,
            Device::PurpleAir if record.is_sjvair => Shape::Circle,
            Device::PurpleAir => Shape::Square,
            Device::Unknown => {
                tracing::error!(monitor = %record.id, "unknown device type for monitor");
                Shape::Diamond
            }
        };

        let mut fill_color = Color::GRAY;
        let mut size = INACTIVE_SIZE;
        let mut label = None;

        if record.is_active && record.latest.is_some() {
            if let Some(value) = self.display_value(record) {
                fill_color = self.scale.color_for(value, self.blend);
                label = Some(format!("{}", value.round() as i64));
            }
            size = match (record.device, shape) {
                (_, Shape::Triangle) => TRIANGLE_ACTIVE_SIZE,
                (Device::PurpleAir, _) if record.is_sjvair => SJVAIR_ACTIVE_SIZE,
                _ => ACTIVE_SIZE,
            };
        }

        let (border_color, border_size) = match record.location {
            Location::Inside => (Color::BLACK, 2),
            Location::Outside => (fill_color.darken(BORDER_DARKEN_PERCENT), 1),
        };

        MarkerParams {
            shape,
            size,
            fill_color,
            border_color,
            border_size,
            text_color: fill_color.readable_text(),
            label,
        }
    }
}

/// Map layer toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    #[serde(alias = "SJVAirPurple")]
    pub sjvair_purple: bool,
    #[serde(alias = "SJVAirBAM")]
    pub sjvair_bam: bool,
    #[serde(alias = "PurpleAir")]
    pub purple_air: bool,
    #[serde(alias = "PurpleAirInside")]
    pub purple_air_inside: bool,
    #[serde(alias = "AirNow")]
    pub air_now: bool,
    #[serde(alias = "displayInactive", alias = "SJVAirInactive")]
    pub display_inactive: bool,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            sjvair_purple: true,
            sjvair_bam: true,
            purple_air: true,
            purple_air_inside: false,
            air_now: true,
            display_inactive: false,
        }
    }
}

impl VisibilityConfig {
    /// Inactive monitors are suppressed before any per-device toggle is
    /// consulted, SJVAir monitors included.
    pub fn is_visible(&self, record: &MonitorRecord) -> bool {
        if !self.display_inactive && !record.is_active {
            return false;
        }

        match record.device {
            Device::PurpleAir if record.is_sjvair => self.sjvair_purple,
            Device::BAM1022 => self.sjvair_bam,
            Device::PurpleAir => {
                self.purple_air && (self.purple_air_inside || record.location == Location::Outside)
            }
            Device::AirNow => self.air_now,
            Device::Unknown => false,
        }
    }
}
