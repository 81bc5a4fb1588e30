// Alert subscription model
use serde::{Deserialize, Serialize};

use super::color::Color;
use super::monitor::MonitorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    UnhealthySensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AlertLevel {
    pub const ALL: [AlertLevel; 4] = [
        AlertLevel::UnhealthySensitive,
        AlertLevel::Unhealthy,
        AlertLevel::VeryUnhealthy,
        AlertLevel::Hazardous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::UnhealthySensitive => "unhealthy_sensitive",
            AlertLevel::Unhealthy => "unhealthy",
            AlertLevel::VeryUnhealthy => "very_unhealthy",
            AlertLevel::Hazardous => "hazardous",
        }
    }

    /// "very_unhealthy" -> "Very Unhealthy"
    pub fn display_name(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }

    /// Badge color matching the PM2.5 band the alert fires at.
    pub fn color(&self) -> Color {
        match self {
            AlertLevel::UnhealthySensitive => Color::ORANGE,
            AlertLevel::Unhealthy => Color::RED,
            AlertLevel::VeryUnhealthy => Color::PURPLE,
            AlertLevel::Hazardous => Color::MAROON,
        }
    }
}

/// A user's alert subscription as returned by `GET /alerts/subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub level: AlertLevel,
    pub monitor: MonitorId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionLevel {
    pub level: AlertLevel,
    pub display: String,
    pub bg_color: Color,
    pub subscribed: bool,
}

/// Every alert level for `monitor`, flagged when the user is subscribed to it.
pub fn subscription_levels(monitor: &str, subscriptions: &[Subscription]) -> Vec<SubscriptionLevel> {
    AlertLevel::ALL
        .iter()
        .map(|level| SubscriptionLevel {
            level: *level,
            display: level.display_name(),
            bg_color: level.color(),
            subscribed: subscriptions
                .iter()
                .any(|s| s.monitor == monitor && s.level == *level),
        })
        .collect()
}
