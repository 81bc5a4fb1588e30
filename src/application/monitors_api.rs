// Port for the monitors REST API
use crate::domain::chart::RawEntry;
use crate::domain::date_range::DateRange;
use crate::domain::monitor::MonitorRecord;
use crate::domain::subscription::Subscription;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One page of `GET /monitors/{id}/entries/`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EntriesPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub data: Vec<RawEntry>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub has_previous_page: bool,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntriesQuery {
    pub fields: Vec<String>,
    pub page: u32,
    pub range: DateRange,
}

#[async_trait]
pub trait MonitorsApi: Send + Sync {
    /// `GET /monitors`
    async fn list_monitors(&self) -> anyhow::Result<Vec<MonitorRecord>>;

    /// `GET /monitors/{id}/entries/` for a single page
    async fn entries_page(&self, monitor_id: &str, query: &EntriesQuery) -> anyhow::Result<EntriesPage>;

    /// `GET /alerts/subscriptions`
    async fn list_subscriptions(&self) -> anyhow::Result<Vec<Subscription>>;

    /// Download link for the CSV export of a monitor's entries.
    fn entries_csv_url(&self, monitor_id: &str, fields: &[String], range: &DateRange) -> String;
}
