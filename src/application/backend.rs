// Monitor data capability, callable in-process or through the background worker
use crate::application::entry_fetcher::EntryFetcher;
use crate::application::monitors_api::MonitorsApi;
use crate::domain::chart::{build_chart_data, ChartDataArray};
use crate::domain::date_range::DateRange;
use crate::domain::monitor::{Monitor, MonitorRecord};
use crate::domain::subscription::Subscription;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait MonitorsBackend: Send + Sync {
    async fn fetch_monitors(&self) -> anyhow::Result<Vec<MonitorRecord>>;

    /// Chart series for `monitor` over `range`. Page failures shorten the
    /// result instead of failing it.
    async fn fetch_chart_data(&self, monitor: &Monitor, range: &DateRange) -> anyhow::Result<ChartDataArray>;

    async fn load_subscriptions(&self) -> anyhow::Result<Vec<Subscription>>;
}

/// Runs the pipeline in the caller's context.
#[derive(Clone)]
pub struct DirectBackend {
    api: Arc<dyn MonitorsApi>,
    fetcher: EntryFetcher,
}

impl DirectBackend {
    pub fn new(api: Arc<dyn MonitorsApi>, max_pages: u32) -> Self {
        let fetcher = EntryFetcher::new(api.clone(), max_pages);
        Self { api, fetcher }
    }
}

#[async_trait]
impl MonitorsBackend for DirectBackend {
    async fn fetch_monitors(&self) -> anyhow::Result<Vec<MonitorRecord>> {
        self.api.list_monitors().await.context("Unable to fetch monitors")
    }

    async fn fetch_chart_data(&self, monitor: &Monitor, range: &DateRange) -> anyhow::Result<ChartDataArray> {
        let entries = self.fetcher.fetch_entries(monitor, range).await;
        Ok(build_chart_data(monitor, &entries))
    }

    async fn load_subscriptions(&self) -> anyhow::Result<Vec<Subscription>> {
        self.api
            .list_subscriptions()
            .await
            .context("Unable to fetch subscriptions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::entry_fetcher::fakes::{entry, FakeApi};
    use crate::application::entry_fetcher::DEFAULT_MAX_PAGES;
    use crate::domain::classifier::MonitorClassifier;
    use crate::domain::monitor::fixtures::record;
    use crate::domain::monitor::Device;

    #[tokio::test]
    async fn test_chart_data_spans_pages() {
        let api = Arc::new(FakeApi {
            pages: vec![
                vec![entry("2024-01-01T03:00:00Z", "3"), entry("2024-01-01T02:00:00Z", "2")],
                vec![entry("2024-01-01T01:00:00Z", "1")],
            ],
            ..FakeApi::default()
        });
        let backend = DirectBackend::new(api, DEFAULT_MAX_PAGES);
        let monitor = Monitor::new(record("m1", Device::AirNow), &MonitorClassifier::default());

        let chart = backend.fetch_chart_data(&monitor, &DateRange::default()).await.unwrap();

        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0].iter().map(|p| p.y).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_monitor_fetch_failure_propagates() {
        let api = Arc::new(FakeApi {
            fail_monitors: true,
            ..FakeApi::default()
        });
        let backend = DirectBackend::new(api, DEFAULT_MAX_PAGES);
        let err = backend.fetch_monitors().await.unwrap_err();
        assert!(format!("{:#}", err).contains("monitors endpoint unavailable"));
    }
}
