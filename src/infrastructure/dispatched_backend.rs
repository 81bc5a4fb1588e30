// MonitorsBackend proxied through the background service
use crate::application::backend::MonitorsBackend;
use crate::domain::chart::ChartDataArray;
use crate::domain::date_range::DateRange;
use crate::domain::monitor::{Monitor, MonitorRecord};
use crate::domain::subscription::Subscription;
use crate::infrastructure::background_client::BackgroundServiceClient;
use crate::infrastructure::background_service::BackgroundService;
use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub const MONITORS_SERVICE: &str = "MonitorsBackgroundService";
pub const FETCH_MONITORS: &str = "fetchMonitors";
pub const FETCH_CHART_DATA: &str = "fetchChartData";
pub const LOAD_SUBSCRIPTIONS: &str = "loadSubscriptions";

fn parameter<T: DeserializeOwned>(parameters: &[Value], index: usize, name: &str) -> anyhow::Result<T> {
    let value = parameters
        .get(index)
        .cloned()
        .with_context(|| format!("Missing parameter {} ({})", index, name))?;
    serde_json::from_value(value).with_context(|| format!("Invalid parameter {} ({})", index, name))
}

/// Operation table serving `backend` to a [`DispatchedBackend`].
pub fn monitors_background_service(backend: Arc<dyn MonitorsBackend>) -> BackgroundService {
    let monitors = backend.clone();
    let charts = backend.clone();
    let subscriptions = backend;

    BackgroundService::new(MONITORS_SERVICE)
        .register(FETCH_MONITORS, move |_| {
            let backend = monitors.clone();
            async move { Ok::<_, anyhow::Error>(serde_json::to_value(backend.fetch_monitors().await?)?) }
        })
        .register(FETCH_CHART_DATA, move |parameters| {
            let backend = charts.clone();
            async move {
                let monitor: Monitor = parameter(&parameters, 0, "monitor")?;
                let range: DateRange = parameter(&parameters, 1, "dateRange")?;
                Ok::<_, anyhow::Error>(serde_json::to_value(backend.fetch_chart_data(&monitor, &range).await?)?)
            }
        })
        .register(LOAD_SUBSCRIPTIONS, move |_| {
            let backend = subscriptions.clone();
            async move { Ok::<_, anyhow::Error>(serde_json::to_value(backend.load_subscriptions().await?)?) }
        })
}

/// Runs every backend operation on the background service.
pub struct DispatchedBackend {
    client: BackgroundServiceClient,
}

impl DispatchedBackend {
    pub fn new(client: BackgroundServiceClient) -> Self {
        Self { client }
    }

    async fn call<T: DeserializeOwned>(&self, task_name: &str, parameters: Vec<Value>) -> anyhow::Result<T> {
        let payload = self
            .client
            .run(task_name, parameters)
            .await
            .with_context(|| format!("Background task {} failed", task_name))?;
        serde_json::from_value(payload).with_context(|| format!("Unexpected payload for {}", task_name))
    }
}

#[async_trait]
impl MonitorsBackend for DispatchedBackend {
    async fn fetch_monitors(&self) -> anyhow::Result<Vec<MonitorRecord>> {
        self.call(FETCH_MONITORS, Vec::new()).await
    }

    async fn fetch_chart_data(&self, monitor: &Monitor, range: &DateRange) -> anyhow::Result<ChartDataArray> {
        let parameters = vec![serde_json::to_value(monitor)?, serde_json::to_value(range)?];
        self.call(FETCH_CHART_DATA, parameters).await
    }

    async fn load_subscriptions(&self) -> anyhow::Result<Vec<Subscription>> {
        self.call(LOAD_SUBSCRIPTIONS, Vec::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend::DirectBackend;
    use crate::application::entry_fetcher::fakes::{entry, FakeApi};
    use crate::application::entry_fetcher::DEFAULT_MAX_PAGES;
    use crate::domain::classifier::MonitorClassifier;
    use crate::domain::monitor::fixtures::record;
    use crate::domain::monitor::Device;
    use crate::domain::subscription::AlertLevel;
    use crate::infrastructure::background_task::TaskError;
    use parking_lot::Mutex;
    use serde_json::json;

    fn dispatched(api: FakeApi) -> DispatchedBackend {
        let direct = DirectBackend::new(Arc::new(api), DEFAULT_MAX_PAGES);
        let channel = monitors_background_service(Arc::new(direct)).spawn();
        DispatchedBackend::new(BackgroundServiceClient::new(channel))
    }

    #[tokio::test]
    async fn test_operations_round_trip_through_worker() {
        let backend = dispatched(FakeApi {
            monitors: Mutex::new(vec![record("m1", Device::AirNow)]),
            pages: vec![vec![entry("2024-01-01T02:00:00Z", "2"), entry("2024-01-01T01:00:00Z", "1")]],
            subscriptions: vec![Subscription {
                level: AlertLevel::Unhealthy,
                monitor: "m1".to_string(),
            }],
            ..FakeApi::default()
        });

        let records = backend.fetch_monitors().await.unwrap();
        assert_eq!(records, vec![record("m1", Device::AirNow)]);

        let monitor = Monitor::new(records[0].clone(), &MonitorClassifier::default());
        let chart = backend.fetch_chart_data(&monitor, &DateRange::default()).await.unwrap();
        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0].iter().map(|p| p.y).collect::<Vec<_>>(), vec![1.0, 2.0]);

        let subscriptions = backend.load_subscriptions().await.unwrap();
        assert_eq!(subscriptions[0].level, AlertLevel::Unhealthy);
    }

    #[tokio::test]
    async fn test_backend_error_crosses_the_worker() {
        let backend = dispatched(FakeApi {
            fail_monitors: true,
            ..FakeApi::default()
        });

        let err = backend.fetch_monitors().await.unwrap_err();
        assert!(format!("{:#}", err).contains("monitors endpoint unavailable"));
    }

    #[tokio::test]
    async fn test_missing_parameters_fail_the_task() {
        let direct = DirectBackend::new(Arc::new(FakeApi::default()), DEFAULT_MAX_PAGES);
        let client = BackgroundServiceClient::new(monitors_background_service(Arc::new(direct)).spawn());

        let result = client.run(FETCH_CHART_DATA, vec![json!({"id": "m1"})]).await;
        assert!(matches!(result, Err(TaskError::Failed(_))));

        let result = client.run("dropTables", Vec::new()).await;
        match result {
            Err(TaskError::NotFound(message)) => assert_eq!(
                message,
                "Background task \"dropTables\" not found in \"MonitorsBackgroundService\" controller"
            ),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
