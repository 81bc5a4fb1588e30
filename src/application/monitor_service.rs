// Orchestrates monitor loading, selection and chart retrieval
use crate::application::backend::MonitorsBackend;
use crate::application::monitors_api::MonitorsApi;
use crate::application::registry::{Bounds, MonitorRegistry, UpsertSummary};
use crate::domain::chart::ChartDataArray;
use crate::domain::classifier::{MarkerParams, MonitorClassifier, VisibilityConfig};
use crate::domain::date_range::DateRange;
use crate::domain::monitor::{Device, Monitor, MonitorId, Position};
use crate::domain::subscription::{subscription_levels, Subscription, SubscriptionLevel};
use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of [`MonitorDataService::set_active_monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    AlreadyActive,
    /// Monitors are still loading; the selection is applied once they arrive.
    Deferred,
    Activated,
    NotFound,
}

/// Selection requested while monitors were loading.
#[derive(Debug, Clone, PartialEq)]
struct CachedMonitor {
    id: MonitorId,
    date_range: Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveChart {
    pub monitor_id: MonitorId,
    pub date_range: DateRange,
    pub data: ChartDataArray,
}

/// What the map needs to draw one monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerView {
    pub id: MonitorId,
    pub name: String,
    pub device: Device,
    pub position: Option<Position>,
    pub marker: MarkerParams,
}

impl From<&Monitor> for MarkerView {
    fn from(monitor: &Monitor) -> Self {
        Self {
            id: monitor.data.id.clone(),
            name: monitor.data.name.clone(),
            device: monitor.data.device,
            position: monitor.data.position.clone(),
            marker: monitor.marker_params.clone(),
        }
    }
}

/// Result of [`MonitorDataService::open_chart`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChartOutcome {
    Ready(ActiveChart),
    /// Monitors are still loading; the selection is applied once they arrive.
    Deferred,
    NotFound,
}

/// Loading flags as reported to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadingStatus {
    pub monitors: bool,
    pub entries: bool,
}

#[derive(Debug, Clone, Copy)]
enum Loading {
    Monitors,
    Entries,
}

#[derive(Debug, Default)]
struct ServiceState {
    active_monitor: Option<MonitorId>,
    cached_monitor: Option<CachedMonitor>,
    date_range: DateRange,
    monitor_loads: usize,
    entry_loads: usize,
    chart: Option<ActiveChart>,
    subscriptions: Vec<Subscription>,
}

impl ServiceState {
    fn loads(&mut self, kind: Loading) -> &mut usize {
        match kind {
            Loading::Monitors => &mut self.monitor_loads,
            Loading::Entries => &mut self.entry_loads,
        }
    }

    /// The active chart slot only takes data for the current selection.
    fn keep_if_current(&mut self, chart: &ActiveChart) -> bool {
        if self.active_monitor.as_deref() != Some(chart.monitor_id.as_str()) || self.date_range != chart.date_range {
            tracing::debug!(monitor = %chart.monitor_id, "Not caching chart data for a stale selection");
            return false;
        }
        self.chart = Some(chart.clone());
        true
    }
}

/// Counts one in-flight load until finished or dropped, so a cancelled
/// request does not leave the flag raised.
struct LoadingGuard<'a> {
    state: &'a Mutex<ServiceState>,
    kind: Loading,
    armed: bool,
}

impl<'a> LoadingGuard<'a> {
    fn start(state: &'a Mutex<ServiceState>, kind: Loading) -> Self {
        *state.lock().loads(kind) += 1;
        Self { state, kind, armed: true }
    }

    /// Lower the flag while the caller already holds the state lock.
    fn finish(mut self, state: &mut ServiceState) {
        *state.loads(self.kind) -= 1;
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state.lock().loads(self.kind) -= 1;
        }
    }
}

pub struct MonitorDataService {
    registry: RwLock<MonitorRegistry>,
    visibility: RwLock<VisibilityConfig>,
    backend: Arc<dyn MonitorsBackend>,
    api: Arc<dyn MonitorsApi>,
    state: Mutex<ServiceState>,
}

impl MonitorDataService {
    pub fn new(
        classifier: MonitorClassifier,
        visibility: VisibilityConfig,
        backend: Arc<dyn MonitorsBackend>,
        api: Arc<dyn MonitorsApi>,
    ) -> Self {
        Self {
            registry: RwLock::new(MonitorRegistry::new(classifier)),
            visibility: RwLock::new(visibility),
            backend,
            api,
            state: Mutex::new(ServiceState::default()),
        }
    }

    pub fn loading(&self) -> LoadingStatus {
        let state = self.state.lock();
        LoadingStatus {
            monitors: state.monitor_loads > 0,
            entries: state.entry_loads > 0,
        }
    }

    pub fn monitor_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Fetch every monitor and merge it into the registry, then apply a
    /// selection that was deferred while loading.
    pub async fn load_monitors(&self) -> anyhow::Result<UpsertSummary> {
        let loading = LoadingGuard::start(&self.state, Loading::Monitors);
        let records = self.backend.fetch_monitors().await.context("Error fetching monitors")?;
        let summary = self.registry.write().upsert(records);
        tracing::info!(
            inserted = summary.inserted,
            updated = summary.updated,
            total = self.monitor_count(),
            "Loaded monitors"
        );

        let deferred = {
            let mut state = self.state.lock();
            loading.finish(&mut state);
            let ready = state.monitor_loads == 0
                && state.active_monitor.is_none()
                && state
                    .cached_monitor
                    .as_ref()
                    .is_some_and(|cached| self.registry.read().contains(&cached.id));
            if ready { state.cached_monitor.take() } else { None }
        };
        if let Some(cached) = deferred {
            tracing::debug!(monitor = %cached.id, "Applying deferred monitor selection");
            self.set_active_monitor(&cached.id, cached.date_range);
        }

        Ok(summary)
    }

    /// Select `id` for charting. The date range is reset to the default
    /// window unless `date_range` is given.
    pub fn set_active_monitor(&self, id: &str, date_range: Option<DateRange>) -> Activation {
        let mut state = self.state.lock();

        if state.active_monitor.as_deref() == Some(id) {
            return Activation::AlreadyActive;
        }
        if state.monitor_loads > 0 {
            state.cached_monitor = Some(CachedMonitor {
                id: id.to_string(),
                date_range,
            });
            return Activation::Deferred;
        }
        if !self.registry.read().contains(id) {
            tracing::warn!(monitor = id, "Unable to activate monitor, not found");
            return Activation::NotFound;
        }

        state.active_monitor = Some(id.to_string());
        state.date_range = date_range.unwrap_or_default();
        state.chart = None;
        Activation::Activated
    }

    pub fn clear_active_monitor(&self) {
        let mut state = self.state.lock();
        state.active_monitor = None;
        state.cached_monitor = None;
        state.chart = None;
    }

    pub fn active_monitor(&self) -> Option<Monitor> {
        let id = self.state.lock().active_monitor.clone()?;
        self.monitor(&id)
    }

    pub fn monitor(&self, id: &str) -> Option<Monitor> {
        self.registry.read().get(id).map(|handle| handle.read().clone())
    }

    pub fn date_range(&self) -> DateRange {
        self.state.lock().date_range
    }

    pub fn set_date_range(&self, date_range: DateRange) {
        let mut state = self.state.lock();
        if state.date_range != date_range {
            state.date_range = date_range;
            state.chart = None;
        }
    }

    /// Chart series for `id` over `date_range`. `None` when the monitor is unknown.
    pub async fn fetch_chart_data(&self, id: &str, date_range: &DateRange) -> anyhow::Result<Option<ChartDataArray>> {
        let Some(monitor) = self.monitor(id) else {
            tracing::error!(monitor = id, "Unable to fetch chart data, monitor not found");
            return Ok(None);
        };

        let result = {
            let _loading = LoadingGuard::start(&self.state, Loading::Entries);
            self.backend.fetch_chart_data(&monitor, date_range).await
        };

        result
            .with_context(|| format!("Error fetching chart data for {}", monitor.data.name))
            .map(Some)
    }

    /// Fetch the chart for the active monitor and keep it, unless the
    /// selection or date range changed while the request was in flight.
    pub async fn refresh_active_chart(&self) -> anyhow::Result<Option<ActiveChart>> {
        let (id, date_range) = {
            let state = self.state.lock();
            match &state.active_monitor {
                Some(id) => (id.clone(), state.date_range),
                None => return Ok(None),
            }
        };

        let Some(data) = self.fetch_chart_data(&id, &date_range).await? else {
            return Ok(None);
        };

        let chart = ActiveChart {
            monitor_id: id,
            date_range,
            data,
        };
        Ok(self.state.lock().keep_if_current(&chart).then_some(chart))
    }

    /// Select `id` and return its chart for the requested window. The result
    /// always belongs to `id`, even if another caller changes the selection
    /// meanwhile; it only replaces the active chart if still current.
    pub async fn open_chart(&self, id: &str, date_range: Option<DateRange>) -> anyhow::Result<ChartOutcome> {
        match self.set_active_monitor(id, date_range) {
            Activation::NotFound => return Ok(ChartOutcome::NotFound),
            Activation::Deferred => return Ok(ChartOutcome::Deferred),
            Activation::AlreadyActive => {
                if let Some(date_range) = date_range {
                    self.set_date_range(date_range);
                }
            }
            Activation::Activated => {}
        }

        let date_range = date_range.unwrap_or_else(|| {
            let state = self.state.lock();
            if state.active_monitor.as_deref() == Some(id) {
                state.date_range
            } else {
                DateRange::default()
            }
        });

        let Some(data) = self.fetch_chart_data(id, &date_range).await? else {
            return Ok(ChartOutcome::NotFound);
        };

        let chart = ActiveChart {
            monitor_id: id.to_string(),
            date_range,
            data,
        };
        self.state.lock().keep_if_current(&chart);
        Ok(ChartOutcome::Ready(chart))
    }

    pub fn active_chart(&self) -> Option<ActiveChart> {
        self.state.lock().chart.clone()
    }

    pub async fn load_subscriptions(&self) -> anyhow::Result<Vec<Subscription>> {
        let subscriptions = self
            .backend
            .load_subscriptions()
            .await
            .context("Error loading subscriptions")?;
        self.state.lock().subscriptions = subscriptions.clone();
        Ok(subscriptions)
    }

    pub fn subscription_levels(&self, id: &str) -> Vec<SubscriptionLevel> {
        subscription_levels(id, &self.state.lock().subscriptions)
    }

    /// CSV download link for the active monitor's entries.
    pub fn entries_csv_url(&self) -> Option<String> {
        let Some(monitor) = self.active_monitor() else {
            tracing::error!("Unable to build CSV link, no active monitor");
            return None;
        };
        let date_range = self.date_range();
        Some(self.entries_csv_url_for(&monitor, &date_range))
    }

    pub fn entries_csv_url_for(&self, monitor: &Monitor, date_range: &DateRange) -> String {
        self.api.entries_csv_url(monitor.id(), &monitor.data_fields, date_range)
    }

    pub fn visibility(&self) -> VisibilityConfig {
        self.visibility.read().clone()
    }

    pub fn set_visibility(&self, visibility: VisibilityConfig) {
        *self.visibility.write() = visibility;
    }

    /// Visible monitors, ready to be drawn.
    pub fn markers(&self) -> Vec<MarkerView> {
        let visibility = self.visibility();
        self.registry
            .read()
            .visible(&visibility)
            .iter()
            .map(|handle| MarkerView::from(&*handle.read()))
            .collect()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.registry.read().bounds()
    }
}
