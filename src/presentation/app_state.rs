// Application state for HTTP handlers
use crate::application::monitor_service::MonitorDataService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub monitor_service: Arc<MonitorDataService>,
}
