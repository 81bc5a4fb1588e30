// Application layer - Ports, orchestration and monitor bookkeeping
pub mod backend;
pub mod entry_fetcher;
pub mod monitor_service;
pub mod monitors_api;
pub mod registry;
