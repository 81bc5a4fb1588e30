// Infrastructure layer - External dependencies and adapters
pub mod background_client;
pub mod background_service;
pub mod background_task;
pub mod config;
pub mod dispatched_backend;
pub mod http_api;
