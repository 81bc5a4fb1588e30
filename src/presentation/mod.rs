// Presentation layer - HTTP handlers and state
pub mod app_state;
pub mod handlers;
