// Domain layer - Monitor, color and chart models
pub mod chart;
pub mod classifier;
pub mod color;
pub mod date_range;
pub mod monitor;
pub mod subscription;
