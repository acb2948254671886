pub mod anomaly;
pub mod models;
pub mod port_analytics;
