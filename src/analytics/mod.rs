//! The streaming analytics core: declarative window processing and
//! rolling-window anomaly detection.

pub mod anomaly;
pub mod window_processor;

pub use anomaly::{
    Anomaly, AnomalyDetector, AnomalyType, BaselineStats, MultiMetricAnomalyDetector, Severity,
};
pub use window_processor::WindowProcessor;
