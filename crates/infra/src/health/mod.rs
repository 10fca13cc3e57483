//! Platform health probing and the availability gate built on it

pub mod monitor;
pub mod registry;

pub use monitor::{HealthEvent, HealthMonitor, HealthStatusListener, LoggingListener};
pub use registry::{HealthRegistry, PlatformHealth};
