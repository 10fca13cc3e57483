//! Practice-management vendor integrations
//!
//! One module per vendor, each implementing
//! [`billsync_core::PlatformAdapter`] over the helpers in [`shared`]. Use
//! [`build_adapter`] to construct the right adapter for a configured
//! platform.

pub mod clio;
pub mod factory;
pub mod practicepanther;
pub mod rocketmatter;
pub mod shared;

pub use clio::ClioAdapter;
pub use factory::{build_adapter, build_adapters};
pub use practicepanther::PracticePantherAdapter;
pub use rocketmatter::RocketMatterAdapter;
