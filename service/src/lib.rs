//! Ratekeeper Service
//!
//! Wires the conversion engine to the ECB feed and a rate store, and keeps
//! the cache fresh in the background.

pub mod config;
pub mod refresher;

pub use config::{ConfigError, ServiceConfig};
pub use refresher::RefreshLoop;
