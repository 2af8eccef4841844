//! # promsd core
//!
//! Data model, configuration and error types shared by the promsd workspace.
//!
//! - **Types**: [`TargetGroup`] and [`Snapshot`], the Prometheus file_sd
//!   representation of discovered services, plus the reserved label names.
//! - **Configuration**: [`AppConfig`] loaded from YAML files and `PROMSD__*`
//!   environment variables, with validation.
//! - **Durations**: human readable durations such as `10s` or `1m30s`.
//!
//! ## Example
//!
//! ```
//! use promsd_core::types::{Snapshot, TargetGroup};
//!
//! let mut snapshot = Snapshot::new();
//! snapshot.push(TargetGroup::new("10.0.0.5:9100").with_label("instance", "node1.local"));
//! snapshot.sort();
//!
//! let json = snapshot.to_json().unwrap();
//! assert!(String::from_utf8(json).unwrap().contains("10.0.0.5:9100"));
//! ```

pub mod config;
pub mod duration;
pub mod error;
pub mod types;

pub use config::{AppConfig, DiscoveryConfig, LogFormat, LoggingConfig, OutputConfig};
pub use error::{ConfigError, Result};
pub use types::{Snapshot, TargetGroup};
