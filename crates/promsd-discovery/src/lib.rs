//! DNS-SD discovery of Prometheus scrape targets.
//!
//! This crate finds services advertised over multicast DNS and turns them
//! into Prometheus file_sd target groups:
//! - Query every configured service name, optionally per interface
//! - Map each response to a target with labels built from its TXT records
//! - Aggregate one snapshot per refresh cycle
//! - Emit a snapshot only when it differs from the last one written
//!
//! # Architecture
//!
//! ```text
//! Scheduler --tick--> Discovery::refresh_all
//!                        |-- fan_out: one task per QueryPlan --> mapper
//!                        '-- aggregator::collect
//!           --Snapshot--> ChangeFilter::run --> SnapshotSink
//! ```
//!
//! The transport sits behind [`ServiceQuerier`]; [`MdnsQuerier`] implements
//! it with the `mdns-sd` crate.
//!
//! # Example
//!
//! ```no_run
//! use promsd_core::{DiscoveryConfig, OutputConfig};
//! use promsd_discovery::{ChangeFilter, Discovery, MdnsQuerier, OutputSink, Scheduler};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DiscoveryConfig::default();
//!     let querier = MdnsQuerier::new(&config.interfaces, config.query_timeout)?;
//!     let mut scheduler = Scheduler::new(Discovery::new(Arc::new(querier), &config), config.interval);
//!
//!     let (tx, rx) = mpsc::channel(1);
//!     let token = CancellationToken::new();
//!     tokio::spawn(async move { scheduler.run(tx, token).await });
//!
//!     let mut sink = OutputSink::from_config(&OutputConfig::default());
//!     ChangeFilter::new().run(rx, &mut sink).await?;
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod change;
pub mod discovery;
pub mod error;
pub mod fanout;
pub mod interfaces;
pub mod mapper;
pub mod output;
pub mod querier;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod testing;

pub use change::{ChangeDecision, ChangeFilter, EmitStats};
pub use discovery::Discovery;
pub use error::{DiscoveryError, Result};
pub use interfaces::{format_interfaces, list_interfaces, resolve_interfaces, InterfaceSummary};
pub use mapper::{map_entry, MapperOptions};
pub use output::{OutputSink, SnapshotSink};
pub use querier::{MdnsQuerier, ServiceQuerier};
pub use scheduler::{Scheduler, SchedulerState};
pub use types::{CycleReport, QueryOutcome, QueryPlan, QueryReport, ServiceEntry};
