//! Types exchanged between the transport, the fan-out and the scheduler

use crate::error::DiscoveryError;
use promsd_core::Snapshot;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// One raw DNS-SD response as delivered by the query transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceEntry {
    /// Full instance name, e.g. `node1._prometheus-http._tcp.local.`
    pub name: String,

    /// Advertised host name, usually with a trailing dot
    pub host: String,

    /// Advertised port
    pub port: u16,

    /// Resolved IPv4 address, if any
    pub addr_v4: Option<Ipv4Addr>,

    /// Resolved IPv6 address, if any
    pub addr_v6: Option<Ipv6Addr>,

    /// Service name the entry was discovered under
    pub service: String,

    /// Raw TXT record strings in advertised order, `key=value` or bare `key`
    pub info_fields: Vec<String>,
}

impl ServiceEntry {
    /// Creates an entry with only a host and port.
    pub fn new(service: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            service: service.into(),
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_v4(mut self, addr: Ipv4Addr) -> Self {
        self.addr_v4 = Some(addr);
        self
    }

    pub fn with_v6(mut self, addr: Ipv6Addr) -> Self {
        self.addr_v6 = Some(addr);
        self
    }

    pub fn with_info(mut self, field: impl Into<String>) -> Self {
        self.info_fields.push(field.into());
        self
    }
}

/// One query issued per refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryPlan {
    /// Service name, e.g. `_prometheus-http._tcp`
    pub service: String,

    /// Interface to scope the query to; `None` queries unscoped
    pub interface: Option<String>,
}

impl QueryPlan {
    pub fn new(service: impl Into<String>, interface: Option<String>) -> Self {
        Self {
            service: service.into(),
            interface,
        }
    }

    /// Builds one plan per service name, repeated per interface when any
    /// are configured.
    pub fn for_services(services: &[String], interfaces: &[String]) -> Vec<QueryPlan> {
        if interfaces.is_empty() {
            return services
                .iter()
                .map(|s| QueryPlan::new(s.clone(), None))
                .collect();
        }

        services
            .iter()
            .flat_map(|s| {
                interfaces
                    .iter()
                    .map(move |i| QueryPlan::new(s.clone(), Some(i.clone())))
            })
            .collect()
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.interface {
            Some(interface) => write!(f, "{}%{}", self.service, interface),
            None => f.write_str(&self.service),
        }
    }
}

/// How a single query task ended.
#[derive(Debug)]
pub enum QueryOutcome {
    /// The response stream closed normally
    Completed { forwarded: usize, dropped: usize },

    /// The transport failed; treated as a query with no results
    Failed { error: DiscoveryError },

    /// Cancellation fired before the stream closed
    Cancelled { forwarded: usize },
}

impl QueryOutcome {
    /// Number of target groups this query forwarded.
    pub fn forwarded(&self) -> usize {
        match self {
            QueryOutcome::Completed { forwarded, .. } | QueryOutcome::Cancelled { forwarded } => {
                *forwarded
            }
            QueryOutcome::Failed { .. } => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryOutcome::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryOutcome::Cancelled { .. })
    }
}

/// Outcome of one plan within a refresh cycle.
#[derive(Debug)]
pub struct QueryReport {
    pub plan: QueryPlan,
    pub outcome: QueryOutcome,
}

/// Result of one refresh cycle.
#[derive(Debug)]
pub struct CycleReport {
    /// Every target group delivered during the cycle, in arrival order
    pub snapshot: Snapshot,

    /// One report per query plan, in plan order
    pub queries: Vec<QueryReport>,
}

impl CycleReport {
    /// Number of queries whose transport failed.
    pub fn failed_queries(&self) -> usize {
        self.queries.iter().filter(|q| q.outcome.is_failed()).count()
    }

    /// Whether any query was interrupted by cancellation.
    pub fn was_cancelled(&self) -> bool {
        self.queries.iter().any(|q| q.outcome.is_cancelled())
    }
}
