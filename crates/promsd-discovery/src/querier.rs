//! Query transport: the seam between the discovery engine and mDNS.
//!
//! A [`ServiceQuerier`] turns a service name (and optional interface) into
//! a stream of [`ServiceEntry`] values that closes once the query is
//! exhausted. [`MdnsQuerier`] implements it on top of `mdns-sd`.

use crate::error::{DiscoveryError, Result};
use crate::types::ServiceEntry;
use async_channel::Receiver;
use mdns_sd::{IfKind, ServiceDaemon, ServiceEvent as MdnsEvent, ServiceInfo};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Raw responses buffered per query before the mapper catches up
const RESPONSE_CHANNEL_CAPACITY: usize = 100;

/// Issues DNS-SD queries.
pub trait ServiceQuerier: Send + Sync {
    /// Starts a query for `service`, scoped to `interface` when given.
    ///
    /// The returned stream yields responses as they arrive and closes when
    /// the query is done. An error means the query could not be issued at
    /// all.
    fn query(&self, service: &str, interface: Option<&str>) -> Result<Receiver<ServiceEntry>>;
}

/// Returns the fully qualified mDNS service type for a service name.
pub fn service_type(service: &str) -> String {
    if service.ends_with('.') {
        service.to_string()
    } else if service.ends_with(".local") {
        format!("{}.", service)
    } else {
        format!("{}.local.", service)
    }
}

/// mDNS transport backed by `mdns-sd` daemons.
///
/// Unscoped queries share one daemon listening on every interface. When
/// interfaces are configured, each gets its own daemon with all other
/// interfaces disabled, so a query only sees responses from that link.
pub struct MdnsQuerier {
    unscoped: Option<ServiceDaemon>,
    scoped: HashMap<String, ServiceDaemon>,
    timeout: Duration,
}

impl MdnsQuerier {
    /// Creates the daemons. `timeout` bounds how long each query listens.
    pub fn new(interfaces: &[String], timeout: Duration) -> Result<Self> {
        let mut scoped = HashMap::new();
        let unscoped = if interfaces.is_empty() {
            Some(new_daemon(None)?)
        } else {
            for interface in interfaces {
                if !scoped.contains_key(interface) {
                    scoped.insert(interface.clone(), new_daemon(Some(interface))?);
                }
            }
            None
        };

        debug!(
            interfaces = ?interfaces,
            timeout = ?timeout,
            "mDNS querier created"
        );

        Ok(Self {
            unscoped,
            scoped,
            timeout,
        })
    }

    fn daemon_for(&self, interface: Option<&str>) -> Option<&ServiceDaemon> {
        match interface {
            Some(name) => self.scoped.get(name),
            None => self.unscoped.as_ref(),
        }
    }
}

fn new_daemon(interface: Option<&str>) -> Result<ServiceDaemon> {
    let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::DaemonInit(e.to_string()))?;

    if let Some(name) = interface {
        daemon
            .disable_interface(IfKind::All)
            .and_then(|_| daemon.enable_interface(IfKind::Name(name.to_string())))
            .map_err(|e| {
                DiscoveryError::DaemonInit(format!("Failed to scope daemon to {}: {}", name, e))
            })?;
    }

    Ok(daemon)
}

impl ServiceQuerier for MdnsQuerier {
    fn query(&self, service: &str, interface: Option<&str>) -> Result<Receiver<ServiceEntry>> {
        let daemon = self
            .daemon_for(interface)
            .ok_or_else(|| {
                DiscoveryError::query_failed(service, interface, "no mDNS daemon for interface")
            })?
            .clone();

        let service_type = service_type(service);
        let browser = daemon
            .browse(&service_type)
            .map_err(|e| DiscoveryError::query_failed(service, interface, e.to_string()))?;

        let (tx, rx) = async_channel::bounded(RESPONSE_CHANNEL_CAPACITY);
        let timeout = self.timeout;
        let service = service.to_string();

        tokio::spawn(async move {
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            // Instances can resolve several times as records arrive; keep
            // the merged view and forward each one when the window closes.
            let mut resolved = ResolvedSet::default();

            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = browser.recv_async() => match event {
                        Ok(MdnsEvent::ServiceResolved(info)) => {
                            trace!(
                                service = info.get_fullname(),
                                hostname = info.get_hostname(),
                                port = info.get_port(),
                                "Service resolved"
                            );
                            resolved.update(entry_from_info(&info, &service));
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    },
                }
            }

            for entry in resolved.into_entries() {
                if tx.send(entry).await.is_err() {
                    break;
                }
            }

            if let Err(e) = daemon.stop_browse(&service_type) {
                debug!(service = service_type, error = %e, "Failed to stop browse");
            }
        });

        Ok(rx)
    }
}

impl Drop for MdnsQuerier {
    fn drop(&mut self) {
        for daemon in self.unscoped.iter().chain(self.scoped.values()) {
            if let Err(e) = daemon.shutdown() {
                warn!(error = %e, "Failed to shut down mDNS daemon");
            }
        }
    }
}

/// Resolved instances of one query, keyed by full instance name.
///
/// A later resolution replaces host, port and TXT fields, while addresses
/// are merged so an address seen earlier in the window is not lost.
#[derive(Debug, Default)]
pub struct ResolvedSet {
    order: Vec<String>,
    entries: HashMap<String, ServiceEntry>,
}

impl ResolvedSet {
    /// Records a resolution. Returns true if it added or changed anything.
    pub fn update(&mut self, mut entry: ServiceEntry) -> bool {
        match self.entries.get(&entry.name) {
            Some(existing) => {
                entry.addr_v4 = lowest(existing.addr_v4, entry.addr_v4);
                entry.addr_v6 = lowest(existing.addr_v6, entry.addr_v6);
                if *existing == entry {
                    return false;
                }
            }
            None => self.order.push(entry.name.clone()),
        }
        self.entries.insert(entry.name.clone(), entry);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Final entries in first-resolved order.
    pub fn into_entries(mut self) -> Vec<ServiceEntry> {
        self.order
            .iter()
            .filter_map(|name| self.entries.remove(name))
            .collect()
    }
}

fn lowest<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Converts a resolved `mdns-sd` service into a raw entry.
///
/// The lowest address of each family is reported so the chosen target does
/// not flap between cycles for multi-homed hosts.
pub fn entry_from_info(info: &ServiceInfo, service: &str) -> ServiceEntry {
    let addresses = info.get_addresses();
    let addr_v4 = addresses
        .iter()
        .filter_map(|a| match a {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
        .min();
    let addr_v6 = addresses
        .iter()
        .filter_map(|a| match a {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        })
        .min();

    let info_fields = info
        .get_properties()
        .iter()
        .map(|property| match property.val() {
            Some(value) => format!("{}={}", property.key(), String::from_utf8_lossy(value)),
            None => property.key().to_string(),
        })
        .collect();

    ServiceEntry {
        name: info.get_fullname().to_string(),
        host: info.get_hostname().to_string(),
        port: info.get_port(),
        addr_v4,
        addr_v6,
        service: service.to_string(),
        info_fields,
    }
}
