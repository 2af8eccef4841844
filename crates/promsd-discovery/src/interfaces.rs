//! Network interface enumeration.

use crate::error::{DiscoveryError, Result};
use nix::net::if_::InterfaceFlags;
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::warn;

/// Flags shown in listings, in display order.
const FLAG_NAMES: [(InterfaceFlags, &str); 6] = [
    (InterfaceFlags::IFF_UP, "up"),
    (InterfaceFlags::IFF_BROADCAST, "broadcast"),
    (InterfaceFlags::IFF_LOOPBACK, "loopback"),
    (InterfaceFlags::IFF_POINTOPOINT, "pointtopoint"),
    (InterfaceFlags::IFF_MULTICAST, "multicast"),
    (InterfaceFlags::IFF_RUNNING, "running"),
];

/// One network interface and its kernel flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSummary {
    pub name: String,
    pub flags: InterfaceFlags,
}

impl InterfaceSummary {
    pub fn new(name: impl Into<String>, flags: InterfaceFlags) -> Self {
        Self {
            name: name.into(),
            flags,
        }
    }

    /// `|` separated flag names, e.g. `up|broadcast|multicast`.
    pub fn flag_names(&self) -> String {
        let names: Vec<&str> = FLAG_NAMES
            .iter()
            .filter(|(flag, _)| self.flags.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        names.join("|")
    }

    pub fn is_up(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_UP)
    }

    pub fn supports_multicast(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_MULTICAST)
    }
}

/// Lists the host's interfaces, one entry per name, sorted by name.
///
/// Interfaces without any IP address are included; on Linux every
/// interface reports at least its link-layer entry.
pub fn list_interfaces() -> Result<Vec<InterfaceSummary>> {
    let ifaddrs = nix::ifaddrs::getifaddrs()
        .map_err(|errno| DiscoveryError::InterfaceEnumeration(errno.into()))?;

    let mut by_name: BTreeMap<String, InterfaceFlags> = BTreeMap::new();
    for ifaddr in ifaddrs {
        *by_name
            .entry(ifaddr.interface_name)
            .or_insert_with(InterfaceFlags::empty) |= ifaddr.flags;
    }

    Ok(by_name
        .into_iter()
        .map(|(name, flags)| InterfaceSummary::new(name, flags))
        .collect())
}

/// Renders interfaces as a `name flags` table.
pub fn format_interfaces(interfaces: &[InterfaceSummary]) -> String {
    let width = interfaces
        .iter()
        .map(|i| i.name.len())
        .max()
        .unwrap_or(0)
        .max("name".len());

    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  flags", "name", width = width);
    for iface in interfaces {
        let _ = writeln!(out, "{:<width$}  {}", iface.name, iface.flag_names(), width = width);
    }
    out
}

/// Checks that every requested interface exists.
///
/// Returns the names deduplicated in the order given.
pub fn resolve_interfaces(
    requested: &[String],
    available: &[InterfaceSummary],
) -> Result<Vec<String>> {
    let mut resolved: Vec<String> = Vec::with_capacity(requested.len());
    for name in requested {
        let Some(iface) = available.iter().find(|i| &i.name == name) else {
            return Err(DiscoveryError::InterfaceNotFound(name.clone()));
        };
        if !iface.is_up() || !iface.supports_multicast() {
            warn!(
                interface = %name,
                flags = %iface.flag_names(),
                "Interface is down or not multicast capable; queries on it may find nothing"
            );
        }
        if !resolved.contains(name) {
            resolved.push(name.clone());
        }
    }
    Ok(resolved)
}
