//! Maps raw DNS-SD responses to Prometheus target groups.
//!
//! Address selection prefers the resolved IPv4 address, then the IPv6
//! address, then the advertised host name. TXT fields become labels: `path`
//! sets the metrics path, anything else is namespaced under `__meta_`.

use crate::types::ServiceEntry;
use promsd_core::types::{
    Scheme, TargetGroup, INSTANCE_LABEL, METRICS_PATH_LABEL, META_LABEL_PREFIX, SCHEME_LABEL,
};

/// TXT key that overrides the scrape path.
pub const PATH_KEY: &str = "path";

/// Settings that shape how responses become target groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperOptions {
    /// Drop responses without a resolved IPv4 address
    pub ipv4_only: bool,

    /// Services discovered under this name are scraped over HTTPS
    pub secure_service: String,
}

impl MapperOptions {
    pub fn new(secure_service: impl Into<String>, ipv4_only: bool) -> Self {
        Self {
            ipv4_only,
            secure_service: secure_service.into(),
        }
    }

    /// Returns the scheme for a service discovered under `service`.
    pub fn scheme_for(&self, service: &str) -> Scheme {
        if normalize_service(service) == normalize_service(&self.secure_service) {
            Scheme::Https
        } else {
            Scheme::Http
        }
    }
}

/// Strips trailing dots and the `.local` domain so `_x._tcp` and
/// `_x._tcp.local.` compare equal.
fn normalize_service(service: &str) -> &str {
    let trimmed = service.trim_end_matches('.');
    trimmed.strip_suffix(".local").unwrap_or(trimmed)
}

/// Picks the scrape address for an entry.
pub fn target_address(entry: &ServiceEntry) -> String {
    if let Some(v4) = entry.addr_v4 {
        format!("{}:{}", v4, entry.port)
    } else if let Some(v6) = entry.addr_v6 {
        format!("[{}]:{}", v6, entry.port)
    } else {
        format!("{}:{}", entry.host, entry.port)
    }
}

/// Splits a TXT field on the first `=`; a field without one is a key with
/// an empty value.
pub fn split_info_field(field: &str) -> (&str, &str) {
    field.split_once('=').unwrap_or((field, ""))
}

/// Returns the label name a TXT key is published under.
pub fn label_for_key(key: &str) -> String {
    if key == PATH_KEY {
        METRICS_PATH_LABEL.to_string()
    } else {
        format!("{}{}", META_LABEL_PREFIX, key)
    }
}

/// Turns one response into a target group, or `None` when the response is
/// filtered out.
pub fn map_entry(entry: &ServiceEntry, options: &MapperOptions) -> Option<TargetGroup> {
    if options.ipv4_only && entry.addr_v4.is_none() {
        return None;
    }

    let mut group = TargetGroup::new(target_address(entry))
        .with_label(INSTANCE_LABEL, entry.host.trim_end_matches('.'))
        .with_label(SCHEME_LABEL, options.scheme_for(&entry.service).as_str());

    for field in &entry.info_fields {
        let (key, value) = split_info_field(field);
        group.set_label(label_for_key(key), value);
    }

    Some(group)
}
