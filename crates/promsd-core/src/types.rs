//! Prometheus file_sd target groups.
//!
//! A [`TargetGroup`] is one discovered service instance: a single scrape
//! address with its labels. A [`Snapshot`] is everything found in one
//! refresh cycle.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Label holding the instance identity.
pub const INSTANCE_LABEL: &str = "instance";

/// Reserved label selecting the scrape scheme.
pub const SCHEME_LABEL: &str = "__scheme__";

/// Reserved label overriding the metrics path.
pub const METRICS_PATH_LABEL: &str = "__metrics_path__";

/// Prefix for labels carrying discovery metadata. Prometheus drops these
/// after relabeling, so TXT keys cannot collide with reserved labels.
pub const META_LABEL_PREFIX: &str = "__meta_";

/// Scrape scheme of a discovered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Returns the label value for this scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scrape target with its label set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetGroup {
    /// Scrape addresses, `host:port` or `[ipv6]:port`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,

    /// Label names to values, ordered by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl TargetGroup {
    /// Creates a group with a single target and no labels.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            targets: vec![target.into()],
            labels: BTreeMap::new(),
        }
    }

    /// Adds or replaces a label.
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_label(name, value);
        self
    }

    /// Adds or replaces a label in place.
    pub fn set_label(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(name.into(), value.into());
    }

    /// Returns a label value.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(|s| s.as_str())
    }

    /// Returns the first target, used as the sort key.
    pub fn first_target(&self) -> Option<&str> {
        self.targets.first().map(|s| s.as_str())
    }

    /// Snapshot ordering: by first target, groups without targets last.
    ///
    /// Equal first targets fall back to labels and then the full target
    /// list, so the order is total and independent of arrival order.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        let by_target = match (self.first_target(), other.first_target()) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };

        by_target
            .then_with(|| self.labels.cmp(&other.labels))
            .then_with(|| self.targets.cmp(&other.targets))
    }
}

/// All target groups produced by one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    groups: Vec<TargetGroup>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a group in arrival order.
    pub fn push(&mut self, group: TargetGroup) {
        self.groups.push(group);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[TargetGroup] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<TargetGroup> {
        self.groups
    }

    /// Sorts groups into their canonical order.
    pub fn sort(&mut self) {
        self.groups.sort_by(TargetGroup::sort_cmp);
    }

    /// Returns whether the groups are already in canonical order.
    pub fn is_sorted(&self) -> bool {
        self.groups
            .windows(2)
            .all(|w| w[0].sort_cmp(&w[1]) != Ordering::Greater)
    }

    /// Serializes the snapshot as a tab-indented JSON array, the format
    /// Prometheus `file_sd_configs` reads.
    ///
    /// The groups are written in their current order; call [`Snapshot::sort`]
    /// first for canonical output.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(128 * self.groups.len().max(1));
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.groups.serialize(&mut serializer)?;
        Ok(buf)
    }
}

impl From<Vec<TargetGroup>> for Snapshot {
    fn from(groups: Vec<TargetGroup>) -> Self {
        Self { groups }
    }
}

impl FromIterator<TargetGroup> for Snapshot {
    fn from_iter<I: IntoIterator<Item = TargetGroup>>(iter: I) -> Self {
        Self {
            groups: iter.into_iter().collect(),
        }
    }
}
