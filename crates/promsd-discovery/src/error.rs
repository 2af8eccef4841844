//! Error types for the discovery engine

use promsd_core::ConfigError;
use thiserror::Error;

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors that can occur during service discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// mDNS service daemon failed to initialize
    #[error("Failed to initialize mDNS daemon: {0}")]
    DaemonInit(String),

    /// A single query could not be issued
    #[error("Failed to query '{service}'{}: {reason}", on_interface(.interface))]
    QueryFailed {
        service: String,
        interface: Option<String>,
        reason: String,
    },

    /// A configured network interface does not exist
    #[error("Network interface not found: {0}")]
    InterfaceNotFound(String),

    /// Network interfaces could not be enumerated
    #[error("Failed to list network interfaces: {0}")]
    InterfaceEnumeration(#[source] std::io::Error),

    /// Writing a snapshot to its destination failed
    #[error("Failed to write targets to {destination}: {source}")]
    Output {
        destination: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot serialization failed
    #[error("Failed to serialize targets: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn on_interface(interface: &Option<String>) -> String {
    interface
        .as_deref()
        .map(|i| format!(" on {}", i))
        .unwrap_or_default()
}

impl DiscoveryError {
    /// Creates a query failed error.
    pub fn query_failed(
        service: impl Into<String>,
        interface: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self::QueryFailed {
            service: service.into(),
            interface: interface.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// Returns true for errors that end the process rather than a single query.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DiscoveryError::QueryFailed { .. })
    }
}
