//! Common test utilities and helpers for integration tests

use promsd_discovery::{Result, ServiceEntry, ServiceQuerier, SnapshotSink};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

pub const HTTP: &str = "_prometheus-http._tcp";
pub const HTTPS: &str = "_prometheus-https._tcp";

/// A querier whose answers change from cycle to cycle.
///
/// Each service name has a script of response lists. Query number `n` for a
/// service gets entry `n` of its script; once the script runs out the last
/// entry repeats.
#[derive(Default)]
pub struct ScriptedQuerier {
    scripts: HashMap<String, Vec<Vec<ServiceEntry>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedQuerier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, service: &str, cycles: Vec<Vec<ServiceEntry>>) -> Self {
        self.scripts.insert(service.to_string(), cycles);
        self
    }

    pub fn calls(&self, service: &str) -> usize {
        self.calls.lock().unwrap().get(service).copied().unwrap_or(0)
    }
}

impl ServiceQuerier for ScriptedQuerier {
    fn query(
        &self,
        service: &str,
        _interface: Option<&str>,
    ) -> Result<async_channel::Receiver<ServiceEntry>> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(service.to_string()).or_insert(0);
            *n += 1;
            *n - 1
        };

        let (tx, rx) = async_channel::unbounded();
        if let Some(script) = self.scripts.get(service) {
            if let Some(entries) = script.get(n).or_else(|| script.last()) {
                for entry in entries {
                    tx.try_send(entry.clone()).unwrap();
                }
            }
        }
        Ok(rx)
    }
}

/// Sink that keeps every payload in memory, shareable with the test body.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub writes: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn payloads(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

impl SnapshotSink for RecordingSink {
    fn write(&mut self, payload: &[u8]) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push(String::from_utf8(payload.to_vec()).unwrap());
        Ok(())
    }
}

/// An HTTP node at `10.0.0.<octet>:9100` advertising a metrics path.
pub fn node(octet: u8) -> ServiceEntry {
    ServiceEntry::new(HTTP, format!("node{}.local.", octet), 9100)
        .with_v4(Ipv4Addr::new(10, 0, 0, octet))
        .with_info("path=/metrics")
}
