//! In-memory queriers for unit tests

use crate::error::{DiscoveryError, Result};
use crate::querier::ServiceQuerier;
use crate::types::ServiceEntry;
use async_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Key = (String, Option<String>);

/// Answers every query from a fixed table and closes the stream.
/// Unknown (service, interface) pairs yield an empty result.
#[derive(Default)]
pub struct StaticQuerier {
    responses: HashMap<Key, std::result::Result<Vec<ServiceEntry>, String>>,
    calls: AtomicUsize,
}

impl StaticQuerier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(
        mut self,
        service: &str,
        interface: Option<&str>,
        entries: Vec<ServiceEntry>,
    ) -> Self {
        self.responses.insert(
            (service.to_string(), interface.map(str::to_string)),
            Ok(entries),
        );
        self
    }

    pub fn with_failure(mut self, service: &str, interface: Option<&str>, reason: &str) -> Self {
        self.responses.insert(
            (service.to_string(), interface.map(str::to_string)),
            Err(reason.to_string()),
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ServiceQuerier for StaticQuerier {
    fn query(&self, service: &str, interface: Option<&str>) -> Result<Receiver<ServiceEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let key = (service.to_string(), interface.map(str::to_string));
        let (tx, rx) = async_channel::unbounded();
        match self.responses.get(&key) {
            Some(Ok(entries)) => {
                for entry in entries {
                    let _ = tx.try_send(entry.clone());
                }
            }
            Some(Err(reason)) => {
                return Err(DiscoveryError::query_failed(service, interface, reason.clone()))
            }
            None => {}
        }
        Ok(rx)
    }
}

/// Delivers the given entries and then never closes the stream, like a
/// transport that hangs until the caller gives up.
pub struct HangingQuerier {
    entries: Vec<ServiceEntry>,
    open: Mutex<Vec<Sender<ServiceEntry>>>,
}

impl HangingQuerier {
    pub fn new(entries: Vec<ServiceEntry>) -> Self {
        Self {
            entries,
            open: Mutex::new(Vec::new()),
        }
    }
}

impl ServiceQuerier for HangingQuerier {
    fn query(&self, _service: &str, _interface: Option<&str>) -> Result<Receiver<ServiceEntry>> {
        let (tx, rx) = async_channel::unbounded();
        for entry in &self.entries {
            let _ = tx.try_send(entry.clone());
        }
        self.open.lock().unwrap().push(tx);
        Ok(rx)
    }
}
