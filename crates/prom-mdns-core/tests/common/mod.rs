//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal service browsers that let the contract tests
//! control what each lookup returns, how long it takes, and whether it
//! fails, without touching the network.

#![allow(dead_code)]

use prom_mdns_core::config::{DiscoveryConfig, HTTP_SERVICE, HTTPS_SERVICE};
use prom_mdns_core::error::{Error, Result};
use prom_mdns_core::traits::{ServiceBrowser, ServiceEntry};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A browser answering from a mutable table of canned entries
pub struct StaticBrowser {
    /// Entries returned per service name
    entries: Arc<Mutex<HashMap<String, Vec<ServiceEntry>>>>,
    /// Service names whose lookup fails (after sending their entries)
    failing: Arc<Mutex<HashSet<String>>>,
    /// Delay before each lookup answers
    delay: Duration,
    /// Call counter for lookup()
    lookup_call_count: Arc<AtomicUsize>,
}

impl StaticBrowser {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            delay: Duration::ZERO,
            lookup_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay every lookup by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the entries returned for `service`
    pub fn set_entries(&self, service: &str, entries: Vec<ServiceEntry>) {
        self.entries
            .lock()
            .unwrap()
            .insert(service.to_string(), entries);
    }

    /// Make lookups for `service` fail
    pub fn fail_service(&self, service: &str) {
        self.failing.lock().unwrap().insert(service.to_string());
    }

    /// Get the number of times lookup() was called
    pub fn lookup_call_count(&self) -> usize {
        self.lookup_call_count.load(Ordering::SeqCst)
    }

    /// Create a new StaticBrowser that shares tables and counters with an existing one
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            entries: Arc::clone(&other.entries),
            failing: Arc::clone(&other.failing),
            delay: other.delay,
            lookup_call_count: Arc::clone(&other.lookup_call_count),
        }
    }
}

#[async_trait::async_trait]
impl ServiceBrowser for StaticBrowser {
    async fn lookup(&self, service: &str, sink: mpsc::Sender<ServiceEntry>) -> Result<()> {
        self.lookup_call_count.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let entries = self
            .entries
            .lock()
            .unwrap()
            .get(service)
            .cloned()
            .unwrap_or_default();

        for entry in entries {
            if sink.send(entry).await.is_err() {
                return Ok(());
            }
        }

        if self.failing.lock().unwrap().contains(service) {
            return Err(Error::browser(format!("lookup for {} failed", service)));
        }

        Ok(())
    }

    fn browser_name(&self) -> &'static str {
        "static"
    }
}

/// Sets a flag when dropped; used to observe aborted lookup tasks
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A browser whose lookups never finish on their own
pub struct HangingBrowser {
    /// Call counter for lookup()
    lookup_call_count: Arc<AtomicUsize>,
    /// Number of lookups that were torn down (aborted)
    aborted: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
}

impl HangingBrowser {
    pub fn new() -> Self {
        Self {
            lookup_call_count: Arc::new(AtomicUsize::new(0)),
            aborted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the number of times lookup() was called
    pub fn lookup_call_count(&self) -> usize {
        self.lookup_call_count.load(Ordering::SeqCst)
    }

    /// Number of lookups whose future has been dropped
    pub fn torn_down_count(&self) -> usize {
        self.aborted
            .lock()
            .unwrap()
            .iter()
            .filter(|flag| flag.load(Ordering::SeqCst))
            .count()
    }

    /// Create a new HangingBrowser that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            lookup_call_count: Arc::clone(&other.lookup_call_count),
            aborted: Arc::clone(&other.aborted),
        }
    }
}

#[async_trait::async_trait]
impl ServiceBrowser for HangingBrowser {
    async fn lookup(&self, _service: &str, _sink: mpsc::Sender<ServiceEntry>) -> Result<()> {
        self.lookup_call_count.fetch_add(1, Ordering::SeqCst);

        let flag = Arc::new(AtomicBool::new(false));
        self.aborted.lock().unwrap().push(Arc::clone(&flag));
        let _guard = DropFlag(flag);

        std::future::pending::<()>().await;
        Ok(())
    }

    fn browser_name(&self) -> &'static str {
        "hanging"
    }
}

/// An entry as advertised for plain-HTTP metrics
pub fn http_entry(host: &str, port: u16, ip: [u8; 4]) -> ServiceEntry {
    ServiceEntry::new(
        format!("{}.", host),
        port,
        format!("{}.{}.local.", host, HTTP_SERVICE),
    )
    .with_v4(Ipv4Addr::from(ip))
}

/// An entry as advertised for HTTPS metrics
pub fn https_entry(host: &str, port: u16, ip: [u8; 4]) -> ServiceEntry {
    ServiceEntry::new(
        format!("{}.", host),
        port,
        format!("{}.{}.local.", host, HTTPS_SERVICE),
    )
    .with_v4(Ipv4Addr::from(ip))
}

/// Helper to create a DiscoveryConfig with a short interval for testing
pub fn test_config(interval_ms: u64) -> DiscoveryConfig {
    DiscoveryConfig::new().with_interval(Duration::from_millis(interval_ms))
}
