// # mDNS Service Browser
//
// This crate provides the multicast DNS implementation of
// `prom_mdns_core::traits::ServiceBrowser`, backed by the `mdns-sd` crate.
//
// ## Query Model
//
// mdns-sd browses continuously and caches what it has resolved. A lookup
// therefore opens a browse for the service type, collects resolved instances
// for a fixed query window, then stops the browse again. Each instance (by
// full name) is reported at most once per lookup.
//
// A browse is stopped when its lookup ends, including when the lookup is
// aborted from outside mid-query.
//
// ## Sharing
//
// One `ServiceDaemon` owns the multicast sockets. It is shared by every
// lookup of every cycle and shut down explicitly by the daemon on exit.

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use prom_mdns_core::traits::{ServiceBrowser, ServiceEntry};
use prom_mdns_core::{Error, Result};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Default length of the query window
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Domain appended to bare service types
const LOCAL_DOMAIN: &str = "local.";

/// mDNS browser over a shared `ServiceDaemon`
#[derive(Clone)]
pub struct MdnsBrowser {
    daemon: Arc<ServiceDaemon>,
    query_timeout: Duration,
}

impl MdnsBrowser {
    /// Start the mDNS daemon
    ///
    /// # Errors
    ///
    /// Returns `Error::Browser` if the multicast sockets cannot be opened.
    pub fn new(query_timeout: Duration) -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::browser(format!("Failed to start mDNS daemon: {}", e)))?;

        Ok(Self {
            daemon: Arc::new(daemon),
            query_timeout,
        })
    }

    /// Length of the query window
    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Stop the mDNS daemon
    ///
    /// Lookups issued afterwards fail with `Error::Browser`.
    pub fn shutdown(&self) -> Result<()> {
        self.daemon
            .shutdown()
            .map(|_| ())
            .map_err(|e| Error::browser(format!("Failed to shut down mDNS daemon: {}", e)))
    }
}

/// Fully qualify a service type for browsing
///
/// `_prometheus-http._tcp` becomes `_prometheus-http._tcp.local.`; names that
/// already carry a domain only gain the trailing dot if it is missing.
pub fn normalize_service_type(service: &str) -> String {
    let service = service.trim_end_matches('.');

    if service.ends_with(".local") {
        format!("{}.", service)
    } else {
        format!("{}.{}", service, LOCAL_DOMAIN)
    }
}

/// Convert a resolved instance into a `ServiceEntry`
///
/// The lowest IPv4 and the lowest IPv6 address are kept so that repeated
/// lookups of an unchanged instance produce the same entry.
pub fn entry_from_info(info: &ServiceInfo) -> ServiceEntry {
    let addresses = info.get_addresses();

    let mut entry = ServiceEntry::new(info.get_hostname(), info.get_port(), info.get_fullname());

    if let Some(v4) = addresses
        .iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
        .min()
    {
        entry = entry.with_v4(v4);
    }

    if let Some(v6) = addresses
        .iter()
        .filter_map(|addr| match addr {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        })
        .min()
    {
        entry = entry.with_v6(v6);
    }

    for property in info.get_properties().iter() {
        entry = match property.val() {
            Some(value) => entry.with_info(format!(
                "{}={}",
                property.key(),
                String::from_utf8_lossy(value)
            )),
            None => entry.with_info(property.key()),
        };
    }

    entry
}

#[async_trait::async_trait]
impl ServiceBrowser for MdnsBrowser {
    async fn lookup(&self, service: &str, sink: mpsc::Sender<ServiceEntry>) -> Result<()> {
        let service_type = normalize_service_type(service);

        let receiver = self
            .daemon
            .browse(&service_type)
            .map_err(|e| Error::browser(format!("Failed to browse {}: {}", service_type, e)))?;

        let daemon = Arc::clone(&self.daemon);
        let stop_type = service_type.clone();
        let _session = StopOnDrop::new(move || stop_browse(&daemon, &stop_type));

        let deadline = Instant::now() + self.query_timeout;
        let mut seen = HashSet::new();

        loop {
            let event = match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    // Daemon went away mid-query
                    return Err(Error::browser(format!(
                        "mDNS daemon closed while browsing {}: {}",
                        service_type, e
                    )));
                }
                Err(_) => break,
            };

            match event {
                ServiceEvent::ServiceResolved(info) => {
                    if !seen.insert(info.get_fullname().to_string()) {
                        continue;
                    }

                    trace!(
                        "Resolved {} at {}:{}",
                        info.get_fullname(),
                        info.get_hostname(),
                        info.get_port()
                    );

                    if sink.send(entry_from_info(&info)).await.is_err() {
                        debug!("Entry consumer for {} closed, ending query early", service_type);
                        break;
                    }
                }
                ServiceEvent::SearchStarted(_) | ServiceEvent::SearchStopped(_) => {}
                other => trace!("Ignoring {:?} while browsing {}", other, service_type),
            }
        }

        debug!("Query for {} found {} instance(s)", service_type, seen.len());

        Ok(())
    }

    fn browser_name(&self) -> &'static str {
        "mdns"
    }
}

fn stop_browse(daemon: &ServiceDaemon, service_type: &str) {
    if let Err(e) = daemon.stop_browse(service_type) {
        warn!("Failed to stop browsing {}: {}", service_type, e);
    }
}

/// Runs a closure exactly once when dropped
struct StopOnDrop<F: FnOnce()> {
    stop: Option<F>,
}

impl<F: FnOnce()> StopOnDrop<F> {
    fn new(stop: F) -> Self {
        Self { stop: Some(stop) }
    }
}

impl<F: FnOnce()> Drop for StopOnDrop<F> {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}
