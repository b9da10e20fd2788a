// # Service Browser Trait
//
// Defines the interface to the service discovery wire protocol.
//
// ## Implementations
//
// - mDNS / DNS-SD: `prom-mdns-browser` crate (backed by `mdns-sd`)
// - Tests: static and scripted browsers in `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use prom_mdns_core::ServiceBrowser;
// use tokio::sync::mpsc;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let browser = /* ServiceBrowser implementation */;
//
//     let (tx, mut rx) = mpsc::channel(100);
//     tokio::spawn(async move { browser.lookup("_prometheus-http._tcp", tx).await });
//
//     while let Some(entry) = rx.recv().await {
//         println!("found {}:{}", entry.host, entry.port);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::sync::mpsc;

/// One resolved service instance as reported by the discovery protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    /// Host name advertised by the instance (may carry a trailing `.`)
    pub host: String,
    /// Service port
    pub port: u16,
    /// IPv4 address, if one was advertised
    pub addr_v4: Option<Ipv4Addr>,
    /// IPv6 address, if one was advertised
    pub addr_v6: Option<Ipv6Addr>,
    /// Full instance name (e.g. `node1._prometheus-http._tcp.local.`)
    pub name: String,
    /// Free-form `key=value` info (TXT) fields
    pub info_fields: Vec<String>,
}

impl ServiceEntry {
    /// Create an entry with no addresses and no info fields
    pub fn new(host: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            addr_v4: None,
            addr_v6: None,
            name: name.into(),
            info_fields: Vec::new(),
        }
    }

    /// Set the IPv4 address
    pub fn with_v4(mut self, addr: Ipv4Addr) -> Self {
        self.addr_v4 = Some(addr);
        self
    }

    /// Set the IPv6 address
    pub fn with_v6(mut self, addr: Ipv6Addr) -> Self {
        self.addr_v6 = Some(addr);
        self
    }

    /// Append an info field
    pub fn with_info(mut self, field: impl Into<String>) -> Self {
        self.info_fields.push(field.into());
        self
    }
}

/// Trait for service discovery protocol implementations
///
/// A browser performs one bounded query for a service name and pushes every
/// instance it resolves into `sink`. The caller owns the receiving side and
/// treats the sink being dropped (the call returning) as the end of the
/// response stream.
///
/// # Responsibilities
///
/// Browsers are **observers**:
/// - Perform protocol I/O (multicast sockets, daemons)
/// - Bound their own query window; `lookup` must eventually return
///
/// They must not:
/// - Retry failed lookups (the next refresh cycle is the retry)
/// - Build target groups or labels (owned by the lookup adapter)
/// - Cache results across calls
///
/// # Cancellation
///
/// The engine may drop the receiver or abort the task running `lookup` at
/// any await point. A closed sink is not an error; implementations should
/// stop and return `Ok(())`.
#[async_trait]
pub trait ServiceBrowser: Send + Sync {
    /// Query for `service` and push each resolved instance into `sink`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The query window finished (zero or more entries sent)
    /// - `Err(Error)`: The query could not be performed
    async fn lookup(
        &self,
        service: &str,
        sink: mpsc::Sender<ServiceEntry>,
    ) -> Result<(), crate::Error>;

    /// Short name used in logs
    fn browser_name(&self) -> &'static str;
}
