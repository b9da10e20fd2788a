//! Lookup adapter
//!
//! Runs one [`ServiceBrowser`] query and turns every response into a
//! [`TargetGroup`], forwarding groups to the refresh collector as they
//! arrive.
//!
//! ```text
//! ┌────────────────┐  ServiceEntry  ┌───────────────┐  TargetGroup  ┌───────────┐
//! │ ServiceBrowser │ ─────────────▶ │ LookupAdapter │ ────────────▶ │ collector │
//! └────────────────┘  (bounded)     └───────────────┘               └───────────┘
//! ```
//!
//! The browser runs on its own task and owns the sending half of the entry
//! channel; when its query window ends the channel closes and the lookup
//! finishes. Cancellation wins over pending entries: once the token fires the
//! browser task is aborted and [`Error::Cancelled`] is returned without
//! waiting for the stream to close.
//!
//! The browser task lives in a `JoinSet` owned by the lookup, so dropping the
//! lookup future (e.g. under `tokio::time::timeout`) aborts it as well.

use crate::error::{Error, Result};
use crate::target::TargetGroup;
use crate::traits::ServiceBrowser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Translates browser responses into target groups
#[derive(Clone)]
pub struct LookupAdapter {
    browser: Arc<dyn ServiceBrowser>,
    secure_marker: String,
    buffer_capacity: usize,
}

impl LookupAdapter {
    /// Create an adapter over `browser`
    ///
    /// # Parameters
    ///
    /// - `secure_marker`: service name substring that selects `https`
    /// - `buffer_capacity`: capacity of the entry channel between the browser
    ///   and the adapter
    pub fn new(
        browser: Arc<dyn ServiceBrowser>,
        secure_marker: impl Into<String>,
        buffer_capacity: usize,
    ) -> Self {
        Self {
            browser,
            secure_marker: secure_marker.into(),
            buffer_capacity: buffer_capacity.max(1),
        }
    }

    /// Name of the underlying browser
    pub fn browser_name(&self) -> &'static str {
        self.browser.browser_name()
    }

    /// Look up `service` and forward one group per response into `out`
    ///
    /// # Returns
    ///
    /// - `Ok(n)`: The browser finished; `n` groups were forwarded
    /// - `Err(Error::Cancelled)`: `cancel` fired or the collector went away
    /// - `Err(Error::Browser)`: The browser failed; groups forwarded before
    ///   the failure stay forwarded
    pub async fn lookup(
        &self,
        service: &str,
        cancel: &CancellationToken,
        out: &mpsc::UnboundedSender<TargetGroup>,
    ) -> Result<usize> {
        let (entries_tx, entries_rx) = mpsc::channel(self.buffer_capacity);

        let browser = Arc::clone(&self.browser);
        let query = service.to_string();
        let mut browse = JoinSet::new();
        browse.spawn(async move { browser.lookup(&query, entries_tx).await });

        let mut entries = ReceiverStream::new(entries_rx);
        let mut forwarded = 0;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    browse.abort_all();
                    debug!("Lookup for {} cancelled after {} response(s)", service, forwarded);
                    return Err(Error::Cancelled);
                }

                entry = entries.next() => {
                    let Some(entry) = entry else { break };

                    let group = TargetGroup::from_entry(&entry, &self.secure_marker);
                    if out.send(group).is_err() {
                        browse.abort_all();
                        return Err(Error::Cancelled);
                    }
                    forwarded += 1;
                }
            }
        }

        match browse.join_next().await {
            Some(Ok(Ok(()))) | None => {
                debug!("Lookup for {} finished: {} response(s)", service, forwarded);
                Ok(forwarded)
            }
            Some(Ok(Err(e))) => Err(e),
            Some(Err(e)) => Err(Error::browser(format!(
                "Lookup task for {} failed: {}",
                service, e
            ))),
        }
    }
}
