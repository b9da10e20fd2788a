//! Dedup & commit sink
//!
//! The sink is the single consumer of the engine's aggregate channel. For
//! every aggregate, in delivery order:
//!
//! 1. Canonicalize (sort by first target, empty groups last)
//! 2. Encode in the configured [`OutputFormat`]
//! 3. Fingerprint the encoded bytes (xxHash64)
//! 4. Same fingerprint as the last commit → skip, no I/O
//! 5. Otherwise commit through the [`OutputWriter`] and remember the
//!    fingerprint
//!
//! The last committed fingerprint is owned by the sink itself; it is only
//! touched by the one task running [`DedupSink::run`], so it needs no lock.
//! Encoding and commit failures are returned to the caller, which treats
//! them as fatal.

use crate::error::{Error, Result};
use crate::target::{self, OutputFormat, TargetGroup};
use crate::traits::OutputWriter;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use twox_hash::XxHash64;

/// Seed for output fingerprints
const FINGERPRINT_SEED: u64 = 0;

/// Fingerprint of an encoded aggregate
pub fn fingerprint(payload: &[u8]) -> u64 {
    XxHash64::oneshot(FINGERPRINT_SEED, payload)
}

/// What the sink did with one aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The payload differed from the last commit and is now visible
    Committed {
        fingerprint: u64,
        groups: usize,
        bytes: usize,
        at: DateTime<Utc>,
    },

    /// The payload matched the last commit; nothing was written
    Unchanged { fingerprint: u64 },
}

impl CommitOutcome {
    /// Whether this outcome produced a visible write
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Counters reported when the sink loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Aggregates written to the output
    pub committed: u64,
    /// Aggregates skipped as unchanged
    pub skipped: u64,
}

/// Deduplicating, committing consumer of aggregates
pub struct DedupSink {
    /// Destination of committed payloads
    writer: Box<dyn OutputWriter>,

    /// Encoding of committed payloads
    format: OutputFormat,

    /// Fingerprint of the last committed payload (`None` until the first commit)
    last_fingerprint: Option<u64>,

    /// Running counters
    stats: SinkStats,
}

impl DedupSink {
    /// Create a sink committing through `writer`
    pub fn new(writer: Box<dyn OutputWriter>, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            last_fingerprint: None,
            stats: SinkStats::default(),
        }
    }

    /// Fingerprint of the last committed payload
    pub fn last_fingerprint(&self) -> Option<u64> {
        self.last_fingerprint
    }

    /// Counters so far
    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Process one aggregate
    ///
    /// # Returns
    ///
    /// - `Ok(CommitOutcome)`: Committed or skipped
    /// - `Err(Error)`: Encoding or commit failed; the stored fingerprint is
    ///   left unchanged
    pub async fn process(&mut self, mut aggregate: Vec<TargetGroup>) -> Result<CommitOutcome> {
        target::canonicalize(&mut aggregate);

        let payload = target::encode(&aggregate, self.format)
            .map_err(|e| Error::encode(format!("Failed to encode {} group(s): {}", aggregate.len(), e)))?;
        let fingerprint = fingerprint(&payload);

        if self.last_fingerprint == Some(fingerprint) {
            debug!("Output unchanged ({:016x}), skipping write", fingerprint);
            self.stats.skipped += 1;
            return Ok(CommitOutcome::Unchanged { fingerprint });
        }

        self.writer.commit(&payload).await?;
        self.last_fingerprint = Some(fingerprint);
        self.stats.committed += 1;

        info!(
            "Committed {} group(s) to {} ({:016x})",
            aggregate.len(),
            self.writer.destination(),
            fingerprint
        );

        Ok(CommitOutcome::Committed {
            fingerprint,
            groups: aggregate.len(),
            bytes: payload.len(),
            at: Utc::now(),
        })
    }

    /// Consume aggregates until the channel closes
    ///
    /// # Returns
    ///
    /// - `Ok(SinkStats)`: The producer closed the channel
    /// - `Err(Error)`: The first encoding or commit failure
    pub async fn run(mut self, mut rx: mpsc::Receiver<Vec<TargetGroup>>) -> Result<SinkStats> {
        while let Some(aggregate) = rx.recv().await {
            if let Err(e) = self.process(aggregate).await {
                error!("Failed to commit output to {}: {}", self.writer.destination(), e);
                return Err(e);
            }
        }

        debug!(
            "Aggregate channel closed: {} committed, {} skipped",
            self.stats.committed, self.stats.skipped
        );
        Ok(self.stats)
    }
}
