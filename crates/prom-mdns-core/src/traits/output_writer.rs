// # Output Writer Trait
//
// Defines where committed target lists go.
//
// ## Purpose
//
// The dedup sink decides *whether* an aggregate is committed; the writer
// decides *how*. A commit must be all-or-nothing from the reader's point of
// view: nobody may observe a partially written payload.
//
// ## Implementations
//
// - Console: stdout, one payload per commit
// - File: write-to-temp then atomic rename
// - Memory: keeps payloads for embedding and tests

use async_trait::async_trait;

/// Trait for output writer implementations
///
/// # Thread Safety
///
/// The sink calls `commit` from a single consumer task, one payload at a
/// time. Implementations still need to be `Send + Sync` so the sink can be
/// moved into a spawned task.
///
/// # Failure
///
/// A commit error is fatal for the daemon. Implementations must not leave a
/// half-written payload visible when they fail, and must clean up any
/// temporary resources on every exit path.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Publish `payload` as the new output
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The payload is now the visible output
    /// - `Err(Error)`: Nothing new is visible; the previous output (if any) stands
    async fn commit(&self, payload: &[u8]) -> Result<(), crate::Error>;

    /// Human-readable destination, used in logs
    fn destination(&self) -> String;
}
