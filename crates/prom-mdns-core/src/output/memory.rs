// # Memory Output
//
// In-memory implementation of OutputWriter.
//
// Keeps every committed payload in order. Useful when the engine is embedded
// in another program that consumes target lists directly, and in tests that
// need to count externally visible writes.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::OutputWriter;

/// In-memory output writer
///
/// Clones share the same commit log.
///
/// # Example
///
/// ```rust,no_run
/// use prom_mdns_core::output::MemoryOutput;
/// use prom_mdns_core::traits::OutputWriter;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let output = MemoryOutput::new();
///     output.commit(b"[]").await?;
///
///     assert_eq!(output.last().await.as_deref(), Some(&b"[]"[..]));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    commits: Arc<RwLock<Vec<Vec<u8>>>>,
}

impl MemoryOutput {
    /// Create a new empty memory output
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits so far
    pub async fn len(&self) -> usize {
        self.commits.read().await.len()
    }

    /// Check if nothing was committed yet
    pub async fn is_empty(&self) -> bool {
        self.commits.read().await.is_empty()
    }

    /// The most recent payload
    pub async fn last(&self) -> Option<Vec<u8>> {
        self.commits.read().await.last().cloned()
    }

    /// All payloads, oldest first
    pub async fn commits(&self) -> Vec<Vec<u8>> {
        self.commits.read().await.clone()
    }
}

#[async_trait]
impl OutputWriter for MemoryOutput {
    async fn commit(&self, payload: &[u8]) -> Result<(), Error> {
        self.commits.write().await.push(payload.to_vec());
        Ok(())
    }

    fn destination(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_output_keeps_order() {
        let output = MemoryOutput::new();
        assert!(output.is_empty().await);

        output.commit(b"a").await.unwrap();
        output.commit(b"b").await.unwrap();

        assert_eq!(output.len().await, 2);
        assert_eq!(output.commits().await, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(output.last().await, Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_output_clones_share_log() {
        let output = MemoryOutput::new();
        let clone = output.clone();

        clone.commit(b"x").await.unwrap();
        assert_eq!(output.len().await, 1);
    }
}
