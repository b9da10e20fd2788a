// # Console Output
//
// Writes each committed payload to stdout followed by a newline.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::traits::OutputWriter;

/// Stdout output writer, selected with `--out -`
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputWriter for ConsoleOutput {
    async fn commit(&self, payload: &[u8]) -> Result<(), Error> {
        let mut stdout = tokio::io::stdout();
        let write = async {
            stdout.write_all(payload).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        };

        write
            .await
            .map_err(|e| Error::output(format!("Failed to write to stdout: {}", e)))
    }

    fn destination(&self) -> String {
        "stdout".to_string()
    }
}
