//! JSON-lines response channel.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::request::{ResponseChannel, SuResponse};

/// Writes each terminal signal as one JSON object per line.
pub struct JsonLineChannel<W> {
    writer: Mutex<W>,
}

impl<W> JsonLineChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> ResponseChannel for JsonLineChannel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, response: SuResponse) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await
    }
}
