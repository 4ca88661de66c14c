//! Writes serialized reply frames back to the connection.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tracing::debug;

/// Drains the reply channel into the socket. The task ends when the
/// dispatch side closes the channel or the transport fails.
pub struct StreamWriter<W> {
    writer: W,
    replies: Receiver<Vec<u8>>,
}

impl<W: AsyncWrite + Send + Unpin + 'static> StreamWriter<W> {
    pub fn spawn(writer: W, replies: Receiver<Vec<u8>>) -> JoinHandle<()> {
        tokio::spawn(Self { writer, replies }.run())
    }

    async fn run(mut self) {
        while let Some(frame) = self.replies.recv().await {
            if let Err(err) = self.writer.write_all(&frame).await {
                debug!(%err, "transport write failed");
                return;
            }
        }
        let _ = self.writer.shutdown().await;
    }
}
