//! Reads 9P frames from a connection, parses them, and forwards them to
//! the dispatch task.

use std::io::Cursor;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::Error;
use crate::ninep::messages::Tmessage;
use crate::ninep::{parser, HEADERSZ, MAX_MSIZE};

/// One parsed inbound frame, or enough of one to answer it with an error.
pub enum Incoming {
    Request { tag: u16, msg: Tmessage },
    /// The frame carried a tag but no parseable message.
    Malformed { tag: u16, err: Error },
}

/// Reads requests from a connection and forwards them for dispatch. The
/// task ends at EOF, on a transport error, or on a frame the stream
/// cannot recover from.
pub struct ReadTask<R> {
    reader: R,
    requests: Sender<Incoming>,
}

impl<R: AsyncRead + Send + Unpin + 'static> ReadTask<R> {
    pub fn spawn(reader: R, requests: Sender<Incoming>) -> JoinHandle<()> {
        tokio::spawn(Self { reader, requests }.run())
    }

    async fn run(mut self) {
        loop {
            let frame = match self.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    trace!("connection closed by peer");
                    return;
                }
                Err(err) => {
                    debug!(%err, "transport read failed");
                    return;
                }
            };

            let incoming = match parser::t_message(&mut Cursor::new(&frame), MAX_MSIZE as usize) {
                Ok((tag, msg)) => Incoming::Request { tag, msg },
                Err(err) => {
                    // The tag sits right after the type byte; answering
                    // with an error is only possible when it survived.
                    if frame.len() >= 3 {
                        let tag = u16::from_le_bytes([frame[1], frame[2]]);
                        Incoming::Malformed { tag, err }
                    } else {
                        debug!(%err, "unanswerable frame, dropping connection");
                        return;
                    }
                }
            };

            if self.requests.send(incoming).await.is_err() {
                return;
            }
        }
    }

    /// Reads one length-prefixed frame body (everything after `size[4]`).
    /// `Ok(None)` is a clean EOF at a frame boundary.
    async fn read_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut size_buf = [0u8; 4];
        match self.reader.read_exact(&mut size_buf).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err),
        }
        let size = u32::from_le_bytes(size_buf) as usize;
        if !(HEADERSZ..=MAX_MSIZE as usize).contains(&size) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame size {size} out of bounds"),
            ));
        }
        let mut frame = vec![0u8; size - 4];
        self.reader.read_exact(&mut frame).await?;
        Ok(Some(frame))
    }
}
