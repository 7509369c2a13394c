use crate::controller::{Frame, FramePair};
use crate::port::environment::Environment;
use serde::Serialize;
use std::io::ErrorKind;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Failed to serialize frame: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Failed to write frame: {0}")]
    IoError(#[from] std::io::Error),
}

/// One frame as it appears on the wire
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage<'a> {
    pub current: &'a Frame,
    pub previous: &'a Frame,
    /// Milliseconds since the Unix epoch
    pub captured_at: i64,
    /// Milliseconds between the `previous` and `current` captures
    pub since_previous: f64,
    pub environment: &'a Environment,
}

impl<'a> WireMessage<'a> {
    pub fn new(pair: &'a FramePair, environment: &'a Environment) -> Self {
        Self {
            current: &pair.current,
            previous: &pair.previous,
            captured_at: pair.captured_at.timestamp_millis(),
            since_previous: pair.since_previous.as_nanos() as f64 / 1_000_000.0,
            environment,
        }
    }
}

/// Writes frame pairs to the consumer as JSON lines
pub struct FramePort<W: AsyncWrite + Unpin> {
    writer: W,
    environment: Environment,
}

impl<W: AsyncWrite + Unpin> FramePort<W> {
    pub fn new(writer: W, environment: Environment) -> Self {
        Self {
            writer,
            environment,
        }
    }

    pub async fn write_frame(&mut self, pair: &FramePair) -> Result<(), PortError> {
        let mut line = serde_json::to_vec(&WireMessage::new(pair, &self.environment))?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Forwards frames until the sampler closes the channel or the consumer goes away
    ///
    /// `shutdown` is cancelled when the port stops for any reason, since the
    /// bridge has nothing left to do without its consumer. Returns the number
    /// of frames written.
    pub async fn run(
        mut self,
        mut frames: mpsc::Receiver<FramePair>,
        shutdown: CancellationToken,
    ) -> Result<u64, PortError> {
        let _shutdown = shutdown.drop_guard();
        info!("Frame port started");
        let mut written: u64 = 0;

        while let Some(pair) = frames.recv().await {
            match self.write_frame(&pair).await {
                Ok(()) => written += 1,
                Err(PortError::IoError(e)) if e.kind() == ErrorKind::BrokenPipe => {
                    warn!("Consumer closed the frame stream after {} frames", written);
                    return Ok(written);
                }
                Err(e) => return Err(e),
            }
            debug!("Wrote frame {}", written);
        }

        info!("Frame channel closed after {} frames", written);
        Ok(written)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
