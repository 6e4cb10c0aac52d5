//! Egress interface: the structured image record handed downstream.
//!
//! Transport internals are out of scope; the pipeline only needs
//! publish-or-fail semantics against the `Egress` trait.

use fovea_hw::PixelFormat;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum EgressError {
    /// The internal pixel format has no wire mapping. The pipeline's fixed
    /// working format should never produce this; it is a programmer-visible
    /// defect, reported loudly rather than silently dropped.
    #[error("unsupported pixel encoding: {0:?}")]
    UnsupportedEncoding(PixelFormat),
    #[error("record payload too short: need {expected} bytes, got {actual}")]
    ShortPayload { expected: usize, actual: usize },
    #[error("egress channel closed")]
    Closed,
}

/// Structured image record delivered to downstream consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub width: u32,
    pub height: u32,
    /// Bytes per row.
    pub step: u32,
    pub encoding: &'static str,
    pub data: Vec<u8>,
}

impl ImageRecord {
    /// Build a record from a pixel buffer, copying the payload.
    ///
    /// One copy per published frame; the record never aliases pipeline
    /// buffers across ticks. `data.len()` is always `step * height`.
    pub fn from_pixels(
        width: u32,
        height: u32,
        step: u32,
        format: PixelFormat,
        pixels: &[u8],
    ) -> Result<Self, EgressError> {
        let encoding = format
            .encoding()
            .ok_or(EgressError::UnsupportedEncoding(format))?;
        let len = step as usize * height as usize;
        if pixels.len() < len {
            return Err(EgressError::ShortPayload {
                expected: len,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            step,
            encoding,
            data: pixels[..len].to_vec(),
        })
    }
}

/// Downstream delivery interface.
pub trait Egress {
    fn publish(&mut self, record: ImageRecord) -> Result<(), EgressError>;
}

/// Bounded channel egress bridging the pipeline thread to the daemon's
/// async consumer.
///
/// When the queue is full the newest record is dropped (drop-newest), so a
/// slow consumer can never block the capture loop.
pub struct ChannelEgress {
    tx: mpsc::Sender<ImageRecord>,
    dropped: u64,
}

impl ChannelEgress {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ImageRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, dropped: 0 }, rx)
    }
}

impl Egress for ChannelEgress {
    fn publish(&mut self, record: ImageRecord) -> Result<(), EgressError> {
        match self.tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::debug!(dropped = self.dropped, "egress queue full, dropping record");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EgressError::Closed),
        }
    }
}
