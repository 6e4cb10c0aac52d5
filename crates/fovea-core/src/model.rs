//! Model blob loading.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    NotFound(String),
    #[error("model read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },
    #[error("model buffer allocation failed ({0} bytes)")]
    Allocation(u64),
}

/// An owned, immutable model blob read whole from disk.
///
/// The blob exists to be handed to the inference engine's init call, which
/// consumes it; it is never retained or reused afterward.
#[derive(Debug)]
pub struct ModelBlob {
    bytes: Vec<u8>,
}

impl ModelBlob {
    /// Read the full model file into memory.
    ///
    /// The size is determined by seeking to the end. A read that delivers
    /// fewer bytes than that size is a failure, not a degraded success.
    /// No partial state is retained on any error path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelError::NotFound(path.display().to_string()));
        }

        let mut file = File::open(path)?;
        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size as usize)
            .map_err(|_| ModelError::Allocation(size))?;
        let actual = file.read_to_end(&mut bytes)? as u64;
        if actual != size {
            return Err(ModelError::ShortRead {
                expected: size,
                actual,
            });
        }

        tracing::info!(path = %path.display(), size, "model blob loaded");
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Release the buffer to the engine init call.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
