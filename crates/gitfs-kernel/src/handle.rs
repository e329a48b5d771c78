//! Per-open file content handles.

use parking_lot::Mutex;

use crate::error::{GitfsError, Result};
use crate::repo::BlobContent;

/// Content of one open file.
///
/// The blob is fetched once at open. Reads are serialized by the handle's lock
/// and may come from any thread. After [`release`](Self::release) the buffer
/// is gone and further reads are a protocol error.
#[derive(Debug)]
pub struct FileHandle {
    name: String,
    buffer: Mutex<Option<BlobContent>>,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, content: BlobContent) -> Self {
        Self {
            name: name.into(),
            buffer: Mutex::new(Some(content)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes `[offset, offset + len)`, clipped to the end of the content.
    ///
    /// Reading at or past the end returns an empty buffer.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let guard = self.buffer.lock();
        let content = guard
            .as_ref()
            .ok_or_else(|| GitfsError::ProtocolMisuse(format!("read of released {}", self.name)))?;
        let data = content.as_bytes();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(len).min(data.len());
        tracing::trace!(file = %self.name, offset, len, returned = end - start, "read");
        Ok(data[start..end].to_vec())
    }

    /// Content length, or `None` once released.
    pub fn size(&self) -> Option<u64> {
        self.buffer.lock().as_ref().map(|c| c.len() as u64)
    }

    pub fn is_released(&self) -> bool {
        self.buffer.lock().is_none()
    }

    /// Drop the buffer. Returns false if already released.
    pub fn release(&self) -> bool {
        let released = self.buffer.lock().take().is_some();
        if released {
            tracing::debug!(file = %self.name, "file released");
        }
        released
    }
}
