use std::sync::Arc;

use tracing::warn;

use crate::interfaces::{CancelToken, StreamError, TargetFileHandle, TargetIo};

/// Largest single request issued against the target I/O facility.
const MAX_READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMetadata {
    pub len: u64,
}

/// Readable backend behind an opened module image. The variant is chosen
/// once, when the image is opened.
pub enum ImageStream {
    File(FileStream),
    Memory(MemoryStream),
}

impl ImageStream {
    /// Wrap an in-memory copy of an image, e.g. one the host loader read by
    /// itself.
    pub fn from_snapshot(image: Vec<u8>) -> Self {
        ImageStream::Memory(MemoryStream::new(image))
    }

    /// Read up to `buf.len()` bytes at `offset`, relative to the image
    /// start. Returns 0 at end-of-stream.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, StreamError> {
        match self {
            ImageStream::File(stream) => stream.read_at(buf, offset),
            ImageStream::Memory(stream) => Ok(stream.read_at(buf, offset)),
        }
    }

    pub fn size(&mut self) -> Result<u64, StreamError> {
        match self {
            ImageStream::File(stream) => stream.size(),
            ImageStream::Memory(stream) => Ok(stream.size()),
        }
    }

    pub fn metadata(&mut self) -> Result<StreamMetadata, StreamError> {
        Ok(StreamMetadata { len: self.size()? })
    }
}

/// Image stored in a file reachable through the target, possibly embedded at
/// an offset inside a larger file.
pub struct FileStream {
    io: Arc<dyn TargetIo>,
    pub(crate) handle: TargetFileHandle,
    pub(crate) offset: u64,
    /// Cached once resolved. Populated up front when the descriptor declared
    /// an explicit size.
    pub(crate) resolved_size: Option<u64>,
    cancel: CancelToken,
}

impl FileStream {
    pub(crate) fn new(
        io: Arc<dyn TargetIo>,
        handle: TargetFileHandle,
        offset: u64,
        declared_size: u64,
        cancel: CancelToken,
    ) -> Self {
        Self {
            io,
            handle,
            offset,
            resolved_size: (declared_size != 0).then_some(declared_size),
            cancel,
        }
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, StreamError> {
        let mut done = 0;
        while done < buf.len() {
            if self.cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }
            let end = buf.len().min(done + MAX_READ_CHUNK);
            let read = self.io.pread(
                self.handle,
                &mut buf[done..end],
                self.offset + offset + done as u64,
            )?;
            if read == 0 {
                break;
            }
            done += read;
        }
        Ok(done)
    }

    fn size(&mut self) -> Result<u64, StreamError> {
        if let Some(size) = self.resolved_size {
            return Ok(size);
        }
        let total = self
            .io
            .stat(self.handle)
            .map_err(|e| StreamError::SizeUndeterminable(e.to_string()))?;
        if self.offset >= total {
            return Err(StreamError::OffsetBeyondEnd {
                offset: self.offset,
                len: total,
            });
        }
        let size = total - self.offset;
        self.resolved_size = Some(size);
        Ok(size)
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        if let Err(e) = self.io.close(self.handle) {
            warn!(handle = self.handle.0, error = %e, "failed to close target file handle");
        }
    }
}

/// Image captured from process memory at open time. The process may reuse
/// that memory afterwards, so the snapshot is private and immutable.
pub struct MemoryStream {
    pub(crate) image: Vec<u8>,
}

impl MemoryStream {
    pub(crate) fn new(image: Vec<u8>) -> Self {
        Self { image }
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> usize {
        if offset >= self.image.len() as u64 {
            return 0;
        }
        let start = offset as usize;
        let count = buf.len().min(self.image.len() - start);
        buf[..count].copy_from_slice(&self.image[start..start + count]);
        count
    }

    fn size(&self) -> u64 {
        self.image.len() as u64
    }
}
