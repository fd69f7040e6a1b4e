use thiserror::Error;
use crate::protocol::{ModuleListing, Section, TrackedModule};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Other: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("`{0}`: no scheme marker")]
    MissingScheme(String),
    #[error("protocol not supported: {0}")]
    UnsupportedProtocol(String),
    #[error("`{0}`: locator is not valid UTF-8 once decoded")]
    InvalidLocator(String),
    #[error("failed to parse integer: {0}")]
    InvalidInteger(String),
    #[error("invalid size value")]
    InvalidSize,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("target I/O failure: {0}")]
    Io(#[from] TargetError),
    #[error("stream size cannot be determined: {0}")]
    SizeUndeterminable(String),
    #[error("offset 0x{offset:X} is past the end of the source (0x{len:X} bytes)")]
    OffsetBeyondEnd { offset: u64, len: u64 },
    #[error("read cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("runtime reported failure: {0}")]
    Runtime(String),
    #[error("process is not tracked by the runtime")]
    NotTracked,
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("host loader failure: {0}")]
    Host(String),
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("`{descriptor}`: code object is from another process (owner {owner}, current {current})")]
    ProcessMismatch {
        descriptor: String,
        owner: u32,
        current: u32,
    },
    #[error("`{path}`: open failed: {source}")]
    Io { path: String, source: TargetError },
    #[error("failed to copy code object from process memory: {0}")]
    MemoryRead(TargetError),
    #[error("`{path}`: {reason}")]
    FormatRejected { path: String, reason: String },
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Cooperative cancellation flag, checked between blocking read attempts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Handle to a byte source opened through the monitored target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetFileHandle(pub u64);

/// Byte access to sources only reachable from the monitored target.
pub trait TargetIo: Send + Sync {
    fn open(&self, pid: u32, path: &str) -> Result<TargetFileHandle, TargetError>;
    fn pread(&self, handle: TargetFileHandle, buf: &mut [u8], offset: u64) -> Result<usize, TargetError>;
    /// Total length in bytes of the source behind `handle`.
    fn stat(&self, handle: TargetFileHandle) -> Result<u64, TargetError>;
    fn close(&self, handle: TargetFileHandle) -> Result<(), TargetError>;
}

/// Address-space reads from a monitored process. Partial reads are errors,
/// never short vectors.
pub trait TargetMemory: Send + Sync {
    fn read_memory(&self, pid: u32, address: u64, size: usize) -> Result<Vec<u8>, TargetError>;
}

/// Query facade over the accelerator runtime tracking device code objects.
pub trait AccelRuntime: Send + Sync {
    fn is_attached(&self, pid: u32) -> bool;
    fn enumerate_tracked_modules(&self, pid: u32) -> Result<Vec<TrackedModule>, QueryError>;
}

/// The loader extension points this subsystem wraps. The host loader
/// implements these for conventionally loaded modules; `DeviceLoader`
/// implements them too, so it can be slotted in wherever the host was.
pub trait ModuleLoader: Send + Sync {
    fn list_current_modules(&self, pid: u32) -> Result<Vec<ModuleListing>, LoaderError>;
    fn open_image(&self, pid: u32, location: &str) -> Result<crate::device_loader::ModuleImage, OpenError>;
    fn handle_refresh_event(&mut self, pid: u32) -> Result<(), LoaderError>;
    fn relocate_sections(&self, module: &ModuleListing, section: &mut Section);
}
