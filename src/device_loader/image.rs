use tracing::trace;

use super::stream::{FileStream, ImageStream, MemoryStream, StreamMetadata};
use super::DeviceLoader;
use crate::descriptor::{self, LocationDescriptor, Scheme};
use crate::interfaces::{DescriptorError, OpenError, StreamError};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const EI_OSABI: usize = 7;
const EI_ABIVERSION: usize = 8;
const EI_NIDENT: usize = 16;
/// OS ABI identification of accelerator code objects.
const ELFOSABI_AMDGPU_HSA: u8 = 64;
/// Code objects predating the v3 ABI carry a lower version byte and are not
/// supported.
const ELFABIVERSION_AMDGPU_HSA_V3: u8 = 1;

/// An opened module image: the location it came from plus the stream backend
/// serving its bytes.
pub struct ModuleImage {
    pub(crate) location: String,
    pub(crate) stream: ImageStream,
}

impl ModuleImage {
    pub fn new(location: impl Into<String>, stream: ImageStream) -> Self {
        Self {
            location: location.into(),
            stream,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Positional read relative to the image start. Returns 0 at
    /// end-of-stream.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, StreamError> {
        self.stream.read_at(buf, offset)
    }

    pub fn size(&mut self) -> Result<u64, StreamError> {
        self.stream.size()
    }

    pub fn metadata(&mut self) -> Result<StreamMetadata, StreamError> {
        self.stream.metadata()
    }
}

pub(super) fn open_image(
    loader: &DeviceLoader,
    pid: u32,
    location: &str,
) -> Result<ModuleImage, OpenError> {
    if !descriptor::has_scheme_marker(location) {
        trace!(pid, location, "plain path, delegating to host loader");
        return loader.host.open_image(pid, location);
    }

    let desc = LocationDescriptor::parse(location)?;
    let mut stream = match desc.scheme {
        Scheme::File => open_file_stream(loader, pid, &desc)?,
        Scheme::Memory => open_memory_stream(loader, pid, location, &desc)?,
    };
    validate_image(&mut stream, location)?;
    Ok(ModuleImage::new(location, stream))
}

fn open_file_stream(
    loader: &DeviceLoader,
    pid: u32,
    desc: &LocationDescriptor,
) -> Result<ImageStream, OpenError> {
    let handle = loader.io.open(pid, &desc.locator).map_err(|source| OpenError::Io {
        path: desc.locator.clone(),
        source,
    })?;
    trace!(pid, path = %desc.locator, handle = handle.0, offset = desc.offset, size = desc.size, "opened target file");
    Ok(ImageStream::File(FileStream::new(
        loader.io.clone(),
        handle,
        desc.offset,
        desc.size,
        loader.cancel.clone(),
    )))
}

fn open_memory_stream(
    loader: &DeviceLoader,
    pid: u32,
    location: &str,
    desc: &LocationDescriptor,
) -> Result<ImageStream, OpenError> {
    let owner: u32 = desc
        .locator
        .parse()
        .map_err(|_| DescriptorError::InvalidInteger(desc.locator.clone()))?;
    if owner != pid {
        return Err(OpenError::ProcessMismatch {
            descriptor: location.to_string(),
            owner,
            current: pid,
        });
    }
    let image = loader
        .memory
        .read_memory(pid, desc.offset, desc.size as usize)
        .map_err(OpenError::MemoryRead)?;
    trace!(pid, address = %format!("0x{:X}", desc.offset), size = desc.size, "copied code object from process memory");
    Ok(ImageStream::Memory(MemoryStream::new(image)))
}

/// Accept only device code objects: ELF, the accelerator OS ABI, and a
/// supported ABI version.
fn validate_image(stream: &mut ImageStream, location: &str) -> Result<(), OpenError> {
    let mut ident = [0u8; EI_NIDENT];
    let read = stream.read_at(&mut ident, 0)?;
    if read < EI_NIDENT || ident[..4] != ELF_MAGIC {
        return Err(OpenError::FormatRejected {
            path: location.to_string(),
            reason: "not in ELF executable format".to_string(),
        });
    }
    if ident[EI_OSABI] != ELFOSABI_AMDGPU_HSA {
        return Err(OpenError::FormatRejected {
            path: location.to_string(),
            reason: format!("unsupported ELF OS ABI {}", ident[EI_OSABI]),
        });
    }
    if ident[EI_ABIVERSION] < ELFABIVERSION_AMDGPU_HSA_V3 {
        return Err(OpenError::FormatRejected {
            path: location.to_string(),
            reason: format!(
                "code object ABI version {} is not supported",
                ident[EI_ABIVERSION]
            ),
        });
    }
    Ok(())
}
