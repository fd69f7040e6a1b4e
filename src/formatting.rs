use crate::descriptor::{LocationDescriptor, Scheme};
use crate::device_loader::{ImageStream, ModuleImage};
use crate::protocol::*;

// Protocol Display and Debug implementations
impl std::fmt::Debug for ModuleListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ds = f.debug_struct("ModuleListing");
        ds.field("name", &self.name);
        ds.field("load_address", &format_args!("0x{:X}", self.load_address));
        ds.finish()
    }
}

impl std::fmt::Display for ModuleListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ 0x{:X}", self.name, self.load_address)
    }
}

impl std::fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessEvent::ProcessCreated { pid } => write!(f, "ProcessCreated {{ pid: {} }}", pid),
            ProcessEvent::ModuleListChanged { pid } => {
                write!(f, "ModuleListChanged {{ pid: {} }}", pid)
            }
            ProcessEvent::ProcessExited { pid } => write!(f, "ProcessExited {{ pid: {} }}", pid),
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::File => write!(f, "file"),
            Scheme::Memory => write!(f, "memory"),
        }
    }
}

impl std::fmt::Display for LocationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.locator)?;
        let mut sep = '?';
        if self.offset != 0 {
            write!(f, "{}offset=0x{:X}", sep, self.offset)?;
            sep = '&';
        }
        if self.size != 0 {
            write!(f, "{}size=0x{:X}", sep, self.size)?;
        }
        Ok(())
    }
}

// Opened image Debug implementations. Not derivable: the file backend
// carries an `Arc<dyn TargetIo>`.
impl std::fmt::Debug for ModuleImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ds = f.debug_struct("ModuleImage");
        ds.field("location", &self.location);
        ds.field("stream", &self.stream);
        ds.finish()
    }
}

impl std::fmt::Debug for ImageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageStream::File(stream) => {
                let mut ds = f.debug_struct("FileStream");
                ds.field("handle", &stream.handle.0);
                ds.field("offset", &format_args!("0x{:X}", stream.offset));
                ds.field("resolved_size", &stream.resolved_size);
                ds.finish()
            }
            ImageStream::Memory(stream) => {
                let mut ds = f.debug_struct("MemoryStream");
                ds.field("len", &stream.image.len());
                ds.finish()
            }
        }
    }
}
