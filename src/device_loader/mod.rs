mod image;
mod refresh;
mod registry;
mod stream;

pub use image::ModuleImage;
pub use stream::{FileStream, ImageStream, MemoryStream, StreamMetadata};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::descriptor;
use crate::interfaces::{
    AccelRuntime, CancelToken, LoaderError, ModuleLoader, OpenError, TargetIo, TargetMemory,
};
use crate::protocol::{DeviceModuleInfo, ModuleListing, ProcessEvent, Section};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// No tracking-capable runtime attached yet; re-probed on events.
    Inactive,
    Active,
}

/// Per-process tracking state and device module registry.
#[derive(Debug)]
pub(crate) struct MonitoredProcess {
    pub(crate) state: TrackingState,
    pub(crate) registry: registry::ModuleRegistry,
}

impl MonitoredProcess {
    pub(crate) fn new() -> Self {
        Self {
            state: TrackingState::Inactive,
            registry: registry::ModuleRegistry::new(),
        }
    }
}

/// Loader overlay that adds runtime-loaded device modules on top of the host
/// loader's view of a process.
pub struct DeviceLoader {
    pub(crate) host: Box<dyn ModuleLoader>,
    pub(crate) runtime: Arc<dyn AccelRuntime>,
    pub(crate) io: Arc<dyn TargetIo>,
    pub(crate) memory: Arc<dyn TargetMemory>,
    /// Map of PID to MonitoredProcess for managing multiple processes
    pub(crate) processes: HashMap<u32, MonitoredProcess>,
    pub(crate) cancel: CancelToken,
}

impl DeviceLoader {
    pub fn new(
        host: Box<dyn ModuleLoader>,
        runtime: Arc<dyn AccelRuntime>,
        io: Arc<dyn TargetIo>,
        memory: Arc<dyn TargetMemory>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            host,
            runtime,
            io,
            memory,
            processes: HashMap::new(),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Tracking state for a process, if it is monitored at all.
    pub fn tracking_state(&self, pid: u32) -> Option<TrackingState> {
        self.processes.get(&pid).map(|process| process.state)
    }

    /// Host modules first in host order, then device modules in
    /// runtime-reported order. Entries are value copies.
    pub fn get_full_module_list(&self, pid: u32) -> Result<Vec<ModuleListing>, LoaderError> {
        let mut modules = self.host.list_current_modules(pid)?;
        if let Some(process) = self.processes.get(&pid) {
            modules.extend(process.registry.listings());
        }
        trace!(pid, count = modules.len(), "merged module list");
        Ok(modules)
    }

    /// Device modules of a process with their synthesized identities. Value
    /// copies, in runtime-reported order.
    pub fn device_modules(&self, pid: u32) -> Vec<DeviceModuleInfo> {
        let Some(process) = self.processes.get(&pid) else {
            return Vec::new();
        };
        process
            .registry
            .entries()
            .iter()
            .map(|entry| DeviceModuleInfo {
                name: entry.display_name.clone(),
                load_address: entry.load_address,
                unique_key: entry.unique_key.clone(),
                descriptor: entry.descriptor.clone(),
            })
            .collect()
    }

    /// Open a module image from a location descriptor, or delegate a plain
    /// path to the host loader.
    pub fn open_module_image(&self, pid: u32, location: &str) -> Result<ModuleImage, OpenError> {
        image::open_image(self, pid, location)
    }

    /// Route a process event through the host loader first, then the device
    /// refresh logic.
    pub fn handle_process_event(&mut self, event: &ProcessEvent) -> Result<(), LoaderError> {
        trace!(event = %event, "DeviceLoader::handle_process_event called");
        match event {
            ProcessEvent::ProcessCreated { pid } => refresh::handle_process_created(self, *pid),
            ProcessEvent::ModuleListChanged { pid } => {
                refresh::handle_module_list_changed(self, *pid)
            }
            ProcessEvent::ProcessExited { pid } => {
                refresh::handle_process_exited(self, *pid);
                Ok(())
            }
        }
    }

    /// Open every tracked device image of a process. A failure is logged per
    /// module and skipped; successfully opened images are returned alongside
    /// their listing.
    pub fn open_tracked_images(&self, pid: u32) -> Vec<(ModuleListing, ModuleImage)> {
        let Some(process) = self.processes.get(&pid) else {
            return Vec::new();
        };
        let mut images = Vec::new();
        for entry in process.registry.entries() {
            match image::open_image(self, pid, &entry.descriptor) {
                Ok(image) => images.push((
                    ModuleListing {
                        name: entry.display_name.clone(),
                        load_address: entry.load_address,
                    },
                    image,
                )),
                Err(e) => {
                    warn!(pid, module = %entry.display_name, error = %e, "skipping device module image");
                }
            }
        }
        images
    }
}

impl ModuleLoader for DeviceLoader {
    fn list_current_modules(&self, pid: u32) -> Result<Vec<ModuleListing>, LoaderError> {
        self.get_full_module_list(pid)
    }

    fn open_image(&self, pid: u32, location: &str) -> Result<ModuleImage, OpenError> {
        self.open_module_image(pid, location)
    }

    fn handle_refresh_event(&mut self, pid: u32) -> Result<(), LoaderError> {
        refresh::handle_module_list_changed(self, pid)
    }

    fn relocate_sections(&self, module: &ModuleListing, section: &mut Section) {
        if descriptor::has_scheme_marker(&module.name) {
            // Device images are linked at zero; rebase by the load address.
            section.addr += module.load_address;
            section.endaddr += module.load_address;
        } else {
            self.host.relocate_sections(module, section);
        }
    }
}
