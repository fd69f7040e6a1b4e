use tracing::{trace, warn};

use super::registry::ModuleEntry;
use super::{DeviceLoader, MonitoredProcess, TrackingState};
use crate::interfaces::LoaderError;

pub(super) fn handle_process_created(loader: &mut DeviceLoader, pid: u32) -> Result<(), LoaderError> {
    loader.host.handle_refresh_event(pid)?;
    // A fresh entry replaces any stale state left behind by a recycled pid.
    loader.processes.insert(pid, MonitoredProcess::new());
    probe_and_rebuild(loader, pid);
    Ok(())
}

pub(super) fn handle_module_list_changed(loader: &mut DeviceLoader, pid: u32) -> Result<(), LoaderError> {
    loader.host.handle_refresh_event(pid)?;
    loader
        .processes
        .entry(pid)
        .or_insert_with(MonitoredProcess::new);
    probe_and_rebuild(loader, pid);
    Ok(())
}

pub(super) fn handle_process_exited(loader: &mut DeviceLoader, pid: u32) {
    if loader.processes.remove(&pid).is_some() {
        trace!(pid, "dropped device module tracking");
    }
}

/// Re-probe an inactive process, then rebuild its registry when tracking is
/// active. A runtime query failure degrades to an empty registry for this
/// cycle; it never aborts the event.
fn probe_and_rebuild(loader: &mut DeviceLoader, pid: u32) {
    let Some(process) = loader.processes.get_mut(&pid) else {
        return;
    };
    if process.state == TrackingState::Inactive {
        if !loader.runtime.is_attached(pid) {
            trace!(pid, "runtime not attached, device tracking deferred");
            return;
        }
        process.state = TrackingState::Active;
        trace!(pid, "device tracking active");
    }

    // Discard the whole list before querying so a failure below leaves no
    // stale entries behind.
    process.registry.clear();
    match loader.runtime.enumerate_tracked_modules(pid) {
        Ok(modules) => {
            let entries: Vec<ModuleEntry> = modules
                .into_iter()
                .map(|module| ModuleEntry::new(module.load_address, module.descriptor))
                .collect();
            trace!(pid, count = entries.len(), "device module registry rebuilt");
            process.registry.rebuild(entries);
        }
        Err(e) => {
            warn!(pid, error = %e, "device module query failed, continuing without device modules");
        }
    }
}
