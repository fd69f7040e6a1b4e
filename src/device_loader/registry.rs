use crate::protocol::ModuleListing;

/// One tracked device code object. Entries are owned by the registry and
/// never handed out by reference.
#[derive(Debug, Clone)]
pub(crate) struct ModuleEntry {
    pub(crate) load_address: u64,
    /// Location descriptor the image can be opened from.
    pub(crate) descriptor: String,
    pub(crate) display_name: String,
    /// Distinct even when two modules share a display name.
    pub(crate) unique_key: String,
}

impl ModuleEntry {
    pub(crate) fn new(load_address: u64, descriptor: String) -> Self {
        Self {
            load_address,
            display_name: descriptor.clone(),
            unique_key: format!("code_object_{:#x}", load_address),
            descriptor,
        }
    }
}

/// Ordered device module set for one process, kept in runtime-reported
/// order. Rebuilt from scratch on every refresh cycle.
#[derive(Debug, Default)]
pub(crate) struct ModuleRegistry {
    entries: Vec<ModuleEntry>,
}

impl ModuleRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Replace the whole entry sequence.
    pub(crate) fn rebuild(&mut self, entries: Vec<ModuleEntry>) {
        self.entries = entries;
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn entries(&self) -> &[ModuleEntry] {
        &self.entries
    }

    /// Value copies for the merged module view.
    pub(crate) fn listings(&self) -> Vec<ModuleListing> {
        self.entries
            .iter()
            .map(|entry| ModuleListing {
                name: entry.display_name.clone(),
                load_address: entry.load_address,
            })
            .collect()
    }
}
