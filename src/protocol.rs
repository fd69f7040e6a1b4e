pub use serde::{Serialize, Deserialize};

/// One entry of the merged module view handed to consumers.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ModuleListing {
    pub name: String,
    pub load_address: u64,
}

/// A code object the accelerator runtime reports as loaded.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TrackedModule {
    pub load_address: u64,
    pub descriptor: String,
}

/// Device module details for consumers that need an identity beyond the
/// merged listing, e.g. to name symbol containers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DeviceModuleInfo {
    pub name: String,
    pub load_address: u64,
    pub unique_key: String,
    pub descriptor: String,
}

/// Address range of one section of a module image, as the binary parser
/// reports it before relocation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub addr: u64,
    pub endaddr: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "event_type", content = "data")]
pub enum ProcessEvent {
    ProcessCreated { pid: u32 },
    ModuleListChanged { pid: u32 },
    ProcessExited { pid: u32 },
}

impl ProcessEvent {
    pub fn pid(&self) -> u32 {
        match self {
            ProcessEvent::ProcessCreated { pid } => *pid,
            ProcessEvent::ModuleListChanged { pid } => *pid,
            ProcessEvent::ProcessExited { pid } => *pid,
        }
    }
}
