#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use modstream::device_loader::{ImageStream, ModuleImage};
use modstream::interfaces::{
    AccelRuntime, CancelToken, LoaderError, ModuleLoader, OpenError, QueryError, TargetError,
    TargetFileHandle, TargetIo, TargetMemory,
};
use modstream::protocol::{ModuleListing, Section, TrackedModule};
use modstream::DeviceLoader;

/// Records cross-component calls so tests can assert ordering.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Default)]
struct FakeTargetState {
    files: HashMap<String, Vec<u8>>,
    open_handles: HashMap<u64, String>,
    next_handle: u64,
    /// (pid, base address, bytes)
    regions: Vec<(u32, u64, Vec<u8>)>,
    max_chunk: usize,
    fail_stat: bool,
    stat_calls: usize,
}

/// In-memory target implementing both the file I/O and the address-space
/// facility.
pub struct FakeTarget {
    state: Mutex<FakeTargetState>,
}

impl FakeTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeTargetState {
                next_handle: 1,
                max_chunk: usize::MAX,
                ..Default::default()
            }),
        })
    }

    pub fn add_file(&self, path: &str, bytes: Vec<u8>) {
        self.state.lock().unwrap().files.insert(path.to_string(), bytes);
    }

    pub fn truncate_file(&self, path: &str, len: usize) {
        self.state
            .lock()
            .unwrap()
            .files
            .get_mut(path)
            .expect("file exists")
            .truncate(len);
    }

    pub fn map_memory(&self, pid: u32, base: u64, bytes: Vec<u8>) {
        self.state.lock().unwrap().regions.push((pid, base, bytes));
    }

    /// Overwrite mapped bytes, modelling the process reusing the memory.
    pub fn clobber_memory(&self, pid: u32, base: u64, value: u8) {
        let mut state = self.state.lock().unwrap();
        for (region_pid, region_base, bytes) in &mut state.regions {
            if *region_pid == pid && *region_base == base {
                bytes.iter_mut().for_each(|b| *b = value);
            }
        }
    }

    /// Cap every pread at `max` bytes to exercise the read retry loop.
    pub fn set_max_chunk(&self, max: usize) {
        self.state.lock().unwrap().max_chunk = max;
    }

    pub fn fail_stat(&self, fail: bool) {
        self.state.lock().unwrap().fail_stat = fail;
    }

    pub fn stat_calls(&self) -> usize {
        self.state.lock().unwrap().stat_calls
    }

    pub fn open_handle_count(&self) -> usize {
        self.state.lock().unwrap().open_handles.len()
    }
}

impl TargetIo for FakeTarget {
    fn open(&self, _pid: u32, path: &str) -> Result<TargetFileHandle, TargetError> {
        let mut state = self.state.lock().unwrap();
        if !state.files.contains_key(path) {
            return Err(TargetError::NotFound(path.to_string()));
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        state.open_handles.insert(handle, path.to_string());
        Ok(TargetFileHandle(handle))
    }

    fn pread(
        &self,
        handle: TargetFileHandle,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize, TargetError> {
        let state = self.state.lock().unwrap();
        let path = state
            .open_handles
            .get(&handle.0)
            .ok_or_else(|| TargetError::Io(format!("stale handle {}", handle.0)))?;
        let bytes = &state.files[path];
        if offset >= bytes.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let count = buf.len().min(state.max_chunk).min(bytes.len() - start);
        buf[..count].copy_from_slice(&bytes[start..start + count]);
        Ok(count)
    }

    fn stat(&self, handle: TargetFileHandle) -> Result<u64, TargetError> {
        let mut state = self.state.lock().unwrap();
        state.stat_calls += 1;
        if state.fail_stat {
            return Err(TargetError::Io("stat failed".to_string()));
        }
        let path = state
            .open_handles
            .get(&handle.0)
            .ok_or_else(|| TargetError::Io(format!("stale handle {}", handle.0)))?;
        Ok(state.files[path].len() as u64)
    }

    fn close(&self, handle: TargetFileHandle) -> Result<(), TargetError> {
        let mut state = self.state.lock().unwrap();
        state
            .open_handles
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(|| TargetError::Other(format!("double close of handle {}", handle.0)))
    }
}

impl TargetMemory for FakeTarget {
    fn read_memory(&self, pid: u32, address: u64, size: usize) -> Result<Vec<u8>, TargetError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.lock().unwrap();
        for (region_pid, base, bytes) in &state.regions {
            if *region_pid != pid {
                continue;
            }
            let end = base + bytes.len() as u64;
            if address >= *base && address + size as u64 <= end {
                let start = (address - base) as usize;
                return Ok(bytes[start..start + size].to_vec());
            }
        }
        Err(TargetError::Io(format!(
            "unmapped range 0x{:X}..0x{:X} in pid {}",
            address,
            address + size as u64,
            pid
        )))
    }
}

#[derive(Default)]
struct FakeRuntimeState {
    attached: Vec<u32>,
    modules: HashMap<u32, Vec<TrackedModule>>,
    fail_queries: bool,
}

/// Scriptable accelerator runtime facade.
pub struct FakeRuntime {
    state: Mutex<FakeRuntimeState>,
    log: CallLog,
}

impl FakeRuntime {
    pub fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeRuntimeState::default()),
            log,
        })
    }

    pub fn attach(&self, pid: u32) {
        self.state.lock().unwrap().attached.push(pid);
    }

    pub fn detach(&self, pid: u32) {
        self.state.lock().unwrap().attached.retain(|p| *p != pid);
    }

    pub fn set_modules(&self, pid: u32, modules: Vec<TrackedModule>) {
        self.state.lock().unwrap().modules.insert(pid, modules);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state.lock().unwrap().fail_queries = fail;
    }
}

impl AccelRuntime for FakeRuntime {
    fn is_attached(&self, pid: u32) -> bool {
        self.state.lock().unwrap().attached.contains(&pid)
    }

    fn enumerate_tracked_modules(&self, pid: u32) -> Result<Vec<TrackedModule>, QueryError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("runtime_query {}", pid));
        let state = self.state.lock().unwrap();
        if state.fail_queries {
            return Err(QueryError::Runtime("event queue invalid".to_string()));
        }
        if !state.attached.contains(&pid) {
            return Err(QueryError::NotTracked);
        }
        Ok(state.modules.get(&pid).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeHostState {
    pub modules: Vec<ModuleListing>,
    pub images: HashMap<String, Vec<u8>>,
    pub fail_list: bool,
    pub fail_refresh: bool,
    /// (module name, section name) pairs delegated to the host.
    pub relocations: Vec<(String, String)>,
}

/// Host loader double that records refresh calls and serves canned images.
pub struct FakeHost {
    state: Arc<Mutex<FakeHostState>>,
    log: CallLog,
}

impl FakeHost {
    pub fn new(log: CallLog) -> (Box<Self>, Arc<Mutex<FakeHostState>>) {
        let state = Arc::new(Mutex::new(FakeHostState::default()));
        (
            Box::new(Self {
                state: state.clone(),
                log,
            }),
            state,
        )
    }
}

impl ModuleLoader for FakeHost {
    fn list_current_modules(&self, pid: u32) -> Result<Vec<ModuleListing>, LoaderError> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(LoaderError::Host(format!("no link map for pid {}", pid)));
        }
        Ok(state.modules.clone())
    }

    fn open_image(&self, _pid: u32, location: &str) -> Result<ModuleImage, OpenError> {
        let state = self.state.lock().unwrap();
        match state.images.get(location) {
            Some(bytes) => Ok(ModuleImage::new(
                location,
                ImageStream::from_snapshot(bytes.clone()),
            )),
            None => Err(OpenError::Io {
                path: location.to_string(),
                source: TargetError::NotFound(location.to_string()),
            }),
        }
    }

    fn handle_refresh_event(&mut self, pid: u32) -> Result<(), LoaderError> {
        if self.state.lock().unwrap().fail_refresh {
            return Err(LoaderError::Host(format!("link map read failed for pid {}", pid)));
        }
        self.log.lock().unwrap().push(format!("host_refresh {}", pid));
        Ok(())
    }

    fn relocate_sections(&self, module: &ModuleListing, section: &mut Section) {
        self.state
            .lock()
            .unwrap()
            .relocations
            .push((module.name.clone(), section.name.clone()));
    }
}

/// A loader wired to fresh fakes, plus handles to drive them.
pub struct TestRig {
    pub loader: DeviceLoader,
    pub target: Arc<FakeTarget>,
    pub runtime: Arc<FakeRuntime>,
    pub host_state: Arc<Mutex<FakeHostState>>,
    pub log: CallLog,
    pub cancel: CancelToken,
}

pub fn build_loader() -> TestRig {
    let log = new_call_log();
    let target = FakeTarget::new();
    let runtime = FakeRuntime::new(log.clone());
    let (host, host_state) = FakeHost::new(log.clone());
    let cancel = CancelToken::new();
    let loader = DeviceLoader::new(
        host,
        runtime.clone(),
        target.clone(),
        target.clone(),
        cancel.clone(),
    );
    TestRig {
        loader,
        target,
        runtime,
        host_state,
        log,
        cancel,
    }
}

/// Minimal byte image that passes the code object acceptance check.
pub fn sample_code_object(body: &[u8]) -> Vec<u8> {
    let mut image = vec![0u8; 16];
    image[..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
    image[4] = 2; // 64-bit
    image[5] = 1; // little endian
    image[6] = 1; // EV_CURRENT
    image[7] = 64; // accelerator OS ABI
    image[8] = 1; // code object v3 ABI version
    image.extend_from_slice(body);
    image
}

pub fn listing(name: &str, load_address: u64) -> ModuleListing {
    ModuleListing {
        name: name.to_string(),
        load_address,
    }
}

pub fn tracked(load_address: u64, descriptor: &str) -> TrackedModule {
    TrackedModule {
        load_address,
        descriptor: descriptor.to_string(),
    }
}
