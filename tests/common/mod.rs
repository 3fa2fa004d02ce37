// In-memory platforms shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use ovirt2pve::{
    CreationRequest, MigrateError, Result,
    error::Platform,
    model::TaskHandle,
    platform::{
        NetworkProfile, SourceDisk, SourceNic, SourcePlatform, SourceVm, StorageDomain,
        TargetPlatform, TaskStatus, VmStatus,
    },
    translate::EnvironmentPolicy,
};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

/// Calls made to either platform, in order.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Log output captured by a thread-local subscriber.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.contains("WARN"))
            .collect()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route this thread's log events into a buffer until the guard drops.
/// `#[tokio::test]` runs on the current thread, so async code is covered.
pub fn capture_logs() -> (DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}

fn not_found(platform: Platform, what: &str) -> MigrateError {
    MigrateError::Api {
        platform,
        status: 404,
        message: format!("{} not found", what),
    }
}

pub fn source_vm(id: &str, name: &str, memory_bytes: u64, cpu_mode: Option<&str>) -> SourceVm {
    SourceVm {
        id: id.to_string(),
        name: name.to_string(),
        memory_bytes,
        cpu_mode: cpu_mode.map(str::to_string),
        sockets: 1,
        cores: 2,
        status: VmStatus::Up,
    }
}

pub fn policy() -> EnvironmentPolicy {
    EnvironmentPolicy {
        bridge: "vmbr1".to_string(),
        storage: "local-lvm".to_string(),
        import_base_dir: "/mnt/pve/ovirt".to_string(),
        nic_model: "virtio".to_string(),
        generic_cpu_model: "x86-64-v3".to_string(),
        vlan_from_network_name: false,
        start_after_create: false,
    }
}

pub struct FakeSource {
    log: EventLog,
    profiles: Vec<NetworkProfile>,
    vms: Vec<SourceVm>,
    nics: HashMap<String, Vec<SourceNic>>,
    attachments: HashMap<String, Vec<String>>,
    disks: HashMap<String, SourceDisk>,
    domains: HashMap<String, StorageDomain>,
    // Successive vm_status answers per VM; the last one repeats.
    statuses: Mutex<HashMap<String, VecDeque<VmStatus>>>,
}

impl FakeSource {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            profiles: Vec::new(),
            vms: Vec::new(),
            nics: HashMap::new(),
            attachments: HashMap::new(),
            disks: HashMap::new(),
            domains: HashMap::new(),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_profile(mut self, id: &str, name: &str) -> Self {
        self.profiles.push(NetworkProfile {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Adds the VM; by default it answers `up` once, then `down`.
    pub fn with_vm(mut self, vm: SourceVm) -> Self {
        self.statuses.lock().unwrap().insert(
            vm.id.clone(),
            VecDeque::from(vec![vm.status, VmStatus::Down]),
        );
        self.vms.push(vm);
        self
    }

    pub fn with_nic(mut self, vm_id: &str, mac: &str, profile_id: Option<&str>) -> Self {
        self.nics.entry(vm_id.to_string()).or_default().push(SourceNic {
            mac: Some(mac.to_string()),
            profile_id: profile_id.map(str::to_string),
        });
        self
    }

    pub fn with_disk(
        mut self,
        vm_id: &str,
        disk_id: &str,
        image_id: &str,
        domain_id: &str,
        domain_name: &str,
    ) -> Self {
        self.attachments
            .entry(vm_id.to_string())
            .or_default()
            .push(disk_id.to_string());
        self.disks.insert(
            disk_id.to_string(),
            SourceDisk {
                id: disk_id.to_string(),
                image_id: image_id.to_string(),
                storage_domain_ids: vec![domain_id.to_string()],
            },
        );
        self.domains.insert(
            domain_id.to_string(),
            StorageDomain {
                id: domain_id.to_string(),
                name: domain_name.to_string(),
            },
        );
        self
    }

    pub fn with_orphan_disk(mut self, vm_id: &str, disk_id: &str) -> Self {
        self.attachments
            .entry(vm_id.to_string())
            .or_default()
            .push(disk_id.to_string());
        self.disks.insert(
            disk_id.to_string(),
            SourceDisk {
                id: disk_id.to_string(),
                image_id: "img-orphan".to_string(),
                storage_domain_ids: Vec::new(),
            },
        );
        self
    }

    pub fn with_statuses(self, vm_id: &str, statuses: Vec<VmStatus>) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(vm_id.to_string(), VecDeque::from(statuses));
        self
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

/// `name=web*` style matching with an optional `status=up` filter.
fn matches_search(vm: &SourceVm, search: &str) -> bool {
    let mut matched = true;
    for term in search.split_whitespace() {
        if let Some(pattern) = term.strip_prefix("name=") {
            matched &= match pattern.strip_suffix('*') {
                Some(prefix) => vm.name.starts_with(prefix),
                None => vm.name == pattern,
            };
        } else if term == "status=up" {
            matched &= vm.status == VmStatus::Up;
        }
    }
    matched
}

#[async_trait]
impl SourcePlatform for FakeSource {
    async fn list_network_profiles(&self) -> Result<Vec<NetworkProfile>> {
        self.record("ovirt:list_network_profiles".to_string());
        Ok(self.profiles.clone())
    }

    async fn list_vms(&self, search: &str) -> Result<Vec<SourceVm>> {
        self.record(format!("ovirt:list_vms:{}", search));
        Ok(self
            .vms
            .iter()
            .filter(|vm| matches_search(vm, search))
            .cloned()
            .collect())
    }

    async fn list_nics(&self, vm_id: &str) -> Result<Vec<SourceNic>> {
        Ok(self.nics.get(vm_id).cloned().unwrap_or_default())
    }

    async fn list_disk_attachments(&self, vm_id: &str) -> Result<Vec<String>> {
        Ok(self.attachments.get(vm_id).cloned().unwrap_or_default())
    }

    async fn get_disk(&self, disk_id: &str) -> Result<SourceDisk> {
        self.disks
            .get(disk_id)
            .cloned()
            .ok_or_else(|| not_found(Platform::Ovirt, disk_id))
    }

    async fn get_storage_domain(&self, domain_id: &str) -> Result<StorageDomain> {
        self.domains
            .get(domain_id)
            .cloned()
            .ok_or_else(|| not_found(Platform::Ovirt, domain_id))
    }

    async fn shutdown_vm(&self, vm_id: &str) -> Result<()> {
        self.record(format!("ovirt:shutdown:{}", vm_id));
        Ok(())
    }

    async fn vm_status(&self, vm_id: &str) -> Result<VmStatus> {
        let mut statuses = self.statuses.lock().unwrap();
        let queue = statuses
            .get_mut(vm_id)
            .ok_or_else(|| not_found(Platform::Ovirt, vm_id))?;
        let status = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            *queue.front().unwrap()
        };
        Ok(status)
    }
}

pub fn task(status: &str, exitstatus: Option<&str>) -> TaskStatus {
    TaskStatus {
        status: status.to_string(),
        exitstatus: exitstatus.map(str::to_string),
    }
}

pub struct FakeTarget {
    log: EventLog,
    next_id: Mutex<u32>,
    fail_allocation: bool,
    reject: bool,
    // Task answers scripted per VM name; default is an immediate `stopped/OK`.
    scripts: HashMap<String, Vec<TaskStatus>>,
    tasks: Mutex<HashMap<TaskHandle, VecDeque<TaskStatus>>>,
    requests: Mutex<Vec<CreationRequest>>,
}

impl FakeTarget {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            next_id: Mutex::new(100),
            fail_allocation: false,
            reject: false,
            scripts: HashMap::new(),
            tasks: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_allocation(mut self) -> Self {
        self.fail_allocation = true;
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn with_task_script(mut self, vm_name: &str, statuses: Vec<TaskStatus>) -> Self {
        self.scripts.insert(vm_name.to_string(), statuses);
        self
    }

    pub fn requests(&self) -> Vec<CreationRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait]
impl TargetPlatform for FakeTarget {
    async fn next_vmid(&self) -> Result<u32> {
        self.record("proxmox:next_vmid".to_string());
        if self.fail_allocation {
            return Err(MigrateError::Api {
                platform: Platform::Proxmox,
                status: 500,
                message: "cluster not ready - no quorum?".to_string(),
            });
        }
        let mut next = self.next_id.lock().unwrap();
        let id = *next;
        *next += 1;
        Ok(id)
    }

    async fn create_vm(&self, request: &CreationRequest) -> Result<TaskHandle> {
        let name = request.get("name").unwrap_or_default().to_string();
        self.record(format!("proxmox:create:{}", name));
        if self.reject {
            return Err(MigrateError::Api {
                platform: Platform::Proxmox,
                status: 400,
                message: "parameter verification failed".to_string(),
            });
        }
        self.requests.lock().unwrap().push(request.clone());

        let handle = TaskHandle(format!(
            "UPID:pve1:0000A1B2:00C0FFEE:6512ABCD:qmcreate:{}:root@pam:",
            request.vmid().unwrap_or_default()
        ));
        let script = self
            .scripts
            .get(&name)
            .cloned()
            .unwrap_or_else(|| vec![task("stopped", Some("OK"))]);
        self.tasks
            .lock()
            .unwrap()
            .insert(handle.clone(), VecDeque::from(script));
        Ok(handle)
    }

    async fn task_status(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        self.record(format!("proxmox:task_status:{}", handle));
        let mut tasks = self.tasks.lock().unwrap();
        let queue = tasks
            .get_mut(handle)
            .ok_or_else(|| not_found(Platform::Proxmox, &handle.0))?;
        let status = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        };
        Ok(status)
    }
}
