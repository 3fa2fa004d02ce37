use crate::{
    config::Settings,
    model::{CpuPolicy, CreationRequest, DiskDescriptor, NicDescriptor, VmDescriptor},
};

pub const PASSTHROUGH_CPU: &str = "host";

/// Target environment choices that are not carried over from the source VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentPolicy {
    pub bridge: String,
    pub storage: String,
    pub import_base_dir: String,
    pub nic_model: String,
    pub generic_cpu_model: String,
    pub vlan_from_network_name: bool,
    pub start_after_create: bool,
}

impl EnvironmentPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bridge: settings.proxmox.bridge.clone(),
            storage: settings.proxmox.storage.clone(),
            import_base_dir: settings.proxmox.nfs_base_dir.clone(),
            nic_model: settings.proxmox.nic_model.clone(),
            generic_cpu_model: settings.proxmox.generic_cpu_model.clone(),
            vlan_from_network_name: settings.proxmox.vlan_from_network_name,
            start_after_create: settings.migration.start_after_create,
        }
    }

    pub fn cpu_model(&self, policy: CpuPolicy) -> &str {
        match policy {
            CpuPolicy::Generic => &self.generic_cpu_model,
            CpuPolicy::Passthrough => PASSTHROUGH_CPU,
        }
    }
}

/// Build the Proxmox `qemu` create parameters for one VM.
pub fn translate(vm: &VmDescriptor, vmid: u32, policy: &EnvironmentPolicy) -> CreationRequest {
    let mut request = CreationRequest::new();

    request.set("vmid", vmid);
    request.set("name", &vm.name);
    request.set("memory", vm.memory_mb);
    request.set("cpu", policy.cpu_model(vm.cpu_policy));
    request.set("sockets", vm.sockets);
    request.set("cores", vm.cores);

    request.set("machine", "q35");
    request.set("agent", 1);
    request.set("ostype", "l26");
    request.set("ide2", "none,media=cdrom");
    request.set("scsihw", "virtio-scsi-single");
    request.set("hotplug", 1);
    request.set("tablet", 1);
    request.set("vga", "qxl");
    request.set("start", u8::from(policy.start_after_create));

    for (slot, nic) in vm.nics.iter().enumerate() {
        request.set(format!("net{}", slot), nic_entry(nic, policy));
    }

    for (slot, disk) in vm.disks.iter().enumerate() {
        request.set(format!("scsi{}", slot), disk_entry(disk, policy));
    }

    request
}

fn nic_entry(nic: &NicDescriptor, policy: &EnvironmentPolicy) -> String {
    let mut entry = format!(
        "{},bridge={},macaddr={}",
        policy.nic_model, policy.bridge, nic.mac
    );
    if policy.vlan_from_network_name {
        if let Some(tag) = vlan_tag(&nic.network) {
            entry.push_str(&format!(",tag={}", tag));
        }
    }
    entry
}

/// `vlan120` -> 120. Valid 802.1Q ids only.
pub fn vlan_tag(network: &str) -> Option<u16> {
    let tag: u16 = network
        .trim()
        .strip_prefix("vlan")
        .or_else(|| network.trim().strip_prefix("VLAN"))?
        .parse()
        .ok()?;
    (1..=4094).contains(&tag).then_some(tag)
}

pub fn import_path(disk: &DiskDescriptor, base_dir: &str) -> String {
    format!(
        "{}/{}/{}/images/{}/{}",
        base_dir.trim_end_matches('/'),
        disk.storage_domain_name,
        disk.storage_domain_id,
        disk.disk_id,
        disk.image_id
    )
}

fn disk_entry(disk: &DiskDescriptor, policy: &EnvironmentPolicy) -> String {
    format!(
        "{}:0,import-from={},media=disk,format=qcow2,discard=on,ssd=1,iothread=1",
        policy.storage,
        import_path(disk, &policy.import_base_dir)
    )
}
