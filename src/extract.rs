use crate::{
    MigrateError, Result, log_debug, log_info, log_warn,
    model::{CpuPolicy, DiskDescriptor, NetworkProfileCatalog, NicDescriptor, VmDescriptor},
    platform::{SourcePlatform, SourceVm},
    units::{Unit, bytes_to},
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Match VMs in any state, not only running ones.
    pub include_stopped: bool,
}

/// Build the source platform search query for a name pattern.
pub fn search_query(pattern: &str, options: ExtractOptions) -> String {
    if options.include_stopped {
        format!("name={}", pattern)
    } else {
        format!("status=up name={}", pattern)
    }
}

/// Describe every VM whose name matches `pattern`, keyed by VM name.
pub async fn extract(
    source: &dyn SourcePlatform,
    catalog: &NetworkProfileCatalog,
    pattern: &str,
    options: ExtractOptions,
) -> Result<BTreeMap<String, VmDescriptor>> {
    let query = search_query(pattern, options);
    log_debug!("Searching source VMs: {}", query);

    let vms = source.list_vms(&query).await?;
    if vms.is_empty() {
        return Err(MigrateError::NoMatchingVm(pattern.to_string()));
    }
    log_info!("Found {} VM(s) matching '{}'", vms.len(), pattern);

    let mut descriptors = BTreeMap::new();
    for vm in vms {
        let descriptor = describe_vm(source, catalog, vm).await?;
        descriptors.insert(descriptor.name.clone(), descriptor);
    }

    Ok(descriptors)
}

async fn describe_vm(
    source: &dyn SourcePlatform,
    catalog: &NetworkProfileCatalog,
    vm: SourceVm,
) -> Result<VmDescriptor> {
    let nics = resolve_nics(source, catalog, &vm).await?;
    let disks = resolve_disks(source, &vm).await?;

    let descriptor = VmDescriptor {
        memory_mb: bytes_to(vm.memory_bytes, Unit::Mebi) as u64,
        cpu_policy: CpuPolicy::from_cpu_mode(vm.cpu_mode.as_deref()),
        sockets: vm.sockets,
        cores: vm.cores,
        nics,
        disks,
        name: vm.name,
        source_id: vm.id,
    };

    log_debug!(
        "VM '{}': {} MiB, {}x{} CPU ({:?}), {} NIC(s), {} disk(s)",
        descriptor.name,
        descriptor.memory_mb,
        descriptor.sockets,
        descriptor.cores,
        descriptor.cpu_policy,
        descriptor.nics.len(),
        descriptor.disks.len()
    );
    Ok(descriptor)
}

async fn resolve_nics(
    source: &dyn SourcePlatform,
    catalog: &NetworkProfileCatalog,
    vm: &SourceVm,
) -> Result<Vec<NicDescriptor>> {
    let mut nics: Vec<NicDescriptor> = Vec::new();

    for nic in source.list_nics(&vm.id).await? {
        let Some(mac) = nic.mac else {
            log_warn!("VM '{}': skipping NIC without a MAC address", vm.name);
            continue;
        };
        let Some(profile_id) = nic.profile_id else {
            log_warn!(
                "VM '{}': skipping NIC {} with no network profile",
                vm.name,
                mac
            );
            continue;
        };
        let Some(network) = catalog.lookup(&profile_id) else {
            log_warn!(
                "VM '{}': skipping NIC {}, network profile {} not found",
                vm.name,
                mac,
                profile_id
            );
            continue;
        };
        if nics.iter().any(|existing| existing.mac == mac) {
            log_warn!("VM '{}': skipping duplicate MAC {}", vm.name, mac);
            continue;
        }

        nics.push(NicDescriptor {
            mac,
            network: network.to_string(),
        });
    }

    Ok(nics)
}

async fn resolve_disks(source: &dyn SourcePlatform, vm: &SourceVm) -> Result<Vec<DiskDescriptor>> {
    let mut disks = Vec::new();

    for disk_id in source.list_disk_attachments(&vm.id).await? {
        let disk = source.get_disk(&disk_id).await?;
        let domain_id = disk.storage_domain_ids.first().ok_or_else(|| {
            MigrateError::MissingReference(format!(
                "disk {} of VM '{}' has no storage domain",
                disk.id, vm.name
            ))
        })?;
        let domain = source.get_storage_domain(domain_id).await?;

        disks.push(DiskDescriptor {
            disk_id: disk.id,
            image_id: disk.image_id,
            storage_domain_id: domain.id,
            storage_domain_name: domain.name,
        });
    }

    Ok(disks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_only_by_default() {
        assert_eq!(
            search_query("web*", ExtractOptions::default()),
            "status=up name=web*"
        );
        assert_eq!(
            search_query(
                "*",
                ExtractOptions {
                    include_stopped: true
                }
            ),
            "name=*"
        );
    }
}
