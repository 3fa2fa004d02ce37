use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Snapshot of the source platform's network profiles, id -> display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkProfileCatalog {
    profiles: HashMap<String, String>,
}

impl NetworkProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.profiles.insert(id.into(), name.into());
    }

    pub fn lookup(&self, id: &str) -> Option<&str> {
        self.profiles.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NetworkProfileCatalog {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for (id, name) in iter {
            catalog.insert(id, name);
        }
        catalog
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuPolicy {
    /// Portable baseline CPU model.
    Generic,
    /// Expose the host CPU to the guest.
    Passthrough,
}

impl CpuPolicy {
    /// A source VM with no CPU mode gets the baseline model; any mode means it
    /// relied on host CPU features.
    pub fn from_cpu_mode(mode: Option<&str>) -> Self {
        match mode {
            None => CpuPolicy::Generic,
            Some(_) => CpuPolicy::Passthrough,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicDescriptor {
    pub mac: String,
    pub network: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDescriptor {
    pub disk_id: String,
    pub image_id: String,
    pub storage_domain_id: String,
    pub storage_domain_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDescriptor {
    pub name: String,
    pub source_id: String,
    pub memory_mb: u64,
    pub cpu_policy: CpuPolicy,
    pub sockets: u32,
    pub cores: u32,
    /// In source listing order; MACs are unique.
    pub nics: Vec<NicDescriptor>,
    /// In attachment listing order. Target slot numbers follow this order.
    pub disks: Vec<DiskDescriptor>,
}

impl VmDescriptor {
    pub fn nic(&self, mac: &str) -> Option<&NicDescriptor> {
        self.nics.iter().find(|nic| nic.mac == mac)
    }
}

/// Flat parameter map submitted to the target platform's create endpoint.
///
/// Keys are kept sorted so two requests built from the same input serialize
/// identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CreationRequest {
    params: BTreeMap<String, String>,
}

impl CreationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.params.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn vmid(&self) -> Option<u32> {
        self.get("vmid").and_then(|id| id.parse().ok())
    }

    /// Values of `<prefix>0`, `<prefix>1`, ... in slot order.
    pub fn slots(&self, prefix: &str) -> Vec<&str> {
        (0..)
            .map_while(|index| self.get(&format!("{}{}", prefix, index)))
            .collect()
    }
}

/// Handle of an asynchronous task on the target platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(pub String);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
