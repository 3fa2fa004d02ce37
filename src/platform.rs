//! Platform Abstraction Layer
//!
//! The migration core talks to both virtualization platforms only through
//! these traits:
//! - `SourcePlatform`: read inventory, shut VMs down (oVirt)
//! - `TargetPlatform`: allocate ids, create VMs, watch tasks (Proxmox)

use crate::error::Platform;
use crate::model::{CreationRequest, TaskHandle};
use crate::{MigrateError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub id: String,
    pub name: String,
}

/// A VM as listed by the source platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVm {
    pub id: String,
    pub name: String,
    pub memory_bytes: u64,
    pub cpu_mode: Option<String>,
    pub sockets: u32,
    pub cores: u32,
    pub status: VmStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNic {
    pub mac: Option<String>,
    pub profile_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDisk {
    pub id: String,
    pub image_id: String,
    pub storage_domain_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDomain {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmStatus {
    Up,
    Down,
    PoweringDown,
    PoweringUp,
    RebootInProgress,
    Paused,
    Suspended,
    SavingState,
    RestoringState,
    MigratingFrom,
    MigratingTo,
    WaitForLaunch,
    ImageLocked,
    NotResponding,
    #[serde(other)]
    Unknown,
}

/// Snapshot of a target task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskStatus {
    pub status: String,
    #[serde(default)]
    pub exitstatus: Option<String>,
}

impl TaskStatus {
    pub fn is_stopped(&self) -> bool {
        self.status == "stopped"
    }

    pub fn succeeded(&self) -> bool {
        self.is_stopped() && self.exitstatus.as_deref() == Some("OK")
    }
}

#[async_trait]
pub trait SourcePlatform: Send + Sync {
    async fn list_network_profiles(&self) -> Result<Vec<NetworkProfile>>;

    /// List VMs matching a native search query.
    async fn list_vms(&self, search: &str) -> Result<Vec<SourceVm>>;

    async fn list_nics(&self, vm_id: &str) -> Result<Vec<SourceNic>>;

    /// Disk attachment ids in attachment order. An attachment id is the
    /// attached disk's id.
    async fn list_disk_attachments(&self, vm_id: &str) -> Result<Vec<String>>;

    async fn get_disk(&self, disk_id: &str) -> Result<SourceDisk>;

    async fn get_storage_domain(&self, domain_id: &str) -> Result<StorageDomain>;

    /// Request a graceful guest shutdown. Returns once the request is accepted.
    async fn shutdown_vm(&self, vm_id: &str) -> Result<()>;

    async fn vm_status(&self, vm_id: &str) -> Result<VmStatus>;
}

#[async_trait]
pub trait TargetPlatform: Send + Sync {
    async fn next_vmid(&self) -> Result<u32>;

    async fn create_vm(&self, request: &CreationRequest) -> Result<TaskHandle>;

    async fn task_status(&self, task: &TaskHandle) -> Result<TaskStatus>;
}

/// Turn a non-success HTTP response into `MigrateError::Api`.
pub(crate) async fn error_for_status(
    platform: Platform,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match body.trim() {
        "" => status.canonical_reason().unwrap_or("request failed").to_string(),
        text => text.to_string(),
    };
    Err(MigrateError::Api {
        platform,
        status: status.as_u16(),
        message,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

/// Accept integers sent either as JSON numbers or as decimal strings.
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

pub(crate) fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = lenient_u64(deserializer)?;
    u32::try_from(value).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_success_requires_stopped_and_ok() {
        let running = TaskStatus {
            status: "running".to_string(),
            exitstatus: None,
        };
        let ok = TaskStatus {
            status: "stopped".to_string(),
            exitstatus: Some("OK".to_string()),
        };
        let failed = TaskStatus {
            status: "stopped".to_string(),
            exitstatus: Some("unable to create VM 120 - disk import failed".to_string()),
        };
        assert!(!running.is_stopped());
        assert!(ok.succeeded());
        assert!(failed.is_stopped() && !failed.succeeded());
    }

    #[derive(Deserialize)]
    struct Sizing {
        #[serde(deserialize_with = "lenient_u64")]
        memory: u64,
        #[serde(deserialize_with = "lenient_u32")]
        sockets: u32,
    }

    #[test]
    fn lenient_integers() {
        let parsed: Sizing =
            serde_json::from_str(r#"{"memory": "4294967296", "sockets": 2}"#).unwrap();
        assert_eq!(parsed.memory, 4294967296);
        assert_eq!(parsed.sockets, 2);

        assert!(serde_json::from_str::<Sizing>(r#"{"memory": "4G", "sockets": 1}"#).is_err());
        assert!(
            serde_json::from_str::<Sizing>(r#"{"memory": 1, "sockets": "4294967296"}"#).is_err()
        );
    }

    #[test]
    fn vm_status_parses_unknown_values() {
        let status: VmStatus = serde_json::from_str("\"powering_down\"").unwrap();
        assert_eq!(status, VmStatus::PoweringDown);
        let status: VmStatus = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(status, VmStatus::Unknown);
    }
}
