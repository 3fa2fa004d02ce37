use crate::{MigrateError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub ovirt: OvirtConfig,
    pub proxmox: ProxmoxConfig,
    pub migration: MigrationSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OvirtConfig {
    /// API root, e.g. `https://engine.example.com/ovirt-engine/api`
    pub engine_url: String,
    pub username: String,
    pub password: String,
    /// PEM bundle used to trust the engine certificate.
    #[serde(default, alias = "cert")]
    pub ca_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxmoxConfig {
    #[serde(alias = "ip")]
    pub host: String,
    #[serde(default = "default_proxmox_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub verify_ssl: bool,
    pub node: String,
    /// Storage that receives imported disks.
    pub storage: String,
    /// Mount point of the oVirt storage domains on the Proxmox node.
    pub nfs_base_dir: String,
    pub bridge: String,
    #[serde(default = "default_nic_model")]
    pub nic_model: String,
    /// Tag NICs with the VLAN id found in `vlan<N>` network names.
    #[serde(default)]
    pub vlan_from_network_name: bool,
    #[serde(default = "default_generic_cpu_model")]
    pub generic_cpu_model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the batch at the first failed VM.
    Abort,
    /// Record the failure and continue with the next VM.
    Skip,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationSettings {
    /// Boot migrated VMs as soon as they are created.
    pub start_after_create: bool,
    pub on_failure: FailurePolicy,
    /// Also pick up VMs that are not running.
    #[serde(default)]
    pub include_stopped: bool,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
    #[serde(default = "default_shutdown_poll_interval")]
    pub shutdown_poll_interval_seconds: u64,
    #[serde(default = "default_creation_timeout")]
    pub creation_timeout_seconds: u64,
    #[serde(default = "default_creation_poll_interval")]
    pub creation_poll_interval_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_proxmox_port() -> u16 {
    8006
}

fn default_nic_model() -> String {
    "virtio".to_string()
}

fn default_generic_cpu_model() -> String {
    "x86-64-v3".to_string()
}

fn default_shutdown_timeout() -> u64 {
    300
}

fn default_shutdown_poll_interval() -> u64 {
    5
}

fn default_creation_timeout() -> u64 {
    1800
}

fn default_creation_poll_interval() -> u64 {
    3
}

fn default_request_timeout() -> u64 {
    60
}

impl MigrationSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_secs(self.shutdown_poll_interval_seconds)
    }

    pub fn creation_timeout(&self) -> Duration {
        Duration::from_secs(self.creation_timeout_seconds)
    }

    pub fn creation_poll_interval(&self) -> Duration {
        Duration::from_secs(self.creation_poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl ProxmoxConfig {
    pub fn api_url(&self) -> String {
        format!("https://{}:{}/api2/json", self.host, self.port)
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents)?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("ovirt.engine_url", &self.ovirt.engine_url),
            ("ovirt.username", &self.ovirt.username),
            ("proxmox.host", &self.proxmox.host),
            ("proxmox.username", &self.proxmox.username),
            ("proxmox.node", &self.proxmox.node),
            ("proxmox.storage", &self.proxmox.storage),
            ("proxmox.nfs_base_dir", &self.proxmox.nfs_base_dir),
            ("proxmox.bridge", &self.proxmox.bridge),
            ("proxmox.nic_model", &self.proxmox.nic_model),
            ("proxmox.generic_cpu_model", &self.proxmox.generic_cpu_model),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(MigrateError::Config(format!("{} must not be empty", key)));
            }
        }

        let m = &self.migration;
        check_interval(
            "shutdown",
            m.shutdown_poll_interval_seconds,
            m.shutdown_timeout_seconds,
        )?;
        check_interval(
            "creation",
            m.creation_poll_interval_seconds,
            m.creation_timeout_seconds,
        )?;
        if m.request_timeout_seconds == 0 {
            return Err(MigrateError::Config(
                "migration.request_timeout_seconds must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_interval(phase: &str, interval: u64, timeout: u64) -> Result<()> {
    if interval == 0 {
        return Err(MigrateError::Config(format!(
            "migration.{}_poll_interval_seconds must be positive",
            phase
        )));
    }
    if interval > timeout {
        return Err(MigrateError::Config(format!(
            "migration.{}_poll_interval_seconds ({}) exceeds the timeout ({})",
            phase, interval, timeout
        )));
    }
    Ok(())
}

/// `settings.toml` in the working directory, else the per-user config dir.
pub fn default_settings_path() -> PathBuf {
    let local = PathBuf::from(SETTINGS_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("ovirt2pve").join(SETTINGS_FILE))
        .unwrap_or(local)
}
