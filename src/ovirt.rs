//! oVirt engine REST client
//!
//! Talks JSON to `/ovirt-engine/api` with an SSO bearer token. Only the calls
//! the migration needs are implemented.

use crate::{
    MigrateError, Result,
    config::OvirtConfig,
    error::Platform,
    log_debug, log_info,
    platform::{
        NetworkProfile, SourceDisk, SourceNic, SourcePlatform, SourceVm, StorageDomain, VmStatus,
        error_for_status, lenient_u32, lenient_u64,
    },
};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub struct OvirtClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl OvirtClient {
    /// Open an SSO session against the engine.
    pub async fn connect(config: &OvirtConfig, request_timeout: Duration) -> Result<Self> {
        let api_url = config.engine_url.trim_end_matches('/').to_string();
        log_info!("Connecting to oVirt engine at {}", api_url);

        let mut builder = reqwest::Client::builder().timeout(request_timeout);
        if let Some(ca_file) = &config.ca_file {
            let pem = tokio::fs::read(ca_file).await.map_err(|e| {
                connectivity(format!("cannot read CA file {}: {}", ca_file.display(), e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                connectivity(format!("invalid CA file {}: {}", ca_file.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder.build().map_err(|e| connectivity(e.to_string()))?;

        let token_url = format!("{}/sso/oauth/token", engine_root(&api_url));
        let response = http
            .post(&token_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "password"),
                ("scope", "ovirt-app-api"),
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| connectivity(e.to_string()))?;

        let status = response.status();
        let body: SsoResponse = response
            .json()
            .await
            .map_err(|e| connectivity(format!("unexpected SSO response ({}): {}", status, e)))?;
        let token = match body {
            SsoResponse {
                access_token: Some(token),
                ..
            } => token,
            SsoResponse { error, .. } => {
                return Err(connectivity(format!(
                    "login as {} failed: {}",
                    config.username,
                    error.unwrap_or_else(|| status.to_string())
                )));
            }
        };

        log_debug!("oVirt SSO session established");
        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .header("Version", "4")
            .query(query)
            .send()
            .await?;
        Ok(error_for_status(Platform::Ovirt, response).await?.json().await?)
    }

    async fn action(&self, path: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .header("Version", "4")
            .json(&serde_json::json!({}))
            .send()
            .await?;
        error_for_status(Platform::Ovirt, response).await?;
        Ok(())
    }
}

fn connectivity(message: String) -> MigrateError {
    MigrateError::Connectivity {
        platform: Platform::Ovirt,
        message,
    }
}

/// `https://engine/ovirt-engine/api` -> `https://engine/ovirt-engine`
fn engine_root(api_url: &str) -> &str {
    api_url.strip_suffix("/api").unwrap_or(api_url)
}

#[derive(Deserialize)]
struct SsoResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct Link {
    id: String,
}

#[derive(Deserialize)]
struct VmList {
    #[serde(default)]
    vm: Vec<VmWire>,
}

#[derive(Deserialize)]
struct VmWire {
    id: String,
    name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    memory: u64,
    #[serde(default)]
    status: Option<VmStatus>,
    #[serde(default)]
    cpu: Option<CpuWire>,
}

#[derive(Deserialize)]
struct CpuWire {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    topology: Option<TopologyWire>,
}

#[derive(Deserialize)]
struct TopologyWire {
    #[serde(default = "one", deserialize_with = "lenient_u32")]
    sockets: u32,
    #[serde(default = "one", deserialize_with = "lenient_u32")]
    cores: u32,
}

fn one() -> u32 {
    1
}

impl From<VmWire> for SourceVm {
    fn from(vm: VmWire) -> Self {
        let (cpu_mode, sockets, cores) = match vm.cpu {
            Some(cpu) => {
                let (sockets, cores) = cpu
                    .topology
                    .map(|t| (t.sockets, t.cores))
                    .unwrap_or((1, 1));
                (cpu.mode, sockets, cores)
            }
            None => (None, 1, 1),
        };
        SourceVm {
            id: vm.id,
            name: vm.name,
            memory_bytes: vm.memory,
            cpu_mode,
            sockets,
            cores,
            status: vm.status.unwrap_or(VmStatus::Unknown),
        }
    }
}

#[derive(Deserialize)]
struct NicList {
    #[serde(default)]
    nic: Vec<NicWire>,
}

#[derive(Deserialize)]
struct NicWire {
    #[serde(default)]
    mac: Option<MacWire>,
    #[serde(default)]
    vnic_profile: Option<Link>,
}

#[derive(Deserialize)]
struct MacWire {
    address: String,
}

impl From<NicWire> for SourceNic {
    fn from(nic: NicWire) -> Self {
        SourceNic {
            mac: nic.mac.map(|m| m.address),
            profile_id: nic.vnic_profile.map(|p| p.id),
        }
    }
}

#[derive(Deserialize)]
struct DiskAttachmentList {
    #[serde(default)]
    disk_attachment: Vec<DiskAttachmentWire>,
}

#[derive(Deserialize)]
struct DiskAttachmentWire {
    id: String,
    #[serde(default)]
    disk: Option<Link>,
}

#[derive(Deserialize)]
struct DiskWire {
    id: String,
    image_id: String,
    #[serde(default)]
    storage_domains: Option<StorageDomainLinks>,
}

#[derive(Deserialize)]
struct StorageDomainLinks {
    #[serde(default)]
    storage_domain: Vec<Link>,
}

impl From<DiskWire> for SourceDisk {
    fn from(disk: DiskWire) -> Self {
        SourceDisk {
            id: disk.id,
            image_id: disk.image_id,
            storage_domain_ids: disk
                .storage_domains
                .map(|links| links.storage_domain.into_iter().map(|l| l.id).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct Named {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct VnicProfileList {
    #[serde(default)]
    vnic_profile: Vec<Named>,
}

#[derive(Deserialize)]
struct VmStatusWire {
    status: VmStatus,
}

#[async_trait]
impl SourcePlatform for OvirtClient {
    async fn list_network_profiles(&self) -> Result<Vec<NetworkProfile>> {
        let list: VnicProfileList = self.get("/vnicprofiles", &[]).await?;
        Ok(list
            .vnic_profile
            .into_iter()
            .map(|p| NetworkProfile {
                id: p.id,
                name: p.name,
            })
            .collect())
    }

    async fn list_vms(&self, search: &str) -> Result<Vec<SourceVm>> {
        let list: VmList = self.get("/vms", &[("search", search)]).await?;
        Ok(list.vm.into_iter().map(SourceVm::from).collect())
    }

    async fn list_nics(&self, vm_id: &str) -> Result<Vec<SourceNic>> {
        let list: NicList = self.get(&format!("/vms/{}/nics", vm_id), &[]).await?;
        Ok(list.nic.into_iter().map(SourceNic::from).collect())
    }

    async fn list_disk_attachments(&self, vm_id: &str) -> Result<Vec<String>> {
        let list: DiskAttachmentList = self
            .get(&format!("/vms/{}/diskattachments", vm_id), &[])
            .await?;
        Ok(list
            .disk_attachment
            .into_iter()
            .map(|a| a.disk.map(|d| d.id).unwrap_or(a.id))
            .collect())
    }

    async fn get_disk(&self, disk_id: &str) -> Result<SourceDisk> {
        let disk: DiskWire = self.get(&format!("/disks/{}", disk_id), &[]).await?;
        Ok(disk.into())
    }

    async fn get_storage_domain(&self, domain_id: &str) -> Result<StorageDomain> {
        let domain: Named = self
            .get(&format!("/storagedomains/{}", domain_id), &[])
            .await?;
        Ok(StorageDomain {
            id: domain.id,
            name: domain.name,
        })
    }

    async fn shutdown_vm(&self, vm_id: &str) -> Result<()> {
        self.action(&format!("/vms/{}/shutdown", vm_id)).await
    }

    async fn vm_status(&self, vm_id: &str) -> Result<VmStatus> {
        let vm: VmStatusWire = self.get(&format!("/vms/{}", vm_id), &[]).await?;
        Ok(vm.status)
    }
}
