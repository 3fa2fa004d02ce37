//! Proxmox VE REST client
//!
//! Ticket based session against `/api2/json`. Every response body is wrapped
//! in `{"data": ...}`.

use crate::{
    MigrateError, Result,
    config::ProxmoxConfig,
    error::Platform,
    log_debug, log_info,
    model::{CreationRequest, TaskHandle},
    platform::{TargetPlatform, TaskStatus, error_for_status, lenient_u32},
};
use async_trait::async_trait;
use reqwest::header::COOKIE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const CSRF_HEADER: &str = "CSRFPreventionToken";

pub struct ProxmoxClient {
    http: reqwest::Client,
    api_url: String,
    node: String,
    ticket: String,
    csrf_token: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct Ticket {
    ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    csrf_token: String,
}

#[derive(Deserialize)]
struct NextId {
    #[serde(deserialize_with = "lenient_u32")]
    data: u32,
}

impl ProxmoxClient {
    pub async fn connect(config: &ProxmoxConfig, request_timeout: Duration) -> Result<Self> {
        let api_url = config.api_url();
        log_info!("Connecting to Proxmox at {} (node {})", api_url, config.node);

        if !config.verify_ssl {
            log_debug!("TLS certificate verification disabled for Proxmox");
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| connectivity(e.to_string()))?;

        let response = http
            .post(format!("{}/access/ticket", api_url))
            .form(&[
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| connectivity(e.to_string()))?;
        if !response.status().is_success() {
            return Err(connectivity(format!(
                "login as {} failed: {}",
                config.username,
                response.status()
            )));
        }
        let Envelope { data: ticket }: Envelope<Ticket> = response
            .json()
            .await
            .map_err(|e| connectivity(format!("unexpected ticket response: {}", e)))?;

        log_debug!("Proxmox ticket acquired");
        Ok(Self {
            http,
            api_url,
            node: config.node.clone(),
            ticket: ticket.ticket,
            csrf_token: ticket.csrf_token,
        })
    }

    fn auth_cookie(&self) -> String {
        format!("PVEAuthCookie={}", self.ticket)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .header(COOKIE, self.auth_cookie())
            .send()
            .await?;
        Ok(error_for_status(Platform::Proxmox, response).await?.json().await?)
    }
}

fn connectivity(message: String) -> MigrateError {
    MigrateError::Connectivity {
        platform: Platform::Proxmox,
        message,
    }
}

#[async_trait]
impl TargetPlatform for ProxmoxClient {
    async fn next_vmid(&self) -> Result<u32> {
        let next: NextId = self.get("/cluster/nextid").await?;
        Ok(next.data)
    }

    async fn create_vm(&self, request: &CreationRequest) -> Result<TaskHandle> {
        let response = self
            .http
            .post(format!("{}/nodes/{}/qemu", self.api_url, self.node))
            .header(COOKIE, self.auth_cookie())
            .header(CSRF_HEADER, &self.csrf_token)
            .form(request.params())
            .send()
            .await?;
        let Envelope { data: upid }: Envelope<String> =
            error_for_status(Platform::Proxmox, response).await?.json().await?;
        Ok(TaskHandle(upid))
    }

    async fn task_status(&self, task: &TaskHandle) -> Result<TaskStatus> {
        let Envelope { data: status }: Envelope<TaskStatus> = self
            .get(&format!("/nodes/{}/tasks/{}/status", self.node, task))
            .await?;
        Ok(status)
    }
}
