use crate::{
    MigrateError, Result,
    clock::Clock,
    config::{FailurePolicy, MigrationSettings},
    extract::{self, ExtractOptions},
    inventory, log_debug, log_error, log_info, log_warn,
    model::{TaskHandle, VmDescriptor},
    platform::{SourcePlatform, TargetPlatform, VmStatus},
    translate::{EnvironmentPolicy, translate},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MigrationStatus {
    PendingShutdown,
    ShutDown,
    Submitted,
    Polling,
    Succeeded,
    Failed(String),
}

impl MigrationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationStatus::Succeeded | MigrationStatus::Failed(_))
    }
}

/// Progress record of one VM's migration.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationJob {
    pub job_id: String,
    pub vm_name: String,
    pub source_id: String,
    pub target_vmid: Option<u32>,
    pub task: Option<TaskHandle>,
    pub status: MigrationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl MigrationJob {
    pub fn new(vm: &VmDescriptor) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            vm_name: vm.name.clone(),
            source_id: vm.source_id.clone(),
            target_vmid: None,
            task: None,
            status: MigrationStatus::PendingShutdown,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    fn update_status(&mut self, status: MigrationStatus) {
        log_debug!("Job {} ({}): {:?}", self.job_id, self.vm_name, status);
        if status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.status = status;
    }

    fn mark_failed(&mut self, error: &MigrateError) {
        self.error_message = Some(error.to_string());
        self.update_status(MigrationStatus::Failed(error.to_string()));
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub jobs: Vec<MigrationJob>,
    /// Set when the abort policy stopped the batch before every VM was tried.
    pub aborted: bool,
}

impl MigrationReport {
    pub fn succeeded(&self) -> usize {
        self.jobs
            .iter()
            .filter(|job| job.status == MigrationStatus::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|job| matches!(job.status, MigrationStatus::Failed(_)))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub shutdown_timeout: Duration,
    pub shutdown_poll_interval: Duration,
    pub creation_timeout: Duration,
    pub creation_poll_interval: Duration,
    pub on_failure: FailurePolicy,
    pub include_stopped: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(300),
            shutdown_poll_interval: Duration::from_secs(5),
            creation_timeout: Duration::from_secs(1800),
            creation_poll_interval: Duration::from_secs(3),
            on_failure: FailurePolicy::Abort,
            include_stopped: false,
        }
    }
}

impl From<&MigrationSettings> for MigrationConfig {
    fn from(settings: &MigrationSettings) -> Self {
        Self {
            shutdown_timeout: settings.shutdown_timeout(),
            shutdown_poll_interval: settings.shutdown_poll_interval(),
            creation_timeout: settings.creation_timeout(),
            creation_poll_interval: settings.creation_poll_interval(),
            on_failure: settings.on_failure,
            include_stopped: settings.include_stopped,
        }
    }
}

/// Drives VMs from oVirt to Proxmox, one at a time.
pub struct MigrationManager<'a> {
    source: &'a dyn SourcePlatform,
    target: &'a dyn TargetPlatform,
    clock: &'a dyn Clock,
    policy: EnvironmentPolicy,
    config: MigrationConfig,
}

impl<'a> MigrationManager<'a> {
    pub fn new(
        source: &'a dyn SourcePlatform,
        target: &'a dyn TargetPlatform,
        clock: &'a dyn Clock,
        policy: EnvironmentPolicy,
        config: MigrationConfig,
    ) -> Self {
        Self {
            source,
            target,
            clock,
            policy,
            config,
        }
    }

    /// Snapshot the network profiles, describe the VMs matching `pattern`
    /// and migrate them.
    pub async fn run(&self, pattern: &str) -> Result<MigrationReport> {
        let catalog = inventory::list_network_profiles(self.source).await?;
        let options = ExtractOptions {
            include_stopped: self.config.include_stopped,
        };
        let vms = extract::extract(self.source, &catalog, pattern, options).await?;
        Ok(self.migrate_all(vms.values()).await)
    }

    /// Migrate `vms` in order. Failures are recorded in the report; under the
    /// abort policy the first one also ends the batch.
    pub async fn migrate_all<'v, I>(&self, vms: I) -> MigrationReport
    where
        I: IntoIterator<Item = &'v VmDescriptor>,
    {
        let mut report = MigrationReport::default();

        for vm in vms {
            let mut job = MigrationJob::new(vm);
            let outcome = self.migrate_vm(vm, &mut job).await;
            report.jobs.push(job);

            if let Err(e) = outcome {
                match self.config.on_failure {
                    FailurePolicy::Abort => {
                        log_error!("Migration of '{}' failed, aborting run: {}", vm.name, e);
                        report.aborted = true;
                        break;
                    }
                    FailurePolicy::Skip => {
                        log_error!("Migration of '{}' failed, continuing: {}", vm.name, e);
                    }
                }
            }
        }

        report
    }

    /// Run one VM through shutdown, creation and task polling. `job` is
    /// left in a terminal state either way.
    pub async fn migrate_vm(&self, vm: &VmDescriptor, job: &mut MigrationJob) -> Result<()> {
        log_info!("Starting migration of VM '{}' (job {})", vm.name, job.job_id);

        match self.drive(vm, job).await {
            Ok(()) => {
                job.update_status(MigrationStatus::Succeeded);
                log_info!(
                    "VM '{}' migrated as Proxmox VM {}",
                    vm.name,
                    job.target_vmid.unwrap_or_default()
                );
                Ok(())
            }
            Err(e) => {
                job.mark_failed(&e);
                Err(e)
            }
        }
    }

    async fn drive(&self, vm: &VmDescriptor, job: &mut MigrationJob) -> Result<()> {
        self.shutdown_source(vm).await?;
        job.update_status(MigrationStatus::ShutDown);

        let task = self.submit(vm, job).await?;
        job.update_status(MigrationStatus::Submitted);

        job.update_status(MigrationStatus::Polling);
        self.wait_for_task(vm, &task).await
    }

    async fn shutdown_source(&self, vm: &VmDescriptor) -> Result<()> {
        if self.source.vm_status(&vm.source_id).await? == VmStatus::Down {
            log_info!("VM '{}' is already down on oVirt", vm.name);
            return Ok(());
        }

        log_info!("Shutting down VM '{}' on oVirt", vm.name);
        self.source.shutdown_vm(&vm.source_id).await?;

        let started = self.clock.now();
        loop {
            self.clock.sleep(self.config.shutdown_poll_interval).await;

            let status = self.source.vm_status(&vm.source_id).await?;
            if status == VmStatus::Down {
                log_info!("VM '{}' is down", vm.name);
                return Ok(());
            }

            let waited = self.clock.now().duration_since(started);
            log_debug!("VM '{}' is {:?} after {}s", vm.name, status, waited.as_secs());
            if waited >= self.config.shutdown_timeout {
                log_warn!(
                    "VM '{}' still {:?} after {}s, leaving it as is",
                    vm.name,
                    status,
                    waited.as_secs()
                );
                return Err(MigrateError::ShutdownTimeout {
                    vm: vm.name.clone(),
                    timeout: self.config.shutdown_timeout,
                });
            }
        }
    }

    async fn submit(&self, vm: &VmDescriptor, job: &mut MigrationJob) -> Result<TaskHandle> {
        let rejected = |e: MigrateError| MigrateError::SubmissionFailed {
            vm: vm.name.clone(),
            message: e.to_string(),
        };

        let vmid = self.target.next_vmid().await.map_err(rejected)?;
        job.target_vmid = Some(vmid);
        let request = translate(vm, vmid, &self.policy);
        log_debug!(
            "Creation request for '{}':\n{}",
            vm.name,
            serde_json::to_string_pretty(&request)?
        );

        let task = self.target.create_vm(&request).await.map_err(rejected)?;
        log_info!(
            "Submitted VM '{}' as Proxmox VM {} (task {})",
            vm.name,
            vmid,
            task
        );

        job.task = Some(task.clone());
        Ok(task)
    }

    async fn wait_for_task(&self, vm: &VmDescriptor, task: &TaskHandle) -> Result<()> {
        let started = self.clock.now();
        loop {
            let status = self.target.task_status(task).await?;
            if status.is_stopped() {
                if status.succeeded() {
                    return Ok(());
                }
                return Err(MigrateError::CreationFailure {
                    vm: vm.name.clone(),
                    task: task.to_string(),
                    exit_status: status.exitstatus.unwrap_or_else(|| "unknown".to_string()),
                });
            }

            let waited = self.clock.now().duration_since(started);
            log_debug!("Task {} status: {} ({}s)", task, status.status, waited.as_secs());
            if waited >= self.config.creation_timeout {
                return Err(MigrateError::CreationTimeout {
                    vm: vm.name.clone(),
                    task: task.to_string(),
                    timeout: self.config.creation_timeout,
                });
            }

            self.clock.sleep(self.config.creation_poll_interval).await;
        }
    }
}
