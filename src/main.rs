use anyhow::Context;
use clap::Parser;
use ovirt2pve::{
    MigrationManager, TokioClock,
    config::{Settings, default_settings_path},
    logger,
    migration::{MigrationConfig, MigrationReport, MigrationStatus},
    ovirt::OvirtClient,
    proxmox::ProxmoxClient,
    translate::EnvironmentPolicy,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ovirt2pve")]
#[command(about = "oVirt to Proxmox VM migration")]
#[command(version)]
struct Cli {
    /// VM name in oVirt. Wildcards allowed, e.g. "web*" or "*" for all VMs
    #[arg(long = "vmname", value_name = "PATTERN")]
    vm_name: String,

    /// Path to the settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Also write the per-VM results as JSON to this file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose && std::env::var_os("RUST_LOG").is_none() {
        unsafe {
            std::env::set_var("RUST_LOG", "ovirt2pve=debug");
        }
    }
    logger::init_logger();

    match run(cli).await {
        Ok(report) => {
            print_summary(&report);
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            logger::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<MigrationReport> {
    let settings_path = cli.config.unwrap_or_else(default_settings_path);
    let settings = Settings::from_file(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    settings.validate()?;

    let request_timeout = settings.migration.request_timeout();
    let ovirt = OvirtClient::connect(&settings.ovirt, request_timeout).await?;
    let proxmox = ProxmoxClient::connect(&settings.proxmox, request_timeout).await?;

    let clock = TokioClock;
    let manager = MigrationManager::new(
        &ovirt,
        &proxmox,
        &clock,
        EnvironmentPolicy::from_settings(&settings),
        MigrationConfig::from(&settings.migration),
    );

    let report = manager
        .run(&cli.vm_name)
        .await
        .with_context(|| format!("Migration of '{}' stopped", cli.vm_name))?;

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }
    Ok(report)
}

fn print_summary(report: &MigrationReport) {
    for job in &report.jobs {
        match &job.status {
            MigrationStatus::Succeeded => println!(
                "✅ {} -> Proxmox VM {}",
                job.vm_name,
                job.target_vmid.unwrap_or_default()
            ),
            MigrationStatus::Failed(reason) => println!("❌ {}: {}", job.vm_name, reason),
            other => println!("⏸️ {}: {:?}", job.vm_name, other),
        }
    }
    println!(
        "{} migrated, {} failed",
        report.succeeded(),
        report.failed()
    );
    if report.aborted {
        println!("Run aborted after the first failure; remaining VMs were not touched");
    }
}
