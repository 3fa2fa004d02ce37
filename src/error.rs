use std::fmt;
use std::time::Duration;

/// Which side of the migration an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ovirt,
    Proxmox,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Ovirt => write!(f, "oVirt"),
            Platform::Proxmox => write!(f, "Proxmox"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cannot connect to {platform}: {message}")]
    Connectivity { platform: Platform, message: String },

    #[error("{platform} API returned {status}: {message}")]
    Api {
        platform: Platform,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No VM matches '{0}'")]
    NoMatchingVm(String),

    #[error("Missing reference: {0}")]
    MissingReference(String),

    #[error("VM '{vm}' did not shut down within {}s", .timeout.as_secs())]
    ShutdownTimeout { vm: String, timeout: Duration },

    #[error("Creation of VM '{vm}' rejected: {message}")]
    SubmissionFailed { vm: String, message: String },

    #[error("Creation task {task} for VM '{vm}' did not finish within {}s", .timeout.as_secs())]
    CreationTimeout {
        vm: String,
        task: String,
        timeout: Duration,
    },

    #[error("Creation task {task} for VM '{vm}' finished with exit status '{exit_status}'")]
    CreationFailure {
        vm: String,
        task: String,
        exit_status: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
