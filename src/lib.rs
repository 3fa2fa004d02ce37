pub mod clock;
pub mod config;
pub mod error;
pub mod extract;
pub mod inventory;
pub mod logger;
pub mod migration;
pub mod model;
pub mod ovirt;
pub mod platform;
pub mod proxmox;
pub mod translate;
pub mod units;

pub use error::MigrateError;
pub use model::{CpuPolicy, CreationRequest, DiskDescriptor, NicDescriptor, VmDescriptor};

pub type Result<T> = std::result::Result<T, MigrateError>;

pub use clock::{Clock, ManualClock, TokioClock};
pub use migration::{MigrationConfig, MigrationJob, MigrationManager, MigrationReport};
pub use platform::{SourcePlatform, TargetPlatform};
