pub use error::{WebdeskError, Result};
pub use settings::{
    Settings, LoggingSettings, DisplaySettings, AudioSettings, GatewaySettings, ContainerSettings,
    ReadinessSettings, NetworkMode, SetupSettings, PackageRequirement, LimitSettings,
};
pub use system::System;
pub use process_handle::ProcessHandle;
pub use executor::{CommandLine, CommandOutput, Executor, SystemExecutor};
pub use shutdown::ShutdownSignal;
pub use retry::{RetryPolicy, Attempt};

mod error;
mod settings;
mod system;
mod process_handle;
pub mod executor;
mod shutdown;
mod retry;
