pub use state::StartupState;
pub use port_checker::{PortChecker, PortStatus, find_listeners};
pub use teardown::Teardown;
pub use resources::{Resource, Resources};
pub use orchestrator::{Orchestrator, RunningSession};

mod state;
mod port_checker;
mod teardown;
mod resources;
mod orchestrator;
