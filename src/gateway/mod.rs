pub use container::{ContainerEngine, ContainerSpec};
pub use gateway_service::GatewayService;
pub use readiness::{ReadinessProbe, HttpProbe, check_ready};

mod container;
mod gateway_service;
mod readiness;
