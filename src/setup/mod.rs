pub use packages::SetupSequencer;
pub use limits::ResourceLimitAdjuster;

mod packages;
mod limits;
