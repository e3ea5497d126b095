pub mod allocator;
pub mod health;
pub mod installer;
pub mod plan;
pub mod tester;

pub use allocator::{AllocationError, AllocationResult, PortAllocator, PortRequest};
pub use installer::{InstallOptions, Installer};
pub use plan::PortPlan;
