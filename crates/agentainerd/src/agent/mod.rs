//! Agent domain — records, deploy specs, and the lifecycle manager.

pub mod lifecycle;
pub mod model;

pub use lifecycle::{LifecycleError, LifecycleManager};
pub use model::{Agent, AgentStatus, DeploySpec, StatusChange, VolumeMount};
