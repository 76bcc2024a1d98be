//! Container driver — a narrow capability set over the Docker engine.
//!
//! All engine access goes through [`client::DockerClient`]; domain methods
//! are split across sibling files by concern.

pub mod client;
pub mod container;
pub mod event;
pub mod image;
pub mod info;
pub mod network;

pub use client::{DockerClient, DockerError, LABEL_AGENT_ID, LABEL_AGENT_NAME};
pub use container::ContainerSpec;
pub use info::ContainerInfo;
