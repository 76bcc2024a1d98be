//! Proxy — the authenticated HTTP front door's public half: per-agent
//! store-and-forward reverse proxying.

pub mod forward;
pub mod route;

pub use forward::{HEADER_REPLAY, HEADER_REQUEST_ID};
