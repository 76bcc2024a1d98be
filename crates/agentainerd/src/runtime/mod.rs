//! Runtime — process boot, serving, and shutdown plumbing.

pub mod boot;
pub mod serve;
pub mod shutdown;

pub use boot::{boot, init_logging};
pub use serve::serve;
