//! State store — Redis-backed persistence for agent and request records.

pub mod client;
pub mod keys;

pub use client::{RedisStore, StoreError};
