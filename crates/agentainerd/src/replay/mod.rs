//! Replay worker — at-least-once delivery for requests that arrived while
//! their agent was down.

pub mod worker;

pub use worker::{drain_agent, replay_one, run};
