//! State reconciler — keeps persisted agent status consistent with actual
//! container state via periodic polling and engine-event subscription.

pub mod run;
pub mod sync;

pub use run::{run_events, run_periodic};
pub use sync::{derive_status, sync_all, sync_one, ReconcileError};
