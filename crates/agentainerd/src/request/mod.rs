//! Request persistence — records, queues, and retry bookkeeping.

pub mod model;
pub mod store;

pub use model::{RequestStatus, StoredRequest, StoredResponse};
pub use store::{RequestStore, RequestStoreError};
