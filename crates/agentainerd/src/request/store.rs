//! Store — request/response persistence and queue bookkeeping.
//!
//! Queue invariant: a request ID lives in exactly one of
//! {pending, completed, failed} at any time, beside its canonical record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::keys::{self, Queue};
use crate::store::{RedisStore, StoreError};

use super::model::{RequestStatus, StoredRequest, StoredResponse};

#[derive(Error, Debug)]
pub enum RequestStoreError {
    #[error("Request not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct RequestStore {
    store: Arc<RedisStore>,
    ttl: Duration,
    max_retries: u32,
}

impl RequestStore {
    pub fn new(store: Arc<RedisStore>, ttl: Duration, max_retries: u32) -> Self {
        Self {
            store,
            ttl,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn save(&self, request: &StoredRequest) -> Result<(), RequestStoreError> {
        self.store
            .set_json_ex(
                &keys::request(&request.agent_id, &request.id),
                request,
                self.ttl,
            )
            .await?;
        Ok(())
    }

    /// Persist an inbound request and enqueue it as pending.
    pub async fn store_request(
        &self,
        agent_id: &str,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        body: Vec<u8>,
    ) -> Result<StoredRequest, RequestStoreError> {
        let request = StoredRequest::new(agent_id, method, path, headers, body, self.max_retries);

        self.save(&request).await?;
        self.store
            .rpush(&keys::queue(agent_id, Queue::Pending), &request.id)
            .await?;
        // Time-scored index; queue entries for expired records are pruned
        // against it since list entries carry no TTL of their own.
        self.store
            .zadd(
                &keys::request_index(agent_id),
                &request.id,
                request.created_at.timestamp() as f64,
            )
            .await?;

        debug!(agent_id = %agent_id, request_id = %request.id, "Stored request");
        Ok(request)
    }

    /// Drop queue entries (and index entries) for requests created before the
    /// cutoff. Their records have hit the TTL; this reclaims the list slots.
    pub async fn prune_expired(
        &self,
        agent_id: &str,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<usize, RequestStoreError> {
        let index_key = keys::request_index(agent_id);
        let cutoff_score = cutoff.timestamp() as f64;

        let expired = self
            .store
            .zrange_by_score(&index_key, f64::NEG_INFINITY, cutoff_score)
            .await?;
        if expired.is_empty() {
            return Ok(0);
        }

        for request_id in &expired {
            for queue in [Queue::Pending, Queue::Completed, Queue::Failed] {
                self.store
                    .lrem(&keys::queue(agent_id, queue), 0, request_id)
                    .await?;
            }
            self.store
                .del(&keys::request(agent_id, request_id))
                .await?;
        }
        self.store
            .zrem_range_by_score(&index_key, f64::NEG_INFINITY, cutoff_score)
            .await?;

        info!(agent_id = %agent_id, pruned = expired.len(), "Pruned expired request entries");
        Ok(expired.len())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist the captured response and move the request to completed.
    ///
    /// Idempotent with respect to replays: re-storing a response updates the
    /// record but never duplicates the completed-queue entry.
    pub async fn store_response(
        &self,
        agent_id: &str,
        request_id: &str,
        status_code: u16,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Result<StoredRequest, RequestStoreError> {
        let mut request = self
            .get_request(agent_id, request_id)
            .await?
            .ok_or_else(|| RequestStoreError::NotFound(request_id.to_string()))?;

        request.response = Some(StoredResponse {
            status_code,
            headers,
            body,
            received_at: Utc::now(),
        });
        request.status = RequestStatus::Completed;
        request.processed_at = Some(Utc::now());
        request.error = None;
        // Response is persisted before the queue move, so a request is never
        // in `completed` without its response.
        self.save(&request).await?;

        self.store
            .lrem(&keys::queue(agent_id, Queue::Pending), 1, request_id)
            .await?;
        self.store
            .lrem(&keys::queue(agent_id, Queue::Completed), 0, request_id)
            .await?;
        self.store
            .rpush(&keys::queue(agent_id, Queue::Completed), request_id)
            .await?;

        debug!(
            agent_id = %agent_id,
            request_id = %request_id,
            status_code,
            "Stored response"
        );
        Ok(request)
    }

    /// Count a failed delivery attempt.
    ///
    /// Below the retry budget the request stays pending (and queued) for the
    /// next pass; at the budget it moves to the failed queue for good.
    pub async fn mark_failed(
        &self,
        agent_id: &str,
        request_id: &str,
        error: &str,
    ) -> Result<StoredRequest, RequestStoreError> {
        let mut request = self
            .get_request(agent_id, request_id)
            .await?
            .ok_or_else(|| RequestStoreError::NotFound(request_id.to_string()))?;

        request.retry_count += 1;
        request.error = Some(error.to_string());

        if request.retry_count < request.max_retries {
            request.status = RequestStatus::Pending;
            self.save(&request).await?;
            debug!(
                agent_id = %agent_id,
                request_id = %request_id,
                retry_count = request.retry_count,
                "Request attempt failed, will retry"
            );
        } else {
            request.status = RequestStatus::Failed;
            request.processed_at = Some(Utc::now());
            self.save(&request).await?;

            self.store
                .lrem(&keys::queue(agent_id, Queue::Pending), 1, request_id)
                .await?;
            self.store
                .lrem(&keys::queue(agent_id, Queue::Failed), 0, request_id)
                .await?;
            self.store
                .rpush(&keys::queue(agent_id, Queue::Failed), request_id)
                .await?;

            info!(
                agent_id = %agent_id,
                request_id = %request_id,
                retries = request.retry_count,
                "Request exhausted its retries"
            );
        }

        Ok(request)
    }

    /// Reset a request to pending without counting an attempt. Used when a
    /// replay pass could not reach the local proxy at all.
    pub async fn reset_pending(
        &self,
        agent_id: &str,
        request_id: &str,
    ) -> Result<(), RequestStoreError> {
        let Some(mut request) = self.get_request(agent_id, request_id).await? else {
            return Ok(());
        };
        if request.status == RequestStatus::Processing {
            request.status = RequestStatus::Pending;
            self.save(&request).await?;
        }
        Ok(())
    }

    /// Flag a request as in-flight so concurrent replay passes skip it.
    pub async fn mark_processing(
        &self,
        agent_id: &str,
        request_id: &str,
    ) -> Result<(), RequestStoreError> {
        let mut request = self
            .get_request(agent_id, request_id)
            .await?
            .ok_or_else(|| RequestStoreError::NotFound(request_id.to_string()))?;
        request.status = RequestStatus::Processing;
        self.save(&request).await?;
        Ok(())
    }

    pub async fn get_request(
        &self,
        agent_id: &str,
        request_id: &str,
    ) -> Result<Option<StoredRequest>, RequestStoreError> {
        Ok(self
            .store
            .get_json::<StoredRequest>(&keys::request(agent_id, request_id))
            .await?)
    }

    /// Read a queue in FIFO order, sweeping entries whose record expired.
    pub async fn read_queue(
        &self,
        agent_id: &str,
        queue: Queue,
    ) -> Result<Vec<StoredRequest>, RequestStoreError> {
        let queue_key = keys::queue(agent_id, queue);
        let ids = self.store.lrange(&queue_key).await?;

        let mut requests = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_request(agent_id, &id).await? {
                Some(request) => requests.push(request),
                None => {
                    // Orphan: the record's TTL expired while the queue entry
                    // lived on. Swept on read.
                    warn!(agent_id = %agent_id, request_id = %id, "Sweeping orphan queue entry");
                    self.store.lrem(&queue_key, 0, &id).await?;
                }
            }
        }
        Ok(requests)
    }

    pub async fn get_pending(&self, agent_id: &str) -> Result<Vec<StoredRequest>, RequestStoreError> {
        self.read_queue(agent_id, Queue::Pending).await
    }
}
