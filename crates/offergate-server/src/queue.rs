//! Cursor queue service.
//!
//! Converts the coordinator's asynchronous product stream into a durable,
//! resumable, paginated API: each query writes a singly-linked chain of
//! cache entries under fresh UUID cursors, with a work-in-progress sentinel
//! on the not-yet-written tail and an empty `nextCursor` terminating the
//! finished chain. The full result is additionally copied into a snapshot
//! store so finished queries can be shared.
//!
//! TTL layering: chain tails waiting for the producer live 15 minutes, so
//! a producer crash leaves pollers a bounded WIP window instead of a
//! dangling 404; settled links live an hour; fresh snapshots five minutes
//! unless a share call persisted them. There is no liveness guarantee
//! beyond the WIP TTL when the producer dies mid-stream.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use offergate_cache::{Cache, CacheError, CacheExt, Ttl};
use offergate_core::{Address, InternetProduct};
use offergate_providers::{AdapterRequest, RequestCoordinator};

use serde::{Deserialize, Serialize};

/// `nextCursor` sentinel: the producer has not reached this link yet.
pub const WORK_IN_PROGRESS: &str = "indicator-work-in-progress";
/// Snapshot `version` sentinel: a share call reserved this cursor before
/// the producer finished.
pub const PERSIST_PLACEHOLDER: &str = "indicator-persist";
/// Wire version stamped on cursor and snapshot responses.
pub const RESPONSE_VERSION: &str = "v1";

const WIP_TTL: Duration = Duration::from_secs(15 * 60);
const LINK_TTL: Duration = Duration::from_secs(60 * 60);
const SNAPSHOT_TTL: Duration = Duration::from_secs(5 * 60);
const SHARE_RESERVATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One link of a cursor chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    #[serde(default)]
    pub products: Vec<InternetProduct>,
    pub next_cursor: String,
}

/// The finalized result of a query, stored for sharing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedSnapshot {
    #[serde(default)]
    pub products: Vec<InternetProduct>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub version: String,
}

/// Answer to `POST /internet-products`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorResponse {
    pub version: String,
    pub next_cursor: String,
}

/// Answer to a successful continue call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsResponse {
    pub products: Vec<InternetProduct>,
    pub next_cursor: String,
}

/// What a continue call found.
#[derive(Debug)]
pub enum ContinueOutcome {
    /// Products were accumulated; the contained cursor resumes the walk
    /// (empty when the chain is complete).
    Ready(ProductsResponse),
    /// The producer has not emitted anything for this cursor yet.
    Pending,
    NotFound,
    BadCursor,
}

/// What a share or fetch-shared call found.
#[derive(Debug)]
pub enum ShareOutcome {
    Ok,
    BadCursor,
}

#[derive(Debug)]
pub enum SharedFetchOutcome {
    Found(SharedSnapshot),
    NotFound,
    BadCursor,
}

pub struct QueueService {
    /// Shared-snapshot store.
    cache: Arc<dyn Cache>,
    /// Cursor-chain store.
    queue: Arc<dyn Cache>,
    coordinator: Arc<RequestCoordinator>,
    response_buffer: usize,
    error_buffer: usize,
    query_deadline: Duration,
}

impl QueueService {
    #[must_use]
    pub fn new(
        cache: Arc<dyn Cache>,
        queue: Arc<dyn Cache>,
        coordinator: Arc<RequestCoordinator>,
        response_buffer: usize,
        error_buffer: usize,
        query_deadline: Duration,
    ) -> Self {
        QueueService {
            cache,
            queue,
            coordinator,
            response_buffer,
            error_buffer,
            query_deadline,
        }
    }

    /// Starts a query and immediately returns its root cursor. The actual
    /// work runs detached under the configured deadline.
    #[must_use]
    pub fn initiate_query(self: &Arc<Self>, address: Address) -> CursorResponse {
        let cursor = Uuid::new_v4().to_string();

        let service = Arc::clone(self);
        let root = cursor.clone();
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let deadline_guard = cancel.clone();
            let deadline = service.query_deadline;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                tracing::warn!("query deadline reached, cancelling in-flight work");
                deadline_guard.cancel();
            });

            service.process_request(cancel, address, root).await;
            timer.abort();
        });

        CursorResponse {
            version: RESPONSE_VERSION.to_string(),
            next_cursor: cursor,
        }
    }

    /// Runs the coordinator for `address` and writes the cursor chain under
    /// `root`. Cache write failures are logged and skipped — a terminal
    /// chain entry is always attempted so pollers never hang on WIP past
    /// its TTL.
    pub async fn process_request(&self, cancel: CancellationToken, address: Address, root: String) {
        let (mut products_rx, mut errors_rx) = self.coordinator.run(
            cancel,
            AdapterRequest {
                address: address.clone(),
            },
            self.response_buffer,
            self.error_buffer,
        );

        tokio::spawn(async move {
            while let Some(error) = errors_rx.recv().await {
                tracing::error!(error = %error, "error fetching products");
            }
        });

        let mut all_products: Vec<InternetProduct> = Vec::new();
        let mut current = root.clone();
        let mut next = Uuid::new_v4().to_string();

        self.write_wip(&current).await;

        while let Some(product) = products_rx.recv().await {
            tracing::debug!(product = %product.id, cursor = %current, "appending product to queue");
            all_products.push(product.clone());

            let entry = QueueEntry {
                products: vec![product],
                next_cursor: next.clone(),
            };
            if let Err(e) = self
                .queue
                .set_json(&current, &entry, Ttl::Expires(LINK_TTL))
                .await
            {
                // Leave `current` in place; the next product overwrites the
                // same link instead of orphaning the chain.
                tracing::error!(cursor = %current, error = %e, "failed to write queue entry");
                continue;
            }

            self.write_wip(&next).await;

            current = next;
            next = Uuid::new_v4().to_string();
        }

        let terminal = QueueEntry {
            products: Vec::new(),
            next_cursor: String::new(),
        };
        if let Err(e) = self
            .queue
            .set_json(&current, &terminal, Ttl::Expires(LINK_TTL))
            .await
        {
            tracing::error!(cursor = %current, error = %e, "failed to write terminal queue entry");
        }

        tracing::info!(count = all_products.len(), cursor = %root, "query complete");

        self.write_snapshot(&root, address, all_products).await;
    }

    async fn write_wip(&self, cursor: &str) {
        let entry = QueueEntry {
            products: Vec::new(),
            next_cursor: WORK_IN_PROGRESS.to_string(),
        };
        if let Err(e) = self
            .queue
            .set_json(cursor, &entry, Ttl::Expires(WIP_TTL))
            .await
        {
            tracing::error!(cursor = %cursor, error = %e, "failed to write work-in-progress entry");
        }
    }

    /// Publishes the finalized snapshot. When a share call already reserved
    /// the cursor with a placeholder, the snapshot overwrites it while
    /// keeping whatever TTL the share call established (possibly none).
    async fn write_snapshot(&self, root: &str, address: Address, products: Vec<InternetProduct>) {
        let snapshot = SharedSnapshot {
            products,
            address: Some(address),
            version: RESPONSE_VERSION.to_string(),
        };

        let stored = match self
            .cache
            .set_json_if_not_exists(root, &snapshot, Ttl::Expires(SNAPSHOT_TTL))
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(cursor = %root, error = %e, "failed to write shared snapshot");
                return;
            }
        };

        if !stored {
            match self.cache.get_json::<SharedSnapshot>(root).await {
                Ok(Some(existing)) if existing.version != PERSIST_PLACEHOLDER => {
                    // A fresh UUID collided with an existing snapshot.
                    // Overwriting is the least-bad option.
                    tracing::error!(cursor = %root, "snapshot cursor collision, overwriting");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(cursor = %root, error = %e, "failed to read existing snapshot");
                    return;
                }
            }
            if let Err(e) = self.cache.set_json(root, &snapshot, Ttl::Keep).await {
                tracing::error!(cursor = %root, error = %e, "failed to overwrite shared snapshot");
            }
        }
    }

    /// Walks the chain from `cursor`, accumulating products until the end,
    /// a WIP marker, or a missing link.
    ///
    /// # Errors
    ///
    /// Returns the underlying `CacheError` when the queue store fails.
    pub async fn continue_query(&self, cursor: &str) -> Result<ContinueOutcome, CacheError> {
        if Uuid::parse_str(cursor).is_err() {
            return Ok(ContinueOutcome::BadCursor);
        }

        let mut cursor = cursor.to_string();
        let mut products: Vec<InternetProduct> = Vec::new();
        let mut found_any = false;

        while !cursor.is_empty() {
            let Some(entry) = self.queue.get_json::<QueueEntry>(&cursor).await? else {
                break;
            };

            if entry.next_cursor == WORK_IN_PROGRESS {
                if !found_any {
                    return Ok(ContinueOutcome::Pending);
                }
                break;
            }

            found_any = true;
            products.extend(entry.products);
            cursor = entry.next_cursor;
        }

        if !found_any {
            return Ok(ContinueOutcome::NotFound);
        }

        Ok(ContinueOutcome::Ready(ProductsResponse {
            products,
            next_cursor: cursor,
        }))
    }

    /// Marks a query's snapshot for sharing. Reserves a placeholder when
    /// the producer has not finished yet; otherwise removes the snapshot's
    /// TTL. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the underlying `CacheError` when the snapshot store fails.
    pub async fn share(&self, cursor: &str) -> Result<ShareOutcome, CacheError> {
        if Uuid::parse_str(cursor).is_err() {
            return Ok(ShareOutcome::BadCursor);
        }

        let placeholder = SharedSnapshot {
            products: Vec::new(),
            address: None,
            version: PERSIST_PLACEHOLDER.to_string(),
        };
        let stored = self
            .cache
            .set_json_if_not_exists(cursor, &placeholder, Ttl::Expires(SHARE_RESERVATION_TTL))
            .await?;

        if !stored {
            self.cache.persist(cursor).await?;
        }

        Ok(ShareOutcome::Ok)
    }

    /// Fetches a shared snapshot. Persist placeholders count as absent —
    /// the producer has not delivered the real snapshot yet.
    ///
    /// # Errors
    ///
    /// Returns the underlying `CacheError` when the snapshot store fails.
    pub async fn get_shared(&self, cursor: &str) -> Result<SharedFetchOutcome, CacheError> {
        if Uuid::parse_str(cursor).is_err() {
            return Ok(SharedFetchOutcome::BadCursor);
        }

        match self.cache.get_json::<SharedSnapshot>(cursor).await? {
            None => Ok(SharedFetchOutcome::NotFound),
            Some(snapshot) if snapshot.version == PERSIST_PLACEHOLDER => {
                Ok(SharedFetchOutcome::NotFound)
            }
            Some(snapshot) => Ok(SharedFetchOutcome::Found(snapshot)),
        }
    }
}
