//! Fan-out request coordinator.
//!
//! [`RequestCoordinator::run`] sends one query to every configured provider
//! in parallel, validates everything the adapters produce, and multiplexes
//! the results onto a single pair of bounded channels. Adapters may declare
//! follow-up requests (two-stage listing→detail protocols, pagination);
//! those are dispatched with the same retry, backoff and concurrency rules
//! as the initial requests, and both channels close only once every
//! transitively spawned piece of work has finished.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use offergate_core::{canonicalize, validate_constraints, validate_required, InternetProduct};

use crate::adapter::{AdapterRequest, ParsedResponse, PreparedRequest, ProviderResponse};
use crate::error::ProviderError;
use crate::registry::ProviderConfig;

/// Dispatches one query across all configured providers.
pub struct RequestCoordinator {
    providers: Vec<Arc<ProviderConfig>>,
}

impl RequestCoordinator {
    #[must_use]
    pub fn new(providers: Vec<Arc<ProviderConfig>>) -> Self {
        RequestCoordinator { providers }
    }

    /// Runs `request` on every provider, returning fresh channels for
    /// validated products and errors.
    ///
    /// Both channels close once all providers and their transitive
    /// follow-up requests have completed (every spawned task holds a sender
    /// clone; channel closure is the drop of the last one). Cancelling
    /// `cancel` stops retries and follow-ups at their next checkpoint; the
    /// channels still close cleanly.
    #[must_use]
    pub fn run(
        &self,
        cancel: CancellationToken,
        request: AdapterRequest,
        resp_buf: usize,
        err_buf: usize,
    ) -> (
        mpsc::Receiver<InternetProduct>,
        mpsc::Receiver<ProviderError>,
    ) {
        let (product_tx, product_rx) = mpsc::channel(resp_buf);
        let (error_tx, error_rx) = mpsc::channel(err_buf);

        for cfg in &self.providers {
            let outputs = Outputs {
                products: product_tx.clone(),
                errors: error_tx.clone(),
            };
            tokio::spawn(run_provider(
                Arc::clone(cfg),
                cancel.clone(),
                request.clone(),
                outputs,
            ));
        }

        (product_rx, error_rx)
    }
}

/// The coordinator's output channels; cloned into every spawned task so the
/// receivers observe end-of-stream exactly when all work is done.
#[derive(Clone)]
struct Outputs {
    products: mpsc::Sender<InternetProduct>,
    errors: mpsc::Sender<ProviderError>,
}

impl Outputs {
    async fn emit_error(&self, error: ProviderError) {
        // A dropped receiver means the consumer is gone; nothing to do.
        let _ = self.errors.send(error).await;
    }
}

/// Top-level branch for one provider: preparation plus follow-up dispatch.
async fn run_provider(
    cfg: Arc<ProviderConfig>,
    cancel: CancellationToken,
    request: AdapterRequest,
    outputs: Outputs,
) {
    let parsed = match cfg.adapter.prepare_request(&request).await {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(provider = cfg.adapter.name(), error = %e, "request preparation failed");
            outputs.emit_error(e).await;
            return;
        }
    };

    handle_parsed(cfg, cancel, parsed, request, outputs).await;
}

/// Emits validated products and spawns the follow-up requests of one
/// [`ParsedResponse`]. Boxed because follow-ups recurse through
/// [`dispatch_request`].
fn handle_parsed(
    cfg: Arc<ProviderConfig>,
    cancel: CancellationToken,
    parsed: ParsedResponse,
    original: AdapterRequest,
    outputs: Outputs,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let provider = cfg.adapter.name();

        for mut product in parsed.products {
            if product.date_offered.is_none() {
                product.date_offered = Some(Utc::now());
            }
            let product = canonicalize(product);

            let check = validate_required(&product).and_then(|()| validate_constraints(&product));
            if let Err(e) = check {
                tracing::warn!(provider, product = %product.id, error = %e, "dropping invalid product");
                outputs
                    .emit_error(ProviderError::Validation {
                        provider: product.provider.clone(),
                        source: e,
                    })
                    .await;
                continue;
            }

            if outputs.products.send(product).await.is_err() {
                // Receiver gone; the query was abandoned.
                return;
            }
        }

        // Adapter-reported row errors: keep the products above, report the
        // errors, and drop this parse's follow-ups per the adapter contract.
        let drop_follow_ups = !parsed.errors.is_empty();
        for error in parsed.errors {
            tracing::warn!(provider, error = %error, "adapter reported a partial parse failure");
            outputs.emit_error(error).await;
        }
        if drop_follow_ups {
            if !parsed.requests.is_empty() {
                tracing::warn!(
                    provider,
                    dropped = parsed.requests.len(),
                    "dropping follow-up requests after parse errors"
                );
            }
            return;
        }

        for follow in parsed.requests {
            tokio::spawn(dispatch_request(
                Arc::clone(&cfg),
                cancel.clone(),
                follow,
                original.clone(),
                outputs.clone(),
            ));
        }
    })
}

/// Executes one prepared request with retry and backoff, then hands the
/// response to the callback adapter.
async fn dispatch_request(
    cfg: Arc<ProviderConfig>,
    cancel: CancellationToken,
    prepared: PreparedRequest,
    original: AdapterRequest,
    outputs: Outputs,
) {
    let provider = cfg.adapter.name();
    let callback = prepared
        .callback
        .unwrap_or_else(|| Arc::clone(&cfg.adapter));
    let metadata = prepared.metadata;
    let request = prepared.request;

    for attempt in 0..=cfg.retry_count {
        if cancel.is_cancelled() {
            tracing::debug!(provider, "query cancelled, abandoning request");
            return;
        }
        if attempt > 0 {
            tracing::info!(provider, attempt, "retrying request");
        }

        // Clone per attempt; the original stays available for the next one.
        let Some(attempt_request) = request.try_clone() else {
            outputs
                .emit_error(ProviderError::RequestNotCloneable { provider })
                .await;
            return;
        };

        let Ok(permit) = cfg.semaphore.acquire().await else {
            return;
        };
        let result = tokio::select! {
            () = cancel.cancelled() => {
                drop(permit);
                return;
            }
            result = cfg.client.execute(attempt_request) => result,
        };
        drop(permit);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(provider, attempt, error = %e, "request transport error");
                if attempt == cfg.retry_count {
                    outputs
                        .emit_error(ProviderError::Http { provider, source: e })
                        .await;
                    return;
                }
                backoff_sleep(&cfg, &cancel).await;
                continue;
            }
        };

        match response.status() {
            reqwest::StatusCode::OK => {
                let url = response.url().clone();
                let parsed = callback
                    .parse_response(ProviderResponse {
                        initial: original.clone(),
                        url,
                        metadata: metadata.clone(),
                        http: response,
                    })
                    .await;
                match parsed {
                    Ok(parsed) => {
                        handle_parsed(cfg, cancel, parsed, original, outputs).await;
                    }
                    Err(e) => {
                        tracing::warn!(provider, error = %e, "response parse failed");
                        outputs.emit_error(e).await;
                    }
                }
                return;
            }

            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                tracing::debug!(provider, attempt, "rate limited, backing off");
                if attempt == cfg.retry_count {
                    outputs
                        .emit_error(ProviderError::RateLimited {
                            provider,
                            attempts: cfg.retry_count + 1,
                        })
                        .await;
                    return;
                }
                backoff_sleep(&cfg, &cancel).await;
            }

            status => {
                tracing::debug!(
                    provider,
                    status = status.as_u16(),
                    attempt,
                    "unexpected response status"
                );
                if attempt == cfg.retry_count {
                    outputs
                        .emit_error(ProviderError::UnexpectedStatus {
                            provider,
                            status: status.as_u16(),
                        })
                        .await;
                    return;
                }
            }
        }
    }
}

async fn backoff_sleep(cfg: &ProviderConfig, cancel: &CancellationToken) {
    tokio::select! {
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(cfg.backoff) => {}
    }
}
