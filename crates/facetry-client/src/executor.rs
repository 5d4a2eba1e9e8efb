//! Cancellable request execution.
//!
//! At most one request per result type is live. Starting a request aborts
//! the previous in-flight request of the same type before anything else
//! happens, so a slow stale response can never overwrite a newer one.
//! Aborts are cooperative: the superseded task is woken through its
//! [`CancellationToken`] and resolves with [`Error::Aborted`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use facetry_core::ResultType;
use facetry_query::{SearchBackend, SearchRequest, SearchResponse};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::cache::QueryCache;
use crate::error::{Error, Result};

type Outcome = Result<Arc<SearchResponse>>;

struct InFlight {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    in_flight: HashMap<ResultType, InFlight>,
}

/// Dispatches requests through the cache to a backend.
pub struct QueryExecutor {
    backend: Arc<dyn SearchBackend>,
    cache: Arc<QueryCache>,
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("backend", &self.backend.name())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl QueryExecutor {
    /// Creates an executor with a fresh cache.
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self::with_cache(backend, Arc::new(QueryCache::new()))
    }

    /// Creates an executor sharing `cache`.
    pub fn with_cache(backend: Arc<dyn SearchBackend>, cache: Arc<QueryCache>) -> Self {
        Self {
            backend,
            cache,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// The response cache.
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// The backend requests go to.
    pub fn backend(&self) -> &dyn SearchBackend {
        self.backend.as_ref()
    }

    /// Starts `request`, superseding any in-flight request of its type.
    ///
    /// A cached response completes the handle immediately without a
    /// dispatch. Otherwise the request runs on a spawned task, so this must
    /// be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails only if the request cannot be serialized into a cache key.
    pub fn execute(&self, request: SearchRequest) -> Result<QueryHandle> {
        let key = request.cache_key()?;
        let result_type = request.result_type;
        let token = CancellationToken::new();
        let id = self.supersede(result_type, token.clone());

        if let Some(response) = self.cache.get(&key) {
            log::debug!("cache hit for {} request at {}", result_type, request.from);
            self.finish(result_type, id);
            return Ok(QueryHandle {
                result_type,
                token,
                state: HandleState::Ready(Some(Ok(response))),
            });
        }

        log::debug!(
            "dispatching {} request at {} to {}",
            result_type,
            request.from,
            self.backend.name()
        );
        let (tx, rx) = oneshot::channel();
        let backend = Arc::clone(&self.backend);
        let cache = Arc::clone(&self.cache);
        let registry = Arc::clone(&self.registry);
        let task_token = token.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = task_token.cancelled() => Err(Error::Aborted),
                result = backend.search(request) => match result {
                    Ok(response) => {
                        let response = Arc::new(response);
                        cache.put(key, Arc::clone(&response));
                        Ok(response)
                    }
                    Err(e) => {
                        log::warn!("{} request failed: {}", result_type, e);
                        Err(Error::from(e))
                    }
                },
            };
            release(&registry, result_type, id);
            let _ = tx.send(outcome);
        });

        Ok(QueryHandle {
            result_type,
            token,
            state: HandleState::Pending(rx),
        })
    }

    /// Starts `request` and reports its outcome through callbacks.
    ///
    /// Exactly one of `on_success` and `on_error` is called, once. An abort
    /// reaches `on_error` as [`Error::Aborted`]. A cache hit calls
    /// `on_success` before this returns.
    pub fn execute_with<S, E>(
        &self,
        request: SearchRequest,
        on_success: S,
        on_error: E,
    ) -> Result<CancelHandle>
    where
        S: FnOnce(Arc<SearchResponse>) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let mut handle = self.execute(request)?;
        let cancel = handle.cancel_handle();
        if let Some(outcome) = handle.take_ready() {
            match outcome {
                Ok(response) => on_success(response),
                Err(e) => on_error(e),
            }
            return Ok(cancel);
        }
        tokio::spawn(async move {
            match handle.wait().await {
                Ok(response) => on_success(response),
                Err(e) => on_error(e),
            }
        });
        Ok(cancel)
    }

    /// Aborts the in-flight request of `result_type`, if any.
    pub fn abort(&self, result_type: ResultType) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = registry.in_flight.remove(&result_type) {
            log::debug!("aborting in-flight {} request", result_type);
            previous.token.cancel();
        }
    }

    /// Whether a request of `result_type` is still running.
    pub fn is_in_flight(&self, result_type: ResultType) -> bool {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.in_flight.contains_key(&result_type)
    }

    fn supersede(&self, result_type: ResultType, token: CancellationToken) -> u64 {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.next_id += 1;
        let id = registry.next_id;
        if let Some(previous) = registry.in_flight.insert(result_type, InFlight { id, token }) {
            log::debug!("superseding in-flight {} request", result_type);
            previous.token.cancel();
        }
        id
    }

    fn finish(&self, result_type: ResultType, id: u64) {
        release(&self.registry, result_type, id);
    }
}

fn release(registry: &Mutex<Registry>, result_type: ResultType, id: u64) {
    let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
    if registry.in_flight.get(&result_type).is_some_and(|f| f.id == id) {
        registry.in_flight.remove(&result_type);
    }
}

// ============================================================================
// Handles
// ============================================================================

enum HandleState {
    Ready(Option<Outcome>),
    Pending(oneshot::Receiver<Outcome>),
}

/// A started request.
pub struct QueryHandle {
    result_type: ResultType,
    token: CancellationToken,
    state: HandleState,
}

impl std::fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("result_type", &self.result_type)
            .field("cached", &self.is_cached())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl QueryHandle {
    /// Result type of the request.
    pub fn result_type(&self) -> ResultType {
        self.result_type
    }

    /// Whether the response came from the cache without a dispatch.
    pub fn is_cached(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    /// Whether the request has been aborted.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Aborts the request.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A handle that can abort the request after this one is consumed.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.token.clone(),
        }
    }

    fn take_ready(&mut self) -> Option<Outcome> {
        match &mut self.state {
            HandleState::Ready(outcome) => outcome.take(),
            HandleState::Pending(_) => None,
        }
    }

    /// Waits for the outcome.
    ///
    /// Resolves with [`Error::Aborted`] if the request was superseded, even
    /// when a response arrived in the same instant.
    pub async fn wait(self) -> Outcome {
        let outcome = match self.state {
            HandleState::Ready(outcome) => outcome.unwrap_or(Err(Error::Aborted)),
            HandleState::Pending(rx) => rx.await.unwrap_or(Err(Error::Aborted)),
        };
        if self.token.is_cancelled() {
            return Err(Error::Aborted);
        }
        outcome
    }
}

/// Aborts a request started with [`QueryExecutor::execute_with`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Aborts the request.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the request has been aborted.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ============================================================================
// Tests
// ============================================================================
