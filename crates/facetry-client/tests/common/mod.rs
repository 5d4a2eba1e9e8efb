//! Common test utilities for facetry-client integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use facetry_client::{QueryExecutor, SearchSession};
use facetry_core::{Catalog, CatalogNode, FilterTreeBuilder};
use facetry_query::{
    Hit, QueryBuilder, QueryConfig, SearchBackend, SearchRequest, SearchResponse, TotalHits,
};
use tokio::sync::{oneshot, watch};

/// Produces the response to one request.
pub type Responder = dyn Fn(&SearchRequest) -> facetry_core::Result<SearchResponse> + Send + Sync;

#[derive(Default)]
struct Dispatches {
    requests: Vec<SearchRequest>,
    gates: Vec<Option<oneshot::Sender<()>>>,
}

/// Scripted backend recording every dispatch.
///
/// When gated, each request waits until [`release`](Self::release) is
/// called with its dispatch index.
pub struct GatedBackend {
    responder: Box<Responder>,
    gated: bool,
    failing: AtomicBool,
    dispatches: Mutex<Dispatches>,
    count: watch::Sender<usize>,
}

impl GatedBackend {
    /// A backend answering immediately.
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&SearchRequest) -> facetry_core::Result<SearchResponse> + Send + Sync + 'static,
    {
        Arc::new(Self::build(Box::new(responder), false))
    }

    /// A backend holding every request until released.
    pub fn gated<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&SearchRequest) -> facetry_core::Result<SearchResponse> + Send + Sync + 'static,
    {
        Arc::new(Self::build(Box::new(responder), true))
    }

    fn build(responder: Box<Responder>, gated: bool) -> Self {
        let (count, _) = watch::channel(0);
        Self {
            responder,
            gated,
            failing: AtomicBool::new(false),
            dispatches: Mutex::new(Dispatches::default()),
            count,
        }
    }

    /// Makes subsequent requests fail with a 500.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of requests that reached the backend.
    pub fn dispatch_count(&self) -> usize {
        *self.count.borrow()
    }

    /// Every request that reached the backend, in order.
    pub fn requests(&self) -> Vec<SearchRequest> {
        self.dispatches.lock().unwrap().requests.clone()
    }

    /// Lets the `index`-th dispatched request complete.
    pub fn release(&self, index: usize) {
        let gate = self.dispatches.lock().unwrap().gates[index].take();
        if let Some(gate) = gate {
            let _ = gate.send(());
        }
    }

    /// Waits until at least `n` requests have been dispatched.
    pub async fn wait_for_dispatches(&self, n: usize) {
        let mut rx = self.count.subscribe();
        rx.wait_for(|count| *count >= n).await.unwrap();
    }
}

#[async_trait]
impl SearchBackend for GatedBackend {
    async fn search(&self, request: SearchRequest) -> facetry_core::Result<SearchResponse> {
        let gate = {
            let mut dispatches = self.dispatches.lock().unwrap();
            dispatches.requests.push(request.clone());
            if self.gated {
                let (tx, rx) = oneshot::channel();
                dispatches.gates.push(Some(tx));
                Some(rx)
            } else {
                dispatches.gates.push(None);
                None
            }
        };
        self.count.send_modify(|count| *count += 1);

        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(facetry_core::Error::backend_with_status(500, "internal error"));
        }
        (self.responder)(&request)
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// A document hit.
pub fn hit(id: &str, path: &str) -> Hit {
    Hit::new(id).with_field("ref", id).with_field("path", path)
}

/// A response with the given hits and total.
pub fn response(hits: Vec<Hit>, total: TotalHits) -> SearchResponse {
    let mut response = SearchResponse::default();
    response.hits.hits = hits;
    response.hits.total = total;
    response
}

/// Catalog with two empty top-level categories, `A` and `B`.
pub fn catalog_ab() -> Catalog {
    Catalog::new(vec![
        CatalogNode::category("A", Vec::new()),
        CatalogNode::category("B", Vec::new()),
    ])
}

/// A session over `backend` with `config` and the `A`/`B` catalog.
pub fn session_with(backend: Arc<GatedBackend>, config: QueryConfig) -> SearchSession {
    SearchSession::new(
        QueryExecutor::new(backend),
        QueryBuilder::new(Arc::new(config)),
        FilterTreeBuilder::new(Arc::new(catalog_ab())),
    )
}

/// A session over `backend` with the default configuration.
pub fn session(backend: Arc<GatedBackend>) -> SearchSession {
    session_with(backend, QueryConfig::default())
}
