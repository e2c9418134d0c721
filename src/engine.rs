//! The request engine: execution lifecycle from prepared request to
//! terminal outcome.
//!
//! One [`RequestEngine`] owns the in-flight registry, the image cache, and a
//! shared transport. Callers describe a request once ([`RequestConfig`] +
//! [`CallbackChain`] + [`DeliveryContext`]) and get back an opaque
//! [`RequestHandle`]; completion is always asynchronous.
//!
//! Lifecycle per request:
//! 1. Prepare (url parse, param encoding). Failure is terminal before any
//!    network I/O and flows through the error handlers.
//! 2. Image fetches consult the cache. A hit dispatches the cache-hit
//!    handler and never touches the registry or the transport.
//! 3. Register (cancelling any in-flight request with the same
//!    fingerprint), then race the transport against the cancellation token.
//! 4. Classify the result: transport fault → mapped error; 2xx → success
//!    dispatch (image payloads enter the cache first); mapped 4xx/5xx →
//!    error broadcast.
//! 5. Unregister on every terminal path. A cancellation that races the
//!    completion wins: delivery is suppressed, never duplicated.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use tokio_util::sync::CancellationToken;

use crate::cache::{self, ImageCache};
use crate::callbacks::{CallbackChain, DeliveryContext};
use crate::net::{ReqwestTransport, Transport};
use crate::registry::{RequestHandle, RequestRegistry};
use crate::request::RequestConfig;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout applied when a request carries no override.
    pub default_timeout: Duration,
    /// Byte budget for the image cache.
    pub image_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            image_cache_capacity: cache::default_capacity(),
        }
    }
}

/// Delivery wrapper for in-flight requests: re-checks the cancellation
/// token inside the dispatched job, at the moment it actually runs on the
/// delivery context. A `cancel()` landing after the transport completed but
/// before the job executes still suppresses delivery.
struct CancelGuard {
    inner: Arc<dyn DeliveryContext>,
    token: CancellationToken,
}

impl DeliveryContext for CancelGuard {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        let token = self.token.clone();
        self.inner.dispatch(Box::new(move || {
            if token.is_cancelled() {
                debug!("dropping completion that was cancelled while queued for delivery");
                return;
            }
            job();
        }));
    }
}

/// Asynchronous HTTP request engine.
pub struct RequestEngine {
    config: EngineConfig,
    registry: Arc<RequestRegistry>,
    cache: Arc<ImageCache>,
    transport: Arc<dyn Transport>,
}

impl RequestEngine {
    /// Engine with default configuration and a reqwest-backed transport.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    /// Engine with a custom transport. Tests use this to substitute a stub
    /// and observe (or suppress) network I/O.
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let cache = Arc::new(ImageCache::new(config.image_cache_capacity));
        Self {
            config,
            registry: Arc::new(RequestRegistry::new()),
            cache,
            transport,
        }
    }

    /// Execute a request. Returns immediately; the chain resolves later on
    /// the delivery context.
    pub fn execute(
        &self,
        config: RequestConfig,
        chain: CallbackChain,
        delivery: Arc<dyn DeliveryContext>,
    ) -> RequestHandle {
        self.execute_inner(config, chain, delivery, false)
    }

    /// Execute an image fetch: a GET whose successful payload is cached and
    /// whose cache hits short-circuit the network entirely.
    pub fn fetch_image(
        &self,
        url: impl Into<String>,
        chain: CallbackChain,
        delivery: Arc<dyn DeliveryContext>,
    ) -> RequestHandle {
        self.execute_inner(RequestConfig::get(url), chain, delivery, true)
    }

    /// Number of requests currently in flight.
    pub fn inflight_count(&self) -> usize {
        self.registry.len()
    }

    fn execute_inner(
        &self,
        config: RequestConfig,
        chain: CallbackChain,
        delivery: Arc<dyn DeliveryContext>,
        use_cache: bool,
    ) -> RequestHandle {
        let fingerprint = config.fingerprint();

        let prepared = match config.prepare(self.config.default_timeout) {
            Ok(prepared) => prepared,
            Err(error) => {
                debug!("request for {} failed before execution: {error}", config.url);
                chain.deliver_error(error, &*delivery);
                return RequestHandle::terminal(fingerprint);
            }
        };

        if use_cache && chain.has_cache_hit_handler() {
            if let Some(payload) = self.cache.get(fingerprint) {
                debug!("cache hit for {}", prepared.url);
                chain.deliver_cache_hit(payload, &*delivery);
                return RequestHandle::terminal(fingerprint);
            }
        }

        if self.registry.lookup(fingerprint).is_some() {
            debug!("superseding in-flight request for {fingerprint:?}");
        }
        let registration = self.registry.register(fingerprint);
        let handle = RequestHandle::live(fingerprint, self.registry.clone(), &registration);

        let registry = self.registry.clone();
        let cache = use_cache.then(|| self.cache.clone());
        let token = registration.token;
        let generation = registration.generation;
        let fetch = self.transport.fetch(prepared);

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => None,
                result = fetch => Some(result),
            };

            registry.unregister(fingerprint, generation);

            let Some(result) = outcome else {
                debug!("request {fingerprint:?} cancelled before completion");
                return;
            };
            // A cancel may race the completion; the cancel wins. The guard
            // re-checks the token inside the delivery job itself, so even a
            // cancel arriving while the job sits queued suppresses it.
            if token.is_cancelled() {
                debug!("request {fingerprint:?} completed after cancellation; dropping");
                return;
            }
            let delivery = CancelGuard {
                inner: delivery,
                token,
            };

            match result {
                Err(transport_error) => {
                    chain.deliver_error(transport_error.into_request_error(), &delivery);
                }
                Ok(response) => {
                    let class = response.status_class();
                    if class.is_success() {
                        if let Some(cache) = cache {
                            cache.put(fingerprint, response.body.clone());
                        }
                        chain.deliver_success(response, &delivery);
                    } else if let Some(error) = class.to_error() {
                        chain.deliver_error(error, &delivery);
                    } else {
                        // Non-2xx without a mapped error (stray 3xx the
                        // transport did not follow, out-of-range code):
                        // terminal with nothing to deliver.
                        debug!(
                            "request {fingerprint:?} finished with undeliverable status {}",
                            response.status
                        );
                    }
                }
            }
        });

        handle
    }
}

impl Default for RequestEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;
    use tokio::sync::mpsc;

    use super::*;
    use crate::callbacks::SpawnDelivery;
    use crate::errors::RequestError;
    use crate::net::{Response, TransportError};
    use crate::request::PreparedRequest;

    /// Scripted transport that counts invocations.
    struct StubTransport {
        calls: AtomicUsize,
        script: Script,
    }

    enum Script {
        Respond { status: u16, body: Vec<u8> },
        Fail(TransportError),
        Hang,
    }

    impl StubTransport {
        fn respond(status: u16, body: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Script::Respond {
                    status,
                    body: body.to_vec(),
                },
            })
        }

        fn fail(error: TransportError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Script::Fail(error),
            })
        }

        fn hang() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Script::Hang,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for StubTransport {
        fn fetch(
            &self,
            request: PreparedRequest,
        ) -> BoxFuture<'static, Result<Response, TransportError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Respond { status, body } => {
                    let response = Response {
                        url: request.url,
                        status: *status,
                        status_text: String::new(),
                        headers: http::HeaderMap::new(),
                        body: body.clone(),
                    };
                    Box::pin(async move { Ok(response) })
                }
                Script::Fail(error) => {
                    let error = error.clone();
                    Box::pin(async move { Err(error) })
                }
                Script::Hang => Box::pin(futures::future::pending()),
            }
        }
    }

    fn engine_with(transport: Arc<StubTransport>) -> RequestEngine {
        let _ = env_logger::builder().is_test(true).try_init();
        RequestEngine::with_transport(EngineConfig::default(), transport)
    }

    #[tokio::test]
    async fn success_reaches_the_success_handler() {
        let transport = StubTransport::respond(200, b"payload");
        let engine = engine_with(transport.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let chain = CallbackChain::new().on_success(move |resp| {
            tx.send((resp.status, resp.body)).unwrap();
        });
        engine.execute(
            RequestConfig::get("https://example.com/data"),
            chain,
            Arc::new(SpawnDelivery),
        );

        let (status, body) = rx.recv().await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, b"payload");
        assert_eq!(transport.calls(), 1);
        assert_eq!(engine.inflight_count(), 0);
    }

    #[tokio::test]
    async fn status_404_maps_to_not_found() {
        let engine = engine_with(StubTransport::respond(404, b""));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let chain = CallbackChain::new()
            .on_success(|_| panic!("404 must not reach the success handler"))
            .on_error(move |e| tx.send(matches!(e, RequestError::NotFound)).unwrap());
        engine.execute(
            RequestConfig::get("https://example.com/missing"),
            chain,
            Arc::new(SpawnDelivery),
        );

        assert!(rx.recv().await.unwrap());
    }

    #[tokio::test]
    async fn status_500_maps_to_server_error() {
        let engine = engine_with(StubTransport::respond(500, b""));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let chain = CallbackChain::new().on_error(move |e| {
            tx.send(matches!(e, RequestError::ServerError(500))).unwrap()
        });
        engine.execute(
            RequestConfig::get("https://example.com/broken"),
            chain,
            Arc::new(SpawnDelivery),
        );

        assert!(rx.recv().await.unwrap());
    }

    #[tokio::test]
    async fn transport_faults_map_into_the_taxonomy() {
        let engine = engine_with(StubTransport::fail(TransportError::TimedOut));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let chain = CallbackChain::new().on_error(move |e| {
            tx.send(matches!(e, RequestError::ConnectionTimedOut)).unwrap()
        });
        engine.execute(
            RequestConfig::get("https://example.com/slow"),
            chain,
            Arc::new(SpawnDelivery),
        );

        assert!(rx.recv().await.unwrap());
    }

    #[tokio::test]
    async fn invalid_url_fails_without_touching_the_transport() {
        let transport = StubTransport::respond(200, b"");
        let engine = engine_with(transport.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let chain = CallbackChain::new()
            .on_error(move |e| tx.send(matches!(e, RequestError::InvalidUrl)).unwrap());
        let handle = engine.execute(
            RequestConfig::get("definitely not a url"),
            chain,
            Arc::new(SpawnDelivery),
        );

        assert!(rx.recv().await.unwrap());
        assert_eq!(transport.calls(), 0);
        assert_eq!(engine.inflight_count(), 0);
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn cache_hit_skips_the_network_entirely() {
        let transport = StubTransport::respond(200, b"imagebytes");
        let engine = engine_with(transport.clone());

        // First fetch misses and populates the cache.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let chain = CallbackChain::new()
            .on_cache_hit(|_| panic!("first fetch must miss"))
            .on_success(move |resp| tx.send(resp.body).unwrap());
        engine.fetch_image("https://img.example.com/cover.jpg", chain, Arc::new(SpawnDelivery));
        assert_eq!(rx.recv().await.unwrap(), b"imagebytes");
        assert_eq!(transport.calls(), 1);

        // Second fetch hits: cache-hit handler only, zero new transport calls,
        // no registry entry.
        let (hit_tx, mut hit_rx) = mpsc::unbounded_channel();
        let chain = CallbackChain::new()
            .on_success(|_| panic!("cache hit must not dispatch the success handler"))
            .on_cache_hit(move |payload| hit_tx.send(payload).unwrap());
        let handle =
            engine.fetch_image("https://img.example.com/cover.jpg", chain, Arc::new(SpawnDelivery));

        assert_eq!(hit_rx.recv().await.unwrap(), b"imagebytes");
        assert_eq!(transport.calls(), 1);
        assert_eq!(engine.inflight_count(), 0);
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_before_resolution_suppresses_all_delivery() {
        let engine = engine_with(StubTransport::hang());
        let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();
        let err_tx = tx.clone();

        let chain = CallbackChain::new()
            .on_success(move |_| tx.send("success").unwrap())
            .on_error(move |_| err_tx.send("error").unwrap());
        let handle = engine.execute(
            RequestConfig::get("https://example.com/never"),
            chain,
            Arc::new(SpawnDelivery),
        );
        assert_eq!(engine.inflight_count(), 1);

        handle.cancel();

        // Registry entry is gone immediately; nothing is ever delivered.
        assert_eq!(engine.inflight_count(), 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    /// Queues delivery jobs instead of running them, so a test can act
    /// between dispatch and execution.
    #[derive(Default)]
    struct ManualDelivery {
        jobs: std::sync::Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    }

    impl ManualDelivery {
        fn queued(&self) -> usize {
            self.jobs.lock().unwrap().len()
        }

        fn run_all(&self) {
            let jobs: Vec<_> = self.jobs.lock().unwrap().drain(..).collect();
            for job in jobs {
                job();
            }
        }
    }

    impl DeliveryContext for ManualDelivery {
        fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
            self.jobs.lock().unwrap().push(job);
        }
    }

    #[tokio::test]
    async fn cancel_while_completion_is_queued_for_delivery_suppresses_it() {
        let engine = engine_with(StubTransport::respond(200, b"late"));
        let delivery = Arc::new(ManualDelivery::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();
        let err_tx = tx.clone();

        let chain = CallbackChain::new()
            .on_success(move |_| tx.send("success").unwrap())
            .on_error(move |_| err_tx.send("error").unwrap());
        let handle = engine.execute(
            RequestConfig::get("https://example.com/race"),
            chain,
            delivery.clone(),
        );

        // Let the transport complete and queue the delivery job.
        while delivery.queued() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Cancel lands after completion but before the job runs.
        handle.cancel();
        delivery.run_all();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_fingerprint_supersedes_the_first_request() {
        let engine = engine_with(StubTransport::hang());
        let config = RequestConfig::get("https://example.com/dup");

        let first = engine.execute(
            config.clone(),
            CallbackChain::new().on_success(|_| panic!("superseded request must stay silent")),
            Arc::new(SpawnDelivery),
        );
        let second = engine.execute(config, CallbackChain::new(), Arc::new(SpawnDelivery));

        // Give the first spawned task a moment to observe its cancellation.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(engine.inflight_count(), 1);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }
}
