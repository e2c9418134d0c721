//! Per-request completion protocol.
//!
//! A [`CallbackChain`] collects everything that may run when a request
//! reaches its terminal outcome: at most one success handler, any number of
//! error handlers, and (for cached image fetches) a distinguished cache-hit
//! handler. The chain is assembled *before* execution and handed to the
//! engine by value, so there is no window where a half-configured request is
//! already in flight.
//!
//! Exactly one terminal outcome is ever delivered: the success handler, or a
//! broadcast to all error handlers, never both. Handlers run on the
//! caller-supplied [`DeliveryContext`], never inline on the transport task.

use log::debug;
use serde::de::DeserializeOwned;

use crate::errors::RequestError;
use crate::net::Response;

/// Execution context on which terminal outcomes are delivered.
///
/// The engine hands the whole terminal dispatch (success handler or error
/// broadcast) to `dispatch` as one job. Implementations decide where that
/// job runs: a spawned task, a UI event loop, a test channel.
pub trait DeliveryContext: Send + Sync {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>);
}

/// Delivers outcomes on a freshly spawned tokio task.
pub struct SpawnDelivery;

impl DeliveryContext for SpawnDelivery {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        tokio::spawn(async move { job() });
    }
}

type SuccessHandler = Box<dyn FnOnce(Response) -> Result<(), RequestError> + Send>;
type ErrorHandler = Box<dyn Fn(&RequestError) + Send>;
type CacheHitHandler = Box<dyn FnOnce(Vec<u8>) + Send>;

/// Handlers for one request, collected before execution.
#[derive(Default)]
pub struct CallbackChain {
    on_success: Option<SuccessHandler>,
    on_error: Vec<ErrorHandler>,
    on_cache_hit: Option<CacheHitHandler>,
}

impl CallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the (single) success handler, receiving the raw response.
    pub fn on_success(mut self, handler: impl FnOnce(Response) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(move |response| {
            handler(response);
            Ok(())
        }));
        self
    }

    /// Attach a typed success handler. The body is decoded as JSON; a
    /// missing body reports [`RequestError::NoBodyAvailable`] and a decode
    /// failure reports [`RequestError::BodyDecode`], both through the same
    /// error handlers as every other failure.
    pub fn on_success_json<T, F>(mut self, handler: F) -> Self
    where
        T: DeserializeOwned,
        F: FnOnce(T) + Send + 'static,
    {
        self.on_success = Some(Box::new(move |response| {
            if response.body.is_empty() {
                return Err(RequestError::NoBodyAvailable);
            }
            let decoded: T =
                serde_json::from_slice(&response.body).map_err(RequestError::BodyDecode)?;
            handler(decoded);
            Ok(())
        }));
        self
    }

    /// Attach an error handler. All attached error handlers see the
    /// terminal error.
    pub fn on_error(mut self, handler: impl Fn(&RequestError) + Send + 'static) -> Self {
        self.on_error.push(Box::new(handler));
        self
    }

    /// Attach the distinguished cache-hit handler for image fetches.
    pub fn on_cache_hit(mut self, handler: impl FnOnce(Vec<u8>) + Send + 'static) -> Self {
        self.on_cache_hit = Some(Box::new(handler));
        self
    }

    pub(crate) fn has_cache_hit_handler(&self) -> bool {
        self.on_cache_hit.is_some()
    }

    /// Deliver the success outcome. If the success handler itself fails
    /// (decode error, missing body), the failure is broadcast to the error
    /// handlers inside the same dispatched job, preserving the
    /// exactly-one-terminal-outcome guarantee.
    pub(crate) fn deliver_success(self, response: Response, ctx: &dyn DeliveryContext) {
        let on_error = self.on_error;
        let Some(handler) = self.on_success else {
            debug!("terminal success with no success handler attached; dropping response");
            return;
        };
        ctx.dispatch(Box::new(move || {
            if let Err(error) = handler(response) {
                for error_handler in &on_error {
                    error_handler(&error);
                }
            }
        }));
    }

    /// Broadcast the terminal error to all error handlers.
    pub(crate) fn deliver_error(self, error: RequestError, ctx: &dyn DeliveryContext) {
        if self.on_error.is_empty() {
            debug!("terminal error with no error handlers attached: {error}");
            return;
        }
        let on_error = self.on_error;
        ctx.dispatch(Box::new(move || {
            for error_handler in &on_error {
                error_handler(&error);
            }
        }));
    }

    /// Deliver a cached payload through the cache-hit handler.
    pub(crate) fn deliver_cache_hit(self, payload: Vec<u8>, ctx: &dyn DeliveryContext) {
        let Some(handler) = self.on_cache_hit else {
            debug!("cache hit with no cache-hit handler attached; dropping payload");
            return;
        };
        ctx.dispatch(Box::new(move || handler(payload)));
    }
}
