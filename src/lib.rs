//! Asynchronous HTTP request engine.
//!
//! Request construction and fingerprinting, a deduplicating in-flight
//! registry with opaque cancellation handles, status classification into a
//! closed error taxonomy, a chained-callback completion protocol delivered
//! on a caller-supplied context, a byte-bounded image response cache, and a
//! thin album search client on top.

pub mod cache;
pub mod callbacks;
pub mod engine;
pub mod errors;
pub mod memsize;
pub mod net;
pub mod registry;
pub mod request;
pub mod search;
pub mod status;

pub use cache::ImageCache;
pub use callbacks::{CallbackChain, DeliveryContext, SpawnDelivery};
pub use engine::{EngineConfig, RequestEngine};
pub use errors::RequestError;
pub use memsize::Memory;
pub use net::{Response, Transport, TransportError};
pub use registry::{RequestHandle, RequestRegistry};
pub use request::{Fingerprint, RequestConfig, Verb};
pub use search::{Album, ImageInfo, SearchClient, SearchError, SearchPayload, SearchSession};
pub use status::StatusClass;
