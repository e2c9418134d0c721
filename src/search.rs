//! Album search client.
//!
//! Thin domain composition over the request engine: one GET against a
//! Spotify-style search endpoint with fixed result-set parameters and a
//! short timeout, decoding `albums.items` into value objects. The detailed
//! error taxonomy collapses to three presentation-facing categories: an
//! invalid search (re-focus the input), no connectivity, or a generic
//! network failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use serde::Deserialize;

use crate::callbacks::{CallbackChain, DeliveryContext};
use crate::engine::RequestEngine;
use crate::errors::RequestError;
use crate::registry::RequestHandle;
use crate::request::RequestConfig;

/// Default search endpoint.
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.spotify.com/v1/search";

/// Search requests get a tighter budget than the engine default.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// One image descriptor of an album.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageInfo {
    pub url: String,
    pub width: i32,
    pub height: i32,
}

/// One album search result.
#[derive(Debug, Clone, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Vec<ImageInfo>,
}

impl Album {
    /// The image whose width is closest to `width`, used to pick a
    /// thumbnail for a given cell size. `None` for an album without images.
    pub fn image_nearest_to(&self, width: i32) -> Option<&ImageInfo> {
        self.images
            .iter()
            .min_by_key(|image| (width - image.width).abs())
    }
}

/// Decoded search response.
#[derive(Debug, Clone)]
pub struct SearchPayload {
    pub albums: Vec<Album>,
}

impl<'de> Deserialize<'de> for SearchPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Envelope {
            albums: Items,
        }
        #[derive(Deserialize)]
        struct Items {
            items: Vec<Album>,
        }

        let envelope = Envelope::deserialize(deserializer)?;
        Ok(SearchPayload {
            albums: envelope.albums.items,
        })
    }
}

/// Presentation-facing search failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// The term itself was rejected; worth re-focusing the input.
    #[error("invalid search: {0}")]
    InvalidSearch(String),

    #[error("network failure")]
    NetworkFailure,

    #[error("network unavailable")]
    NetworkUnavailable,
}

/// Collapse the engine taxonomy into the three domain categories.
fn collapse(term: &str, error: &RequestError) -> SearchError {
    match error {
        RequestError::BadRequest | RequestError::ClientError(_) => {
            SearchError::InvalidSearch(term.to_string())
        }
        RequestError::NetworkUnavailable => SearchError::NetworkUnavailable,
        _ => SearchError::NetworkFailure,
    }
}

/// Client for album search against one configured endpoint.
pub struct SearchClient {
    engine: Arc<RequestEngine>,
    endpoint: String,
}

impl SearchClient {
    pub fn new(engine: Arc<RequestEngine>) -> Self {
        Self::with_endpoint(engine, DEFAULT_SEARCH_ENDPOINT)
    }

    pub fn with_endpoint(engine: Arc<RequestEngine>, endpoint: impl Into<String>) -> Self {
        Self {
            engine,
            endpoint: endpoint.into(),
        }
    }

    /// Search albums by title. The handler receives exactly one outcome on
    /// the delivery context.
    pub fn search(
        &self,
        term: &str,
        delivery: Arc<dyn DeliveryContext>,
        handler: impl Fn(Result<SearchPayload, SearchError>) + Send + Sync + 'static,
    ) -> RequestHandle {
        let params: HashMap<String, String> = [
            ("type".to_string(), "album".to_string()),
            ("limit".to_string(), "15".to_string()),
            ("q".to_string(), format!("album:{term}")),
        ]
        .into_iter()
        .collect();

        let config = RequestConfig::get(&self.endpoint)
            .with_params(params)
            .with_timeout(SEARCH_TIMEOUT);

        let handler = Arc::new(handler);
        let on_ok = handler.clone();
        let term = term.to_string();

        let chain = CallbackChain::new()
            .on_success_json(move |payload: SearchPayload| on_ok(Ok(payload)))
            .on_error(move |error| {
                warn!("album search for {term:?} failed: {error}");
                handler(Err(collapse(&term, error)));
            });

        self.engine.execute(config, chain, delivery)
    }
}

/// Caller-owned "current search" slot: starting a new search cancels the
/// previous one, so the last search wins. The engine itself tracks nothing.
#[derive(Default)]
pub struct SearchSession {
    current: Option<RequestHandle>,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` the current search, cancelling the previous occupant.
    pub fn track(&mut self, handle: RequestHandle) {
        if let Some(previous) = self.current.replace(handle) {
            previous.cancel();
        }
    }

    /// Cancel and clear the current search, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }
}
