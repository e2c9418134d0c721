//! Request descriptions and fingerprinting.
//!
//! A [`RequestConfig`] is the immutable description of one HTTP call: url,
//! verb, and an optional string-keyed parameter map. It is handed to the
//! engine once, together with the callback chain, and never mutated after
//! that. Preparation (url parsing, query encoding, body serialization)
//! happens before any network I/O; its failures flow through the normal
//! error channel.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use url::Url;

use crate::errors::RequestError;

/// HTTP verb for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Delete,
    Put,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Delete => "DELETE",
            Verb::Put => "PUT",
        }
    }
}

/// Canonical identity of a request: url, verb, and parameter set,
/// independent of parameter insertion order. Used as the registry and
/// cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

/// Immutable description of one HTTP call.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub url: String,
    pub verb: Verb,
    pub params: Option<HashMap<String, String>>,
    /// Per-request timeout override; the engine default applies when `None`.
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            verb: Verb::Get,
            params: None,
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>, params: HashMap<String, String>) -> Self {
        Self {
            url: url.into(),
            verb: Verb::Post,
            params: Some(params),
            timeout: None,
        }
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Compute the canonical fingerprint. Parameters are hashed in sorted
    /// key order so insertion order never changes the identity.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.url.hash(&mut hasher);
        self.verb.hash(&mut hasher);
        if let Some(params) = &self.params {
            let mut keys: Vec<&String> = params.keys().collect();
            keys.sort();
            for key in keys {
                key.hash(&mut hasher);
                params[key].hash(&mut hasher);
            }
        }
        Fingerprint(hasher.finish())
    }

    /// Resolve the config into something the transport can send.
    ///
    /// GET requests encode parameters as query pairs; other verbs carry
    /// them as a JSON body. An unparseable url or unserializable body is a
    /// terminal error and never reaches the network.
    pub fn prepare(&self, default_timeout: Duration) -> Result<PreparedRequest, RequestError> {
        let mut url = Url::parse(&self.url).map_err(|_| RequestError::InvalidUrl)?;
        if url.host_str().is_none() {
            return Err(RequestError::InvalidUrl);
        }

        let mut body = None;
        if let Some(params) = &self.params {
            match self.verb {
                Verb::Get => {
                    let mut pairs = url.query_pairs_mut();
                    for (key, value) in params {
                        pairs.append_pair(key, value);
                    }
                }
                Verb::Post | Verb::Put | Verb::Delete => {
                    let bytes =
                        serde_json::to_vec(params).map_err(RequestError::ParamsSerialization)?;
                    body = Some(bytes);
                }
            }
        }

        Ok(PreparedRequest {
            url,
            verb: self.verb,
            body,
            timeout: self.timeout.unwrap_or(default_timeout),
        })
    }
}

/// A fully resolved request, ready for the transport.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: Url,
    pub verb: Verb,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn fingerprint_ignores_param_order() {
        let a = RequestConfig::get("https://example.com/search")
            .with_params(params(&[("q", "album:x"), ("limit", "15"), ("type", "album")]));
        let b = RequestConfig::get("https://example.com/search")
            .with_params(params(&[("type", "album"), ("q", "album:x"), ("limit", "15")]));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_on_url_verb_and_params() {
        let base = RequestConfig::get("https://example.com/a");
        let other_url = RequestConfig::get("https://example.com/b");
        assert_ne!(base.fingerprint(), other_url.fingerprint());

        let post = RequestConfig {
            verb: Verb::Post,
            ..base.clone()
        };
        assert_ne!(base.fingerprint(), post.fingerprint());

        let with_params = base.clone().with_params(params(&[("k", "v")]));
        assert_ne!(base.fingerprint(), with_params.fingerprint());

        let other_value = base.clone().with_params(params(&[("k", "w")]));
        assert_ne!(with_params.fingerprint(), other_value.fingerprint());
    }

    #[test]
    fn get_params_become_query_pairs() {
        let config = RequestConfig::get("https://example.com/search")
            .with_params(params(&[("q", "album:Reality Testing")]));
        let prepared = config.prepare(Duration::from_secs(30)).unwrap();
        assert_eq!(prepared.url.query_pairs().count(), 1);
        let (key, value) = prepared.url.query_pairs().next().unwrap();
        assert_eq!(key, "q");
        assert_eq!(value, "album:Reality Testing");
        assert!(prepared.body.is_none());
    }

    #[test]
    fn post_params_become_json_body() {
        let config = RequestConfig::post("https://example.com/items", params(&[("name", "x")]));
        let prepared = config.prepare(Duration::from_secs(30)).unwrap();
        let body = prepared.body.expect("post should carry a body");
        let decoded: HashMap<String, String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded["name"], "x");
    }

    #[test]
    fn invalid_url_is_rejected_before_any_io() {
        let config = RequestConfig::get("not a url");
        assert!(matches!(
            config.prepare(Duration::from_secs(30)),
            Err(RequestError::InvalidUrl)
        ));
    }

    #[test]
    fn timeout_override_beats_default() {
        let config =
            RequestConfig::get("https://example.com/").with_timeout(Duration::from_secs(5));
        let prepared = config.prepare(Duration::from_secs(30)).unwrap();
        assert_eq!(prepared.timeout, Duration::from_secs(5));
    }
}
