//! In-flight request registry and cancellation handles.
//!
//! The registry is the process-wide table of live network calls, keyed by
//! request [`Fingerprint`]. It is **deduplicating**: registering a
//! fingerprint that is already in flight cancels the prior occupant before
//! installing the new one, so at most one live network call exists per
//! fingerprint at any time.
//!
//! Entries carry a generation id so that a superseded request completing
//! late cannot evict its replacement: `unregister` only removes the entry
//! when the generation still matches.
//!
//! The registry owns its entries. Callers never see them; they hold a
//! [`RequestHandle`], an opaque cancellation token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::request::Fingerprint;

/// One live registry entry.
#[derive(Clone)]
pub(crate) struct Registration {
    pub generation: Uuid,
    pub token: CancellationToken,
}

/// Table of in-flight requests. All mutation goes through one mutex, so
/// concurrent completions cannot lose updates.
pub struct RequestRegistry {
    inflight: Mutex<HashMap<Fingerprint, Registration>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Install a fresh registration for `fingerprint`, cancelling any prior
    /// occupant (deduplicating policy).
    pub(crate) fn register(&self, fingerprint: Fingerprint) -> Registration {
        let registration = Registration {
            generation: Uuid::new_v4(),
            token: CancellationToken::new(),
        };
        let mut inflight = self.inflight.lock().unwrap();
        if let Some(prior) = inflight.insert(fingerprint, registration.clone()) {
            prior.token.cancel();
        }
        registration
    }

    /// Remove the entry for `fingerprint` if it still belongs to
    /// `generation`. Returns whether an entry was removed.
    pub(crate) fn unregister(&self, fingerprint: Fingerprint, generation: Uuid) -> bool {
        let mut inflight = self.inflight.lock().unwrap();
        match inflight.get(&fingerprint) {
            Some(entry) if entry.generation == generation => {
                inflight.remove(&fingerprint);
                true
            }
            _ => false,
        }
    }

    /// The live cancellation token for `fingerprint`, if one is in flight.
    pub(crate) fn lookup(&self, fingerprint: Fingerprint) -> Option<CancellationToken> {
        let inflight = self.inflight.lock().unwrap();
        inflight.get(&fingerprint).map(|entry| entry.token.clone())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

enum HandleState {
    /// Registered and (possibly still) in flight.
    Live {
        registry: Arc<RequestRegistry>,
        generation: Uuid,
        token: CancellationToken,
    },
    /// Already terminal at creation: construction error or cache hit.
    /// There is nothing to cancel.
    Terminal,
}

/// Opaque per-request handle returned by the engine.
///
/// Dropping the handle does *not* cancel the request; call
/// [`RequestHandle::cancel`] for that. Cancelling removes the registry entry
/// immediately and suppresses any still-pending delivery; it cannot unwind
/// transport I/O that already happened.
pub struct RequestHandle {
    fingerprint: Fingerprint,
    state: HandleState,
}

impl RequestHandle {
    pub(crate) fn live(
        fingerprint: Fingerprint,
        registry: Arc<RequestRegistry>,
        registration: &Registration,
    ) -> Self {
        Self {
            fingerprint,
            state: HandleState::Live {
                registry,
                generation: registration.generation,
                token: registration.token.clone(),
            },
        }
    }

    pub(crate) fn terminal(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            state: HandleState::Terminal,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Cancel the request. Idempotent; a no-op for handles that were
    /// terminal at creation or have already completed.
    pub fn cancel(&self) {
        if let HandleState::Live {
            registry,
            generation,
            token,
        } = &self.state
        {
            token.cancel();
            registry.unregister(self.fingerprint, *generation);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.state {
            HandleState::Live { token, .. } => token.is_cancelled(),
            HandleState::Terminal => false,
        }
    }
}
