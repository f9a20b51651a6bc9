//! Maps a window observation to a single application identity.
//!
//! Matching order, first hit wins:
//! 1. URL pass: the first signature whose URL substrings occur in the URL.
//!    Title and process are ignored here; browser titles are unreliable for
//!    web apps.
//! 2. Ordered pass over every signature. Browser signatures are skipped when
//!    the observation has a URL (an unmatched URL is an unknown web app, not
//!    the bare browser). Otherwise a title-pattern match or an exact process
//!    match is enough.
//! 3. Nothing matched: [`UNKNOWN_APP`].

use super::registry::SignatureRegistry;
use crate::collector::WindowObservation;
use tracing::trace;

/// Identity reported when no signature matches.
pub const UNKNOWN_APP: &str = "unknown";

/// Deterministic, total classifier over a [`SignatureRegistry`].
#[derive(Debug, Clone)]
pub struct AppIdentifier {
    registry: SignatureRegistry,
}

impl AppIdentifier {
    pub fn new(registry: SignatureRegistry) -> Self {
        Self { registry }
    }

    /// Identifier over the built-in table.
    pub fn builtin() -> Self {
        Self::new(SignatureRegistry::builtin())
    }

    pub fn registry(&self) -> &SignatureRegistry {
        &self.registry
    }

    /// Classify one observation.
    pub fn identify<'a>(&'a self, observation: &WindowObservation) -> &'a str {
        if !observation.has_title() {
            return UNKNOWN_APP;
        }

        let url = observation.url().map(str::to_lowercase);

        if let Some(url) = url.as_deref() {
            if let Some(sig) = self.registry.iter().find(|s| s.matches_url(url)) {
                trace!(app = %sig.id, "identified by url");
                return &sig.id;
            }
        }

        let has_url = url.is_some();
        for sig in self.registry.iter() {
            if sig.is_browser() && has_url {
                continue;
            }
            if sig.matches_title(&observation.title) || sig.matches_process(&observation.process) {
                trace!(app = %sig.id, "identified by title/process");
                return &sig.id;
            }
        }

        UNKNOWN_APP
    }

    /// Classify an optional observation; `None` is "unknown".
    pub fn identify_opt<'a>(&'a self, observation: Option<&WindowObservation>) -> &'a str {
        observation.map_or(UNKNOWN_APP, |obs| self.identify(obs))
    }
}

impl Default for AppIdentifier {
    fn default() -> Self {
        Self::builtin()
    }
}
