//! Session credential resolution for the request loop.
//!
//! The app never talks to the portal's login flow itself; the cookie header
//! comes from passively captured portal traffic. Resolution happens once per
//! run, before the first request.

use thiserror::Error;

use crate::settings::SettingsStore;

/// Errors raised while resolving the portal session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No usable cookie header is available for the portal domain.
    #[error(
        "Not logged in: no portal session has been captured yet. \
         Open the partner portal in your browser and retry."
    )]
    NotLoggedIn,
}

/// Seam over wherever session cookies come from, so the request loop can be
/// tested without captured traffic.
pub trait SessionSource: Send + Sync {
    /// Return the raw cookie header for the portal domain, if one is known.
    fn cookie_header(&self) -> Option<String>;
}

/// Resolve the session up front, failing the whole run when absent.
pub fn resolve(source: &dyn SessionSource) -> Result<String, SessionError> {
    source
        .cookie_header()
        .filter(|header| !header.trim().is_empty())
        .ok_or(SessionError::NotLoggedIn)
}

/// Session source backed by the most recently captured cookie in settings.
pub struct CapturedSessionSource {
    store: SettingsStore,
}

impl CapturedSessionSource {
    pub fn new(store: SettingsStore) -> Self {
        Self { store }
    }
}

impl SessionSource for CapturedSessionSource {
    fn cookie_header(&self) -> Option<String> {
        self.store.snapshot().captured_cookie
    }
}
