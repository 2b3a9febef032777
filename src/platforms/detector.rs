//! Logged-out detection strategies

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::driver::{BrowserDriver, LocatorSpec, SessionHandle};

/// Decides, on an already loaded page, whether the session is logged out
///
/// This is the only platform-specific step of a liveness check. Loading the
/// session, navigating and tearing down are shared by the verifier.
#[async_trait]
pub trait LoggedOutDetector: Send + Sync + fmt::Debug {
    /// `Ok(true)` when the page shows the platform's logged-out state.
    /// Must return within `timeout`.
    async fn detect_logged_out(
        &self,
        driver: &dyn BrowserDriver,
        session: SessionHandle,
        timeout: Duration,
    ) -> Result<bool>;
}

/// Logged out iff a marker element shows up within the timeout
#[derive(Debug, Clone)]
pub struct MarkerDetector {
    marker: LocatorSpec,
}

impl MarkerDetector {
    pub fn new(marker: LocatorSpec) -> Self {
        Self { marker }
    }
}

#[async_trait]
impl LoggedOutDetector for MarkerDetector {
    async fn detect_logged_out(
        &self,
        driver: &dyn BrowserDriver,
        session: SessionHandle,
        timeout: Duration,
    ) -> Result<bool> {
        let found = driver
            .wait_for_selector(session, &self.marker, timeout)
            .await?;

        tracing::debug!(marker = %self.marker, found = found.is_some(), "Logged-out marker check");
        Ok(found.is_some())
    }
}
