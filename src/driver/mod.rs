//! Browser automation capabilities
//!
//! The lifecycle manager never talks to a browser directly. It consumes the
//! [`BrowserDriver`] trait: open a session (optionally from a stored storage
//! state), navigate, watch main-frame navigations, wait for locators, take
//! element screenshots and export the storage state.
//!
//! Two implementations ship with the crate:
//! - [`ScriptedDriver`]: deterministic, in-memory, used by tests and dry runs
//! - `ChromiumDriver` (feature `chromium`): Chrome over the DevTools Protocol

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod locator;
pub mod scripted;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumDriver;
pub use locator::LocatorSpec;
pub use scripted::{DriverStats, ScriptedDriver};

/// Upper bound for tearing a session down
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Invoked with the new URL after every main-frame navigation
pub type NavigationCallback = Box<dyn Fn(&str) + Send + Sync + 'static>;

/// Opaque reference to an open automation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Opaque reference to an element found in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub session: SessionHandle,
    pub id: u64,
}

/// Capability set the lifecycle manager needs from a browser
#[async_trait]
pub trait BrowserDriver: Send + Sync + fmt::Debug {
    /// Start an isolated session, restoring `storage_state` when given
    async fn open_session(&self, storage_state: Option<&str>) -> Result<SessionHandle>;

    /// Navigate the session's page and wait for the load to commit
    async fn navigate(&self, session: SessionHandle, url: &str) -> Result<()>;

    /// URL of the main frame
    async fn current_url(&self, session: SessionHandle) -> Result<String>;

    /// Register a callback for main-frame navigations
    async fn on_navigated(&self, session: SessionHandle, callback: NavigationCallback)
    -> Result<()>;

    /// Wait until `locator` matches, returning `None` once `timeout` expires
    async fn wait_for_selector(
        &self,
        session: SessionHandle,
        locator: &LocatorSpec,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>>;

    async fn click(&self, element: ElementHandle) -> Result<()>;

    async fn attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>>;

    /// PNG screenshot of a single element
    async fn screenshot(&self, element: ElementHandle) -> Result<Vec<u8>>;

    /// Serialized cookies and local storage of the session
    async fn export_storage_state(&self, session: SessionHandle) -> Result<String>;

    /// Tear the session down; the handle is invalid afterwards
    async fn close(&self, session: SessionHandle) -> Result<()>;
}

/// Scoped ownership of an open session
///
/// Call [`SessionGuard::close`] on every normal exit. If the guard is dropped
/// without it (an early return or a cancelled future) the session is closed
/// on a background task instead, so no browser outlives the call.
pub struct SessionGuard {
    driver: Arc<dyn BrowserDriver>,
    handle: Option<SessionHandle>,
}

impl SessionGuard {
    /// Open a session, giving up after `timeout`
    pub async fn open(
        driver: Arc<dyn BrowserDriver>,
        storage_state: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let handle = tokio::time::timeout(timeout, driver.open_session(storage_state))
            .await
            .map_err(|_| {
                crate::Error::driver(format!("opening a browser session took longer than {timeout:?}"))
            })??;
        Ok(Self {
            driver,
            handle: Some(handle),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        // Only `close` and `drop` take the handle, and both consume the guard.
        self.handle.unwrap_or(SessionHandle(u64::MAX))
    }

    pub fn driver(&self) -> &dyn BrowserDriver {
        self.driver.as_ref()
    }

    /// Close the session, waiting at most [`CLOSE_TIMEOUT`]
    pub async fn close(mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, self.driver.close(handle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(session = handle.id(), "Failed to close browser session: {}", e);
            }
            Err(_) => {
                tracing::warn!(
                    session = handle.id(),
                    "Browser session did not close within {:?}",
                    CLOSE_TIMEOUT
                );
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        let driver = Arc::clone(&self.driver);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(session = handle.id(), "Closing abandoned browser session");
                runtime.spawn(async move {
                    if let Err(e) = driver.close(handle).await {
                        tracing::warn!(session = handle.id(), "Failed to close browser session: {}", e);
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    session = handle.id(),
                    "Browser session dropped outside a runtime and could not be closed"
                );
            }
        }
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("handle", &self.handle)
            .finish()
    }
}
