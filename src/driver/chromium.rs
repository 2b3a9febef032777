//! Chrome DevTools Protocol driver
//!
//! One Chrome process per session, each with its own throwaway profile
//! directory. Storage state uses the same JSON shape as Playwright's
//! `storage_state`:
//!
//! ```json
//! {
//!   "cookies": [{"name": "sid", "value": "..", "domain": ".douyin.com", "path": "/"}],
//!   "origins": [{"origin": "https://creator.douyin.com", "localStorage": [{"name": "k", "value": "v"}]}]
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, GetAllCookiesParams, SetCookiesParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, EventFrameNavigated,
};
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{BrowserDriver, ElementHandle, LocatorSpec, NavigationCallback, SessionHandle};
use crate::config::settings::BrowserSettings;
use crate::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageState {
    #[serde(default)]
    cookies: Vec<StoredCookie>,
    #[serde(default)]
    origins: Vec<OriginState>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    #[serde(default = "root_path")]
    path: String,
    /// Seconds since the epoch; -1 for session cookies
    #[serde(default = "session_expiry")]
    expires: f64,
    #[serde(default)]
    http_only: bool,
    #[serde(default)]
    secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    same_site: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OriginState {
    origin: String,
    #[serde(default)]
    local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StorageEntry {
    name: String,
    value: String,
}

fn root_path() -> String {
    "/".to_string()
}

fn session_expiry() -> f64 {
    -1.0
}

impl StoredCookie {
    fn to_param(&self) -> Result<CookieParam> {
        let mut builder = CookieParam::builder()
            .name(self.name.clone())
            .value(self.value.clone())
            .domain(self.domain.clone())
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure);
        if self.expires > 0.0 {
            builder = builder.expires(TimeSinceEpoch::new(self.expires));
        }
        if let Some(same_site) = self.same_site.as_deref().and_then(parse_same_site) {
            builder = builder.same_site(same_site);
        }
        builder.build().map_err(Error::driver)
    }

    fn from_cdp(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires: cookie.expires,
            http_only: cookie.http_only,
            secure: cookie.secure,
            same_site: cookie.same_site.as_ref().map(|s| {
                match s {
                    CookieSameSite::Strict => "Strict",
                    CookieSameSite::Lax => "Lax",
                    CookieSameSite::None => "None",
                }
                .to_string()
            }),
        }
    }
}

fn parse_same_site(raw: &str) -> Option<CookieSameSite> {
    match raw {
        "Strict" => Some(CookieSameSite::Strict),
        "Lax" => Some(CookieSameSite::Lax),
        "None" => Some(CookieSameSite::None),
        _ => None,
    }
}

/// Script restoring saved local storage for whichever origin loads
fn local_storage_script(origins: &[OriginState]) -> Result<String> {
    let by_origin: HashMap<&str, Vec<(&str, &str)>> = origins
        .iter()
        .map(|o| {
            let entries = o
                .local_storage
                .iter()
                .map(|e| (e.name.as_str(), e.value.as_str()))
                .collect();
            (o.origin.as_str(), entries)
        })
        .collect();

    Ok(format!(
        "(() => {{ const saved = {}; const entries = saved[location.origin]; \
         if (!entries) return; \
         for (const [k, v] of entries) {{ try {{ localStorage.setItem(k, v); }} catch (e) {{}} }} }})()",
        serde_json::to_string(&by_origin)?
    ))
}

const EXPORT_LOCAL_STORAGE: &str = "({ origin: location.origin, \
     localStorage: Object.entries(localStorage).map(([name, value]) => ({ name, value })) })";

/// An element resolved by a locator
enum Found {
    Node(Element),
    /// Match inside a same-origin iframe, addressed through the iframe element
    Framed {
        frame: Arc<Element>,
        css: String,
        index: usize,
    },
}

impl Found {
    /// `this.contentDocument.querySelectorAll(css)[index]` as a JS expression
    fn framed_expr(css: &str, index: usize) -> Result<String> {
        Ok(format!(
            "(this.contentDocument ? this.contentDocument.querySelectorAll({})[{}] : null)",
            serde_json::to_string(css)?,
            index
        ))
    }
}

struct ChromeSession {
    page: Page,
    browser: tokio::sync::Mutex<Browser>,
    handler: JoinHandle<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
    elements: Mutex<HashMap<u64, Arc<Found>>>,
    next_element: AtomicU64,
    _profile: tempfile::TempDir,
}

/// [`BrowserDriver`] backed by a local Chrome or Chromium
pub struct ChromiumDriver {
    settings: BrowserSettings,
    sessions: Mutex<HashMap<u64, Arc<ChromeSession>>>,
    next_session: AtomicU64,
}

impl std::fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("settings", &self.settings)
            .field("sessions", &lock(&self.sessions).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn cdp(e: impl std::fmt::Display) -> Error {
    Error::driver(e.to_string())
}

impl ChromiumDriver {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    fn session(&self, handle: SessionHandle) -> Result<Arc<ChromeSession>> {
        lock(&self.sessions)
            .get(&handle.id())
            .cloned()
            .ok_or_else(|| Error::driver(format!("unknown session {}", handle.id())))
    }

    fn element(&self, handle: ElementHandle) -> Result<(Arc<ChromeSession>, Arc<Found>)> {
        let session = self.session(handle.session)?;
        let found = lock(&session.elements)
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| Error::driver(format!("stale element {}", handle.id)))?;
        Ok((session, found))
    }

    async fn launch(&self) -> Result<(Browser, JoinHandle<()>, tempfile::TempDir)> {
        let profile = tempfile::Builder::new()
            .prefix("upload-session-chrome.")
            .tempdir()
            .map_err(|e| Error::driver(format!("create browser profile: {e}")))?;

        let mut builder = BrowserConfig::builder().user_data_dir(profile.path());
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(Error::driver)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(cdp)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler stopped: {}", e);
                    break;
                }
            }
        });

        Ok((browser, handler, profile))
    }
}

/// Close Chrome and reap the process; failures are logged only
async fn shut_down(browser: &mut Browser) {
    if let Err(e) = browser.close().await {
        warn!("Chrome did not close cleanly: {}", e);
    }
    if let Err(e) = browser.wait().await {
        warn!("Waiting for Chrome to exit failed: {}", e);
    }
}

/// Every match of `locator`, in document order
fn resolve<'a>(page: &'a Page, locator: &'a LocatorSpec) -> BoxFuture<'a, Result<Vec<Found>>> {
    async move {
        match locator {
            LocatorSpec::Css(css) => Ok(page
                .find_elements(css.as_str())
                .await
                .map_err(cdp)?
                .into_iter()
                .map(Found::Node)
                .collect()),
            LocatorSpec::Text(text) => Ok(page
                .find_xpaths(text_xpath(text))
                .await
                .map_err(cdp)?
                .into_iter()
                .map(Found::Node)
                .collect()),
            LocatorSpec::CssWithText { css, text } => {
                let mut matches = Vec::new();
                for element in page.find_elements(css.as_str()).await.map_err(cdp)? {
                    let inner = element.inner_text().await.map_err(cdp)?;
                    if inner.is_some_and(|inner| inner.contains(text.as_str())) {
                        matches.push(Found::Node(element));
                    }
                }
                Ok(matches)
            }
            LocatorSpec::Nth { locator, index } => {
                Ok(resolve(page, locator).await?.into_iter().nth(*index).into_iter().collect())
            }
            LocatorSpec::Frame { frame, locator } => {
                let LocatorSpec::Css(css) = locator.as_ref() else {
                    return Err(Error::driver(format!(
                        "only css locators are supported inside frames, got {locator}"
                    )));
                };
                let mut matches = Vec::new();
                for frame in page.find_elements(frame.as_str()).await.map_err(cdp)? {
                    let count = frame
                        .call_js_fn(
                            format!(
                                "function() {{ return this.contentDocument ? \
                                 this.contentDocument.querySelectorAll({}).length : 0; }}",
                                serde_json::to_string(css)?
                            ),
                            false,
                        )
                        .await
                        .map_err(cdp)?
                        .result
                        .value
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    if count == 0 {
                        continue;
                    }
                    let frame = Arc::new(frame);
                    for index in 0..count as usize {
                        matches.push(Found::Framed {
                            frame: Arc::clone(&frame),
                            css: css.clone(),
                            index,
                        });
                    }
                }
                Ok(matches)
            }
            LocatorSpec::AnyOf(candidates) => {
                for candidate in candidates {
                    let found = resolve(page, candidate).await?;
                    if !found.is_empty() {
                        return Ok(found);
                    }
                }
                Ok(Vec::new())
            }
        }
    }
    .boxed()
}

/// Load cookies and local storage into a fresh page
async fn restore(page: &Page, state: &StorageState) -> Result<()> {
    if !state.cookies.is_empty() {
        let cookies = state
            .cookies
            .iter()
            .map(StoredCookie::to_param)
            .collect::<Result<Vec<_>>>()?;
        page.execute(SetCookiesParams::new(cookies)).await.map_err(cdp)?;
    }
    if !state.origins.is_empty() {
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(
            local_storage_script(&state.origins)?,
        ))
        .await
        .map_err(cdp)?;
    }
    Ok(())
}

fn text_xpath(text: &str) -> String {
    let literal = if text.contains('\'') {
        format!("\"{text}\"")
    } else {
        format!("'{text}'")
    };
    format!("//*[contains(normalize-space(text()), {literal})]")
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn open_session(&self, storage_state: Option<&str>) -> Result<SessionHandle> {
        let state: StorageState = match storage_state {
            Some(raw) => serde_json::from_str(raw)?,
            None => StorageState::default(),
        };

        let (mut browser, handler, profile) = self.launch().await?;
        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                warn!("Opening the first tab failed, shutting Chrome down: {}", e);
                shut_down(&mut browser).await;
                handler.abort();
                return Err(cdp(e));
            }
        };

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(ChromeSession {
            page,
            browser: tokio::sync::Mutex::new(browser),
            handler,
            listener: Mutex::new(None),
            elements: Mutex::new(HashMap::new()),
            next_element: AtomicU64::new(1),
            _profile: profile,
        });
        lock(&self.sessions).insert(id, Arc::clone(&entry));
        let handle = SessionHandle::new(id);

        if let Err(e) = restore(&entry.page, &state).await {
            if let Err(close_err) = self.close(handle).await {
                warn!(session = id, "Failed to close Chrome session: {}", close_err);
            }
            return Err(e);
        }

        debug!(session = id, restored = storage_state.is_some(), "Opened Chrome session");
        Ok(handle)
    }

    async fn navigate(&self, session: SessionHandle, url: &str) -> Result<()> {
        let session = self.session(session)?;
        session.page.goto(url).await.map_err(cdp)?;
        Ok(())
    }

    async fn current_url(&self, session: SessionHandle) -> Result<String> {
        let session = self.session(session)?;
        Ok(session.page.url().await.map_err(cdp)?.unwrap_or_default())
    }

    async fn on_navigated(
        &self,
        session: SessionHandle,
        callback: NavigationCallback,
    ) -> Result<()> {
        let entry = self.session(session)?;
        let mut events = entry
            .page
            .event_listener::<EventFrameNavigated>()
            .await
            .map_err(cdp)?;

        let listener = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.frame.parent_id.is_none() {
                    callback(&event.frame.url);
                }
            }
        });
        if let Some(previous) = lock(&entry.listener).replace(listener) {
            previous.abort();
        }
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        session: SessionHandle,
        locator: &LocatorSpec,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        let entry = self.session(session)?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match resolve(&entry.page, locator).await {
                Ok(found) => {
                    if let Some(first) = found.into_iter().next() {
                        let id = entry.next_element.fetch_add(1, Ordering::Relaxed);
                        lock(&entry.elements).insert(id, Arc::new(first));
                        return Ok(Some(ElementHandle { session, id }));
                    }
                }
                // Lookups fail transiently while a page is being replaced
                Err(e) => debug!(%locator, "Locator lookup failed: {}", e),
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, element: ElementHandle) -> Result<()> {
        let (_session, found) = self.element(element)?;
        match found.as_ref() {
            Found::Node(node) => {
                node.click().await.map_err(cdp)?;
            }
            Found::Framed { frame, css, index } => {
                frame
                    .call_js_fn(
                        format!(
                            "function() {{ const el = {}; if (el) el.click(); }}",
                            Found::framed_expr(css, *index)?
                        ),
                        false,
                    )
                    .await
                    .map_err(cdp)?;
            }
        }
        Ok(())
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        let (_session, found) = self.element(element)?;
        match found.as_ref() {
            Found::Node(node) => node.attribute(name).await.map_err(cdp),
            Found::Framed { frame, css, index } => {
                let value = frame
                    .call_js_fn(
                        format!(
                            "function() {{ const el = {}; return el ? el.getAttribute({}) : null; }}",
                            Found::framed_expr(css, *index)?,
                            serde_json::to_string(name)?
                        ),
                        false,
                    )
                    .await
                    .map_err(cdp)?
                    .result
                    .value;
                Ok(value.and_then(|v| v.as_str().map(str::to_string)))
            }
        }
    }

    async fn screenshot(&self, element: ElementHandle) -> Result<Vec<u8>> {
        let (_session, found) = self.element(element)?;
        // Framed matches are captured through their iframe
        let node = match found.as_ref() {
            Found::Node(node) => node,
            Found::Framed { frame, .. } => frame.as_ref(),
        };
        node.screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(cdp)
    }

    async fn export_storage_state(&self, session: SessionHandle) -> Result<String> {
        let entry = self.session(session)?;

        let cookies = entry
            .page
            .execute(GetAllCookiesParams::default())
            .await
            .map_err(cdp)?
            .result
            .cookies
            .iter()
            .map(StoredCookie::from_cdp)
            .collect();

        let origins = match entry.page.evaluate(EXPORT_LOCAL_STORAGE).await {
            Ok(result) => match result.into_value::<OriginState>() {
                Ok(origin) if !origin.local_storage.is_empty() => vec![origin],
                Ok(_) => Vec::new(),
                Err(e) => {
                    warn!("Could not read local storage: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("Could not read local storage: {}", e);
                Vec::new()
            }
        };

        Ok(serde_json::to_string(&StorageState { cookies, origins })?)
    }

    async fn close(&self, session: SessionHandle) -> Result<()> {
        let entry = lock(&self.sessions)
            .remove(&session.id())
            .ok_or_else(|| Error::driver(format!("unknown session {}", session.id())))?;

        if let Some(listener) = lock(&entry.listener).take() {
            listener.abort();
        }
        lock(&entry.elements).clear();

        shut_down(&mut *entry.browser.lock().await).await;
        entry.handler.abort();
        debug!(session = session.id(), "Closed Chrome session");
        Ok(())
    }
}
