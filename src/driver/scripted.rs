//! Scripted in-memory browser driver
//!
//! Behaves like a browser whose platforms follow a fixed script. Used by the
//! test suite and handy for exercising the CLI without launching Chrome.
//!
//! The script decides:
//! - which storage states the "remote platform" accepts; a verification
//!   session opened with any other state sees its logged-out marker
//! - which storage state a completed login issues
//! - whether the login page shows an artifact, which, and how long it takes
//!   to appear
//! - which main-frame navigations fire after a login page registers its
//!   navigation callback, and after what delay

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::{BrowserDriver, ElementHandle, LocatorSpec, NavigationCallback, SessionHandle};
use crate::{Error, Result};

/// Artifact the scripted login page exposes
#[derive(Debug, Clone)]
pub enum ScriptedArtifact {
    /// An element with this `src` attribute
    Source(String),
    /// An element without `src`, only capturable as a screenshot
    Canvas(Vec<u8>),
}

/// Call counters recorded by [`ScriptedDriver`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Sessions opened without a storage state (login sessions)
    pub login_sessions: usize,
    /// Sessions opened from a stored state (verification sessions)
    pub restored_sessions: usize,
    pub closed: usize,
    pub clicks: usize,
    /// Every URL passed to `navigate`, in order
    pub navigations: Vec<String>,
}

impl DriverStats {
    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.login_sessions + self.restored_sessions - self.closed
    }
}

#[derive(Debug)]
struct Script {
    accepted_states: HashSet<String>,
    issued_state: String,
    artifact: Option<ScriptedArtifact>,
    login_navigations: Vec<String>,
    navigation_delay: Duration,
    artifact_delay: Duration,
    fail_navigation: bool,
    stall_navigation: bool,
    stall_open: bool,
    stall_current_url: bool,
    redirect_to: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            accepted_states: HashSet::new(),
            issued_state: "{\"cookies\":[],\"origins\":[]}".to_string(),
            artifact: Some(ScriptedArtifact::Source(
                "data:image/png;base64,iVBORw0KGgo=".to_string(),
            )),
            login_navigations: Vec::new(),
            navigation_delay: Duration::ZERO,
            artifact_delay: Duration::ZERO,
            fail_navigation: false,
            stall_navigation: false,
            stall_open: false,
            stall_current_url: false,
            redirect_to: None,
        }
    }
}

#[derive(Debug)]
struct ScriptedSession {
    storage_state: Option<String>,
    url: String,
    watcher: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    sessions: HashMap<u64, ScriptedSession>,
    stats: DriverStats,
}

/// Deterministic [`BrowserDriver`] following a [`ScriptedDriver`] script
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    script: Mutex<Script>,
    state: Arc<Mutex<State>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The remote platform accepts `state` as a logged-in session
    pub fn accept_state(&self, state: impl Into<String>) -> &Self {
        self.script().accepted_states.insert(state.into());
        self
    }

    /// The remote platform stops accepting `state`
    pub fn reject_state(&self, state: &str) -> &Self {
        self.script().accepted_states.remove(state);
        self
    }

    /// Storage state exported from a login session
    pub fn issue_state(&self, state: impl Into<String>) -> &Self {
        self.script().issued_state = state.into();
        self
    }

    /// Artifact shown on login pages; `None` hides it
    pub fn show_artifact(&self, artifact: Option<ScriptedArtifact>) -> &Self {
        self.script().artifact = artifact;
        self
    }

    /// Login page elements appear only `delay` after a wait starts
    pub fn delay_artifact(&self, delay: Duration) -> &Self {
        self.script().artifact_delay = delay;
        self
    }

    /// Main-frame navigations fired `delay` after a login session starts
    /// listening
    pub fn navigate_after_login(&self, delay: Duration, urls: &[&str]) -> &Self {
        let mut script = self.script();
        script.navigation_delay = delay;
        script.login_navigations = urls.iter().map(|u| u.to_string()).collect();
        self
    }

    /// Every `navigate` call fails as if the network were down
    pub fn fail_navigation(&self, fail: bool) -> &Self {
        self.script().fail_navigation = fail;
        self
    }

    /// Every `navigate` call hangs forever
    pub fn stall_navigation(&self, stall: bool) -> &Self {
        self.script().stall_navigation = stall;
        self
    }

    /// Browser launches hang forever
    pub fn stall_open(&self, stall: bool) -> &Self {
        self.script().stall_open = stall;
        self
    }

    /// Reading the current URL hangs forever
    pub fn stall_current_url(&self, stall: bool) -> &Self {
        self.script().stall_current_url = stall;
        self
    }

    /// Restored sessions end up on `url` whatever they navigate to
    pub fn redirect_restored_sessions(&self, url: Option<&str>) -> &Self {
        self.script().redirect_to = url.map(str::to_string);
        self
    }

    pub fn stats(&self) -> DriverStats {
        lock(&self.state).stats.clone()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        lock(&self.script)
    }

    fn session_state(&self, session: SessionHandle) -> Result<Option<String>> {
        lock(&self.state)
            .sessions
            .get(&session.id())
            .map(|s| s.storage_state.clone())
            .ok_or_else(|| unknown_session(session))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unknown_session(session: SessionHandle) -> Error {
    Error::driver(format!("unknown session {}", session.id()))
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn open_session(&self, storage_state: Option<&str>) -> Result<SessionHandle> {
        let stall = self.script().stall_open;
        if stall {
            std::future::pending::<()>().await;
        }

        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;

        if storage_state.is_some() {
            state.stats.restored_sessions += 1;
        } else {
            state.stats.login_sessions += 1;
        }
        state.sessions.insert(
            id,
            ScriptedSession {
                storage_state: storage_state.map(str::to_string),
                url: "about:blank".to_string(),
                watcher: None,
            },
        );

        Ok(SessionHandle::new(id))
    }

    async fn navigate(&self, session: SessionHandle, url: &str) -> Result<()> {
        let (fail, stall, redirect) = {
            let script = self.script();
            (
                script.fail_navigation,
                script.stall_navigation,
                script.redirect_to.clone(),
            )
        };

        {
            let mut state = lock(&self.state);
            state.stats.navigations.push(url.to_string());
            if !state.sessions.contains_key(&session.id()) {
                return Err(unknown_session(session));
            }
        }

        if stall {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(Error::driver(format!(
                "net::ERR_CONNECTION_RESET at {url}"
            )));
        }

        let mut state = lock(&self.state);
        let entry = state
            .sessions
            .get_mut(&session.id())
            .ok_or_else(|| unknown_session(session))?;
        entry.url = match (&entry.storage_state, redirect) {
            (Some(_), Some(redirect)) => redirect,
            _ => url.to_string(),
        };
        Ok(())
    }

    async fn current_url(&self, session: SessionHandle) -> Result<String> {
        let stall = self.script().stall_current_url;
        if stall {
            std::future::pending::<()>().await;
        }

        lock(&self.state)
            .sessions
            .get(&session.id())
            .map(|s| s.url.clone())
            .ok_or_else(|| unknown_session(session))
    }

    async fn on_navigated(
        &self,
        session: SessionHandle,
        callback: NavigationCallback,
    ) -> Result<()> {
        let is_login = self.session_state(session)?.is_none();
        let (delay, urls) = {
            let script = self.script();
            (script.navigation_delay, script.login_navigations.clone())
        };
        if !is_login || urls.is_empty() {
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        let watcher = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for url in urls {
                if let Some(entry) = lock(&state).sessions.get_mut(&session.id()) {
                    entry.url = url.clone();
                }
                callback(&url);
            }
        });

        if let Some(entry) = lock(&self.state).sessions.get_mut(&session.id()) {
            entry.watcher = Some(watcher);
        }
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        session: SessionHandle,
        _locator: &LocatorSpec,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        let found = match self.session_state(session)? {
            // Restored sessions only ever look for logged-out markers
            Some(state) => !self.script().accepted_states.contains(&state),
            None => {
                let (shown, delay) = {
                    let script = self.script();
                    (script.artifact.is_some(), script.artifact_delay)
                };
                if shown && !delay.is_zero() {
                    tokio::time::sleep(delay.min(timeout)).await;
                }
                shown && delay <= timeout
            }
        };

        Ok(found.then_some(ElementHandle { session, id: 1 }))
    }

    async fn click(&self, element: ElementHandle) -> Result<()> {
        self.session_state(element.session)?;
        lock(&self.state).stats.clicks += 1;
        Ok(())
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        self.session_state(element.session)?;
        Ok(match (&self.script().artifact, name) {
            (Some(ScriptedArtifact::Source(src)), "src") => Some(src.clone()),
            _ => None,
        })
    }

    async fn screenshot(&self, element: ElementHandle) -> Result<Vec<u8>> {
        self.session_state(element.session)?;
        match &self.script().artifact {
            Some(ScriptedArtifact::Canvas(png)) => Ok(png.clone()),
            Some(ScriptedArtifact::Source(_)) => Ok(vec![0x89, b'P', b'N', b'G']),
            None => Err(Error::driver("element is not attached")),
        }
    }

    async fn export_storage_state(&self, session: SessionHandle) -> Result<String> {
        self.session_state(session)?;
        Ok(self.script().issued_state.clone())
    }

    async fn close(&self, session: SessionHandle) -> Result<()> {
        let mut state = lock(&self.state);
        let entry = state
            .sessions
            .remove(&session.id())
            .ok_or_else(|| unknown_session(session))?;
        if let Some(watcher) = entry.watcher {
            watcher.abort();
        }
        state.stats.closed += 1;
        Ok(())
    }
}
