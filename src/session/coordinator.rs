//! Interactive login coordinator
//!
//! Runs one human-assisted login per call:
//!
//! 1. open an unauthenticated session at the platform's login page
//! 2. locate the login artifact (clicking through any prelude first) and
//!    publish it
//! 3. wait for a main-frame navigation away from the login page, bounded by
//!    the attempt deadline
//! 4. export the session's storage state, close the browser, verify the
//!    exported state and only then persist it
//!
//! The browser session is closed on every path out of [`LoginCoordinator::login`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::progress::ProgressSender;
use super::store::CredentialStore;
use super::verifier::LivenessVerifier;
use crate::config::settings::LoginSettings;
use crate::driver::{BrowserDriver, SessionGuard};
use crate::platforms::PlatformProfile;
use crate::types::{Account, FailureReason, LoginArtifact, LoginAttempt, LoginPhase};
use crate::{Error, Result};

/// Stand-in deadline for timeouts too large to represent
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Where the interactive part of an attempt ended
enum Interaction {
    /// Navigation observed; carries the exported storage state
    Captured(String),
    TimedOut,
    Failed(FailureReason),
}

/// Drives interactive logins through a [`BrowserDriver`]
#[derive(Debug, Clone)]
pub struct LoginCoordinator {
    driver: Arc<dyn BrowserDriver>,
    verifier: LivenessVerifier,
    settings: LoginSettings,
    navigation_timeout: Duration,
}

impl LoginCoordinator {
    /// `navigation_timeout` bounds page loads and storage export
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        verifier: LivenessVerifier,
        settings: LoginSettings,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            verifier,
            settings,
            navigation_timeout,
        }
    }

    /// Run one login attempt for `(profile.platform, account)`
    ///
    /// The attempt always resolves to exactly one of `Succeeded`, `TimedOut`
    /// or `Failed`, mirrored by a single terminal event on `progress`. A
    /// record is written to `store` only on `Succeeded`.
    ///
    /// # Errors
    ///
    /// Only a failure to persist the verified session escapes as an error.
    pub async fn login(
        &self,
        profile: &PlatformProfile,
        account: &Account,
        timeout: Duration,
        store: &CredentialStore,
        progress: &mut ProgressSender,
    ) -> Result<LoginAttempt> {
        let platform = profile.platform;
        let mut attempt = LoginAttempt::new(platform, account.clone(), timeout);
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE);
        info!(%platform, %account, ?timeout, "Starting interactive login");

        let opened =
            SessionGuard::open(Arc::clone(&self.driver), None, self.navigation_timeout).await;
        let guard = match opened {
            Ok(guard) => guard,
            Err(e) => {
                fail(&mut attempt, progress, FailureReason::Driver(e.to_string()));
                return Ok(attempt);
            }
        };

        let interaction = match tokio::time::timeout_at(
            deadline,
            self.await_navigation(&guard, profile, &mut attempt, progress),
        )
        .await
        {
            Err(_) => Interaction::TimedOut,
            Ok(Err(e)) => Interaction::Failed(FailureReason::Driver(e.to_string())),
            Ok(Ok(false)) => Interaction::Failed(FailureReason::ArtifactNotFound),
            Ok(Ok(true)) => match self.export_state(&guard).await {
                Ok(blob) => Interaction::Captured(blob),
                Err(e) => Interaction::Failed(FailureReason::Driver(e.to_string())),
            },
        };
        guard.close().await;

        let blob = match interaction {
            Interaction::Captured(blob) => blob,
            Interaction::TimedOut => {
                warn!(%platform, %account, "{}", Error::navigation_timeout(platform, timeout));
                attempt.time_out();
                progress.timeout();
                return Ok(attempt);
            }
            Interaction::Failed(reason) => {
                if reason == FailureReason::ArtifactNotFound {
                    warn!(
                        %platform,
                        %account,
                        "{}",
                        Error::artifact_not_found(platform, self.settings.artifact_timeout)
                    );
                }
                fail(&mut attempt, progress, reason);
                return Ok(attempt);
            }
        };

        let verification = self.verifier.verify(profile, &blob).await;
        if !verification.valid {
            fail(
                &mut attempt,
                progress,
                FailureReason::PostLoginVerificationFailed(verification.reason),
            );
            return Ok(attempt);
        }

        if let Err(e) = store.write(platform, account, &blob) {
            fail(&mut attempt, progress, FailureReason::Storage(e.to_string()));
            return Err(e);
        }

        attempt.succeed();
        progress.success();
        info!(%platform, %account, "Interactive login succeeded");
        Ok(attempt)
    }

    /// Steps 1 to 3. `Ok(false)` when the artifact could not be located.
    async fn await_navigation(
        &self,
        guard: &SessionGuard,
        profile: &PlatformProfile,
        attempt: &mut LoginAttempt,
        progress: &mut ProgressSender,
    ) -> Result<bool> {
        let driver = guard.driver();
        let session = guard.handle();

        tokio::time::timeout(
            self.navigation_timeout,
            driver.navigate(session, &profile.login_url),
        )
        .await
        .map_err(|_| {
            Error::driver(format!(
                "loading {} took longer than {:?}",
                profile.login_url, self.navigation_timeout
            ))
        })??;

        let Some(artifact) = self.capture_artifact(guard, profile).await? else {
            return Ok(false);
        };

        let origin = driver.current_url(session).await?;
        let (tx, mut rx) = watch::channel(None::<String>);
        let login_url = origin.clone();
        driver
            .on_navigated(
                session,
                Box::new(move |url: &str| {
                    if url == login_url {
                        return;
                    }
                    tx.send_if_modified(|seen| {
                        if seen.is_some() {
                            return false;
                        }
                        *seen = Some(url.to_string());
                        true
                    });
                }),
            )
            .await?;

        attempt.capture(artifact.clone());
        progress.artifact(artifact);
        attempt.enter(LoginPhase::AwaitingCompletion);

        let released = rx.wait_for(Option::is_some).await.is_err();
        if released {
            // The driver released the listener; no signal can arrive anymore
            debug!(platform = %profile.platform, "Navigation listener released");
            std::future::pending::<()>().await;
        }

        let landed = rx.borrow().clone().unwrap_or_default();
        info!(platform = %profile.platform, from = %origin, to = %landed, "Login navigation observed");
        Ok(true)
    }

    async fn capture_artifact(
        &self,
        guard: &SessionGuard,
        profile: &PlatformProfile,
    ) -> Result<Option<LoginArtifact>> {
        let driver = guard.driver();
        let session = guard.handle();
        // One budget for the prelude clicks and the target together
        let deadline = Instant::now() + self.settings.artifact_timeout;
        let remaining = || deadline.saturating_duration_since(Instant::now());

        for step in &profile.artifact.prelude {
            let Some(element) = driver.wait_for_selector(session, step, remaining()).await? else {
                debug!(platform = %profile.platform, locator = %step, "Login prelude element missing");
                return Ok(None);
            };
            driver.click(element).await?;
        }

        let target = &profile.artifact.target;
        let Some(element) = driver.wait_for_selector(session, target, remaining()).await? else {
            debug!(platform = %profile.platform, locator = %target, "Login artifact missing");
            return Ok(None);
        };

        if !self.settings.artifact_render_wait.is_zero() {
            tokio::time::sleep(self.settings.artifact_render_wait).await;
        }

        let artifact = match driver.attribute(element, "src").await? {
            Some(src) if !src.is_empty() => LoginArtifact::from_source(src),
            _ => LoginArtifact::from_png(&driver.screenshot(element).await?),
        };
        debug!(platform = %profile.platform, artifact = %artifact.summary(), "Captured login artifact");
        Ok(Some(artifact))
    }

    async fn export_state(&self, guard: &SessionGuard) -> Result<String> {
        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        tokio::time::timeout(
            self.navigation_timeout,
            guard.driver().export_storage_state(guard.handle()),
        )
        .await
        .map_err(|_| Error::driver("exporting storage state timed out"))?
    }
}

fn fail(attempt: &mut LoginAttempt, progress: &mut ProgressSender, reason: FailureReason) {
    warn!(
        platform = %attempt.platform,
        account = %attempt.account,
        %reason,
        "Interactive login failed"
    );
    progress.error(reason.to_string());
    attempt.fail(reason);
}
