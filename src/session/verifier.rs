//! Liveness verification of stored sessions
//!
//! Loads a storage state into a fresh automation session, opens the
//! platform's check page and asks the platform's
//! [`LoggedOutDetector`](crate::platforms::LoggedOutDetector) whether the
//! page is in a logged-out state. Driver failures and timeouts never escape:
//! they come back as an invalid, inconclusive result.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::settings::VerifySettings;
use crate::driver::{BrowserDriver, SessionGuard};
use crate::platforms::PlatformProfile;
use crate::types::VerificationResult;
use crate::{Error, Result};

/// Slack on top of the detector's own timeout before the check is abandoned
const DETECT_GRACE: Duration = Duration::from_secs(2);

/// Checks whether a storage state is still accepted by its platform
#[derive(Debug, Clone)]
pub struct LivenessVerifier {
    driver: Arc<dyn BrowserDriver>,
    settings: VerifySettings,
}

impl LivenessVerifier {
    pub fn new(driver: Arc<dyn BrowserDriver>, settings: VerifySettings) -> Self {
        Self { driver, settings }
    }

    /// Time allowed for one check once the session is open
    pub fn check_budget(&self, profile: &PlatformProfile) -> Duration {
        self.settings.navigation_timeout
            + profile.check_settle
            + self.settings.detect_timeout
            + DETECT_GRACE
    }

    /// Verify `storage_state` against `profile`'s check page
    ///
    /// Opening the session is bounded by the navigation timeout, the check
    /// itself by [`Self::check_budget`] and teardown by
    /// [`CLOSE_TIMEOUT`](crate::driver::CLOSE_TIMEOUT). The automation
    /// session is closed before this returns, whatever the result.
    pub async fn verify(&self, profile: &PlatformProfile, storage_state: &str) -> VerificationResult {
        let platform = profile.platform;

        let guard = match SessionGuard::open(
            Arc::clone(&self.driver),
            Some(storage_state),
            self.settings.navigation_timeout,
        )
        .await
        {
            Ok(guard) => guard,
            Err(e) => {
                warn!(%platform, "Could not open verification session: {}", e);
                return VerificationResult::inconclusive(e);
            }
        };

        let budget = self.check_budget(profile);
        let result = match tokio::time::timeout(budget, self.check(&guard, profile)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(%platform, "Liveness check inconclusive, treating as invalid: {}", e);
                VerificationResult::inconclusive(e)
            }
            Err(_) => {
                let e = Error::verification_inconclusive(format!(
                    "liveness check did not finish within {budget:?}"
                ));
                warn!(%platform, "{}", e);
                VerificationResult::inconclusive(e)
            }
        };
        guard.close().await;

        info!(%platform, valid = result.valid, reason = %result.reason, "Verified stored session");
        result
    }

    async fn check(
        &self,
        guard: &SessionGuard,
        profile: &PlatformProfile,
    ) -> Result<VerificationResult> {
        let driver = guard.driver();
        let session = guard.handle();

        tokio::time::timeout(
            self.settings.navigation_timeout,
            driver.navigate(session, &profile.check_url),
        )
        .await
        .map_err(|_| {
            Error::verification_inconclusive(format!(
                "loading {} took longer than {:?}",
                profile.check_url, self.settings.navigation_timeout
            ))
        })??;

        if !profile.check_settle.is_zero() {
            tokio::time::sleep(profile.check_settle).await;
        }

        if profile.require_landing {
            let landed = driver.current_url(session).await?;
            if !profile.is_check_url(&landed) {
                debug!(platform = %profile.platform, %landed, "Redirected away from check page");
                return Ok(VerificationResult::invalid(VerificationResult::REDIRECTED));
            }
        }

        let detect_timeout = self.settings.detect_timeout;
        let logged_out = tokio::time::timeout(
            detect_timeout + DETECT_GRACE,
            profile
                .logged_out
                .detect_logged_out(driver, session, detect_timeout),
        )
        .await
        .map_err(|_| {
            Error::verification_inconclusive(format!(
                "logged-out detection did not finish within {:?}",
                detect_timeout + DETECT_GRACE
            ))
        })??;

        Ok(if logged_out {
            VerificationResult::invalid(VerificationResult::LOGGED_OUT)
        } else {
            VerificationResult::valid()
        })
    }
}
