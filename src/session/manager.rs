//! Session lifecycle manager
//!
//! The single entry point callers use before publishing: "make sure there is
//! a live session for this platform and account, logging in if needed".

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use super::coordinator::LoginCoordinator;
use super::progress::ProgressSender;
use super::store::{CredentialStore, SessionListing};
use super::verifier::LivenessVerifier;
use crate::Result;
use crate::config::Settings;
use crate::driver::BrowserDriver;
use crate::platforms::{PlatformProfile, ProfileSet};
use crate::types::{Account, LoginAttempt, Platform, VerificationResult};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Owns the store, verifier and coordinator for every platform
///
/// Operations on the same (platform, account) are serialized; operations on
/// different keys run independently.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use upload_session::config::Settings;
/// use upload_session::driver::ScriptedDriver;
/// use upload_session::session::SessionLifecycleManager;
/// use upload_session::types::{Account, Platform};
///
/// # tokio_test::block_on(async {
/// let dir = tempfile::tempdir()?;
/// let mut settings = Settings::default();
/// settings.storage.sessions_dir = dir.path().to_path_buf();
///
/// let manager = SessionLifecycleManager::new(settings, Arc::new(ScriptedDriver::new()));
/// let result = manager.verify(Platform::Douyin, &Account::default()).await?;
/// assert!(!result.valid);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug)]
pub struct SessionLifecycleManager {
    settings: Arc<Settings>,
    store: CredentialStore,
    profiles: ProfileSet,
    verifier: LivenessVerifier,
    coordinator: LoginCoordinator,
    locks: Mutex<HashMap<(Platform, Account), KeyLock>>,
}

impl SessionLifecycleManager {
    /// Creates a manager over `driver` with the built-in platform profiles.
    pub fn new(settings: Settings, driver: Arc<dyn BrowserDriver>) -> Self {
        Self::with_drivers(settings, Arc::clone(&driver), driver)
    }

    /// Like [`Self::new`], with separate browsers for logins and liveness
    /// checks
    ///
    /// Logins need a window a human can use; checks usually run headless.
    pub fn with_drivers(
        settings: Settings,
        login_driver: Arc<dyn BrowserDriver>,
        verify_driver: Arc<dyn BrowserDriver>,
    ) -> Self {
        let verifier = LivenessVerifier::new(verify_driver, settings.verify.clone());
        let coordinator = LoginCoordinator::new(
            login_driver,
            verifier.clone(),
            settings.login.clone(),
            settings.browser.navigation_timeout,
        );

        Self {
            store: CredentialStore::new(&settings.storage.sessions_dir),
            settings: Arc::new(settings),
            profiles: ProfileSet::builtin(),
            verifier,
            coordinator,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the platform profiles
    pub fn with_profiles(mut self, profiles: ProfileSet) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn profile(&self, platform: Platform) -> &PlatformProfile {
        self.profiles.get(platform)
    }

    /// Ensure a live session exists, logging in when needed
    ///
    /// Returns `true` when the stored session is accepted or a fresh login
    /// succeeded. Only storage failures are returned as errors.
    pub async fn ensure_valid_session(
        &self,
        platform: Platform,
        account: &Account,
        force_relogin: bool,
    ) -> Result<bool> {
        self.ensure_valid_session_observed(
            platform,
            account,
            force_relogin,
            ProgressSender::detached(),
        )
        .await
    }

    /// [`Self::ensure_valid_session`] reporting login progress to `progress`
    ///
    /// Nothing is published when the stored session is still valid; the
    /// stream then simply ends when the sender is dropped.
    pub async fn ensure_valid_session_observed(
        &self,
        platform: Platform,
        account: &Account,
        force_relogin: bool,
        mut progress: ProgressSender,
    ) -> Result<bool> {
        let lock = self.key_lock(platform, account);
        let _held = lock.lock().await;

        if !force_relogin {
            if let Some(result) = self.verify_stored(platform, account).await?
                && result.valid
            {
                debug!(%platform, %account, "Stored session still valid");
                return Ok(true);
            }
        } else {
            info!(%platform, %account, "Forced re-login requested");
        }

        let attempt = self
            .run_login(platform, account, self.settings.login.timeout, &mut progress)
            .await?;
        Ok(attempt.outcome.is_success())
    }

    /// Check the stored session without ever starting a login
    ///
    /// A missing record is reported as invalid with reason
    /// [`VerificationResult::NO_RECORD`].
    pub async fn verify(&self, platform: Platform, account: &Account) -> Result<VerificationResult> {
        let lock = self.key_lock(platform, account);
        let _held = lock.lock().await;

        Ok(self
            .verify_stored(platform, account)
            .await?
            .unwrap_or_else(|| VerificationResult::invalid(VerificationResult::NO_RECORD)))
    }

    /// Run an interactive login regardless of the stored session
    ///
    /// `timeout` overrides the configured login deadline.
    pub async fn login(
        &self,
        platform: Platform,
        account: &Account,
        timeout: Option<Duration>,
        mut progress: ProgressSender,
    ) -> Result<LoginAttempt> {
        let lock = self.key_lock(platform, account);
        let _held = lock.lock().await;

        let timeout = timeout.unwrap_or(self.settings.login.timeout);
        self.run_login(platform, account, timeout, &mut progress).await
    }

    /// Forget the stored session; no-op when there is none
    pub async fn delete(&self, platform: Platform, account: &Account) -> Result<()> {
        let lock = self.key_lock(platform, account);
        let _held = lock.lock().await;
        self.store.delete(platform, account)
    }

    /// Accounts with a stored session, per platform
    pub fn list(&self) -> Result<SessionListing> {
        self.store.list()
    }

    async fn verify_stored(
        &self,
        platform: Platform,
        account: &Account,
    ) -> Result<Option<VerificationResult>> {
        let Some(record) = self.store.read(platform, account)? else {
            debug!(%platform, %account, "No stored session");
            return Ok(None);
        };
        debug!(
            %platform,
            %account,
            age_hours = record.age().num_hours(),
            "Verifying stored session"
        );

        let result = self
            .verifier
            .verify(self.profiles.get(platform), &record.blob)
            .await;
        Ok(Some(result))
    }

    async fn run_login(
        &self,
        platform: Platform,
        account: &Account,
        timeout: Duration,
        progress: &mut ProgressSender,
    ) -> Result<LoginAttempt> {
        self.coordinator
            .login(
                self.profiles.get(platform),
                account,
                timeout,
                &self.store,
                progress,
            )
            .await
    }

    fn key_lock(&self, platform: Platform, account: &Account) -> KeyLock {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry((platform, account.clone())).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ScriptedDriver;
    use crate::session::progress;
    use crate::types::ProgressEvent;
    use tempfile::TempDir;

    fn manager(driver: &Arc<ScriptedDriver>) -> (TempDir, SessionLifecycleManager) {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.storage.sessions_dir = dir.path().join("sessions");

        let mut douyin = PlatformProfile::builtin(Platform::Douyin);
        douyin.check_settle = Duration::ZERO;
        let manager = SessionLifecycleManager::new(settings, driver.clone())
            .with_profiles(ProfileSet::builtin().with_profile(douyin));
        (dir, manager)
    }

    #[tokio::test]
    async fn test_verify_without_record() {
        let driver = Arc::new(ScriptedDriver::new());
        let (_dir, manager) = manager(&driver);

        let result = manager.verify(Platform::Tencent, &Account::default()).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.reason, VerificationResult::NO_RECORD);
        assert_eq!(driver.stats().restored_sessions, 0);
    }

    #[tokio::test]
    async fn test_valid_record_short_circuits() {
        let driver = Arc::new(ScriptedDriver::new());
        driver.accept_state("live");
        let (_dir, manager) = manager(&driver);
        manager
            .store()
            .write(Platform::Douyin, &Account::default(), "live")
            .unwrap();

        assert!(
            manager
                .ensure_valid_session(Platform::Douyin, &Account::default(), false)
                .await
                .unwrap()
        );
        assert_eq!(driver.stats().login_sessions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_relogin_skips_verification() {
        let driver = Arc::new(ScriptedDriver::new());
        driver
            .accept_state("live")
            .accept_state("fresh")
            .issue_state("fresh")
            .navigate_after_login(Duration::from_secs(5), &["https://creator.douyin.com/home"]);
        let (_dir, manager) = manager(&driver);
        manager
            .store()
            .write(Platform::Douyin, &Account::default(), "live")
            .unwrap();

        let (tx, rx) = progress::channel();
        let ok = manager
            .ensure_valid_session_observed(Platform::Douyin, &Account::default(), true, tx)
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(driver.stats().login_sessions, 1);
        assert_eq!(rx.collect().await.last(), Some(&ProgressEvent::Success));
        let record = manager
            .store()
            .read(Platform::Douyin, &Account::default())
            .unwrap()
            .unwrap();
        assert_eq!(record.blob, "fresh");
    }

    #[tokio::test]
    async fn test_corrupt_record_is_surfaced() {
        let driver = Arc::new(ScriptedDriver::new());
        let (_dir, manager) = manager(&driver);
        let path = manager
            .store()
            .record_path(Platform::Xhs, &Account::default());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json").unwrap();

        let err = manager
            .ensure_valid_session(Platform::Xhs, &Account::default(), false)
            .await
            .unwrap_err();
        assert!(err.is_storage());
        assert_eq!(driver.stats().login_sessions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_operations_are_serialized() {
        let driver = Arc::new(ScriptedDriver::new());
        driver
            .accept_state("fresh")
            .issue_state("fresh")
            .navigate_after_login(Duration::from_secs(10), &["https://creator.douyin.com/home"]);
        let (_dir, manager) = manager(&driver);
        let manager = Arc::new(manager);

        let first = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .ensure_valid_session(Platform::Douyin, &Account::default(), false)
                    .await
            })
        };
        let second = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .ensure_valid_session(Platform::Douyin, &Account::default(), false)
                    .await
            })
        };

        assert!(first.await.unwrap().unwrap());
        assert!(second.await.unwrap().unwrap());
        // The second call waited for the first and found its fresh record
        assert_eq!(driver.stats().login_sessions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checks_and_logins_use_their_own_drivers() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.storage.sessions_dir = dir.path().to_path_buf();
        let login = Arc::new(ScriptedDriver::new());
        let checks = Arc::new(ScriptedDriver::new());
        login
            .issue_state("fresh")
            .navigate_after_login(
                Duration::from_secs(2),
                &["https://channels.weixin.qq.com/platform/post/list"],
            );
        checks.accept_state("fresh");

        let manager = SessionLifecycleManager::with_drivers(settings, login.clone(), checks.clone());
        assert!(manager.settings().verify.headless);

        assert_eq!(manager.profile(Platform::Tencent).platform, Platform::Tencent);

        assert!(
            manager
                .ensure_valid_session(Platform::Tencent, &Account::default(), false)
                .await
                .unwrap()
        );
        assert_eq!(login.stats().login_sessions, 1);
        assert_eq!(login.stats().restored_sessions, 0);
        assert_eq!(checks.stats().login_sessions, 0);
        assert_eq!(checks.stats().restored_sessions, 1);
    }

    #[tokio::test]
    async fn test_delete_then_list() {
        let driver = Arc::new(ScriptedDriver::new());
        let (_dir, manager) = manager(&driver);
        manager
            .store()
            .write(Platform::Kuaishou, &Account::default(), "x")
            .unwrap();
        assert_eq!(manager.list().unwrap().len(), 1);

        manager.delete(Platform::Kuaishou, &Account::default()).await.unwrap();
        assert!(manager.list().unwrap().is_empty());
    }
}
