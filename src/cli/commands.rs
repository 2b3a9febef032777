//! Subcommand implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::output::Reporter;
use crate::config::{ConfigLoader, Settings};
use crate::driver::BrowserDriver;
use crate::session::{CredentialStore, SessionLifecycleManager, progress};
use crate::types::{Account, Platform, VerificationResult};
use crate::utils::version;

/// Options shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub sessions_dir: Option<PathBuf>,
    pub verbose: bool,
    pub json: bool,
}

/// A parsed subcommand
#[derive(Debug, Clone)]
pub enum Command {
    /// Interactive login, replacing any stored session
    Login {
        platform: Platform,
        account: Account,
        timeout: Option<Duration>,
        artifact_out: Option<PathBuf>,
    },
    /// Check the stored session without logging in
    Verify { platform: Platform, account: Account },
    /// Verify, and log in when the stored session is missing or dead
    Ensure {
        platform: Platform,
        account: Account,
        force: bool,
        timeout: Option<Duration>,
        artifact_out: Option<PathBuf>,
    },
    /// Stored sessions per platform
    List,
    /// Forget a stored session
    Delete { platform: Platform, account: Account },
}

/// Run `command`; `Ok(false)` means the command ran but did not succeed
pub async fn run(global: GlobalArgs, command: Command) -> Result<bool> {
    let settings = load_settings(&global)?;
    super::init_logging(&settings.logging);
    info!("upload-session v{}", version::get_version());
    debug!(sessions_dir = ?settings.storage.sessions_dir, "Using session store");

    let reporter = Reporter::new(global.json);

    match command {
        Command::List => {
            let store = CredentialStore::new(&settings.storage.sessions_dir);
            reporter.listing(&store.list()?);
            Ok(true)
        }
        Command::Delete { platform, account } => {
            let store = CredentialStore::new(&settings.storage.sessions_dir);
            store.delete(platform, &account)?;
            reporter.deleted(platform, &account);
            Ok(true)
        }
        Command::Verify { platform, account } => {
            let store = CredentialStore::new(&settings.storage.sessions_dir);
            if !store.exists(platform, &account) {
                let result = VerificationResult::invalid(VerificationResult::NO_RECORD);
                reporter.verification(platform, &account, &result);
                return Ok(false);
            }
            let manager = lifecycle_manager(settings)?;
            let result = manager.verify(platform, &account).await?;
            reporter.verification(platform, &account, &result);
            Ok(result.valid)
        }
        Command::Login {
            platform,
            account,
            timeout,
            artifact_out,
        } => {
            let manager = lifecycle_manager(with_login_timeout(settings, timeout)?)?;
            let (tx, rx) = progress::channel();
            let (attempt, ()) = tokio::join!(
                manager.login(platform, &account, None, tx),
                reporter.follow(rx, artifact_out.as_deref()),
            );
            let attempt = attempt?;
            reporter.attempt(&attempt);
            Ok(attempt.outcome.is_success())
        }
        Command::Ensure {
            platform,
            account,
            force,
            timeout,
            artifact_out,
        } => {
            let manager = lifecycle_manager(with_login_timeout(settings, timeout)?)?;
            let (tx, rx) = progress::channel();
            let (valid, ()) = tokio::join!(
                manager.ensure_valid_session_observed(platform, &account, force, tx),
                reporter.follow(rx, artifact_out.as_deref()),
            );
            let valid = valid?;
            reporter.ensured(platform, &account, valid);
            Ok(valid)
        }
    }
}

/// Config file and environment, then command-line overrides
fn load_settings(global: &GlobalArgs) -> Result<Settings> {
    let mut settings = ConfigLoader::new()
        .load(global.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(dir) = &global.sessions_dir {
        settings.storage.sessions_dir = dir.clone();
    }
    if global.verbose {
        settings.logging.verbose = true;
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Apply `--timeout` and check the result like any configured value
fn with_login_timeout(mut settings: Settings, timeout: Option<Duration>) -> Result<Settings> {
    if let Some(timeout) = timeout {
        settings.login.timeout = timeout;
        settings.validate().context("Invalid --timeout")?;
    }
    Ok(settings)
}

fn lifecycle_manager(settings: Settings) -> Result<SessionLifecycleManager> {
    let (login, verify) = browser_drivers(&settings)?;
    Ok(SessionLifecycleManager::with_drivers(settings, login, verify))
}

/// A windowed browser for logins and one for liveness checks
#[cfg(feature = "chromium")]
fn browser_drivers(
    settings: &Settings,
) -> Result<(Arc<dyn BrowserDriver>, Arc<dyn BrowserDriver>)> {
    use crate::config::settings::BrowserSettings;
    use crate::driver::ChromiumDriver;

    let checks = BrowserSettings {
        headless: settings.verify.headless,
        ..settings.browser.clone()
    };
    Ok((
        Arc::new(ChromiumDriver::new(settings.browser.clone())),
        Arc::new(ChromiumDriver::new(checks)),
    ))
}

#[cfg(not(feature = "chromium"))]
fn browser_drivers(
    _settings: &Settings,
) -> Result<(Arc<dyn BrowserDriver>, Arc<dyn BrowserDriver>)> {
    anyhow::bail!(
        "this build has no browser support; rebuild with `--features chromium` to log in or verify sessions"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn global(dir: &TempDir) -> GlobalArgs {
        GlobalArgs {
            sessions_dir: Some(dir.path().to_path_buf()),
            ..GlobalArgs::default()
        }
    }

    #[tokio::test]
    async fn test_list_and_delete_need_no_browser() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        store.write(Platform::Xhs, &Account::default(), "{}").unwrap();

        assert!(run(global(&dir), Command::List).await.unwrap());
        assert!(
            run(
                global(&dir),
                Command::Delete {
                    platform: Platform::Xhs,
                    account: Account::default()
                }
            )
            .await
            .unwrap()
        );
        assert!(!store.exists(Platform::Xhs, &Account::default()));
    }

    #[test]
    fn test_sessions_dir_override() {
        let dir = TempDir::new().unwrap();
        let settings = load_settings(&global(&dir)).unwrap();
        assert_eq!(settings.storage.sessions_dir, dir.path());
    }

    #[tokio::test]
    async fn test_verify_without_record_needs_no_browser() {
        let dir = TempDir::new().unwrap();
        let valid = run(
            global(&dir),
            Command::Verify {
                platform: Platform::Douyin,
                account: Account::default(),
            },
        )
        .await
        .unwrap();
        assert!(!valid);
    }

    #[tokio::test]
    async fn test_zero_ensure_timeout_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = run(
            global(&dir),
            Command::Ensure {
                platform: Platform::Xhs,
                account: Account::default(),
                force: false,
                timeout: Some(Duration::ZERO),
                artifact_out: None,
            },
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("login.timeout must be greater than zero"));
    }

    #[tokio::test]
    async fn test_login_timeout_shorter_than_artifact_wait_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = run(
            global(&dir),
            Command::Login {
                platform: Platform::Kuaishou,
                account: Account::default(),
                timeout: Some(Duration::from_secs(5)),
                artifact_out: None,
            },
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("login.artifact_timeout"));
    }

    #[test]
    fn test_login_timeout_override_is_applied() {
        let settings =
            with_login_timeout(Settings::default(), Some(Duration::from_secs(60))).unwrap();
        assert_eq!(settings.login.timeout, Duration::from_secs(60));

        let settings = with_login_timeout(Settings::default(), None).unwrap();
        assert_eq!(settings.login.timeout, Duration::from_secs(200));
    }

    #[cfg(not(feature = "chromium"))]
    #[tokio::test]
    async fn test_verify_without_browser_support_is_an_error() {
        let dir = TempDir::new().unwrap();
        CredentialStore::new(dir.path())
            .write(Platform::Douyin, &Account::default(), "{}")
            .unwrap();
        let err = run(
            global(&dir),
            Command::Verify {
                platform: Platform::Douyin,
                account: Account::default(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("--features chromium"));
    }
}
