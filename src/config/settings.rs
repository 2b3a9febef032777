//! Configuration settings structure
//!
//! Defines the main settings structure and loading logic for the session
//! lifecycle manager.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Main configuration settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Session record storage
    pub storage: StorageSettings,
    /// Browser launch configuration
    pub browser: BrowserSettings,
    /// Interactive login configuration
    pub login: LoginSettings,
    /// Liveness check configuration
    pub verify: VerifySettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Where session records live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// One `<platform>_<account>.json` file per session
    pub sessions_dir: PathBuf,
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run without a window; logins need a visible one
    pub headless: bool,
    /// Chrome binary to launch instead of the auto-detected one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    /// Upper bound for a page load
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
}

/// Interactive login configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    /// Time the human has to complete the login
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Time allowed to locate the login artifact
    #[serde(with = "humantime_serde")]
    pub artifact_timeout: Duration,
    /// Fixed wait for the artifact to finish rendering
    #[serde(with = "humantime_serde")]
    pub artifact_render_wait: Duration,
    /// Wait after the success navigation before exporting storage
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
}

/// Liveness check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySettings {
    /// Run liveness checks without a window
    pub headless: bool,
    /// Time allowed for the logged-out detection step
    #[serde(with = "humantime_serde")]
    pub detect_timeout: Duration,
    /// Upper bound for loading the check page
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level
    pub level: String,
    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sessions_dir: default_sessions_dir(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            executable: None,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(200),
            artifact_timeout: Duration::from_secs(20),
            artifact_render_wait: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
        }
    }
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            headless: true,
            detect_timeout: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
        }
    }
}

/// `<data dir>/upload-session/sessions`, or `./sessions` without a data dir
pub fn default_sessions_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("upload-session").join("sessions"))
        .unwrap_or_else(|| PathBuf::from("sessions"))
}

impl Settings {
    /// Create new settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| Error::config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().merge_with_env()
    }

    /// Apply environment variable overrides
    pub fn merge_with_env(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("UPLOAD_SESSION_DIR") {
            self.storage.sessions_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("LOCAL_CHROME_PATH")
            && !path.is_empty()
        {
            self.browser.executable = Some(PathBuf::from(path));
        }

        if let Ok(headless) = std::env::var("UPLOAD_SESSION_HEADLESS") {
            self.browser.headless = parse_bool(&headless).ok_or_else(|| {
                Error::config(format!("Invalid UPLOAD_SESSION_HEADLESS: {headless}"))
            })?;
        }

        if let Ok(secs) = std::env::var("UPLOAD_SESSION_LOGIN_TIMEOUT") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::config(format!("Invalid login timeout: {}", e)))?;
            self.login.timeout = Duration::from_secs(secs);
        }

        if let Ok(level) = std::env::var("UPLOAD_SESSION_LOG") {
            self.logging.level = level;
        }

        Ok(self)
    }

    /// Reject settings the lifecycle manager cannot run with
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("login.timeout", self.login.timeout),
            ("login.artifact_timeout", self.login.artifact_timeout),
            ("verify.detect_timeout", self.verify.detect_timeout),
            ("verify.navigation_timeout", self.verify.navigation_timeout),
            ("browser.navigation_timeout", self.browser.navigation_timeout),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }

        if self.login.artifact_timeout >= self.login.timeout {
            return Err(Error::config(
                "login.artifact_timeout must be shorter than login.timeout",
            ));
        }

        if self.storage.sessions_dir.as_os_str().is_empty() {
            return Err(Error::config("storage.sessions_dir must not be empty"));
        }

        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
