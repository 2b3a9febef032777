//! Configuration loading utilities
//!
//! Provides helper functions for loading configuration from various sources
//! with proper error handling and validation.

use crate::{Result, config::Settings};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration loader with multiple source support
#[derive(Debug)]
pub struct ConfigLoader {
    /// Default settings
    defaults: Settings,
}

impl ConfigLoader {
    /// Create new configuration loader
    pub fn new() -> Self {
        Self {
            defaults: Settings::default(),
        }
    }

    /// Load configuration with precedence order:
    /// 1. Command line arguments (applied by the caller, highest priority)
    /// 2. Environment variables
    /// 3. Configuration file
    /// 4. Default values (lowest priority)
    pub fn load(&self, config_file: Option<&Path>) -> Result<Settings> {
        let mut settings = self.defaults.clone();

        // Load from config file if provided
        if let Some(path) = config_file {
            if path.exists() {
                info!("Loading configuration from file: {:?}", path);
                settings = Settings::from_file(path)?;
            } else {
                warn!("Configuration file not found: {:?}, using defaults", path);
            }
        } else if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            info!("Loading configuration from file: {:?}", path);
            settings = Settings::from_file(&path)?;
        }

        // Override with environment variables
        debug!("Applying environment variable overrides");
        settings = settings.merge_with_env()?;

        // Validate final configuration
        settings.validate()?;

        debug!("Final configuration: {:?}", settings);

        Ok(settings)
    }

    /// Load configuration from environment only
    pub fn from_env_only(&self) -> Result<Settings> {
        let settings = Settings::from_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// `<config dir>/upload-session/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("upload-session").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_defaults() {
        let loader = ConfigLoader::new();
        let settings = loader.from_env_only().unwrap();

        assert_eq!(settings.verify.detect_timeout, Duration::from_secs(5));
        assert_eq!(settings.login.artifact_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[storage]
sessions_dir = "/var/lib/upload-session"

[verify]
detect_timeout = "8s"

[login]
settle_delay = "500ms"
        "#
        )
        .unwrap();

        let loader = ConfigLoader::new();
        let settings = loader.load(Some(temp_file.path())).unwrap();

        assert_eq!(settings.verify.detect_timeout, Duration::from_secs(8));
        assert_eq!(settings.login.settle_delay, Duration::from_millis(500));
        assert_eq!(settings.verify.navigation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[verify]\ndetect_timeout = \"soon\"").unwrap();

        let loader = ConfigLoader::new();
        let err = loader.load(Some(temp_file.path())).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let loader = ConfigLoader::new();
        let settings = loader
            .load(Some(Path::new("/nonexistent/upload-session.toml")))
            .unwrap();
        assert_eq!(settings.verify.detect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_env_var_override() {
        unsafe {
            std::env::set_var("UPLOAD_SESSION_LOGIN_TIMEOUT", "90");
            std::env::set_var("LOCAL_CHROME_PATH", "/opt/google/chrome/chrome");
        }

        let loader = ConfigLoader::new();
        let settings = loader.from_env_only().unwrap();

        assert_eq!(settings.login.timeout, Duration::from_secs(90));
        assert_eq!(
            settings.browser.executable.as_deref(),
            Some(Path::new("/opt/google/chrome/chrome"))
        );

        unsafe {
            std::env::remove_var("UPLOAD_SESSION_LOGIN_TIMEOUT");
            std::env::remove_var("LOCAL_CHROME_PATH");
        }
    }
}
