//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

/// Test helper functions
pub mod helpers {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;
    use upload_session::{config::Settings, driver::ScriptedDriver, session::SessionLifecycleManager};

    /// Where a scripted douyin login lands once the QR code is scanned
    pub const DOUYIN_HOME: &str = "https://creator.douyin.com/creator-micro/home";

    /// Default login deadline used by the tests
    pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(200);

    /// A manager over a scripted browser and a throwaway session directory
    pub struct TestEnv {
        pub dir: TempDir,
        pub driver: Arc<ScriptedDriver>,
        pub manager: Arc<SessionLifecycleManager>,
    }

    /// Settings pointing the store at `sessions_dir`
    pub fn create_test_settings(sessions_dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.storage.sessions_dir = sessions_dir.to_path_buf();
        settings.login.timeout = LOGIN_TIMEOUT;
        settings
    }

    /// Create a test environment with the built-in platform profiles
    pub fn create_test_env() -> TestEnv {
        let dir = TempDir::new().expect("create temp dir");
        let driver = Arc::new(ScriptedDriver::new());
        let manager = SessionLifecycleManager::new(
            create_test_settings(&dir.path().join("sessions")),
            driver.clone(),
        );
        TestEnv {
            dir,
            driver,
            manager: Arc::new(manager),
        }
    }
}
