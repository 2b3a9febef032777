//! Upload Session - credential session lifecycle for video publishing
//!
//! Keeps per-platform, per-account browser sessions alive for automated
//! publishing to douyin, kuaishou, tiktok, WeChat Channels (tencent) and
//! xiaohongshu (xhs). A session is acquired once through an interactive QR
//! login, persisted as a browser storage state, and verified against the
//! platform before every use.
//!
//! # Architecture
//!
//! - [`session::SessionLifecycleManager`]: `ensure_valid_session`, `verify`,
//!   `login`, `delete`, `list`
//! - [`session::CredentialStore`]: atomic per-key record files
//! - [`session::LivenessVerifier`]: platform-specific logged-out detection
//! - [`session::LoginCoordinator`]: bounded interactive login publishing
//!   progress events
//! - [`driver::BrowserDriver`]: the browser capabilities all of the above use
//!
//! # Usage
//!
//! ```bash
//! upload-session login douyin --account brand_1
//! upload-session verify douyin --account brand_1
//! upload-session list
//! ```
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use upload_session::{Account, Platform, SessionLifecycleManager, Settings};
//! use upload_session::driver::ScriptedDriver;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let manager = SessionLifecycleManager::new(Settings::default(), Arc::new(ScriptedDriver::new()));
//! let ready = manager
//!     .ensure_valid_session(Platform::Douyin, &Account::default(), false)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod platforms;
pub mod session;
pub mod types;
pub mod utils;

pub use config::Settings;
pub use error::{Error, Result};
pub use session::{CredentialStore, SessionLifecycleManager};
pub use types::{Account, Platform, ProgressEvent, SessionRecord, VerificationResult};
