//! Session credential lifecycle
//!
//! - [`CredentialStore`]: one atomically replaced record per (platform, account)
//! - [`LivenessVerifier`]: asks the platform whether a stored session still works
//! - [`LoginCoordinator`]: runs a bounded, human-assisted login
//! - [`progress`]: ordered status events from a login to its observer
//! - [`SessionLifecycleManager`]: ties the above together behind
//!   `ensure_valid_session`, `verify`, `login`, `delete` and `list`

pub mod coordinator;
pub mod manager;
pub mod progress;
pub mod store;
pub mod verifier;

pub use coordinator::LoginCoordinator;
pub use manager::SessionLifecycleManager;
pub use progress::{ProgressReceiver, ProgressSender};
pub use store::{CredentialStore, SessionListing};
pub use verifier::LivenessVerifier;
