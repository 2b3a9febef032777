//! Type definitions for the session lifecycle manager
//!
//! This module contains the data model shared by the store, the verifier and
//! the login coordinator.

pub mod attempt;
pub mod platform;
pub mod progress;
pub mod record;
pub mod verification;

pub use attempt::{FailureReason, LoginAttempt, LoginOutcome, LoginPhase};
pub use platform::{Account, Platform};
pub use progress::{LoginArtifact, ProgressEvent};
pub use record::SessionRecord;
pub use verification::VerificationResult;
