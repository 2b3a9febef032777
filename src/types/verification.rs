//! Liveness check result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verdict of one liveness check
///
/// Never persisted. `reason` is a short diagnostic meant for logs and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub valid: bool,
    pub reason: String,
    pub checked_at: DateTime<Utc>,
}

impl VerificationResult {
    pub const ACCEPTED: &'static str = "session-accepted";
    pub const NO_RECORD: &'static str = "no-stored-session";
    pub const LOGGED_OUT: &'static str = "logged-out-marker-present";
    pub const REDIRECTED: &'static str = "redirected-away-from-check-url";
    pub const NETWORK_OR_TIMEOUT: &'static str = "network-or-timeout";

    /// The platform accepted the session
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: Self::ACCEPTED.to_string(),
            checked_at: Utc::now(),
        }
    }

    /// The session must not be used
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
            checked_at: Utc::now(),
        }
    }

    /// Invalid because the check itself failed
    pub fn inconclusive(detail: impl std::fmt::Display) -> Self {
        Self::invalid(format!("{}: {}", Self::NETWORK_OR_TIMEOUT, detail))
    }

    pub fn is_inconclusive(&self) -> bool {
        self.reason.starts_with(Self::NETWORK_OR_TIMEOUT)
    }
}
