//! In-memory state of one interactive login

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Account, LoginArtifact, Platform};

/// Step of the login state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoginPhase {
    Start,
    ArtifactCaptured,
    AwaitingCompletion,
    Succeeded,
    TimedOut,
    Failed,
}

impl LoginPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::TimedOut | Self::Failed)
    }
}

/// Why an attempt ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum FailureReason {
    /// Login entry point changed or rendered too slowly
    ArtifactNotFound,
    /// Navigation happened but the captured session was rejected
    PostLoginVerificationFailed(String),
    /// The browser session broke mid-flow
    Driver(String),
    /// The captured session could not be persisted
    Storage(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArtifactNotFound => f.write_str("artifact-not-found"),
            Self::PostLoginVerificationFailed(detail) => {
                write!(f, "post-login-verification-failed: {detail}")
            }
            Self::Driver(detail) => write!(f, "driver-error: {detail}"),
            Self::Storage(detail) => write!(f, "storage-error: {detail}"),
        }
    }
}

/// Resolution of a login attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "camelCase")]
pub enum LoginOutcome {
    Pending,
    Succeeded,
    TimedOut,
    Failed(FailureReason),
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// One interactive login, created by the coordinator and dropped once resolved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttempt {
    pub platform: Platform,
    pub account: Account,
    pub start_time: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub artifact: Option<LoginArtifact>,
    pub outcome: LoginOutcome,
    /// Phases entered so far, in order
    pub phases: Vec<LoginPhase>,
}

impl LoginAttempt {
    pub fn new(platform: Platform, account: Account, timeout: Duration) -> Self {
        let start_time = Utc::now();
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| start_time.checked_add_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            platform,
            account,
            start_time,
            deadline,
            artifact: None,
            outcome: LoginOutcome::Pending,
            phases: vec![LoginPhase::Start],
        }
    }

    /// Current phase
    pub fn phase(&self) -> LoginPhase {
        self.phases.last().copied().unwrap_or(LoginPhase::Start)
    }

    /// Move forward; transitions out of a terminal phase are ignored
    pub fn enter(&mut self, phase: LoginPhase) {
        let current = self.phase();
        if current.is_terminal() {
            tracing::warn!(
                platform = %self.platform,
                account = %self.account,
                ?current,
                ?phase,
                "Ignoring transition out of terminal login phase"
            );
            return;
        }

        tracing::debug!(
            platform = %self.platform,
            account = %self.account,
            from = ?current,
            to = ?phase,
            "Login phase transition"
        );
        self.phases.push(phase);
    }

    pub fn capture(&mut self, artifact: LoginArtifact) {
        self.artifact = Some(artifact);
        self.enter(LoginPhase::ArtifactCaptured);
    }

    pub fn succeed(&mut self) {
        self.resolve(LoginOutcome::Succeeded, LoginPhase::Succeeded);
    }

    pub fn time_out(&mut self) {
        self.resolve(LoginOutcome::TimedOut, LoginPhase::TimedOut);
    }

    pub fn fail(&mut self, reason: FailureReason) {
        self.resolve(LoginOutcome::Failed(reason), LoginPhase::Failed);
    }

    fn resolve(&mut self, outcome: LoginOutcome, phase: LoginPhase) {
        if self.is_resolved() {
            return;
        }
        self.outcome = outcome;
        self.enter(phase);
    }

    pub fn is_resolved(&self) -> bool {
        self.phase().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn attempt() -> LoginAttempt {
        LoginAttempt::new(Platform::Douyin, Account::default(), Duration::from_secs(200))
    }

    #[test]
    fn test_new_attempt_is_pending() {
        let attempt = attempt();
        assert_eq!(attempt.outcome, LoginOutcome::Pending);
        assert_eq!(attempt.phase(), LoginPhase::Start);
        assert_eq!(
            (attempt.deadline - attempt.start_time).num_seconds(),
            200
        );
    }

    #[test]
    fn test_happy_path_phase_order() {
        let mut attempt = attempt();
        attempt.capture(LoginArtifact::from_source("https://example.com/qr"));
        attempt.enter(LoginPhase::AwaitingCompletion);
        attempt.succeed();

        assert_eq!(
            attempt.phases,
            vec![
                LoginPhase::Start,
                LoginPhase::ArtifactCaptured,
                LoginPhase::AwaitingCompletion,
                LoginPhase::Succeeded,
            ]
        );
        assert!(attempt.outcome.is_success());
    }

    #[test]
    fn test_terminal_phase_is_sticky() {
        let mut attempt = attempt();
        attempt.time_out();
        attempt.enter(LoginPhase::AwaitingCompletion);
        attempt.fail(FailureReason::ArtifactNotFound);

        assert_eq!(attempt.phase(), LoginPhase::TimedOut);
        assert_eq!(attempt.outcome, LoginOutcome::TimedOut);
        assert_eq!(attempt.phases.len(), 2);
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(FailureReason::ArtifactNotFound.to_string(), "artifact-not-found");
        assert_eq!(
            FailureReason::PostLoginVerificationFailed("logged-out-marker-present".into())
                .to_string(),
            "post-login-verification-failed: logged-out-marker-present"
        );
    }
}
