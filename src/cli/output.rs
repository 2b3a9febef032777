//! Human and JSON rendering of command results

use std::path::Path;

use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::session::{ProgressReceiver, SessionListing};
use crate::types::{Account, LoginAttempt, Platform, ProgressEvent, VerificationResult};

/// Writes command results to stdout
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    json: bool,
}

impl Reporter {
    /// `json` switches every line to a JSON document
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) {
        if self.json {
            match serde_json::to_string(value) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Could not serialize output: {}", e),
            }
        } else {
            println!("{}", human());
        }
    }

    /// Print progress events until the stream ends
    ///
    /// PNG artifacts are also written to `artifact_out` when given.
    pub async fn follow(&self, mut events: ProgressReceiver, artifact_out: Option<&Path>) {
        while let Some(event) = events.recv().await {
            if let ProgressEvent::Artifact { artifact } = &event
                && let Some(path) = artifact_out
            {
                match artifact.image_bytes() {
                    Some(bytes) => match std::fs::write(path, bytes) {
                        Ok(()) => eprintln!("Login QR code written to {}", path.display()),
                        Err(e) => warn!("Could not write artifact to {:?}: {}", path, e),
                    },
                    None => warn!("Login artifact is a link, nothing written to {:?}", path),
                }
            }

            self.emit(&event, || match &event {
                ProgressEvent::Artifact { artifact } => {
                    format!("Scan to log in: {}", artifact.summary())
                }
                ProgressEvent::Success => "Login succeeded".to_string(),
                ProgressEvent::Timeout => "Login timed out".to_string(),
                ProgressEvent::Error { detail } => format!("Login failed: {detail}"),
            });
        }
    }

    pub fn attempt(&self, attempt: &LoginAttempt) {
        if self.json {
            self.emit(attempt, String::new);
        }
    }

    pub fn verification(&self, platform: Platform, account: &Account, result: &VerificationResult) {
        self.emit(
            &json!({ "platform": platform, "account": account, "result": result }),
            || {
                format!(
                    "{platform}/{account}: {} ({})",
                    if result.valid { "valid" } else { "invalid" },
                    result.reason
                )
            },
        );
    }

    pub fn ensured(&self, platform: Platform, account: &Account, valid: bool) {
        self.emit(
            &json!({ "platform": platform, "account": account, "valid": valid }),
            || {
                format!(
                    "{platform}/{account}: {}",
                    if valid { "ready" } else { "no valid session" }
                )
            },
        );
    }

    pub fn listing(&self, listing: &SessionListing) {
        if self.json {
            self.emit(listing, String::new);
            return;
        }
        if listing.is_empty() {
            println!("No stored sessions");
            return;
        }
        for (platform, accounts) in listing {
            println!("{} ({})", platform, platform.display_name());
            for account in accounts {
                println!("  {account}");
            }
        }
    }

    pub fn deleted(&self, platform: Platform, account: &Account) {
        self.emit(
            &json!({ "platform": platform, "account": account, "deleted": true }),
            || format!("Deleted {platform}/{account}"),
        );
    }
}
