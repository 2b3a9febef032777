//! Login progress channel
//!
//! Single producer, single consumer, ordered and unbounded. The coordinator
//! publishes without ever waiting on the consumer; a missing or departed
//! consumer simply does not observe the events.

use tokio::sync::mpsc;

use crate::types::{LoginArtifact, ProgressEvent};

/// Create a connected sender/receiver pair
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender {
            tx: Some(tx),
            artifact_sent: false,
            terminated: false,
        },
        ProgressReceiver { rx },
    )
}

/// Producer half, owned by one login attempt
///
/// Enforces the stream shape: at most one artifact, then exactly one
/// terminal event. Anything published after the terminal event is dropped.
#[derive(Debug)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    artifact_sent: bool,
    terminated: bool,
}

impl ProgressSender {
    /// A sender nobody listens to
    pub fn detached() -> Self {
        Self {
            tx: None,
            artifact_sent: false,
            terminated: false,
        }
    }

    pub fn artifact(&mut self, artifact: LoginArtifact) {
        self.publish(ProgressEvent::Artifact { artifact });
    }

    pub fn success(&mut self) {
        self.publish(ProgressEvent::Success);
    }

    pub fn timeout(&mut self) {
        self.publish(ProgressEvent::Timeout);
    }

    pub fn error(&mut self, detail: impl Into<String>) {
        self.publish(ProgressEvent::Error {
            detail: detail.into(),
        });
    }

    /// Whether a terminal event has been published
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn publish(&mut self, event: ProgressEvent) {
        if self.terminated {
            tracing::warn!(?event, "Dropping progress event after stream end");
            return;
        }
        if matches!(event, ProgressEvent::Artifact { .. }) {
            if self.artifact_sent {
                tracing::warn!("Dropping duplicate login artifact event");
                return;
            }
            self.artifact_sent = true;
        }
        self.terminated = event.is_terminal();

        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(event).is_err() {
            tracing::debug!("Progress consumer went away; continuing unobserved");
            self.tx = None;
        }
    }
}

/// Consumer half
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Next event, or `None` once the stream has ended and the sender is gone
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every event until the stream ends
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            let done = event.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }
        events
    }
}
