//! Events published to a login observer

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// Human-actionable login token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LoginArtifact {
    /// Inline image, usually a QR code, as a `data:` URL
    Image { data_url: String },
    /// Remote image or page the user has to open
    Link { url: String },
}

impl LoginArtifact {
    const PNG_PREFIX: &'static str = "data:image/png;base64,";

    /// Wrap a PNG screenshot
    pub fn from_png(bytes: &[u8]) -> Self {
        Self::Image {
            data_url: format!("{}{}", Self::PNG_PREFIX, STANDARD.encode(bytes)),
        }
    }

    /// Classify an `src`-like attribute value
    pub fn from_source(src: impl Into<String>) -> Self {
        let src = src.into();
        if src.starts_with("data:") {
            Self::Image { data_url: src }
        } else {
            Self::Link { url: src }
        }
    }

    /// Decoded image bytes for base64 `data:` artifacts
    pub fn image_bytes(&self) -> Option<Vec<u8>> {
        let Self::Image { data_url } = self else {
            return None;
        };
        let (meta, payload) = data_url.strip_prefix("data:")?.split_once(',')?;
        if !meta.ends_with(";base64") {
            return None;
        }
        STANDARD.decode(payload).ok()
    }

    /// Text suitable for a terminal line
    pub fn summary(&self) -> String {
        match self {
            Self::Image { data_url } => {
                let head: String = data_url.chars().take(48).collect();
                format!("image {}… ({} bytes)", head, data_url.len())
            }
            Self::Link { url } => url.clone(),
        }
    }
}

/// Status event on the progress channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// The login artifact is ready for the human
    Artifact { artifact: LoginArtifact },
    /// Login completed and the captured session was verified
    Success,
    /// Nobody completed the login before the deadline
    Timeout,
    /// The attempt failed
    Error { detail: String },
}

impl ProgressEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Artifact { .. })
    }
}
