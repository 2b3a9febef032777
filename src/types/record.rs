//! Persisted session record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Account, Platform};

/// One persisted login session for a (platform, account) pair
///
/// `blob` is the browser driver's serialized storage state. It is written and
/// read back verbatim and never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub platform: Platform,
    pub account: Account,
    #[serde(rename = "storageState")]
    pub blob: String,
    pub saved_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a record stamped with the current time
    pub fn new(platform: Platform, account: Account, blob: impl Into<String>) -> Self {
        Self {
            platform,
            account,
            blob: blob.into(),
            saved_at: Utc::now(),
        }
    }

    /// Time since the record was saved
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.saved_at
    }
}
