//! Platform and account identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Content platform a session belongs to
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Douyin creator center
    Douyin,
    /// Kuaishou creator platform
    Kuaishou,
    /// TikTok Studio
    Tiktok,
    /// WeChat Channels assistant
    Tencent,
    /// Xiaohongshu creator center
    Xhs,
}

impl Platform {
    /// Every supported platform
    pub const ALL: [Platform; 5] = [
        Platform::Douyin,
        Platform::Kuaishou,
        Platform::Tiktok,
        Platform::Tencent,
        Platform::Xhs,
    ];

    /// Stable identifier, also used in record file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Douyin => "douyin",
            Platform::Kuaishou => "kuaishou",
            Platform::Tiktok => "tiktok",
            Platform::Tencent => "tencent",
            Platform::Xhs => "xhs",
        }
    }

    /// Position in [`Platform::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-facing name
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Douyin => "抖音",
            Platform::Kuaishou => "快手",
            Platform::Tiktok => "TikTok",
            Platform::Tencent => "视频号",
            Platform::Xhs => "小红书",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "douyin" => Ok(Platform::Douyin),
            "kuaishou" | "ks" => Ok(Platform::Kuaishou),
            "tiktok" | "tk" => Ok(Platform::Tiktok),
            "tencent" | "channels" => Ok(Platform::Tencent),
            "xhs" | "xiaohongshu" => Ok(Platform::Xhs),
            other => Err(Error::UnknownPlatform(other.to_string())),
        }
    }
}

/// Caller-chosen account name scoping credentials on one platform
///
/// Only ASCII letters, digits, `-`, `_` and `.` are accepted, and the name
/// may not start with a dot, so it can be embedded in a file name as is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Account(String);

impl Account {
    /// Maximum accepted length
    pub const MAX_LEN: usize = 64;

    /// Validate and wrap an account name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= Self::MAX_LEN
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if valid {
            Ok(Self(name))
        } else {
            Err(Error::InvalidAccount(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Account {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Account {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Account {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Account> for String {
    fn from(value: Account) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("douyin", Platform::Douyin)]
    #[case("KUAISHOU", Platform::Kuaishou)]
    #[case("tiktok", Platform::Tiktok)]
    #[case("channels", Platform::Tencent)]
    #[case("xiaohongshu", Platform::Xhs)]
    fn test_platform_from_str(#[case] input: &str, #[case] expected: Platform) {
        assert_eq!(input.parse::<Platform>().unwrap(), expected);
    }

    #[test]
    fn test_platform_unknown() {
        let err = "bilibili".parse::<Platform>().unwrap_err();
        assert!(matches!(err, Error::UnknownPlatform(_)));
    }

    #[test]
    fn test_platform_roundtrip_display() {
        for platform in Platform::ALL {
            assert_eq!(platform.to_string().parse::<Platform>().unwrap(), platform);
            assert!(!platform.as_str().contains('_'));
        }
    }

    #[test]
    fn test_platform_index_matches_all() {
        for (i, platform) in Platform::ALL.into_iter().enumerate() {
            assert_eq!(platform.index(), i);
        }
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::Xhs).unwrap();
        assert_eq!(json, "\"xhs\"");
    }

    #[rstest]
    #[case("default")]
    #[case("brand_main")]
    #[case("shop-01.backup")]
    fn test_account_accepts_safe_names(#[case] name: &str) {
        assert_eq!(Account::new(name).unwrap().as_str(), name);
    }

    #[rstest]
    #[case("")]
    #[case(".hidden")]
    #[case("../escape")]
    #[case("with space")]
    #[case("slash/name")]
    #[case("账号")]
    fn test_account_rejects_unsafe_names(#[case] name: &str) {
        assert!(matches!(Account::new(name), Err(Error::InvalidAccount(_))));
    }

    #[test]
    fn test_account_default() {
        assert_eq!(Account::default().as_str(), "default");
    }

    #[test]
    fn test_account_deserialize_validates() {
        let ok: Account = serde_json::from_str("\"main\"").unwrap();
        assert_eq!(ok.as_str(), "main");
        assert!(serde_json::from_str::<Account>("\"a/b\"").is_err());
    }
}
