//! Per-platform login and liveness data
//!
//! Everything platform specific lives here as data: the login entry point,
//! the page used for liveness checks, how to reach and read the login
//! artifact, and which markers mean "logged out". The verifier and the login
//! coordinator are shared state machines parameterized by a
//! [`PlatformProfile`].

pub mod detector;

use std::sync::Arc;
use std::time::Duration;

use crate::driver::LocatorSpec;
use crate::types::Platform;

pub use detector::{LoggedOutDetector, MarkerDetector};

/// How to obtain the login artifact on a platform's login page
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    /// Elements to click, in order, before the artifact appears
    pub prelude: Vec<LocatorSpec>,
    /// The artifact element itself
    pub target: LocatorSpec,
}

/// Data describing one platform
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub platform: Platform,
    /// Interactive login entry point
    pub login_url: String,
    /// Page loaded for liveness checks
    pub check_url: String,
    /// Treat a redirect away from `check_url` as logged out
    pub require_landing: bool,
    /// Wait after loading `check_url` before looking for markers
    pub check_settle: Duration,
    pub artifact: ArtifactLocator,
    pub logged_out: Arc<dyn LoggedOutDetector>,
}

impl PlatformProfile {
    /// Built-in profile for `platform`
    pub fn builtin(platform: Platform) -> Self {
        match platform {
            Platform::Douyin => Self {
                platform,
                login_url: "https://creator.douyin.com/".to_string(),
                check_url: "https://creator.douyin.com/creator-micro/content/upload".to_string(),
                require_landing: true,
                check_settle: Duration::from_secs(3),
                artifact: ArtifactLocator {
                    prelude: Vec::new(),
                    target: LocatorSpec::css("img[aria-label='二维码'], img[alt='二维码']"),
                },
                logged_out: Arc::new(MarkerDetector::new(LocatorSpec::text("扫码登录"))),
            },
            Platform::Kuaishou => Self {
                platform,
                login_url: "https://cp.kuaishou.com".to_string(),
                check_url: "https://cp.kuaishou.com/article/publish/video".to_string(),
                require_landing: false,
                check_settle: Duration::ZERO,
                artifact: ArtifactLocator {
                    prelude: vec![
                        LocatorSpec::css_with_text("a", "立即登录"),
                        LocatorSpec::text("扫码登录"),
                    ],
                    target: LocatorSpec::css("img[alt='qrcode']"),
                },
                // The organization-services entry only shows for visitors
                logged_out: Arc::new(MarkerDetector::new(LocatorSpec::css_with_text(
                    "div.names div.container div.name",
                    "机构服务",
                ))),
            },
            Platform::Tiktok => Self {
                platform,
                login_url: "https://www.tiktok.com/tiktokstudio/upload?lang=en".to_string(),
                check_url: "https://www.tiktok.com/tiktokstudio/upload?lang=en".to_string(),
                require_landing: false,
                check_settle: Duration::ZERO,
                artifact: ArtifactLocator {
                    prelude: Vec::new(),
                    target: LocatorSpec::any_of([
                        LocatorSpec::css("canvas[data-e2e='qr-code']"),
                        LocatorSpec::css("div[data-e2e='qr-code'] canvas"),
                        LocatorSpec::css("div[data-e2e='qr-code'] img"),
                        LocatorSpec::css("img[alt*='QR']"),
                        LocatorSpec::css("img[src*='data:image']"),
                        LocatorSpec::css("canvas"),
                    ]),
                },
                logged_out: Arc::new(MarkerDetector::new(LocatorSpec::css(
                    "select[class*='tiktok-'][class*='SelectFormContainer']",
                ))),
            },
            Platform::Tencent => Self {
                platform,
                login_url: "https://channels.weixin.qq.com".to_string(),
                check_url: "https://channels.weixin.qq.com/platform/post/create".to_string(),
                require_landing: false,
                check_settle: Duration::ZERO,
                artifact: ArtifactLocator {
                    prelude: Vec::new(),
                    target: LocatorSpec::in_frame("iframe", LocatorSpec::css("img")),
                },
                logged_out: Arc::new(MarkerDetector::new(LocatorSpec::css_with_text(
                    "div.title-name",
                    "微信小店",
                ))),
            },
            Platform::Xhs => Self {
                platform,
                login_url: "https://creator.xiaohongshu.com/".to_string(),
                check_url: "https://creator.xiaohongshu.com/creator-micro/content/upload"
                    .to_string(),
                require_landing: true,
                check_settle: Duration::ZERO,
                artifact: ArtifactLocator {
                    prelude: vec![LocatorSpec::css("img.css-wemwzq")],
                    target: LocatorSpec::nth(LocatorSpec::css("img"), 2),
                },
                logged_out: Arc::new(MarkerDetector::new(LocatorSpec::any_of([
                    LocatorSpec::text("手机号登录"),
                    LocatorSpec::text("扫码登录"),
                ]))),
            },
        }
    }

    /// Whether `url` is still the liveness page (query and trailing slash
    /// ignored)
    pub fn is_check_url(&self, url: &str) -> bool {
        fn normalize(raw: &str) -> Option<(String, String)> {
            let parsed = url::Url::parse(raw).ok()?;
            let host = parsed.host_str()?.to_ascii_lowercase();
            let path = parsed.path().trim_end_matches('/').to_string();
            Some((host, path))
        }

        match (normalize(url), normalize(&self.check_url)) {
            (Some(actual), Some(expected)) => actual == expected,
            _ => url == self.check_url,
        }
    }
}

/// Profiles for every platform, with per-platform overrides
#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: [PlatformProfile; Platform::ALL.len()],
}

impl ProfileSet {
    /// All built-in profiles
    pub fn builtin() -> Self {
        Self {
            profiles: Platform::ALL.map(PlatformProfile::builtin),
        }
    }

    /// Replace the profile of `profile.platform`
    pub fn with_profile(mut self, profile: PlatformProfile) -> Self {
        let slot = profile.platform.index();
        self.profiles[slot] = profile;
        self
    }

    pub fn get(&self, platform: Platform) -> &PlatformProfile {
        &self.profiles[platform.index()]
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Platform::Douyin)]
    #[case(Platform::Kuaishou)]
    #[case(Platform::Tiktok)]
    #[case(Platform::Tencent)]
    #[case(Platform::Xhs)]
    fn test_builtin_profiles_have_valid_urls(#[case] platform: Platform) {
        let profile = PlatformProfile::builtin(platform);
        assert_eq!(profile.platform, platform);
        assert!(url::Url::parse(&profile.login_url).is_ok());
        assert!(url::Url::parse(&profile.check_url).is_ok());
        assert!(profile.is_check_url(&profile.check_url));
    }

    #[test]
    fn test_is_check_url_ignores_query_and_slash() {
        let profile = PlatformProfile::builtin(Platform::Xhs);
        assert!(profile.is_check_url(
            "https://creator.xiaohongshu.com/creator-micro/content/upload/?from=menu"
        ));
        assert!(!profile.is_check_url("https://creator.xiaohongshu.com/login"));
    }

    #[test]
    fn test_profile_set_override() {
        let mut custom = PlatformProfile::builtin(Platform::Douyin);
        custom.check_settle = Duration::ZERO;
        let set = ProfileSet::builtin().with_profile(custom);

        assert_eq!(set.get(Platform::Douyin).check_settle, Duration::ZERO);
        assert_eq!(set.get(Platform::Kuaishou).platform, Platform::Kuaishou);
    }
}
