//! Fingerprint bundle: a self-consistent browser identity used for one
//! session's lifetime. The core only requires that a supplied bundle is
//! internally consistent (Chrome major version agrees between the
//! `User-Agent` and `sec-ch-ua` header, OS agrees between `User-Agent` and
//! `sec-ch-ua-platform`); the actual randomization tables this ships with
//! are a small literal seed, not an exhaustive data source; a real
//! deployment is expected to swap in the external randomization module
//! named in scope via [`FingerprintSource`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};

/// One internally-consistent identity bundle for a session.
#[derive(Debug, Clone)]
pub struct FingerprintBundle {
    pub user_agent: String,
    pub chrome_major: u32,
    pub platform: String,
    pub sec_ch_ua_platform: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_pixel_ratio: f32,
}

impl FingerprintBundle {
    /// Headers common to every request made under this fingerprint.
    pub fn header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_str(&self.user_agent).unwrap());
        headers.insert(
            "sec-ch-ua",
            HeaderValue::from_str(&format!(
                "\"Chromium\";v=\"{major}\", \"Not.A/Brand\";v=\"8\", \"Google Chrome\";v=\"{major}\"",
                major = self.chrome_major
            ))
            .unwrap(),
        );
        headers.insert(
            "sec-ch-ua-platform",
            HeaderValue::from_str(&format!("\"{}\"", self.sec_ch_ua_platform)).unwrap(),
        );
        headers.insert("accept-language", HeaderValue::from_static("en-US,en;q=0.9"));
        headers
    }

    /// The `wd` viewport cookie value (`WxH`).
    pub fn viewport_cookie(&self) -> String {
        format!("{}x{}", self.viewport_width, self.viewport_height)
    }

    /// The `dpr` cookie value.
    pub fn dpr_cookie(&self) -> String {
        self.device_pixel_ratio.to_string()
    }

    /// A synthetic opaque 24-character `datr` token, generated locally
    /// (not derived from anything server-issued).
    pub fn synthesize_datr(&self) -> String {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
        (0..24)
            .map(|_| ALPHABET[fastrand::usize(..ALPHABET.len())] as char)
            .collect()
    }

    /// `true` if the User-Agent's Chrome major version, OS, and the
    /// `sec-ch-ua-platform` hint agree with each other.
    pub fn is_internally_consistent(&self) -> bool {
        let ua_has_chrome_major = self
            .user_agent
            .contains(&format!("Chrome/{}.", self.chrome_major));
        let ua_has_platform = self.user_agent.contains(&self.platform);
        ua_has_chrome_major && ua_has_platform
    }
}

/// Source of fingerprint bundles, consulted once per session bootstrap.
/// Implementations may be backed by large literal tables (the browser
/// fingerprint randomization module named in scope); the engine only
/// depends on this trait.
#[async_trait]
pub trait FingerprintSource: Send + Sync {
    async fn next_bundle(&self) -> FingerprintBundle;
}

/// A small built-in table of self-consistent bundles, sufficient as a
/// default and as a drop-in stand-in for a richer external source.
pub struct BuiltinFingerprintSource {
    table: Vec<FingerprintBundle>,
}

impl BuiltinFingerprintSource {
    pub fn new() -> Self {
        Self {
            table: vec![
                FingerprintBundle {
                    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".into(),
                    chrome_major: 124,
                    platform: "Windows".into(),
                    sec_ch_ua_platform: "Windows".into(),
                    viewport_width: 1920,
                    viewport_height: 1080,
                    device_pixel_ratio: 1.0,
                },
                FingerprintBundle {
                    user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36".into(),
                    chrome_major: 123,
                    platform: "Mac OS X".into(),
                    sec_ch_ua_platform: "macOS".into(),
                    viewport_width: 1680,
                    viewport_height: 1050,
                    device_pixel_ratio: 2.0,
                },
                FingerprintBundle {
                    user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".into(),
                    chrome_major: 125,
                    platform: "Linux".into(),
                    sec_ch_ua_platform: "Linux".into(),
                    viewport_width: 1366,
                    viewport_height: 768,
                    device_pixel_ratio: 1.0,
                },
            ],
        }
    }
}

impl Default for BuiltinFingerprintSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FingerprintSource for BuiltinFingerprintSource {
    async fn next_bundle(&self) -> FingerprintBundle {
        let idx = fastrand::usize(..self.table.len());
        self.table[idx].clone()
    }
}
