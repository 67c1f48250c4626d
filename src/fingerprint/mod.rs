//! Browser Fingerprint
//!
//! Request identity for everything that talks to a provider: the fixed
//! desktop user agent the headless browser presents, and a browser-like
//! header profile for the direct API client.

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::warn;

/// Desktop Chrome user agent used for browsing sessions and as the
/// `User-Agent` fallback when an intercepted request carried none.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const CHROME_MAJOR: &str = "131";
const CHROME_FULL: &str = "131.0.0.0";

/// Browser profile with realistic fingerprint
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub sec_ch_ua: String,
    pub sec_ch_ua_mobile: String,
    pub sec_ch_ua_platform: String,
}

/// Platform configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Windows,
    Linux,
}

impl Platform {
    fn random() -> Self {
        let mut rng = rand::thread_rng();
        // Realistic distribution: Windows 65%, macOS 20%, Linux 15%
        let roll: f32 = rng.gen();
        if roll < 0.65 {
            Platform::Windows
        } else if roll < 0.85 {
            Platform::MacOS
        } else {
            Platform::Linux
        }
    }

    fn os_string(self) -> &'static str {
        match self {
            Platform::MacOS => "Macintosh; Intel Mac OS X 10_15_7",
            Platform::Windows => "Windows NT 10.0; Win64; x64",
            Platform::Linux => "X11; Linux x86_64",
        }
    }

    fn sec_ch_platform(self) -> &'static str {
        match self {
            Platform::MacOS => "\"macOS\"",
            Platform::Windows => "\"Windows\"",
            Platform::Linux => "\"Linux\"",
        }
    }
}

/// Chrome profile on a randomly weighted desktop platform.
///
/// Used for the direct API client, where the provider only sees plain
/// HTTP requests and a consistent-but-plausible identity is enough.
#[must_use]
pub fn chrome_profile() -> BrowserProfile {
    profile_for(Platform::random())
}

/// Chrome profile for a specific platform.
#[must_use]
pub fn profile_for(platform: Platform) -> BrowserProfile {
    let user_agent = format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{CHROME_FULL} Safari/537.36",
        platform.os_string(),
    );

    BrowserProfile {
        user_agent,
        accept: "application/json, text/plain, */*".to_string(),
        accept_language: "en-US,en;q=0.9".to_string(),
        accept_encoding: "gzip, deflate, br, zstd".to_string(),
        sec_ch_ua: format!(
            "\"Google Chrome\";v=\"{CHROME_MAJOR}\", \"Chromium\";v=\"{CHROME_MAJOR}\", \"Not_A Brand\";v=\"24\""
        ),
        sec_ch_ua_mobile: "?0".to_string(),
        sec_ch_ua_platform: platform.sec_ch_platform().to_string(),
    }
}

impl BrowserProfile {
    /// Convert profile to reqwest `HeaderMap`.
    ///
    /// Values that are not valid header text (e.g. a user agent with a
    /// newline from a hand-edited config) are skipped.
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let pairs: [(&'static str, &str); 7] = [
            ("user-agent", &self.user_agent),
            ("accept", &self.accept),
            ("accept-language", &self.accept_language),
            ("accept-encoding", &self.accept_encoding),
            ("sec-ch-ua", &self.sec_ch_ua),
            ("sec-ch-ua-mobile", &self.sec_ch_ua_mobile),
            ("sec-ch-ua-platform", &self.sec_ch_ua_platform),
        ];

        for (name, value) in pairs {
            if value.is_empty() {
                continue;
            }
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    headers.insert(name, v);
                }
                Err(_) => warn!(header = name, "Skipping invalid header value"),
            }
        }

        headers
    }
}
