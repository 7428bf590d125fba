//! Visitor identity: deterministic fingerprints and bot detection
//!
//! The fingerprint is the stable visitor key. It is derived server-side from
//! the client IP (raw or already hashed), the user agent and the screen
//! resolution, so clients cannot pick their own identity.

use sha2::{Digest, Sha256};

/// Separator placed between the fingerprint inputs
const FINGERPRINT_SEPARATOR: &str = "|";

/// User agents shorter than this are treated as non-browser clients
pub const MIN_BROWSER_UA_LENGTH: usize = 20;

/// Case-insensitive substrings identifying crawlers, headless browsers and
/// HTTP tooling
const BOT_PATTERNS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "slurp",
    "googlebot",
    "bingbot",
    "yandex",
    "baidu",
    "duckduck",
    "facebook",
    "twitter",
    "linkedin",
    "headless",
    "phantom",
    "selenium",
    "puppeteer",
    "playwright",
    "curl",
    "wget",
    "python",
    "java",
    "ruby",
    "go-http",
    "apache-httpclient",
];

/// Compute the visitor fingerprint as lowercase hex SHA-256 of
/// `ip|user_agent|screen_resolution`.
pub fn fingerprint(ip: &str, user_agent: &str, screen_resolution: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(FINGERPRINT_SEPARATOR.as_bytes());
    hasher.update(user_agent.as_bytes());
    hasher.update(FINGERPRINT_SEPARATOR.as_bytes());
    hasher.update(screen_resolution.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Returns true for known automated clients and implausibly short user agents.
///
/// Matching is deliberately broad ("java" also matches "javascript"); some
/// false positives are accepted.
pub fn is_bot(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();

    if BOT_PATTERNS.iter().any(|pattern| ua.contains(pattern)) {
        return true;
    }

    ua.chars().count() < MIN_BROWSER_UA_LENGTH
}
