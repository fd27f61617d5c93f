//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::bail;
use regex::Regex;

/// Pre-compiled regex for a dotted domain with an alphabetic TLD.
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}$").unwrap()
});

/// Reduce a user-supplied URL to the bare domain stored on the block list.
///
/// Accepts:
/// - bare domains: "reddit.com", "news.ycombinator.com"
/// - URLs: "https://www.youtube.com/watch?v=1" becomes "www.youtube.com"
pub fn normalize_url(input: &str) -> anyhow::Result<String> {
    let lowered = input.trim().to_ascii_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let host = without_scheme
        .trim_end_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();

    if !DOMAIN_RE.is_match(host) {
        bail!("Invalid URL: {input}. Use a domain such as reddit.com");
    }
    Ok(host.to_string())
}

/// Format seconds as `MM:SS`, or `H:MM:SS` from an hour up.
pub fn format_clock(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
