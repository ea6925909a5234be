//! Website enrichment: page fetching and contact email extraction.

use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use tracing::debug;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Substrings that mark an address as machine noise rather than a
/// mailbox a human reads.
const JUNK_MARKERS: &[&str] = &[
    "sentry",
    "noreply",
    "no-reply",
    "donotreply",
    "example.",
    "wixpress",
    "wordpress",
    "schema.org",
    ".png",
    ".jpg",
    ".jpeg",
    ".gif",
    ".svg",
    ".webp",
];

/// Local parts that usually reach a decision maker, best first.
const PREFERRED_PREFIXES: &[&str] = &["info@", "contact@", "contacto@", "hello@", "admin@"];

/// Trait for page retrieval. Returns the raw body, or an empty string
/// when the site is unreachable; an unreachable website is ordinary
/// data, not an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> String;
}

/// Plain HTTP fetcher with a browser user agent. Many small-business
/// sites answer 403 to anything that does not look like a browser.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> String {
        match self.client.get(url).send().await {
            Ok(response) => response.text().await.unwrap_or_default(),
            Err(error) => {
                debug!(%url, %error, "page fetch failed");
                String::new()
            }
        }
    }
}

/// Pick the best contact email out of a page body.
///
/// `mailto:` links win outright since someone put them there to be
/// written to. Among scraped addresses, role mailboxes like `info@` are
/// preferred over whatever else the page leaks.
pub fn extract_contact_email(body: &str) -> Option<String> {
    let candidates = extract_emails(body);
    if candidates.is_empty() {
        return None;
    }

    if let Some(linked) = mailto_target(body) {
        if candidates.iter().any(|c| c == &linked) {
            return Some(linked);
        }
    }

    for prefix in PREFERRED_PREFIXES {
        if let Some(found) = candidates.iter().find(|c| c.starts_with(prefix)) {
            return Some(found.clone());
        }
    }

    candidates.into_iter().next()
}

/// All plausible addresses in a page body, junk filtered, order kept,
/// deduplicated.
pub fn extract_emails(body: &str) -> Vec<String> {
    // regex-lite has no compile-once macro; the pattern is tiny and
    // stages batch their calls, so compiling per call is acceptable.
    let Ok(pattern) = Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}") else {
        return Vec::new();
    };

    let mut seen = Vec::new();
    for found in pattern.find_iter(body) {
        let email = found.as_str().to_lowercase();
        if !is_plausible(&email) {
            continue;
        }
        if !seen.contains(&email) {
            seen.push(email);
        }
    }
    seen
}

fn is_plausible(email: &str) -> bool {
    if email.len() < 6 || email.len() > 50 {
        return false;
    }
    !JUNK_MARKERS.iter().any(|marker| email.contains(marker))
}

fn mailto_target(body: &str) -> Option<String> {
    let Ok(pattern) = Regex::new(r#"mailto:([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})"#)
    else {
        return None;
    };
    pattern
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_and_lowercases() {
        let body = "Write to Sales@Example-Shop.com for a quote.";
        assert_eq!(extract_emails(body), vec!["sales@example-shop.com"]);
    }

    #[test]
    fn test_filters_junk_addresses() {
        let body = "a1b2c3@sentry.wixpress.com noreply@shop.com logo@2x.png@shop.com \
                    real@shop.com";
        assert_eq!(extract_emails(body), vec!["real@shop.com"]);
    }

    #[test]
    fn test_filters_length_outliers() {
        let long = format!("{}@x.com", "a".repeat(60));
        let body = format!("a@b.c {long} ok@shop.com");
        assert_eq!(extract_emails(&body), vec!["ok@shop.com"]);
    }

    #[test]
    fn test_mailto_wins() {
        let body = r#"press@shop.com <a href="mailto:owner@shop.com">write us</a>"#;
        assert_eq!(
            extract_contact_email(body).as_deref(),
            Some("owner@shop.com")
        );
    }

    #[test]
    fn test_role_mailbox_preferred() {
        let body = "webmaster@shop.com then info@shop.com somewhere";
        assert_eq!(
            extract_contact_email(body).as_deref(),
            Some("info@shop.com")
        );
    }

    #[test]
    fn test_falls_back_to_first_plausible() {
        let body = "owner@shop.com and later press@shop.com";
        assert_eq!(
            extract_contact_email(body).as_deref(),
            Some("owner@shop.com")
        );
    }

    #[test]
    fn test_empty_page_yields_none() {
        assert_eq!(extract_contact_email(""), None);
        assert_eq!(extract_contact_email("no addresses here"), None);
    }
}
