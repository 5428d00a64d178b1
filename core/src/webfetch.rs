//! `WebBodyFetcher`: HTTP GET + readability-style extraction to markdown,
//! used both by the enrich worker (short content) and the WEB fetcher
//! (full-page body). Blocks localhost/private addresses unless explicitly
//! running in test mode.

use std::net::IpAddr;
use std::time::Duration;

use readability::extractor;

use crate::context::Context;

pub struct WebBodyFetcher {
    client: reqwest::Client,
    allow_private_addresses: bool,
}

impl WebBodyFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent("briefing-core/1.0 (+fetcher)")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            allow_private_addresses: false,
        }
    }

    /// Enables fetching localhost/private-range URLs; only intended for tests.
    pub fn allow_private_for_tests(mut self) -> Self {
        self.allow_private_addresses = true;
        self
    }

    /// Fetches `url` and extracts readable content as markdown. Returns
    /// `None` on any failure; callers treat this as non-fatal.
    pub async fn fetch(&self, ctx: &Context, url: &str) -> Option<String> {
        if !self.allow_private_addresses && is_blocked_host(url) {
            tracing::warn!(user_id = %ctx.user_id, url, "refusing to fetch private/localhost address");
            return None;
        }

        let body = match self.client.get(url).send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => resp.text().await.ok()?,
                Err(e) => {
                    tracing::warn!(user_id = %ctx.user_id, url, error = %e, "web body fetch returned error status");
                    return None;
                }
            },
            Err(e) => {
                tracing::warn!(user_id = %ctx.user_id, url, error = %e, "web body fetch failed");
                return None;
            }
        };

        match extractor::extract(&mut body.as_bytes(), &url.parse().ok()?) {
            Ok(product) => Some(html2text::from_read(product.content.as_bytes(), 100)),
            Err(e) => {
                tracing::warn!(user_id = %ctx.user_id, url, error = %e, "readability extraction failed");
                None
            }
        }
    }
}

fn is_blocked_host(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return true;
    };
    let Some(host) = parsed.host_str() else {
        return true;
    };
    if host == "localhost" {
        return true;
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return is_private_or_loopback(ip);
    }
    false
}

fn is_private_or_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_localhost_and_private_ranges() {
        assert!(is_blocked_host("http://localhost/x"));
        assert!(is_blocked_host("http://127.0.0.1/x"));
        assert!(is_blocked_host("http://10.0.0.5/x"));
        assert!(!is_blocked_host("https://example.com/x"));
    }
}
