//! URL normalization shared by WEB-source guid derivation and dedup.

use url::Url;

const TRACKING_PREFIXES: &[&str] = &["utm_"];
const TRACKING_PARAMS: &[&str] = &["ref", "fbclid", "gclid", "msclkid", "mc_cid", "mc_eid"];

/// Normalize a URL for use as a dedup key: lowercase host, trim a trailing
/// slash from the path (unless the path is just "/"), and strip a fixed set
/// of tracking query params. Invalid input is returned trimmed, unchanged.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut url = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return trimmed.to_string(),
    };

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        if url.set_host(Some(&lowered)).is_err() {
            return trimmed.to_string();
        }
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &kept {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    url.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    let lowered = key.to_lowercase();
    TRACKING_PREFIXES.iter().any(|p| lowered.starts_with(p))
        || TRACKING_PARAMS.contains(&lowered.as_str())
}

/// Resolve a possibly-relative link found in extracted web content against
/// the page it came from. Supports absolute, protocol-relative (`//host/..`)
/// and path-relative links.
pub fn resolve_link(base: &str, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    if let Ok(base_url) = Url::parse(base) {
        if let Ok(joined) = base_url.join(link) {
            return Some(normalize(joined.as_str()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_host_and_trims_trailing_slash() {
        let n = normalize("https://Example.COM/path/");
        assert_eq!(n, "https://example.com/path");
    }

    #[test]
    fn preserves_root_path() {
        let n = normalize("https://example.com/");
        assert_eq!(n, "https://example.com/");
    }

    #[test]
    fn strips_tracking_params_but_keeps_others() {
        let n = normalize("https://example.com/a?utm_source=x&ref=y&q=keep&fbclid=z");
        assert_eq!(n, "https://example.com/a?q=keep");
    }

    #[test]
    fn preserves_fragment() {
        let n = normalize("https://example.com/a#section");
        assert_eq!(n, "https://example.com/a#section");
    }

    #[test]
    fn invalid_input_returns_trimmed_original() {
        let n = normalize("  not a url  ");
        assert_eq!(n, "not a url");
    }

    #[test]
    fn resolves_relative_link_against_base() {
        let r = resolve_link("https://example.com/section/index.html", "../other?utm_source=x").unwrap();
        assert_eq!(r, "https://example.com/other");
    }

    #[test]
    fn resolves_protocol_relative_link() {
        let r = resolve_link("https://example.com/a", "//cdn.example.com/b").unwrap();
        assert_eq!(r, "https://cdn.example.com/b");
    }
}
