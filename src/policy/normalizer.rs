use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("`{0}` is not an absolute URL")]
    NotAbsolute(String),
    #[error("`{0}` has no host")]
    MissingHost(String),
}

/// Scheme plus host (and explicit port) with a trailing slash; path, query and fragment dropped.
pub fn domain_root(raw: &str) -> Result<String, NormalizeError> {
    let url = Url::parse(raw.trim()).map_err(|_| NormalizeError::NotAbsolute(raw.to_string()))?;
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| NormalizeError::MissingHost(raw.to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
        None => format!("{}://{}/", url.scheme(), host),
    })
}

/// Request URLs are stored against the platform with an `http://` scheme.
pub fn canonical_request_url(raw: &str, downgrade_https: bool) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("https://") {
        Some(rest) if downgrade_https => format!("http://{rest}"),
        _ => trimmed.to_string(),
    }
}

/// Last path segment of a traffic report link.
pub fn report_key_from_link(link: &str) -> Option<&str> {
    link.trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_root_drops_path_and_query() {
        assert_eq!(
            domain_root("https://shop.example.com/cart?x=1").as_deref(),
            Ok("https://shop.example.com/")
        );
        assert_eq!(
            domain_root("http://news.example.org").as_deref(),
            Ok("http://news.example.org/")
        );
        assert_eq!(
            domain_root("http://intra.example.org:8080/a/b#frag").as_deref(),
            Ok("http://intra.example.org:8080/")
        );
    }

    #[test]
    fn domain_root_rejects_relative_input() {
        assert_eq!(
            domain_root("shop.example.com/cart"),
            Err(NormalizeError::NotAbsolute("shop.example.com/cart".into()))
        );
    }

    #[test]
    fn https_downgrade_is_optional() {
        assert_eq!(
            canonical_request_url("https://a.example/x", true),
            "http://a.example/x"
        );
        assert_eq!(
            canonical_request_url("https://a.example/x", false),
            "https://a.example/x"
        );
        assert_eq!(
            canonical_request_url(" http://a.example/ ", true),
            "http://a.example/"
        );
    }

    #[test]
    fn report_key_is_last_segment() {
        assert_eq!(
            report_key_from_link("https://netfree.link/app/#/traffic/abc123"),
            Some("abc123")
        );
        assert_eq!(report_key_from_link("abc123/"), Some("abc123"));
        assert_eq!(report_key_from_link(""), None);
    }
}
