use std::{net::IpAddr, time::Duration};

use common::error::AppError;
use dom_smoothie::{Config, Readability, TextMode};
use futures::StreamExt;
use tracing::warn;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Why a URL was rejected for ingestion. The API maps `HostNotAllowed` to 403
/// and everything else to 400; the worker treats any of them as terminal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlGuardError {
    #[error("Unsupported URL scheme for ingestion: {0}")]
    UnsupportedScheme(String),
    #[error("URL is missing a host component")]
    MissingHost,
    #[error("Ingestion URL host is not allowed: {0}")]
    HostNotAllowed(String),
}

/// Validates scheme, blocks loopback/private/link-local targets, and applies
/// the configured host allowlist (suffix match). Returns the host on success.
pub fn ensure_ingestion_url_allowed(
    url: &Url,
    allowed_hosts: &[String],
) -> Result<String, UrlGuardError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            warn!(%url, %scheme, "Rejected ingestion URL due to unsupported scheme");
            return Err(UrlGuardError::UnsupportedScheme(scheme.to_string()));
        }
    }

    let Some(host) = url.host_str() else {
        warn!(%url, "Rejected ingestion URL missing host");
        return Err(UrlGuardError::MissingHost);
    };
    let host = host.to_ascii_lowercase();

    if host == "localhost" {
        warn!(%url, host, "Rejected ingestion URL to localhost");
        return Err(UrlGuardError::HostNotAllowed(host));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        let is_disallowed = match ip {
            IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_unique_local() || v6.is_unicast_link_local(),
        };
        if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || is_disallowed {
            warn!(%url, host, %ip, "Rejected ingestion URL pointing to restricted network range");
            return Err(UrlGuardError::HostNotAllowed(host));
        }
    }

    if !allowed_hosts.is_empty() {
        let allowed = allowed_hosts.iter().any(|suffix| {
            host == *suffix || host.ends_with(&format!(".{suffix}"))
        });
        if !allowed {
            warn!(%url, host, "Rejected ingestion URL not on the allowlist");
            return Err(UrlGuardError::HostNotAllowed(host));
        }
    }

    Ok(host)
}

/// Fetches the URL with a byte cap and reduces HTML to readable text.
pub async fn fetch_url_text(url: &str, max_bytes: usize) -> Result<String, AppError> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()?;
    let response = client.get(url).send().await?.error_for_status()?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    if !is_text_content(&content_type) {
        return Err(AppError::Validation(format!(
            "Unsupported URL content-type: {content_type}"
        )));
    }

    let mut body: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if max_bytes > 0 && body.len() + chunk.len() > max_bytes {
            return Err(AppError::Validation(format!(
                "URL content exceeds max size of {max_bytes} bytes."
            )));
        }
        body.extend_from_slice(&chunk);
    }

    let text = String::from_utf8_lossy(&body).to_string();
    if content_type.contains("text/html") || content_type.contains("application/xhtml+xml") {
        readable_text(&text)
    } else {
        Ok(text)
    }
}

/// Runs readability over raw HTML and returns markdown-flavored text.
pub fn readable_text(html: &str) -> Result<String, AppError> {
    let config = Config {
        text_mode: TextMode::Markdown,
        ..Default::default()
    };
    let mut readability = Readability::new(html, None, Some(config))
        .map_err(|err| AppError::Processing(format!("readability setup failed: {err}")))?;
    let article = readability
        .parse()
        .map_err(|err| AppError::Processing(format!("readability parse failed: {err}")))?;
    Ok(article.text_content.to_string())
}

fn is_text_content(content_type: &str) -> bool {
    if content_type.is_empty() {
        return true;
    }
    let ctype = content_type.split(';').next().unwrap_or("").trim();
    ctype.starts_with("text/")
        || matches!(
            ctype,
            "application/json" | "application/xml" | "application/xhtml+xml"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> Url {
        Url::parse(url).expect("url")
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let err = ensure_ingestion_url_allowed(&parse("ftp://example.com"), &[]);
        assert!(matches!(err, Err(UrlGuardError::UnsupportedScheme(_))));
    }

    #[test]
    fn rejects_localhost_and_private_ranges() {
        for target in [
            "http://localhost/page",
            "http://127.0.0.1/page",
            "http://192.168.1.10/index.html",
            "http://169.254.0.9/metadata",
        ] {
            let err = ensure_ingestion_url_allowed(&parse(target), &[]);
            assert!(
                matches!(err, Err(UrlGuardError::HostNotAllowed(_))),
                "{target} should be blocked"
            );
        }
    }

    #[test]
    fn allows_public_host_without_allowlist() {
        let host = ensure_ingestion_url_allowed(&parse("https://sub.example.com/path"), &[])
            .expect("allowed");
        assert_eq!(host, "sub.example.com");
    }

    #[test]
    fn allowlist_matches_host_suffix() {
        let allowlist = vec!["example.com".to_string()];
        assert!(ensure_ingestion_url_allowed(&parse("https://example.com/a"), &allowlist).is_ok());
        assert!(
            ensure_ingestion_url_allowed(&parse("https://docs.example.com/a"), &allowlist).is_ok()
        );
        assert!(matches!(
            ensure_ingestion_url_allowed(&parse("https://evilexample.com/a"), &allowlist),
            Err(UrlGuardError::HostNotAllowed(_))
        ));
        assert!(matches!(
            ensure_ingestion_url_allowed(&parse("https://other.net/a"), &allowlist),
            Err(UrlGuardError::HostNotAllowed(_))
        ));
    }

    #[test]
    fn text_content_detection() {
        assert!(is_text_content("text/html; charset=utf-8"));
        assert!(is_text_content("application/json"));
        assert!(is_text_content(""));
        assert!(!is_text_content("image/png"));
        assert!(!is_text_content("application/pdf"));
    }

    #[test]
    fn readability_reduces_html_to_article_text() {
        let html = "<html><head><title>T</title></head><body>\
            <nav>menu menu menu</nav>\
            <article><h1>Heading</h1>\
            <p>This is the body paragraph of the article with enough prose to keep \
            readability interested in the content extraction process.</p>\
            <p>A second paragraph keeps the scoring stable across versions.</p>\
            </article></body></html>";
        let text = readable_text(html).expect("readable");
        assert!(text.contains("body paragraph"));
    }
}
