//! Media resolution: turning a user-supplied reference into a [`Track`].
//!
//! Resolution may block on the network and is never deterministic: the same
//! reference can resolve to a different stream on retry. Callers resolve
//! before touching any session state.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Url};
use thiserror::Error;

use crate::track::{Requester, Track};
use crate::utils::strip_extension;

/// Title used when nothing better can be derived.
pub const UNKNOWN_TITLE: &str = "Unknown title";

/// Errors from resolving a reference.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The reference is not something this resolver understands.
    #[error("Unsupported reference: {0}")]
    Unsupported(String),

    /// Network request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP error status {0}")]
    HttpStatus(u16),

    /// The reference points at something that is not playable media.
    #[error("No playable media at {0}")]
    NoMedia(String),
}

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Resolves references to playable tracks.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `reference` on behalf of `requester`.
    async fn resolve(&self, reference: &str, requester: &Requester) -> ResolveResult<Track>;
}

/// Resolves direct `http`/`https` media links.
///
/// Issues a GET, checks the status and content type, and reads the title
/// from the response headers or the URL. The body is never read; the
/// transport fetches it again at play time.
pub struct HttpResolver {
    client: Client,
    timeout: Duration,
}

impl HttpResolver {
    /// Creates a resolver using the shared HTTP client.
    ///
    /// `timeout` bounds each resolution request; the shared client itself
    /// has no overall timeout because relay bodies stream indefinitely.
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self, reference: &str, requester: &Requester) -> ResolveResult<Track> {
        let url = parse_reference(reference)?;
        log::debug!("[Resolver] Resolving {}", url);

        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::HttpStatus(status.as_u16()));
        }
        if is_html(response.headers()) {
            return Err(ResolveError::NoMedia(reference.to_string()));
        }

        // Redirects are followed by the client; play the final location.
        let final_url = response.url().clone();
        let title = title_from_headers(response.headers())
            .or_else(|| title_from_url(&final_url))
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

        log::info!("[Resolver] Resolved {} -> '{}'", reference, title);
        Ok(Track::new(final_url.to_string(), title, requester.clone()))
    }
}

/// Parses a reference as an `http`/`https` URL.
fn parse_reference(reference: &str) -> ResolveResult<Url> {
    let trimmed = reference.trim();
    let url =
        Url::parse(trimmed).map_err(|_| ResolveError::Unsupported(trimmed.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ResolveError::Unsupported(trimmed.to_string())),
    }
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().starts_with("text/html"))
        .unwrap_or(false)
}

/// Reads a display title from `icy-name` or a `Content-Disposition` filename.
fn title_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(name) = headers.get("icy-name").and_then(|v| v.to_str().ok()) {
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    let disposition = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    disposition.split(';').find_map(|part| {
        let value = part.trim().strip_prefix("filename=")?;
        let value = value.trim_matches('"');
        let value = strip_extension(value).trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Uses the last path segment, percent-decoded and without its extension.
fn title_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).ok()?;
    let title = strip_extension(&decoded).trim().to_string();
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve, test_client};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use reqwest::header::HeaderValue;

    fn resolver() -> HttpResolver {
        HttpResolver::new(test_client(), Duration::from_secs(5))
    }

    #[test]
    fn rejects_non_http_references() {
        assert!(matches!(
            parse_reference("never gonna give you up"),
            Err(ResolveError::Unsupported(_))
        ));
        assert!(matches!(
            parse_reference("ftp://host/file.mp3"),
            Err(ResolveError::Unsupported(_))
        ));
    }

    #[test]
    fn accepts_http_and_https() {
        assert!(parse_reference("http://host/a.mp3").is_ok());
        assert!(parse_reference("  https://host/a.mp3 ").is_ok());
    }

    #[test]
    fn icy_name_wins_over_disposition() {
        let mut headers = HeaderMap::new();
        headers.insert("icy-name", HeaderValue::from_static("Radio One"));
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"other.mp3\""),
        );
        assert_eq!(title_from_headers(&headers).as_deref(), Some("Radio One"));
    }

    #[test]
    fn disposition_filename_without_extension() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"My Song.ogg\""),
        );
        assert_eq!(title_from_headers(&headers).as_deref(), Some("My Song"));
    }

    #[test]
    fn url_title_is_decoded() {
        let url = Url::parse("http://host/music/My%20Song.mp3").unwrap();
        assert_eq!(title_from_url(&url).as_deref(), Some("My Song"));
    }

    #[test]
    fn url_without_path_has_no_title() {
        let url = Url::parse("http://host/").unwrap();
        assert_eq!(title_from_url(&url), None);
    }

    #[test]
    fn html_content_is_detected() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        assert!(is_html(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
        assert!(!is_html(&headers));
    }

    #[tokio::test]
    async fn resolves_title_from_disposition_header() {
        let addr = serve(Router::new().route(
            "/dl",
            get(|| async {
                (
                    [
                        (CONTENT_TYPE, "audio/mpeg"),
                        (CONTENT_DISPOSITION, "attachment; filename=\"Blue Monday.mp3\""),
                    ],
                    "data",
                )
            }),
        ))
        .await;

        let track = resolver()
            .resolve(&format!("http://{addr}/dl"), &Requester::new("alice"))
            .await
            .unwrap();

        assert_eq!(track.title(), "Blue Monday");
        assert_eq!(track.source(), format!("http://{addr}/dl"));
        assert_eq!(track.requester().as_str(), "alice");
    }

    #[tokio::test]
    async fn falls_back_to_path_segment_title() {
        let addr = serve(Router::new().route(
            "/music/{file}",
            get(|| async { ([(CONTENT_TYPE, "audio/ogg")], "data") }),
        ))
        .await;

        let track = resolver()
            .resolve(
                &format!("http://{addr}/music/Night%20Drive.ogg"),
                &Requester::new("bob"),
            )
            .await
            .unwrap();

        assert_eq!(track.title(), "Night Drive");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let addr = serve(Router::new().route(
            "/gone",
            get(|| async { StatusCode::GONE }),
        ))
        .await;

        let err = resolver()
            .resolve(&format!("http://{addr}/gone"), &Requester::new("bob"))
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::HttpStatus(410)));
    }

    #[tokio::test]
    async fn html_pages_are_not_media() {
        let addr = serve(Router::new().route(
            "/page",
            get(|| async { axum::response::Html("<html></html>") }),
        ))
        .await;

        let err = resolver()
            .resolve(&format!("http://{addr}/page"), &Requester::new("bob"))
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::NoMedia(_)));
    }
}
