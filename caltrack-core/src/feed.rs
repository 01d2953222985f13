//! Feed retrieval.
//!
//! Calendars are published as `http(s)://` or `webcal://` URLs, but a source
//! may also point at a local `.ics` file (`file://` URL or plain path).

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::timeout;
use url::Url;

use crate::error::FetchError;
use crate::source::CalendarSource;

const USER_AGENT: &str = concat!("caltrack/", env!("CARGO_PKG_VERSION"));

/// Anything that can turn a calendar source into raw feed bytes.
pub trait FeedFetcher: Send + Sync {
    fn fetch(
        &self,
        source: &CalendarSource,
    ) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Where a feed lives once its URL has been interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedLocation {
    Remote(Url),
    Local(PathBuf),
}

impl FeedLocation {
    pub fn parse(url: &str) -> Result<Self, FetchError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        // webcal is plain HTTP(S) under another name
        let normalized = match trimmed.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("webcal") => {
                format!("https://{}", rest)
            }
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("webcals") => {
                format!("https://{}", rest)
            }
            _ => trimmed.to_string(),
        };

        match Url::parse(&normalized) {
            Ok(parsed) => match parsed.scheme() {
                "http" | "https" => Ok(FeedLocation::Remote(parsed)),
                "file" => parsed
                    .to_file_path()
                    .map(FeedLocation::Local)
                    .map_err(|_| FetchError::InvalidUrl(url.to_string())),
                _ => Err(FetchError::InvalidUrl(url.to_string())),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(FeedLocation::Local(PathBuf::from(shellexpand::tilde(trimmed).as_ref())))
            }
            Err(_) => Err(FetchError::InvalidUrl(url.to_string())),
        }
    }
}

/// Fetcher backed by reqwest for remote feeds and tokio::fs for local ones.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(fetch_timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(HttpFetcher {
            client,
            timeout: fetch_timeout,
        })
    }

    async fn fetch_location(&self, location: FeedLocation) -> Result<Vec<u8>, FetchError> {
        match location {
            FeedLocation::Remote(url) => {
                log::debug!("GET {}", url);
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| FetchError::Network(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }

                let body = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::Network(e.to_string()))?;
                Ok(body.to_vec())
            }
            FeedLocation::Local(path) => {
                log::debug!("Reading feed from {}", path.display());
                Ok(tokio::fs::read(&path).await?)
            }
        }
    }
}

impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, source: &CalendarSource) -> Result<Vec<u8>, FetchError> {
        let location = FeedLocation::parse(&source.url)?;

        timeout(self.timeout, self.fetch_location(location))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }
}
