// src/fetch/mod.rs

use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    redirect, Client,
};
use std::time::Duration;
use thiserror::Error;

pub mod download;

pub use download::{download_resource, FetchReport};

/// Some council download endpoints reject reqwest's default identity.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("GET {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("redirect from {url} has no usable Location header")]
    MissingLocation { url: String },
    #[error("gave up on {url} after {max} redirects")]
    TooManyRedirects { url: String, max: usize },
    #[error("building HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("writing downloaded file")]
    Io(#[from] std::io::Error),
}

/// Client for the spreadsheet download. Redirects are not followed
/// automatically; `download_resource` walks them itself so it can cap depth.
pub fn build_download_client(timeout: Duration) -> Result<Client, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );

    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .redirect(redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(FetchError::Client)
}
