// src/fetch/download.rs

use futures::StreamExt;
use reqwest::{header, Client, Response, StatusCode};
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, instrument};
use url::Url;

use super::FetchError;

/// What a successful download resolved to.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub final_url: Url,
    pub redirects: usize,
    pub bytes: u64,
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Download `url` into `dest`, following at most `max_redirects` redirects.
///
/// The body is streamed into a temporary file next to `dest` and only renamed
/// over it once complete, so a failed run never leaves a truncated file.
#[instrument(level = "info", skip(client, dest), fields(dest = %dest.as_ref().display()))]
pub async fn download_resource(
    client: &Client,
    url: &str,
    dest: impl AsRef<Path>,
    max_redirects: usize,
) -> Result<FetchReport, FetchError> {
    let dest = dest.as_ref();
    let mut current = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    let mut redirects = 0;

    loop {
        let resp = client
            .get(current.clone())
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: current.to_string(),
                source,
            })?;
        let status = resp.status();

        if status.is_success() {
            let bytes = stream_to_file(resp, &current, dest).await?;
            info!(url = %current, redirects, bytes, "downloaded");
            return Ok(FetchReport {
                final_url: current,
                redirects,
                bytes,
            });
        }

        if !is_followed_redirect(status) {
            return Err(FetchError::Status {
                url: current.to_string(),
                status: status.as_u16(),
            });
        }

        if redirects >= max_redirects {
            return Err(FetchError::TooManyRedirects {
                url: url.to_string(),
                max: max_redirects,
            });
        }
        let next = redirect_target(&resp, &current)?;
        debug!(from = %current, to = %next, status = status.as_u16(), "following redirect");
        redirects += 1;
        current = next;
    }
}

/// Resolve the `Location` header, which may be relative, against `current`.
fn redirect_target(resp: &Response, current: &Url) -> Result<Url, FetchError> {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|loc| current.join(loc.trim()).ok())
        .ok_or_else(|| FetchError::MissingLocation {
            url: current.to_string(),
        })
}

async fn stream_to_file(resp: Response, url: &Url, dest: &Path) -> Result<u64, FetchError> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).await?;

    // dropped (and deleted) on any early return below
    let tmp = NamedTempFile::new_in(dir)?;
    let mut file = fs::File::from_std(tmp.reopen()?);

    let mut written = 0u64;
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tmp.persist(dest).map_err(|e| FetchError::Io(e.error))?;
    Ok(written)
}
