//! Idempotent download of model checkpoints.
//!
//! A checkpoint is identified by its URL and stored under the last path
//! segment of that URL. If the file is already present nothing is
//! downloaded. Transfers stream to `<name>.part` and are renamed into
//! place only once complete, so an interrupted download never passes for
//! a finished one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

/// Connect and read timeout for checkpoint downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Suffix of in-progress downloads.
const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Cannot derive a filename from URL {0:?}")]
    InvalidUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Download of {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Downloads files over HTTP unless they are already on disk.
#[derive(Clone)]
pub struct AssetFetcher {
    client: reqwest::Client,
}

impl AssetFetcher {
    /// Build a fetcher with redirects enabled and [`DOWNLOAD_TIMEOUT`]
    /// applied to connecting and to each read.
    pub fn new() -> Result<Self, AssetError> {
        let client = reqwest::Client::builder()
            .connect_timeout(DOWNLOAD_TIMEOUT)
            .read_timeout(DOWNLOAD_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(AssetError::Client)?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Make sure `url` is present in `dest_dir` and return its filename.
    pub async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<String, AssetError> {
        let filename = filename_from_url(url)?;
        let dest_path = dest_dir.join(&filename);

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(io_error(dest_dir))?;

        if tokio::fs::try_exists(&dest_path)
            .await
            .map_err(io_error(&dest_path))?
        {
            tracing::debug!(path = %dest_path.display(), "Asset already present");
            return Ok(filename);
        }

        let partial_path = dest_dir.join(format!("{filename}{PARTIAL_SUFFIX}"));
        tracing::info!(url = %url, path = %dest_path.display(), "Downloading asset");

        match self.download(url, &partial_path).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial_path, &dest_path)
                    .await
                    .map_err(io_error(&dest_path))?;
                tracing::info!(path = %dest_path.display(), bytes, "Asset downloaded");
                Ok(filename)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial_path).await {
                    tracing::debug!(error = %cleanup, "No partial download to remove");
                }
                Err(e)
            }
        }
    }

    /// Stream the response body to `path`, returning the bytes written.
    async fn download(&self, url: &str, path: &Path) -> Result<u64, AssetError> {
        let request_error = |source: reqwest::Error| AssetError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(path).await.map_err(io_error(path))?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(request_error)?;
            file.write_all(&chunk).await.map_err(io_error(path))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error(path))?;

        Ok(written)
    }
}

/// Derive the local filename for `url`: the last non-empty path segment,
/// with query string and fragment ignored.
pub fn filename_from_url(url: &str) -> Result<String, AssetError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| AssetError::InvalidUrl(url.to_string()))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .ok_or_else(|| AssetError::InvalidUrl(url.to_string()))
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> AssetError + '_ {
    move |source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    }
}
