use futures_util::StreamExt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::artifact::ProvisionError;

/// Transport behind artifact provisioning. The HTTP implementation is used in
/// production; tests substitute an in-memory fetcher to count fetches.
pub trait Fetcher {
    /// Streams the body at `url` into a file at `dest`, returning the number
    /// of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ProvisionError>;
}

#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ProvisionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ProvisionError::Fetch {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::FetchStatus {
                url: url.to_string(),
                status,
            });
        }

        let mut file = File::create(dest).map_err(|source| ProvisionError::Write {
            path: dest.to_path_buf(),
            source,
        })?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| ProvisionError::Fetch {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk)
                .map_err(|source| ProvisionError::Write {
                    path: dest.to_path_buf(),
                    source,
                })?;
            written += chunk.len() as u64;
        }

        file.sync_all().map_err(|source| ProvisionError::Write {
            path: dest.to_path_buf(),
            source,
        })?;

        Ok(written)
    }
}
