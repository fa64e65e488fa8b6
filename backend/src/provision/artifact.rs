use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::fetcher::Fetcher;

const LOCK_POLL: Duration = Duration::from_millis(250);
const LOCK_STALE: Duration = Duration::from_secs(600);

/// Where a model artifact lives remotely and locally. Defined once at
/// configuration time and never mutated.
#[derive(Debug, Clone)]
pub struct ArtifactDescriptor {
    pub url: String,
    pub path: PathBuf,
    /// Hex SHA-256 of the expected file. When set, a present file with a
    /// different digest does not satisfy the descriptor and is re-fetched.
    pub sha256: Option<String>,
}

impl ArtifactDescriptor {
    /// Whether the local artifact already satisfies this descriptor.
    pub fn is_satisfied(&self) -> Result<bool, ProvisionError> {
        if !self.path.is_file() {
            return Ok(false);
        }
        match &self.sha256 {
            None => Ok(true),
            Some(expected) => Ok(file_sha256(&self.path)?.eq_ignore_ascii_case(expected)),
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    FetchStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("filesystem error at {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

fn write_err(path: &Path) -> impl FnOnce(io::Error) -> ProvisionError + '_ {
    move |source| ProvisionError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Downloads model artifacts with at-most-one fetch per artifact: an async
/// mutex serializes callers within the process, a sidecar lock file excludes
/// other processes sharing the volume.
pub struct Provisioner<F> {
    fetcher: F,
    flight: Mutex<()>,
}

impl<F: Fetcher> Provisioner<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            flight: Mutex::new(()),
        }
    }

    /// Guarantees the artifact exists at its local path, fetching it if
    /// absent. Idempotent: a satisfied descriptor returns without touching
    /// the network. The body is streamed to a uniquely named temporary file
    /// and atomically renamed into place, so a crash mid-download never
    /// leaves a partial file at the final path.
    pub async fn ensure(&self, artifact: &ArtifactDescriptor) -> Result<PathBuf, ProvisionError> {
        if artifact.is_satisfied()? {
            log::debug!("model artifact {} already present", artifact.path.display());
            return Ok(artifact.path.clone());
        }

        let _flight = self.flight.lock().await;
        if artifact.is_satisfied()? {
            return Ok(artifact.path.clone());
        }

        let parent = artifact
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(write_err(parent))?;

        let file_name = artifact.file_name();
        let lock_path = parent.join(format!(".{file_name}.lock"));
        let _lock = FetchLock::acquire(&lock_path).await?;
        if artifact.is_satisfied()? {
            // another process completed the download while we waited
            return Ok(artifact.path.clone());
        }

        let tmp = parent.join(format!(".{file_name}.{}.part", Uuid::new_v4()));
        log::info!("fetching model artifact from {}", artifact.url);
        let written = match self.fetcher.fetch(&artifact.url, &tmp).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };

        if let Some(expected) = &artifact.sha256 {
            let actual = file_sha256(&tmp)?;
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = fs::remove_file(&tmp);
                return Err(ProvisionError::ChecksumMismatch {
                    path: artifact.path.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        fs::rename(&tmp, &artifact.path).map_err(write_err(&artifact.path))?;
        log::info!(
            "stored model artifact at {} ({} bytes)",
            artifact.path.display(),
            written
        );
        Ok(artifact.path.clone())
    }
}

/// Cross-process exclusion around a single artifact download. The lock file
/// is created with `create_new`; waiters poll until it clears. A lock older
/// than `LOCK_STALE` is assumed abandoned and broken.
struct FetchLock {
    path: PathBuf,
}

impl FetchLock {
    async fn acquire(path: &Path) -> Result<Self, ProvisionError> {
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(path) {
                        log::warn!("removing stale artifact lock {}", path.display());
                        let _ = fs::remove_file(path);
                        continue;
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(source) => return Err(write_err(path)(source)),
            }
        }
    }
}

impl Drop for FetchLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_is_stale(path: &Path) -> bool {
    path.metadata()
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > LOCK_STALE)
        .unwrap_or(false)
}

fn file_sha256(path: &Path) -> Result<String, ProvisionError> {
    let mut file = File::open(path).map_err(write_err(path))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(write_err(path))?;
    Ok(hex::encode(hasher.finalize()))
}
