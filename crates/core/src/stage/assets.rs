//! Model assets: lookup in the models directory and verified download.

use futures::StreamExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::config::AssetConfig;
use super::error::StageError;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// A model file a stage needs before it can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelAsset {
    pub file_name: String,
    pub url: Option<String>,
    /// Lowercase hex SHA-256 of the file, when known.
    pub sha256: Option<String>,
}

impl ModelAsset {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            url: None,
            sha256: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into().to_ascii_lowercase());
        self
    }

    pub fn path_in(&self, config: &AssetConfig) -> PathBuf {
        config.models_dir.join(&self.file_name)
    }
}

/// Returns the local path of `asset`, downloading it first if it is missing
/// and downloads are enabled.
pub async fn ensure_asset(
    stage: &str,
    asset: &ModelAsset,
    config: &AssetConfig,
) -> Result<PathBuf, StageError> {
    let path = asset.path_in(config);
    if fs::try_exists(&path).await.unwrap_or(false) {
        if let Some(expected) = &asset.sha256 {
            let actual = sha256_file(&path).await.map_err(|e| {
                StageError::asset_unavailable(
                    stage,
                    format!("Failed to read {}: {}", path.display(), e),
                )
            })?;
            if &actual != expected {
                warn!("Checksum mismatch for {}", path.display());
                return Err(StageError::asset_unavailable(
                    stage,
                    format!(
                        "{} checksum mismatch: expected {}, got {}",
                        path.display(),
                        expected,
                        actual
                    ),
                ));
            }
        }
        debug!("Model {} present at {}", asset.file_name, path.display());
        return Ok(path);
    }

    let url = match (&asset.url, config.download) {
        (Some(url), true) => url,
        (None, _) => {
            return Err(StageError::asset_unavailable(
                stage,
                format!("{} not found and no download URL", path.display()),
            ))
        }
        (Some(_), false) => {
            return Err(StageError::asset_unavailable(
                stage,
                format!("{} not found and downloads are disabled", path.display()),
            ))
        }
    };

    info!("Downloading model {} for stage {}", asset.file_name, stage);
    let bytes = download_asset(url, &path, asset.sha256.as_deref())
        .await
        .map_err(|reason| StageError::asset_unavailable(stage, reason))?;
    info!("Downloaded {} ({} bytes)", asset.file_name, bytes);

    Ok(path)
}

/// Streams `url` into `dest`, verifying the checksum before the file
/// appears under its final name.
async fn download_asset(url: &str, dest: &Path, sha256: Option<&str>) -> Result<u64, String> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }

    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Failed to download {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("Failed to download {}: HTTP {}", url, response.status()));
    }

    let partial = dest.with_extension("part");
    let downloaded = match write_partial(url, response, &partial, sha256).await {
        Ok(downloaded) => downloaded,
        Err(e) => {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&partial, dest).await {
        let _ = fs::remove_file(&partial).await;
        return Err(format!("Failed to move {} into place: {}", dest.display(), e));
    }

    Ok(downloaded)
}

/// Writes the response body to `partial` and checks its digest. The caller
/// removes `partial` on error.
async fn write_partial(
    url: &str,
    response: reqwest::Response,
    partial: &Path,
    sha256: Option<&str>,
) -> Result<u64, String> {
    let mut file = File::create(partial)
        .await
        .map_err(|e| format!("Failed to create {}: {}", partial.display(), e))?;

    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("Download of {} interrupted: {}", url, e))?;
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("Failed to write {}: {}", partial.display(), e))?;
        downloaded += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| format!("Failed to flush {}: {}", partial.display(), e))?;
    drop(file);

    if let Some(expected) = sha256 {
        let actual = format!("{:x}", hasher.finalize());
        if actual != expected {
            warn!("Checksum mismatch for {}", url);
            return Err(format!(
                "Checksum mismatch: expected {}, got {}",
                expected, actual
            ));
        }
    }

    Ok(downloaded)
}

/// Computes the lowercase hex SHA-256 of a file.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut buffer = vec![0u8; 64 * 1024];
    let mut hasher = Sha256::new();

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
