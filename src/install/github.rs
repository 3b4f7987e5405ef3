//! Installer downloading release assets from GitHub

use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::install::error::InstallError;
use crate::install::installer::{EVENT_BUFFER, Installer, ManagedDownload};
use crate::install::progress::DownloadEvent;
use crate::version::registries::build_http_client;
use crate::version::types::Release;

/// Name of the release asset holding the build of `version` for this platform
pub fn asset_name(app_name: &str, version: &str) -> Option<String> {
    let name = if cfg!(target_os = "macos") && cfg!(target_arch = "aarch64") {
        format!("{app_name}-{version}-macos-arm64")
    } else if cfg!(target_os = "macos") && cfg!(target_arch = "x86_64") {
        format!("{app_name}-{version}-macos-x64")
    } else if cfg!(target_os = "linux") && cfg!(target_arch = "x86_64") {
        format!("{app_name}-{version}-linux-x64")
    } else if cfg!(target_os = "linux") && cfg!(target_arch = "aarch64") {
        format!("{app_name}-{version}-linux-arm64")
    } else if cfg!(target_os = "windows") && cfg!(target_arch = "x86_64") {
        format!("{app_name}-{version}-windows-x64.exe")
    } else {
        return None;
    };
    Some(name)
}

pub struct GitHubInstaller {
    client: reqwest::Client,
    web_base_url: String,
    repository: String,
    app_name: String,
    download_dir: PathBuf,
}

impl GitHubInstaller {
    pub fn new(
        web_base_url: &str,
        repository: &str,
        app_name: &str,
        download_dir: &Path,
    ) -> Result<Self, InstallError> {
        Ok(Self {
            client: build_http_client()
                .map_err(|e| InstallError::http("failed to create HTTP client", e))?,
            web_base_url: web_base_url.trim_end_matches('/').to_string(),
            repository: repository.to_string(),
            app_name: app_name.to_string(),
            download_dir: download_dir.to_path_buf(),
        })
    }

    fn platform_asset(&self, version: &str) -> Result<String, InstallError> {
        asset_name(&self.app_name, version).ok_or(InstallError::UnsupportedPlatform)
    }

    /// Download URL of a build, keyed only by its version
    fn direct_url(&self, version: &str, asset: &str) -> String {
        format!(
            "{}/{}/releases/download/v{}/{}",
            self.web_base_url, self.repository, version, asset
        )
    }
}

#[async_trait::async_trait]
impl Installer for GitHubInstaller {
    async fn begin_managed_download(
        &self,
        release: &Release,
    ) -> Result<Option<ManagedDownload>, InstallError> {
        let Some(expected) = asset_name(&self.app_name, release.version()) else {
            return Ok(None);
        };

        let Some(asset) = release.assets.iter().find(|a| a.name == expected) else {
            debug!("Release {} has no asset named {}", release.tag, expected);
            return Ok(None);
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let client = self.client.clone();
        let url = asset.download_url.clone();
        let dest = self.download_dir.join(&asset.name);

        let task = tokio::spawn(async move { download_file(&client, &url, &dest, &tx).await });

        Ok(Some(ManagedDownload { events: rx, task }))
    }

    async fn download_direct(
        &self,
        version: &str,
        events: mpsc::Sender<DownloadEvent>,
    ) -> Result<PathBuf, InstallError> {
        let asset = self.platform_asset(version)?;
        let url = self.direct_url(version, &asset);
        let dest = self.download_dir.join(&asset);

        download_file(&self.client, &url, &dest, &events).await
    }

    fn install(&self, artifact: &Path) -> Result<(), InstallError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(artifact, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| InstallError::io("failed to mark download executable", e))?;
        }

        self_replace::self_replace(artifact).map_err(|source| InstallError::Replace {
            path: artifact.to_path_buf(),
            source,
        })?;

        info!("Replaced running executable with {:?}", artifact);
        Ok(())
    }

    fn restart(&self) -> Result<(), InstallError> {
        let exe = std::env::current_exe()
            .map_err(|e| InstallError::io("failed to get current executable", e))?;

        // After self_replace on Linux, /proc/self/exe points at the deleted inode
        #[cfg(target_os = "linux")]
        let exe = {
            let fixed = exe
                .to_string_lossy()
                .strip_suffix(" (deleted)")
                .map(PathBuf::from);
            fixed.unwrap_or(exe)
        };

        info!("Restarting from: {}", exe.display());
        std::process::Command::new(&exe)
            .args(std::env::args_os().skip(1))
            .spawn()
            .map_err(|e| InstallError::io("failed to restart", e))?;
        Ok(())
    }
}

/// Stream `url` into `dest`, reporting progress on `events`
async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    events: &mpsc::Sender<DownloadEvent>,
) -> Result<PathBuf, InstallError> {
    info!("Downloading {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| InstallError::http("download request failed", e))?;

    if !response.status().is_success() {
        return Err(InstallError::Status(response.status()));
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| InstallError::io("failed to create download directory", e))?;
    }

    let _ = events
        .send(DownloadEvent::Started {
            content_length: response.content_length(),
        })
        .await;

    let chunks = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|e| InstallError::http("download stream error", e)));
    stream_to_file(chunks, dest, events).await?;

    let _ = events.send(DownloadEvent::Finished).await;
    Ok(dest.to_path_buf())
}

/// Write `chunks` to `<dest>.part` and rename it to `dest` once complete.
/// On failure the partial file is removed.
async fn stream_to_file<S, B>(
    chunks: S,
    dest: &Path,
    events: &mpsc::Sender<DownloadEvent>,
) -> Result<(), InstallError>
where
    S: Stream<Item = Result<B, InstallError>>,
    B: AsRef<[u8]>,
{
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    if let Err(e) = write_part(chunks, &part, events).await {
        if let Err(remove_err) = tokio::fs::remove_file(&part).await {
            debug!("Could not remove {:?}: {}", part, remove_err);
        }
        return Err(e);
    }

    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| InstallError::io("failed to finalize download", e))
}

async fn write_part<S, B>(
    chunks: S,
    part: &Path,
    events: &mpsc::Sender<DownloadEvent>,
) -> Result<(), InstallError>
where
    S: Stream<Item = Result<B, InstallError>>,
    B: AsRef<[u8]>,
{
    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| InstallError::io("failed to create download file", e))?;

    let mut chunks = std::pin::pin!(chunks);
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        file.write_all(chunk)
            .await
            .map_err(|e| InstallError::io("failed to write download data", e))?;
        let _ = events
            .send(DownloadEvent::Progress {
                chunk_length: chunk.len() as u64,
            })
            .await;
    }

    file.flush()
        .await
        .map_err(|e| InstallError::io("failed to flush download file", e))
}
