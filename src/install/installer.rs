//! Download and install flow driving an update to a selected release

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::install::error::InstallError;
use crate::install::progress::{DownloadEvent, ProgressTracker};
use crate::version::checker::BusyGuard;
use crate::version::types::{Release, UpdateState};

/// Capacity of the download event channel
pub const EVENT_BUFFER: usize = 64;

/// A download started by the host updater
pub struct ManagedDownload {
    pub events: mpsc::Receiver<DownloadEvent>,
    /// Resolves to the downloaded file
    pub task: JoinHandle<Result<PathBuf, InstallError>>,
}

/// Host-side operations needed to move to another release
#[async_trait::async_trait]
pub trait Installer: Send + Sync {
    /// Start the host updater's download for `release`.
    /// `Ok(None)` means the managed path is unavailable for it.
    async fn begin_managed_download(
        &self,
        release: &Release,
    ) -> Result<Option<ManagedDownload>, InstallError>;

    /// Download the build for `version` directly, reporting on `events`
    async fn download_direct(
        &self,
        version: &str,
        events: mpsc::Sender<DownloadEvent>,
    ) -> Result<PathBuf, InstallError>;

    /// Put the downloaded file in place of the running build
    fn install(&self, artifact: &Path) -> Result<(), InstallError>;

    /// Relaunch so the installed build becomes active
    fn restart(&self) -> Result<(), InstallError>;
}

pub struct InstallFlow<I: Installer> {
    installer: I,
    downloading: AtomicBool,
}

impl<I: Installer> InstallFlow<I> {
    pub fn new(installer: I) -> Self {
        Self {
            installer,
            downloading: AtomicBool::new(false),
        }
    }

    /// Download, install and restart into `release`, reporting each state
    /// on `states`.
    ///
    /// Runs to completion or failure; a failure reports `Idle`, leaves the
    /// running build in place and can be retried by calling this again.
    pub async fn run(
        &self,
        release: &Release,
        states: mpsc::Sender<UpdateState>,
    ) -> Result<(), InstallError> {
        let Some(_busy) = BusyGuard::acquire(&self.downloading) else {
            return Err(InstallError::AlreadyRunning);
        };

        let result = self.download_and_install(release, &states).await;
        if let Err(e) = &result {
            error!("Update to {} failed: {}", release.tag, e);
            let _ = states.send(UpdateState::Idle).await;
        }
        result
    }

    async fn download_and_install(
        &self,
        release: &Release,
        states: &mpsc::Sender<UpdateState>,
    ) -> Result<(), InstallError> {
        let _ = states
            .send(UpdateState::Downloading { percent: None })
            .await;

        let artifact = match self.installer.begin_managed_download(release).await? {
            Some(managed) => {
                info!("Downloading {} through the managed updater", release.tag);
                let tracker = track_progress(managed.events, states).await;
                let artifact = managed.task.await??;
                log_finished(&tracker, &artifact);
                artifact
            }
            None if release.is_prerelease => {
                warn!(
                    "Managed updater unavailable, downloading prerelease {} directly",
                    release.tag
                );
                let (tx, rx) = mpsc::channel(EVENT_BUFFER);
                let (artifact, tracker) = tokio::join!(
                    self.installer.download_direct(release.version(), tx),
                    track_progress(rx, states)
                );
                let artifact = artifact?;
                log_finished(&tracker, &artifact);
                artifact
            }
            None => return Err(InstallError::Unavailable(release.tag.clone())),
        };

        let _ = states.send(UpdateState::Ready).await;
        let _ = states.send(UpdateState::Installing).await;

        info!("Installing {} from {:?}", release.tag, artifact);
        self.installer.install(&artifact)?;
        self.installer.restart()
    }
}

/// Fold download events until the sender side closes, forwarding percent changes
async fn track_progress(
    mut events: mpsc::Receiver<DownloadEvent>,
    states: &mpsc::Sender<UpdateState>,
) -> ProgressTracker {
    let mut tracker = ProgressTracker::default();
    let mut last_percent = None;

    while let Some(event) = events.recv().await {
        tracker.apply(&event);
        let percent = tracker.percent();
        if percent != last_percent {
            last_percent = percent;
            let _ = states.send(UpdateState::Downloading { percent }).await;
        }
    }

    tracker
}

fn log_finished(tracker: &ProgressTracker, artifact: &Path) {
    info!(
        "Download complete: {} bytes to {:?}",
        tracker.downloaded(),
        artifact
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Mutex;

    /// Step at which `FakeInstaller` fails
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Failure {
        ManagedTask,
        Direct,
        Install,
    }

    /// Installer double recording the calls it receives
    #[derive(Default)]
    struct FakeInstaller {
        managed: bool,
        /// Consumed by the first call reaching that step
        fail_once: Mutex<Option<Failure>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeInstaller {
        fn managed() -> Self {
            Self {
                managed: true,
                ..Self::default()
            }
        }

        fn failing(managed: bool, failure: Failure) -> Self {
            Self {
                managed,
                fail_once: Mutex::new(Some(failure)),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn should_fail(&self, step: Failure) -> bool {
            let mut fail_once = self.fail_once.lock().unwrap();
            if *fail_once == Some(step) {
                *fail_once = None;
                true
            } else {
                false
            }
        }
    }

    async fn send_download(events: &mpsc::Sender<DownloadEvent>) {
        for event in [
            DownloadEvent::Started {
                content_length: Some(4),
            },
            DownloadEvent::Progress { chunk_length: 2 },
            DownloadEvent::Progress { chunk_length: 2 },
            DownloadEvent::Finished,
        ] {
            events.send(event).await.unwrap();
        }
    }

    /// Events of a download cut off at 4 of 10 bytes
    async fn send_interrupted_download(events: &mpsc::Sender<DownloadEvent>) {
        for event in [
            DownloadEvent::Started {
                content_length: Some(10),
            },
            DownloadEvent::Progress { chunk_length: 4 },
        ] {
            events.send(event).await.unwrap();
        }
    }

    fn connection_reset() -> InstallError {
        InstallError::io(
            "failed to write download data",
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
        )
    }

    #[async_trait::async_trait]
    impl Installer for FakeInstaller {
        async fn begin_managed_download(
            &self,
            release: &Release,
        ) -> Result<Option<ManagedDownload>, InstallError> {
            if !self.managed {
                return Ok(None);
            }
            self.record(format!("managed {}", release.tag));

            let fail = self.should_fail(Failure::ManagedTask);
            let (tx, rx) = mpsc::channel(EVENT_BUFFER);
            let task = tokio::spawn(async move {
                if fail {
                    send_interrupted_download(&tx).await;
                    return Err(connection_reset());
                }
                send_download(&tx).await;
                Ok(PathBuf::from("/tmp/managed"))
            });
            Ok(Some(ManagedDownload { events: rx, task }))
        }

        async fn download_direct(
            &self,
            version: &str,
            events: mpsc::Sender<DownloadEvent>,
        ) -> Result<PathBuf, InstallError> {
            self.record(format!("direct {}", version));
            if self.should_fail(Failure::Direct) {
                send_interrupted_download(&events).await;
                return Err(connection_reset());
            }
            send_download(&events).await;
            Ok(PathBuf::from("/tmp/direct"))
        }

        fn install(&self, artifact: &Path) -> Result<(), InstallError> {
            if self.should_fail(Failure::Install) {
                return Err(InstallError::Replace {
                    path: artifact.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            self.record(format!("install {}", artifact.display()));
            Ok(())
        }

        fn restart(&self) -> Result<(), InstallError> {
            self.record("restart".to_string());
            Ok(())
        }
    }

    fn release(tag: &str, is_prerelease: bool) -> Release {
        Release {
            tag: tag.to_string(),
            title: tag.to_string(),
            body: String::new(),
            published_at: None,
            is_prerelease,
            url: String::new(),
            assets: vec![],
        }
    }

    async fn collect_states(mut rx: mpsc::Receiver<UpdateState>) -> Vec<UpdateState> {
        let mut states = vec![];
        while let Some(state) = rx.recv().await {
            states.push(state);
        }
        states
    }

    #[tokio::test]
    async fn run_uses_managed_download_and_reports_progress() {
        let flow = InstallFlow::new(FakeInstaller::managed());
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        flow.run(&release("v1.3.0", false), tx).await.unwrap();

        assert_eq!(
            flow.installer.calls(),
            vec!["managed v1.3.0", "install /tmp/managed", "restart"]
        );
        assert_eq!(
            collect_states(rx).await,
            vec![
                UpdateState::Downloading { percent: None },
                UpdateState::Downloading { percent: Some(0) },
                UpdateState::Downloading { percent: Some(50) },
                UpdateState::Downloading { percent: Some(100) },
                UpdateState::Ready,
                UpdateState::Installing,
            ]
        );
    }

    #[tokio::test]
    async fn run_falls_back_to_direct_download_for_prerelease() {
        let flow = InstallFlow::new(FakeInstaller::default());
        let (tx, _rx) = mpsc::channel(EVENT_BUFFER);

        flow.run(&release("v1.3.0-1", true), tx).await.unwrap();

        assert_eq!(
            flow.installer.calls(),
            vec!["direct 1.3.0-1", "install /tmp/direct", "restart"]
        );
    }

    #[tokio::test]
    async fn run_fails_when_stable_release_has_no_managed_download() {
        let flow = InstallFlow::new(FakeInstaller::default());
        let (tx, _rx) = mpsc::channel(EVENT_BUFFER);

        let result = flow.run(&release("v1.3.0", false), tx).await;

        assert!(matches!(result, Err(InstallError::Unavailable(tag)) if tag == "v1.3.0"));
        assert!(flow.installer.calls().is_empty());
    }

    #[tokio::test]
    async fn run_rejects_second_download_in_flight() {
        let flow = InstallFlow::new(FakeInstaller::managed());
        let (tx, _rx) = mpsc::channel(EVENT_BUFFER);

        let _held = BusyGuard::acquire(&flow.downloading).unwrap();
        let result = flow.run(&release("v1.3.0", false), tx).await;

        assert!(matches!(result, Err(InstallError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn run_reports_idle_after_interrupted_download() {
        let flow = InstallFlow::new(FakeInstaller::failing(false, Failure::Direct));
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let result = flow.run(&release("v1.3.0-1", true), tx).await;

        assert!(result.is_err());
        assert_eq!(
            collect_states(rx).await,
            vec![
                UpdateState::Downloading { percent: None },
                UpdateState::Downloading { percent: Some(0) },
                UpdateState::Downloading { percent: Some(40) },
                UpdateState::Idle,
            ]
        );
    }

    #[rstest]
    #[case::managed_task(true, false, Failure::ManagedTask)]
    #[case::direct_download(false, true, Failure::Direct)]
    #[case::install(true, false, Failure::Install)]
    #[tokio::test]
    async fn failed_run_keeps_running_build_and_can_retry(
        #[case] managed: bool,
        #[case] is_prerelease: bool,
        #[case] failure: Failure,
    ) {
        let flow = InstallFlow::new(FakeInstaller::failing(managed, failure));
        let target = release("v1.3.0-1", is_prerelease);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let result = flow.run(&target, tx).await;

        assert!(result.is_err());
        let calls = flow.installer.calls();
        assert!(!calls.iter().any(|c| c.starts_with("install")));
        assert!(!calls.iter().any(|c| c == "restart"));
        assert_eq!(collect_states(rx).await.last(), Some(&UpdateState::Idle));

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        flow.run(&target, tx).await.unwrap();

        assert_eq!(flow.installer.calls().last().map(String::as_str), Some("restart"));
        assert_eq!(collect_states(rx).await.last(), Some(&UpdateState::Installing));
    }

    #[tokio::test]
    async fn rejected_run_does_not_report_idle() {
        let flow = InstallFlow::new(FakeInstaller::managed());
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let _held = BusyGuard::acquire(&flow.downloading).unwrap();
        let result = flow.run(&release("v1.3.0", false), tx).await;

        assert!(matches!(result, Err(InstallError::AlreadyRunning)));
        assert!(collect_states(rx).await.is_empty());
    }
}
