/// Event reported while an update file is being downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadEvent {
    Started { content_length: Option<u64> },
    Progress { chunk_length: u64 },
    Finished,
}

/// Folds download events into a running byte counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    downloaded: u64,
    total: Option<u64>,
    finished: bool,
}

impl ProgressTracker {
    pub fn apply(&mut self, event: &DownloadEvent) {
        match *event {
            DownloadEvent::Started { content_length } => self.total = content_length,
            DownloadEvent::Progress { chunk_length } => {
                self.downloaded = self.downloaded.saturating_add(chunk_length)
            }
            DownloadEvent::Finished => self.finished = true,
        }
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// `round(downloaded / total * 100)`, capped at 100.
    /// `None` until a non-zero total is known.
    pub fn percent(&self) -> Option<u8> {
        let total = u128::from(self.total.filter(|&t| t > 0)?);
        let downloaded = u128::from(self.downloaded);
        let percent = (downloaded * 100 + total / 2) / total;
        Some(percent.min(100) as u8)
    }
}
