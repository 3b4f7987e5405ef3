//! Release source and cache test utilities

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use release_channel::version::cache::Cache;
use release_channel::version::error::RegistryError;
use release_channel::version::registry::ReleaseSource;
use release_channel::version::types::Release;

/// Release source serving a fixed list of releases
pub struct StaticSource {
    releases: Vec<Release>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new(releases: Vec<Release>) -> Self {
        Self {
            releases,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseSource for StaticSource {
    async fn fetch_releases(
        &self,
        include_prerelease: bool,
    ) -> Result<Vec<Release>, RegistryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .releases
            .iter()
            .filter(|r| include_prerelease || !r.is_prerelease)
            .cloned()
            .collect())
    }
}

/// Build a release with empty metadata
pub fn release(tag: &str, is_prerelease: bool) -> Release {
    Release {
        tag: tag.to_string(),
        title: tag.to_string(),
        body: String::new(),
        published_at: None,
        is_prerelease,
        url: format!("https://github.com/owner/app/releases/tag/{}", tag),
        assets: vec![],
    }
}

/// Create a cache in a fresh temporary directory
pub fn create_test_cache() -> (TempDir, Arc<Cache>) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let cache = Cache::new(&db_path).unwrap();

    (temp_dir, Arc::new(cache))
}
