//! Source trait for fetching published releases

#[cfg(test)]
use mockall::automock;

use crate::version::error::RegistryError;
use crate::version::types::Release;

/// Trait for fetching the releases of the application
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetches all known releases
    ///
    /// # Arguments
    /// * `include_prerelease` - Whether releases flagged as prerelease are returned
    ///
    /// # Returns
    /// * `Ok(Vec<Release>)` - Releases in the order the host reports them
    /// * `Err(RegistryError)` - If the fetch fails
    async fn fetch_releases(&self, include_prerelease: bool)
    -> Result<Vec<Release>, RegistryError>;
}
