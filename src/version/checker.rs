//! Throttled update checks against the configured channel

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(test)]
use mockall::automock;
use tracing::{error, info};

use crate::version::cache::Cache;
use crate::version::channel::decide_update;
use crate::version::error::{CacheError, CheckError};
use crate::version::registry::ReleaseSource;
use crate::version::types::{Channel, UpdateDecision};

/// Trait for storing update preferences and the last offered update
#[cfg_attr(test, automock)]
pub trait UpdateStorer: Send + Sync + 'static {
    /// Get the selected channel (stable when never set)
    fn channel(&self) -> Result<Channel, CacheError>;

    /// Persist the selected channel
    fn set_channel(&self, channel: Channel) -> Result<(), CacheError>;

    /// Get the time of the last check in milliseconds since UNIX epoch
    fn last_check_ms(&self) -> Result<Option<i64>, CacheError>;

    /// Record that a check happened at `now_ms`
    fn record_check(&self, now_ms: i64) -> Result<(), CacheError>;

    /// Get the last offered update, dropping it once `current_version` makes it moot
    fn cached_update(&self, current_version: &str) -> Result<Option<UpdateDecision>, CacheError>;

    /// Replace the last offered update; `NoUpdate` clears it
    fn save_cached_update(&self, decision: &UpdateDecision) -> Result<(), CacheError>;
}

/// What started a check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTrigger {
    /// Periodic check, subject to the minimum interval
    Automatic,
    /// Explicit user request, never throttled
    Manual,
}

/// Result of a check request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The minimum interval since the last check has not elapsed
    Throttled,
    /// Another check is in flight
    AlreadyRunning,
    Decided(UpdateDecision),
}

/// Clears the busy flag on every exit path
pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct UpdateChecker<S: UpdateStorer> {
    storer: Arc<S>,
    source: Arc<dyn ReleaseSource>,
    current_version: String,
    min_interval_ms: i64,
    checking: AtomicBool,
}

impl<S: UpdateStorer> UpdateChecker<S> {
    pub fn new(
        storer: Arc<S>,
        source: Arc<dyn ReleaseSource>,
        current_version: &str,
        min_interval_ms: i64,
    ) -> Self {
        Self {
            storer,
            source,
            current_version: current_version.to_string(),
            min_interval_ms,
            checking: AtomicBool::new(false),
        }
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn channel(&self) -> Result<Channel, CacheError> {
        self.storer.channel()
    }

    /// Persist a new channel. The next check resolves against it.
    pub fn switch_channel(&self, channel: Channel) -> Result<(), CacheError> {
        info!("Switching update channel to {}", channel);
        self.storer.set_channel(channel)
    }

    /// The last offered update, for display before a check completes
    pub fn cached_update(&self) -> Result<Option<UpdateDecision>, CacheError> {
        self.storer.cached_update(&self.current_version)
    }

    pub async fn check(&self, trigger: CheckTrigger) -> Result<CheckOutcome, CheckError> {
        self.check_at(trigger, Cache::current_timestamp_ms()).await
    }

    /// Run a check as if the wall clock read `now_ms`
    pub async fn check_at(
        &self,
        trigger: CheckTrigger,
        now_ms: i64,
    ) -> Result<CheckOutcome, CheckError> {
        if trigger == CheckTrigger::Automatic {
            if let Some(last) = self.storer.last_check_ms()? {
                if now_ms - last < self.min_interval_ms {
                    info!(
                        "Skipping automatic check: last check was {}ms ago",
                        now_ms - last
                    );
                    return Ok(CheckOutcome::Throttled);
                }
            }
        }

        let Some(_busy) = BusyGuard::acquire(&self.checking) else {
            info!("Skipping check: another check is in flight");
            return Ok(CheckOutcome::AlreadyRunning);
        };

        // Recorded up front so a failing host is not polled on every tick
        self.storer.record_check(now_ms)?;

        let channel = self.storer.channel()?;
        let releases = self
            .source
            .fetch_releases(channel.includes_prereleases())
            .await
            .inspect_err(|e| error!("Update check failed: {}", e))?;

        let decision = decide_update(&self.current_version, &releases, channel);
        match &decision {
            UpdateDecision::NoUpdate => {
                info!("{} is up to date on {}", self.current_version, channel)
            }
            UpdateDecision::Upgrade(r) => info!("Upgrade available: {}", r.tag),
            UpdateDecision::Downgrade(r) => info!("Downgrade available: {}", r.tag),
        }

        self.storer.save_cached_update(&decision)?;

        Ok(CheckOutcome::Decided(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::error::RegistryError;
    use crate::version::registry::MockReleaseSource;
    use crate::version::types::Release;
    use mockall::predicate::eq;
    use rstest::rstest;

    const HOUR_MS: i64 = 60 * 60 * 1000;

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

    fn source_returning(releases: Vec<Release>) -> MockReleaseSource {
        let mut source = MockReleaseSource::new();
        source
            .expect_fetch_releases()
            .returning(move |_| Ok(releases.clone()));
        source
    }

    fn storer(channel: Channel, last_check: Option<i64>) -> MockUpdateStorer {
        let mut storer = MockUpdateStorer::new();
        storer.expect_channel().returning(move || Ok(channel));
        storer
            .expect_last_check_ms()
            .returning(move || Ok(last_check));
        storer.expect_record_check().returning(|_| Ok(()));
        storer.expect_save_cached_update().returning(|_| Ok(()));
        storer
    }

    #[tokio::test]
    async fn automatic_check_is_throttled_within_interval() {
        let mut source = MockReleaseSource::new();
        source.expect_fetch_releases().never();

        let checker = UpdateChecker::new(
            Arc::new(storer(Channel::Stable, Some(10 * HOUR_MS))),
            Arc::new(source),
            "1.2.0",
            HOUR_MS,
        );

        let outcome = checker
            .check_at(CheckTrigger::Automatic, 10 * HOUR_MS + HOUR_MS - 1)
            .await
            .unwrap();

        assert_eq!(outcome, CheckOutcome::Throttled);
    }

    #[rstest]
    #[case(CheckTrigger::Manual, 10 * HOUR_MS + 1)] // manual bypasses throttling
    #[case(CheckTrigger::Automatic, 11 * HOUR_MS)] // interval elapsed
    #[tokio::test]
    async fn check_runs_when_allowed(#[case] trigger: CheckTrigger, #[case] now: i64) {
        let checker = UpdateChecker::new(
            Arc::new(storer(Channel::Stable, Some(10 * HOUR_MS))),
            Arc::new(source_returning(vec![release("1.3.0", false)])),
            "1.2.0",
            HOUR_MS,
        );

        let outcome = checker.check_at(trigger, now).await.unwrap();

        assert_eq!(
            outcome,
            CheckOutcome::Decided(UpdateDecision::Upgrade(release("1.3.0", false)))
        );
    }

    #[rstest]
    #[case(Channel::Stable, false)]
    #[case(Channel::Prerelease, true)]
    #[tokio::test]
    async fn check_requests_prereleases_only_on_prerelease_channel(
        #[case] channel: Channel,
        #[case] include_prerelease: bool,
    ) {
        let mut source = MockReleaseSource::new();
        source
            .expect_fetch_releases()
            .with(eq(include_prerelease))
            .times(1)
            .returning(|_| Ok(vec![]));

        let checker = UpdateChecker::new(
            Arc::new(storer(channel, None)),
            Arc::new(source),
            "1.2.0",
            HOUR_MS,
        );

        let outcome = checker.check_at(CheckTrigger::Manual, 0).await.unwrap();

        assert_eq!(outcome, CheckOutcome::Decided(UpdateDecision::NoUpdate));
    }

    #[tokio::test]
    async fn check_persists_decision() {
        let mut storer = MockUpdateStorer::new();
        storer.expect_channel().returning(|| Ok(Channel::Stable));
        storer.expect_last_check_ms().returning(|| Ok(None));
        storer
            .expect_record_check()
            .with(eq(42))
            .times(1)
            .returning(|_| Ok(()));
        storer
            .expect_save_cached_update()
            .withf(|decision| {
                *decision == UpdateDecision::Downgrade(release("1.2.0", false))
            })
            .times(1)
            .returning(|_| Ok(()));

        let checker = UpdateChecker::new(
            Arc::new(storer),
            Arc::new(source_returning(vec![release("1.2.0", false)])),
            "1.3.0-1",
            HOUR_MS,
        );

        checker.check_at(CheckTrigger::Automatic, 42).await.unwrap();
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cached_update_untouched() {
        let mut storer = MockUpdateStorer::new();
        storer.expect_channel().returning(|| Ok(Channel::Stable));
        storer.expect_last_check_ms().returning(|| Ok(None));
        storer.expect_record_check().returning(|_| Ok(()));
        storer.expect_save_cached_update().never();

        let mut source = MockReleaseSource::new();
        source
            .expect_fetch_releases()
            .returning(|_| Err(RegistryError::InvalidResponse("boom".to_string())));

        let checker = UpdateChecker::new(Arc::new(storer), Arc::new(source), "1.2.0", HOUR_MS);

        let result = checker.check_at(CheckTrigger::Manual, 0).await;

        assert!(matches!(result, Err(CheckError::Registry(_))));
        // Busy flag released after the failure
        assert!(!checker.checking.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn concurrent_check_reports_already_running() {
        let checker = UpdateChecker::new(
            Arc::new(storer(Channel::Stable, None)),
            Arc::new(source_returning(vec![])),
            "1.2.0",
            HOUR_MS,
        );

        let _held = BusyGuard::acquire(&checker.checking).unwrap();
        let outcome = checker.check_at(CheckTrigger::Manual, 0).await.unwrap();

        assert_eq!(outcome, CheckOutcome::AlreadyRunning);
    }

    #[test]
    fn switch_channel_persists_preference() {
        let mut storer = MockUpdateStorer::new();
        storer
            .expect_set_channel()
            .with(eq(Channel::Prerelease))
            .times(1)
            .returning(|_| Ok(()));

        let checker = UpdateChecker::new(
            Arc::new(storer),
            Arc::new(MockReleaseSource::new()),
            "1.2.0",
            HOUR_MS,
        );

        checker.switch_channel(Channel::Prerelease).unwrap();
    }
}
