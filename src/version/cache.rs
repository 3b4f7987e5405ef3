use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::version::checker::UpdateStorer;
use crate::version::error::CacheError;
use crate::version::semver::compare_versions;
use crate::version::types::{Channel, Release, UpdateDecision};

const CHANNEL_KEY: &str = "channel";
const LAST_CHECK_KEY: &str = "last_check_ms";

const KIND_UPGRADE: &str = "upgrade";
const KIND_DOWNGRADE: &str = "downgrade";

/// SQLite-backed store for the channel preference, the check throttle and
/// the last offered update
pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    pub fn new(db_path: &Path) -> Result<Self, CacheError> {
        info!("Initializing cache database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        debug!("Database connection established");

        let cache = Self {
            conn: Mutex::new(conn),
        };

        cache.create_schema()?;
        info!("Cache initialized successfully");

        Ok(cache)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    /// Get current timestamp in milliseconds since UNIX epoch
    pub fn current_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        // Single row: at most one offered update is remembered
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS cached_update (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                kind TEXT NOT NULL,
                release TEXT NOT NULL,
                cached_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        debug!("Database schema created successfully");
        Ok(())
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self.lock_conn()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put_setting(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let now = Self::current_timestamp_ms();
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            (key, value, now),
        )?;
        Ok(())
    }

    fn clear_cached_update(&self) -> Result<(), CacheError> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM cached_update", [])?;
        Ok(())
    }
}

impl UpdateStorer for Cache {
    fn channel(&self) -> Result<Channel, CacheError> {
        let Some(value) = self.get_setting(CHANNEL_KEY)? else {
            return Ok(Channel::default());
        };

        Ok(value.parse().unwrap_or_else(|e| {
            warn!("Ignoring stored channel preference: {}", e);
            Channel::default()
        }))
    }

    fn set_channel(&self, channel: Channel) -> Result<(), CacheError> {
        debug!("Saving channel preference {}", channel);
        self.put_setting(CHANNEL_KEY, channel.as_str())
    }

    fn last_check_ms(&self) -> Result<Option<i64>, CacheError> {
        let Some(value) = self.get_setting(LAST_CHECK_KEY)? else {
            return Ok(None);
        };

        value
            .parse()
            .map(Some)
            .map_err(|_| CacheError::Corrupt(format!("{} = {}", LAST_CHECK_KEY, value)))
    }

    fn record_check(&self, now_ms: i64) -> Result<(), CacheError> {
        self.put_setting(LAST_CHECK_KEY, &now_ms.to_string())
    }

    fn cached_update(&self, current_version: &str) -> Result<Option<UpdateDecision>, CacheError> {
        let row: Option<(String, String)> = {
            let conn = self.lock_conn()?;
            conn.query_row(
                "SELECT kind, release FROM cached_update WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        let Some((kind, payload)) = row else {
            return Ok(None);
        };

        let release: Release = serde_json::from_str(&payload)
            .map_err(|e| CacheError::Corrupt(format!("cached release: {}", e)))?;

        // Stale once the running build has reached the offered upgrade, or is
        // the offered downgrade
        let running = compare_versions(current_version, &release.tag);
        let stale = match kind.as_str() {
            KIND_UPGRADE => running != Ordering::Less,
            _ => running == Ordering::Equal,
        };
        if stale {
            info!(
                "Cached {} to {} no longer applies to {}, clearing it",
                kind, release.tag, current_version
            );
            self.clear_cached_update()?;
            return Ok(None);
        }

        match kind.as_str() {
            KIND_UPGRADE => Ok(Some(UpdateDecision::Upgrade(release))),
            KIND_DOWNGRADE => Ok(Some(UpdateDecision::Downgrade(release))),
            other => Err(CacheError::Corrupt(format!("cached update kind: {}", other))),
        }
    }

    fn save_cached_update(&self, decision: &UpdateDecision) -> Result<(), CacheError> {
        let (kind, release) = match decision {
            UpdateDecision::NoUpdate => return self.clear_cached_update(),
            UpdateDecision::Upgrade(release) => (KIND_UPGRADE, release),
            UpdateDecision::Downgrade(release) => (KIND_DOWNGRADE, release),
        };

        let payload = serde_json::to_string(release)
            .map_err(|e| CacheError::Corrupt(format!("cached release: {}", e)))?;
        let now = Self::current_timestamp_ms();

        debug!("Caching {} to {}", kind, release.tag);

        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO cached_update (id, kind, release, cached_at)
            VALUES (1, ?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                release = excluded.release,
                cached_at = excluded.cached_at
            "#,
            (kind, payload, now),
        )?;

        Ok(())
    }
}
