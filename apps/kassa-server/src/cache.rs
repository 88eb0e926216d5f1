//! # Settings Provider
//!
//! POS settings are read on most requests and change rarely. They are read
//! through an optional Redis cache in front of the `pos_settings` table.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  load()                                                                 │
//! │    │                                                                    │
//! │    ├── Redis GET kassa:pos_settings ── hit ──► PosSettings              │
//! │    │        │ miss / error (logged)                                     │
//! │    ▼        ▼                                                           │
//! │  SettingsRepository::load() ──► Redis SETEX (best effort) ──► return   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store stays authoritative. A cache failure is never an error.

use kassa_core::PosSettings;
use kassa_db::{DbResult, SettingsRepository};
use redis::AsyncCommands;
use tracing::{debug, warn};

const SETTINGS_KEY: &str = "kassa:pos_settings";

/// Redis-backed settings cache.
#[derive(Clone)]
pub struct SettingsCache {
    client: redis::Client,
    ttl_secs: u64,
}

impl SettingsCache {
    pub fn new(client: redis::Client, ttl_secs: u64) -> Self {
        SettingsCache { client, ttl_secs }
    }

    async fn get(&self) -> redis::RedisResult<Option<PosSettings>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(SETTINGS_KEY).await?;
        Ok(raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(error = %e, "Discarding undecodable cached settings");
                None
            }
        }))
    }

    async fn put(&self, settings: &PosSettings) -> redis::RedisResult<()> {
        let json = match serde_json::to_string(settings) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Settings not cacheable");
                return Ok(());
            }
        };
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex(SETTINGS_KEY, json, self.ttl_secs).await
    }

    async fn evict(&self) -> redis::RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del(SETTINGS_KEY).await
    }
}

/// Reads and writes POS settings, with the cache in front when configured.
#[derive(Clone)]
pub struct SettingsProvider {
    repo: SettingsRepository,
    cache: Option<SettingsCache>,
}

impl SettingsProvider {
    pub fn new(repo: SettingsRepository, cache: Option<SettingsCache>) -> Self {
        SettingsProvider { repo, cache }
    }

    pub async fn load(&self) -> DbResult<PosSettings> {
        if let Some(cache) = &self.cache {
            match cache.get().await {
                Ok(Some(settings)) => {
                    debug!("Settings served from cache");
                    return Ok(settings);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Settings cache unavailable"),
            }
        }

        let settings = self.repo.load().await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&settings).await {
                warn!(error = %e, "Failed to cache settings");
            }
        }
        Ok(settings)
    }

    /// Persists `settings` and drops the cached copy.
    pub async fn save(&self, settings: &PosSettings) -> DbResult<()> {
        self.repo.save(settings).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.evict().await {
                warn!(error = %e, "Failed to evict cached settings");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kassa_core::Money;
    use kassa_db::{Database, DbConfig};

    async fn repo() -> SettingsRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().settings()
    }

    #[tokio::test]
    async fn test_without_cache_reads_the_store() {
        let provider = SettingsProvider::new(repo().await, None);
        assert_eq!(provider.load().await.unwrap(), PosSettings::default());

        let settings = PosSettings {
            rollup: Money::from_cents(2_000_000),
            ..Default::default()
        };
        provider.save(&settings).await.unwrap();
        assert_eq!(provider.load().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_unreachable_cache_falls_back_to_store() {
        // nothing listens on port 1
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let provider = SettingsProvider::new(repo().await, Some(SettingsCache::new(client, 60)));

        let settings = PosSettings {
            approve_sales: true,
            ..Default::default()
        };
        provider.save(&settings).await.unwrap();
        assert!(provider.load().await.unwrap().approve_sales);
    }
}
