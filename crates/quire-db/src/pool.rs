//! Connection pool shared by the note and tag stores.
//!
//! Store calls are short, request-scoped transactions; the only waiting a
//! caller sees is the pool acquire timeout, so `connect_timeout` is the
//! effective upper bound on how long a store call queues for a connection.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use quire_core::defaults::{
    DB_CONNECT_TIMEOUT_SECS, DB_IDLE_TIMEOUT_SECS, DB_MAX_CONNECTIONS, DB_MAX_LIFETIME_SECS,
    DB_MIN_CONNECTIONS,
};
use quire_core::{Error, Result};

/// Environment variable overriding [`PoolConfig::max_connections`].
pub const ENV_MAX_CONNECTIONS: &str = "QUIRE_DB_MAX_CONNECTIONS";

/// Environment variable overriding [`PoolConfig::connect_timeout`] (seconds).
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "QUIRE_DB_CONNECT_TIMEOUT_SECS";

/// Sizing and timeouts for the store pool.
///
/// Listings hold one connection for their count and page queries; a note
/// write holds one for its whole upsert. Size the pool for concurrent
/// requests, not statements.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Acquire timeout; a store call fails with DATABASE_ERROR past it.
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` keeps connections until they fail or go idle.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DB_MAX_CONNECTIONS,
            min_connections: DB_MIN_CONNECTIONS,
            connect_timeout: Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DB_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(DB_MAX_LIFETIME_SECS)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `QUIRE_DB_*` environment variables.
    ///
    /// Unset variables keep the default; unparsable values are a
    /// configuration error rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a positive integer, got '{}'", ENV_MAX_CONNECTIONS, raw))
            })?;
            if config.max_connections == 0 {
                return Err(Error::Config(format!("{} must be at least 1", ENV_MAX_CONNECTIONS)));
            }
            config.min_connections = config.min_connections.min(config.max_connections);
        }
        if let Some(raw) = lookup(ENV_CONNECT_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a number of seconds, got '{}'", ENV_CONNECT_TIMEOUT_SECS, raw))
            })?;
            config.connect_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }
}

/// Open a pool for `database_url` with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Open a pool and wait for the first connection.
///
/// An unreachable server or bad credentials surface here as
/// [`Error::Database`], before any store is built on the pool.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    info!(
        subsystem = "database",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "Opening store pool"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout);

    if let Some(max_lifetime) = config.max_lifetime {
        options = options.max_lifetime(max_lifetime);
    }

    let pool = options
        .connect(database_url)
        .await
        .map_err(Error::from_sqlx)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Store pool ready"
    );
    Ok(pool)
}

/// Log pool occupancy; the CLI calls this once a command finishes.
///
/// Warns when no idle connection is left, since further store calls would
/// queue on the acquire timeout.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "database",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Store pool occupancy"
    );

    if idle == 0 && size > 0 {
        warn!(
            subsystem = "database",
            component = "pool",
            pool_size = size,
            "Store pool has no idle connections; new calls will wait for acquire"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_max_connections() {
        assert_eq!(PoolConfig::default().max_connections, 10);
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .max_connections(20)
            .min_connections(5)
            .connect_timeout(Duration::from_secs(60));

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_from_env_without_overrides_is_default() {
        let config = PoolConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_connections, DB_MAX_CONNECTIONS);
        assert_eq!(
            config.connect_timeout,
            Duration::from_secs(DB_CONNECT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_from_env_overrides() {
        let config = PoolConfig::from_lookup(lookup(&[
            (ENV_MAX_CONNECTIONS, " 4 "),
            (ENV_CONNECT_TIMEOUT_SECS, "5"),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        let err = PoolConfig::from_lookup(lookup(&[(ENV_MAX_CONNECTIONS, "many")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = PoolConfig::from_lookup(lookup(&[(ENV_MAX_CONNECTIONS, "0")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
