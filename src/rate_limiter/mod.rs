/*!
 * # Rate Limiting Module
 *
 * Fixed-window request throttling for the checkout endpoints.
 *
 * - Two independent tiers: `Strict` for money-moving writes, `Lenient` for reads
 * - Identity keys are `ip:<addr>` for anonymous callers and `user:<id>` for
 *   authenticated ones
 * - Counters live in a DashMap for single-instance deployments, or in Redis
 *   (`INCR` + `EXPIRE`) when several instances must share one budget
 *
 * ## Usage
 *
 * ```ignore
 * let limiters = RateLimiters::from_settings(&settings, None);
 * limiters
 *     .enforce(RateLimitTier::Strict, &key_for_ip(&client_ip(&headers)))
 *     .await?;
 * ```
 */
use axum::http::{HeaderMap, HeaderValue};
use dashmap::DashMap;
use metrics::counter;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RateLimitSettings;

/// Numeric strings are always valid header values.
fn num_to_header_value<T: ToString>(n: T) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit of {limit} exceeded, retry after {retry_after:?}")]
    LimitExceeded { limit: u32, retry_after: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RateLimitTier {
    /// Order creation and payment-link issuance
    Strict,
    /// Order lookup
    Lenient,
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn roll_window(&mut self, now: Instant, window_duration: Duration) {
        if now.duration_since(self.window_start) >= window_duration {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn time_until_reset(&self, now: Instant, window_duration: Duration) -> Duration {
        window_duration.saturating_sub(now.duration_since(self.window_start))
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
}

impl RateLimitConfig {
    pub fn new(requests_per_window: u32, window_duration: Duration) -> Self {
        Self {
            requests_per_window,
            window_duration,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window_duration: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Default)]
pub enum RateLimitBackend {
    #[default]
    InMemory,
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
    },
}

#[derive(Clone)]
enum RateLimitStore {
    InMemory {
        entries: Arc<DashMap<String, RateLimitEntry>>,
    },
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
        fallback: Arc<DashMap<String, RateLimitEntry>>,
    },
}

#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: Duration,
}

impl RateLimitResult {
    /// Writes the `X-RateLimit-*` headers describing this decision.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("x-ratelimit-limit", num_to_header_value(self.limit));
        headers.insert("x-ratelimit-remaining", num_to_header_value(self.remaining));
        headers.insert(
            "x-ratelimit-reset",
            num_to_header_value(self.reset_time.as_secs()),
        );
    }
}

/// A single fixed-window limiter over one counter store.
#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Self {
        let store = match backend {
            RateLimitBackend::InMemory => RateLimitStore::InMemory {
                entries: Arc::new(DashMap::new()),
            },
            RateLimitBackend::Redis { client, namespace } => RateLimitStore::Redis {
                client,
                namespace,
                fallback: Arc::new(DashMap::new()),
            },
        };

        Self { store, config }
    }

    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, RateLimitBackend::InMemory)
    }

    /// Counts one request against `key` and reports whether it fits the window.
    pub async fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        match &self.store {
            RateLimitStore::InMemory { entries } => Self::check_in_memory(entries, key, &self.config),
            RateLimitStore::Redis {
                client,
                namespace,
                fallback,
            } => match client.get_async_connection().await {
                Ok(mut conn) => {
                    match Self::check_with_redis(&mut conn, namespace, key, &self.config).await {
                        Ok(result) => result,
                        Err(err) => {
                            warn!("Redis rate limit error: {}", err);
                            Self::check_in_memory(fallback, key, &self.config)
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "Failed to connect to Redis for rate limiting, using fallback: {}",
                        err
                    );
                    Self::check_in_memory(fallback, key, &self.config)
                }
            },
        }
    }

    fn check_in_memory(
        entries: &DashMap<String, RateLimitEntry>,
        key: &str,
        config: &RateLimitConfig,
    ) -> RateLimitResult {
        let now = Instant::now();
        let mut entry = entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::new(now));

        entry.roll_window(now, config.window_duration);
        let reset_time = entry.time_until_reset(now, config.window_duration);

        if entry.count >= config.requests_per_window {
            return RateLimitResult {
                allowed: false,
                limit: config.requests_per_window,
                remaining: 0,
                reset_time,
            };
        }

        entry.count += 1;
        RateLimitResult {
            allowed: true,
            limit: config.requests_per_window,
            remaining: config.requests_per_window.saturating_sub(entry.count),
            reset_time,
        }
    }

    async fn check_with_redis<C>(
        conn: &mut C,
        namespace: &str,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, redis::RedisError>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        let redis_key = format!("{}:{}", namespace, key);
        let limit = config.requests_per_window as i64;
        let window_secs = config.window_duration.as_secs().max(1);

        let count: i64 = conn.incr(&redis_key, 1).await?;
        if count == 1 {
            let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
        } else {
            // A key without TTL would never reset.
            let ttl: i64 = conn.ttl(&redis_key).await.unwrap_or(-1);
            if ttl < 0 {
                let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
            }
        }

        let ttl_secs = match conn.ttl::<_, i64>(&redis_key).await {
            Ok(ttl) if ttl > 0 => ttl as u64,
            _ => window_secs,
        };
        let allowed = count <= limit;
        let remaining = if allowed {
            config
                .requests_per_window
                .saturating_sub(count.max(0) as u32)
        } else {
            0
        };

        Ok(RateLimitResult {
            allowed,
            limit: config.requests_per_window,
            remaining,
            reset_time: Duration::from_secs(ttl_secs),
        })
    }

    /// Drops in-memory entries whose window has elapsed.
    pub fn cleanup_expired(&self) {
        let entries = match &self.store {
            RateLimitStore::InMemory { entries } => entries,
            RateLimitStore::Redis { fallback, .. } => fallback,
        };
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.window_start) < self.config.window_duration);
    }
}

/// The strict and lenient limiters used by the checkout endpoints.
#[derive(Clone)]
pub struct RateLimiters {
    strict: RateLimiter,
    lenient: RateLimiter,
}

impl RateLimiters {
    pub fn new(strict: RateLimiter, lenient: RateLimiter) -> Self {
        Self { strict, lenient }
    }

    /// Builds both tiers; each tier gets its own Redis namespace so their counters never mix.
    pub fn from_settings(settings: &RateLimitSettings, redis: Option<Arc<redis::Client>>) -> Self {
        let backend_for = |tier: RateLimitTier| match (&redis, settings.use_redis) {
            (Some(client), true) => RateLimitBackend::Redis {
                client: client.clone(),
                namespace: format!("{}:{}", settings.namespace, tier),
            },
            _ => RateLimitBackend::InMemory,
        };

        Self {
            strict: RateLimiter::new(
                RateLimitConfig::new(
                    settings.strict_requests,
                    Duration::from_secs(settings.strict_window_secs),
                ),
                backend_for(RateLimitTier::Strict),
            ),
            lenient: RateLimiter::new(
                RateLimitConfig::new(
                    settings.lenient_requests,
                    Duration::from_secs(settings.lenient_window_secs),
                ),
                backend_for(RateLimitTier::Lenient),
            ),
        }
    }

    pub fn tier(&self, tier: RateLimitTier) -> &RateLimiter {
        match tier {
            RateLimitTier::Strict => &self.strict,
            RateLimitTier::Lenient => &self.lenient,
        }
    }

    /// Counts a request for `identity` and fails once the tier's ceiling is passed.
    pub async fn enforce(
        &self,
        tier: RateLimitTier,
        identity: &str,
    ) -> Result<RateLimitResult, RateLimitError> {
        let result = self.tier(tier).check_rate_limit(identity).await;
        if result.allowed {
            debug!(tier = %tier, identity, remaining = result.remaining, "rate limit check passed");
            Ok(result)
        } else {
            warn!(tier = %tier, identity, "rate limit exceeded");
            counter!("checkout.rate_limit.rejected", 1, "tier" => tier.to_string());
            Err(RateLimitError::LimitExceeded {
                limit: result.limit,
                retry_after: result.reset_time,
            })
        }
    }

    pub fn cleanup_expired(&self) {
        self.strict.cleanup_expired();
        self.lenient.cleanup_expired();
    }
}

/// Resolves the caller address from proxy headers.
///
/// Uses the first `X-Forwarded-For` hop, then `X-Real-IP`, else `"unknown"`.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().map(str::trim) {
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let ip = real_ip.trim();
        if !ip.is_empty() {
            return ip.to_string();
        }
    }

    "unknown".to_string()
}

pub fn key_for_ip(ip: &str) -> String {
    format!("ip:{}", ip)
}

pub fn key_for_user(user_id: &str) -> String {
    format!("user:{}", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn limiters(strict: u32, lenient: u32) -> RateLimiters {
        RateLimiters::new(
            RateLimiter::in_memory(RateLimitConfig::new(strict, Duration::from_secs(900))),
            RateLimiter::in_memory(RateLimitConfig::new(lenient, Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn allows_exactly_the_window_ceiling() {
        let limiter = RateLimiter::in_memory(RateLimitConfig::new(3, Duration::from_secs(60)));

        for expected_remaining in [2, 1, 0] {
            let result = limiter.check_rate_limit("ip:1.2.3.4").await;
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
        }

        let result = limiter.check_rate_limit("ip:1.2.3.4").await;
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert!(result.reset_time <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn window_expiry_resets_the_counter() {
        let limiter = RateLimiter::in_memory(RateLimitConfig::new(1, Duration::from_millis(30)));

        assert!(limiter.check_rate_limit("k").await.allowed);
        assert!(!limiter.check_rate_limit("k").await.allowed);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.check_rate_limit("k").await.allowed);
    }

    #[tokio::test]
    async fn identities_do_not_share_budgets() {
        let limiters = limiters(1, 1);

        limiters
            .enforce(RateLimitTier::Strict, &key_for_user("alice"))
            .await
            .unwrap();
        assert_matches!(
            limiters
                .enforce(RateLimitTier::Strict, &key_for_user("alice"))
                .await,
            Err(RateLimitError::LimitExceeded { .. })
        );

        assert!(limiters
            .enforce(RateLimitTier::Strict, &key_for_user("bob"))
            .await
            .is_ok());
        assert!(limiters
            .enforce(RateLimitTier::Strict, &key_for_ip("alice"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn tiers_are_isolated() {
        let limiters = limiters(1, 5);
        let key = key_for_ip("10.0.0.1");

        limiters.enforce(RateLimitTier::Strict, &key).await.unwrap();
        assert!(limiters.enforce(RateLimitTier::Strict, &key).await.is_err());

        for _ in 0..5 {
            limiters.enforce(RateLimitTier::Lenient, &key).await.unwrap();
        }
        assert!(limiters.enforce(RateLimitTier::Lenient, &key).await.is_err());
    }

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(client_ip(&headers), "203.0.113.9");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(client_ip(&headers), "198.51.100.4");

        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn result_headers_are_written() {
        let result = RateLimitResult {
            allowed: true,
            limit: 10,
            remaining: 7,
            reset_time: Duration::from_secs(120),
        };
        let mut headers = HeaderMap::new();
        result.apply_headers(&mut headers);
        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "10");
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "7");
        assert_eq!(headers.get("X-RateLimit-Reset").unwrap(), "120");
    }
}
