/// Login throttling
///
/// Token bucket rate limiting for the login endpoint, with Redis-backed
/// state so every API instance shares the same buckets. One bucket exists
/// per tenant and primary-key value, so guessing passwords for one user
/// does not lock out the rest of the tenant.
///
/// # Algorithm
///
/// - Buckets start full at `attempts_per_minute` tokens
/// - Tokens refill continuously at `attempts_per_minute / 60` per second
/// - Each login attempt consumes 1 token, successful or not
/// - An attempt against an empty bucket is rejected with 429 and `Retry-After`
///
/// # Storage
///
/// Keys: `ratelimit:login:{tenant_id}:{sha256(primary_key_value)}`, TTL 2
/// minutes. The value is hashed so user identifiers never reach Redis.
///
/// # Failure policy
///
/// Throttling fails open: if Redis is slow or down the attempt is allowed
/// and a warning is logged.

use crate::error::ApiError;
use redis::Script;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use tenantgate_shared::redis::{RedisClient, RedisClientError};
use uuid::Uuid;

/// Bucket TTL in seconds
const BUCKET_TTL_SECS: u64 = 120;

/// Atomic refill-and-consume; returns `{allowed, remaining, retry_after}`
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if not tokens then
    tokens = capacity
    last_refill = now
end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + (elapsed * refill_rate))

if tokens >= 1 then
    tokens = tokens - 1
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, ttl)
    return {1, math.floor(tokens), 0}
else
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, ttl)
    return {0, 0, math.ceil((1 - tokens) / refill_rate)}
end
"#;

/// Bucket parameters
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Attempts allowed per minute
    pub requests_per_minute: u32,

    /// Token refill rate (tokens per second)
    pub refill_rate: f64,

    /// Maximum tokens in bucket (burst capacity)
    pub bucket_capacity: u32,
}

impl RateLimit {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let requests_per_minute = requests_per_minute.max(1);
        RateLimit {
            requests_per_minute,
            refill_rate: requests_per_minute as f64 / 60.0,
            bucket_capacity: requests_per_minute,
        }
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the attempt is allowed
    pub ok: bool,

    /// Tokens remaining
    pub remaining: u32,

    /// Seconds until one token is available (0 when allowed)
    pub reset_after: u64,
}

impl RateLimitResult {
    fn from_reply(reply: &[i64]) -> Result<Self, RedisClientError> {
        match reply {
            [ok, remaining, reset_after] => {
                let ok = *ok == 1;
                Ok(RateLimitResult {
                    ok,
                    remaining: (*remaining).max(0) as u32,
                    reset_after: if ok { 0 } else { (*reset_after).max(1) as u64 },
                })
            }
            _ => Err(RedisClientError::CommandError(format!(
                "unexpected rate limit reply: {:?}",
                reply
            ))),
        }
    }
}

/// Redis-backed login throttle
#[derive(Clone)]
pub struct LoginThrottle {
    client: RedisClient,
    limit: RateLimit,
    script: Script,
}

impl LoginThrottle {
    pub fn new(client: RedisClient, attempts_per_minute: u32) -> Self {
        LoginThrottle {
            client,
            limit: RateLimit::per_minute(attempts_per_minute),
            script: Script::new(TOKEN_BUCKET_SCRIPT),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Consumes one token for `(tenant_id, primary_key_value)`
    pub async fn check(
        &self,
        tenant_id: Uuid,
        primary_key_value: &str,
    ) -> Result<RateLimitResult, RedisClientError> {
        let key = bucket_key(tenant_id, primary_key_value);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        let mut conn = self.client.connection();
        let mut invocation = self.script.key(&key);
        invocation
            .arg(self.limit.bucket_capacity)
            .arg(self.limit.refill_rate)
            .arg(now)
            .arg(BUCKET_TTL_SECS);

        let timeout = self.client.command_timeout();
        let reply: Vec<i64> = tokio::time::timeout(timeout, invocation.invoke_async(&mut conn))
            .await
            .map_err(|_| RedisClientError::Timeout(timeout))??;

        RateLimitResult::from_reply(&reply)
    }

    /// Rejects the attempt when its bucket is empty; allows it when Redis fails
    pub async fn enforce(&self, tenant_id: Uuid, primary_key_value: &str) -> Result<(), ApiError> {
        match self.check(tenant_id, primary_key_value).await {
            Ok(result) if result.ok => Ok(()),
            Ok(result) => {
                tracing::warn!(tenant_id = %tenant_id, retry_after = result.reset_after, "Login throttled");
                Err(rate_limit_error(&result))
            }
            Err(e) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "Login throttle unavailable; allowing attempt");
                Ok(())
            }
        }
    }
}

/// Redis key of the bucket for one user of one tenant
pub fn bucket_key(tenant_id: Uuid, primary_key_value: &str) -> String {
    let digest = Sha256::digest(primary_key_value.as_bytes());
    format!("ratelimit:login:{}:{}", tenant_id, hex::encode(digest))
}

fn rate_limit_error(result: &RateLimitResult) -> ApiError {
    ApiError::RateLimitExceeded {
        retry_after: result.reset_after,
        message: format!(
            "Too many login attempts. Try again in {} seconds",
            result.reset_after
        ),
    }
}
