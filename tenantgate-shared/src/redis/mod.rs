/// Redis connectivity
///
/// Used by the API for login throttling. Everything that talks to Redis
/// goes through [`RedisClient`] so timeouts and URL masking are applied
/// consistently.

pub mod client;

pub use client::{RedisClient, RedisClientError, RedisConfig};
