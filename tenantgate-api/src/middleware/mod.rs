/// Middleware modules for the API server
///
/// - Security headers
/// - Login throttling

pub mod rate_limit;
pub mod security;
