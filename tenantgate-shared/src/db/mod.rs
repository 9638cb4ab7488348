/// Database plumbing shared by the API and the worker
///
/// - `pool`: PostgreSQL connection pools with health checks
/// - `migrations`: migration runner for the identity store

pub mod migrations;
pub mod pool;
