/// API route handlers
///
/// Organized by resource:
///
/// - `health`: Health check endpoint
/// - `tenants`: Tenant registration, lookup and provisioning
/// - `users`: Signup and login inside a tenant

pub mod health;
pub mod tenants;
pub mod users;
