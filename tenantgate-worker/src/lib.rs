//! # TenantGate Worker Library
//!
//! Background repair of tenants whose namespace provisioning did not finish
//! during registration.
//!
//! ## Modules
//!
//! - `config`: Worker configuration from the environment
//! - `repair`: The repair loop

pub mod config;
pub mod repair;
