//! # TenantGate API Server Library
//!
//! Router, handlers and middleware of the TenantGate HTTP API. The binary in
//! `main.rs` wires these to PostgreSQL; tests wire them to the in-memory
//! stores.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Security headers and login throttling
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
