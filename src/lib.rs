//! Multi-tenant document rendering: template fallback resolution, pluggable
//! value injectors and payload mappers behind an HTTP API.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod plugins;
