//! Application services: registries, resolution and the render pipeline.

pub mod api_keys;
pub mod auth;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod render;
pub mod repos;
pub mod resolver;
pub mod templates;
