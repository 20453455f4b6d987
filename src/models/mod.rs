//! Data models for the church backend.
//!
//! JSON field names are camelCase to match the admin frontend.

mod app_config;
mod birthday;
mod member;

pub use app_config::*;
pub use birthday::*;
pub use member::*;
