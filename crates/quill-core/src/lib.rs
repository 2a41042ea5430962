//! Quill core — conversation types, configuration, and shared helpers.

pub mod config;
pub mod types;
pub mod utils;
