//! Configuration management for the session lifecycle manager
//!
//! This module handles loading and managing configuration settings for the
//! library and the `upload-session` binary.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::Settings;
