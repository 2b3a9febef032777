//! Error handling for the session lifecycle manager
//!
//! This module defines the error taxonomy shared by the credential store,
//! the liveness verifier and the interactive login coordinator.

pub mod types;

pub use types::{Error, Result};
