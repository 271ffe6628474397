//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the vault storage core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus for file sync notifications
//!
//! ## Overview
//!
//! Every other crate in the workspace depends on this one for its logging
//! conventions, its configuration types and the broadcast channel the sync
//! processors publish to.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
