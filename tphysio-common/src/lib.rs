//! # TPhysio Common Library
//!
//! Shared code for the TPhysio analyzer crates:
//! - Error type
//! - TOML configuration model and loading
//! - Job event types (TphysioEvent enum) and the EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
