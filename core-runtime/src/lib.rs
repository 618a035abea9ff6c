//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the cache, sync and service crates:
//! - Logging and tracing setup
//! - Configuration management
//! - A typed broadcast event bus
//!
//! The sync engine publishes its lifecycle feed through [`events::EventBus`],
//! and the service facade scopes one bus per model type for cross-engine
//! change propagation.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
