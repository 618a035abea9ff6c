//! Workspace placeholder crate.
//!
//! Re-exports the service facade so host applications can depend on
//! `feedsync-workspace` alone instead of wiring each crate individually.

#[cfg(feature = "service")]
pub use core_service::*;
