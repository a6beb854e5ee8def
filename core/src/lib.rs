//! # RedLilium Engine Core
//!
//! Core crate for RedLilium Engine basic utilities.

pub mod abstract_editor;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
