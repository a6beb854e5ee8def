//! Abstract editor framework for reversible editing operations.
//!
//! This module provides the foundational traits and types for building
//! an undo/redo-capable editor system. It is decoupled from specific
//! editable types (scene documents, widget trees, behavior trees) so that
//! higher-level crates can implement concrete editors.
//!
//! - [`Editable`]: marker trait for types that can be edited
//! - [`EditAction`]: an edit operation (Command pattern)
//! - [`EditActionHistory`]: linear undo/redo history managing action sequences
//!
//! # Discarding actions
//!
//! Actions leave the history for good in three ways: a new commit truncates
//! the redo tail, the undo stack overflows its capacity and evicts the
//! oldest entry, or the history is cleared. Each time, the history calls
//! [`EditAction::on_discard`] with the target. Actions that keep removed
//! objects alive for a possible undo use this hook to destroy them.

mod action;
mod history;

pub use action::{AsAny, EditAction, EditActionError, EditActionResult, Editable};
pub use history::{DEFAULT_MAX_UNDO, EditActionHistory};
