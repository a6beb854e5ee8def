//! Undo/redo transaction engine for RedLilium editors.
//!
//! The GUI layout editor, the shape editor and the behavior-tree editor all
//! edit the same kind of data: a [`Document`] of [`Entity`] objects, each
//! with schema-declared fixed fields, free-form dynamic fields and a place
//! in a parent/child hierarchy. This crate makes every edit of such a
//! document undoable.
//!
//! # Architecture
//!
//! - [`ActionRecord`]: one undoable unit of work, a closed tagged variant
//!   (structural add/delete, reparent, field diff, compound) implementing
//!   [`EditAction`](redlilium_core::abstract_editor::EditAction).
//! - [`TransactionContext`]: per-editor manager on top of
//!   [`EditActionHistory`](redlilium_core::abstract_editor::EditActionHistory):
//!   compounds, field edit sessions, menu names, observers.
//! - [`FieldDiff`]: the watch/learn cycle that turns an open-ended edit
//!   into old/new values.
//! - [`Trash`]: owner-tracked holding area for removed entities, so undo
//!   can bring them back and discarding an action destroys them exactly once.
//! - [`operations`]: multi-step editor operations such as
//!   [`insert_between`](operations::insert_between).
//!
//! # Example
//!
//! ```ignore
//! let mut doc = Document::new();
//! let mut ctx = TransactionContext::new();
//!
//! let button = operations::add_entity(&mut ctx, &mut doc, &blueprint, doc.root(), 0, "Add Button")?;
//!
//! ctx.on_pre_edit(&doc, &[button])?;
//! doc.get_mut(button).unwrap().set_field("size", 10);
//! ctx.on_post_edit(&mut doc, &[button])?;
//!
//! ctx.undo(&mut doc)?; // size back to its old value
//! ```

mod action;
mod config;
mod context;
mod diff;
mod document;
mod entity;
mod error;
mod observer;
pub mod operations;
pub mod trash;
mod value;

pub use action::{ActionId, ActionKind, ActionPayload, ActionRecord, ReparentMove, StructuralEntry};
pub use config::TransactionConfig;
pub use context::{Outcome, TransactionContext};
pub use diff::{EntityDiff, FieldDiff, FieldSnapshot, NameChange};
pub use document::{AttachPolicy, Document, DocumentSnapshot, EntitySnapshot};
pub use entity::{Entity, EntityBlueprint, EntityId, Schema};
pub use error::{TransactionError, TransactionResult};
pub use observer::{ChangeNotice, EditorObserver};
pub use trash::Trash;
pub use value::Value;
