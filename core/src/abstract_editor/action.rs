//! Editable targets and reversible editor actions.
//!
//! This module defines the core abstractions for an undo/redo editor system:
//!
//! - [`Editable`]: marker trait for types that can be edited
//! - [`EditAction`]: a reversible edit operation (Command pattern)
//! - [`EditActionError`] / [`EditActionResult`]: error handling for actions
//!
//! EditActions are self-contained: each implementation internally stores whatever
//! data it needs (target identifiers, old/new values, detached objects, etc.).

use std::any::Any;
use std::fmt;

/// Helper trait for downcasting trait objects to concrete types.
///
/// Automatically implemented for all `'static` types. Lets code that owns an
/// [`EditActionHistory`](super::EditActionHistory) of `Box<dyn EditAction<T>>`
/// recover the concrete action type, e.g. to inspect what an undo touched.
pub trait AsAny: 'static {
    /// Returns a reference to `self` as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Marker trait for types that serve as editing targets.
///
/// Implement this on any type that actions can operate on: a scene
/// document, a widget tree, a behavior tree, etc.
///
/// # Example
///
/// ```ignore
/// struct MyScene { /* ... */ }
/// impl Editable for MyScene {}
/// ```
pub trait Editable: 'static {}

/// Error type for action execution failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditActionError {
    /// The target object was not found.
    TargetNotFound(String),
    /// The target is in an invalid state for this action.
    InvalidState(String),
    /// The action detected that its effect did not match the request and
    /// already reverted itself. Nothing was changed.
    Rejected(String),
    /// The undo stack is empty.
    NothingToUndo,
    /// The redo stack is empty.
    NothingToRedo,
    /// A custom error with a description.
    Custom(String),
}

impl fmt::Display for EditActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetNotFound(msg) => write!(f, "target not found: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
            Self::NothingToUndo => write!(f, "nothing to undo"),
            Self::NothingToRedo => write!(f, "nothing to redo"),
            Self::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EditActionError {}

/// Result type for action operations.
pub type EditActionResult<T = ()> = Result<T, EditActionError>;

/// A reversible editor action (Command pattern).
///
/// EditActions encapsulate a single logical edit and capture enough state to
/// undo the change and redo it. Each implementation stores its own data
/// internally; there is no prescribed property system.
///
/// # Ownership
///
/// An action may hold the only claim on objects it removed from the target
/// (a delete that can be undone keeps the deleted objects alive). When the
/// history drops an action for good (truncated redo tail, evicted oldest
/// entry, cleared history) it calls
/// [`on_discard`](Self::on_discard) with the target so the action can
/// release or destroy what it still owns.
///
/// # Object Safety
///
/// This trait is dyn-compatible so that different action types can be stored
/// in a single [`EditActionHistory`](super::EditActionHistory) undo/redo stack as
/// `Box<dyn EditAction<T>>`.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug)]
/// struct MoveEntity {
///     entity: EntityId,
///     old_pos: Vec3,
///     new_pos: Vec3,
/// }
///
/// impl EditAction<Scene> for MoveEntity {
///     fn apply(&mut self, target: &mut Scene) -> EditActionResult {
///         target.set_position(self.entity, self.new_pos);
///         Ok(())
///     }
///
///     fn undo(&mut self, target: &mut Scene) -> EditActionResult {
///         target.set_position(self.entity, self.old_pos);
///         Ok(())
///     }
///
///     fn description(&self) -> &str {
///         "Move entity"
///     }
/// }
/// ```
pub trait EditAction<T: Editable>: fmt::Debug + AsAny + Send {
    /// Applies the action to the target for the first time.
    ///
    /// Returns `Ok(())` on success, or an [`EditActionError`] if the action
    /// could not be applied. A failed apply must leave the target as it
    /// found it.
    fn apply(&mut self, target: &mut T) -> EditActionResult;

    /// Reverses the action (undo direction).
    ///
    /// Must restore the target to the state before [`apply`](Self::apply)
    /// was called.
    fn undo(&mut self, target: &mut T) -> EditActionResult;

    /// Re-applies the action after an [`undo`](Self::undo).
    ///
    /// Defaults to [`apply`](Self::apply).
    fn redo(&mut self, target: &mut T) -> EditActionResult {
        self.apply(target)
    }

    /// A short, human-readable description for display in the edit menu.
    ///
    /// Examples: `"Move entity"`, `"Change base color"`, `"Insert node"`.
    fn description(&self) -> &str;

    /// Called once when the history drops this action permanently.
    ///
    /// Default: does nothing.
    fn on_discard(&mut self, _target: &mut T) {}
}
