use std::fmt;

use redlilium_core::abstract_editor::EditActionError;

use crate::entity::EntityId;

/// Errors reported by the transaction engine to an editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// An action failed to apply, undo, or redo.
    Action(EditActionError),
    /// `on_pre_edit` was called while another edit session is still open.
    EditSessionOpen,
    /// `on_post_edit` or `cancel_edit` without a matching `on_pre_edit`.
    NoEditSession,
    /// `pop_compound` without a matching `push_compound`.
    NoOpenCompound,
    /// Undo/redo requested while a compound is still being built.
    CompoundOpen,
    /// A previous step of the open compound failed; the compound was unwound
    /// and accepts no further actions until it is popped.
    CompoundAborted,
    /// The entity is not alive in the document.
    UnknownEntity(EntityId),
    /// The entity was never passed to `watch`.
    NotWatched(EntityId),
    /// Another live entity already uses this name.
    NameCollision(String),
    /// The entity is already in the trash.
    AlreadyTrashed(EntityId),
    /// The entity is trashed, but owned by another action.
    NotOwner(EntityId),
    /// The action was populated with data of another kind.
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(err) => write!(f, "{err}"),
            Self::EditSessionOpen => write!(f, "an edit session is already open"),
            Self::NoEditSession => write!(f, "no edit session is open"),
            Self::NoOpenCompound => write!(f, "no compound action is open"),
            Self::CompoundOpen => write!(f, "a compound action is still open"),
            Self::CompoundAborted => write!(f, "the open compound action was aborted"),
            Self::UnknownEntity(id) => write!(f, "unknown entity {id}"),
            Self::NotWatched(id) => write!(f, "entity {id} is not being watched"),
            Self::NameCollision(name) => write!(f, "name '{name}' is already in use"),
            Self::AlreadyTrashed(id) => write!(f, "entity {id} is already trashed"),
            Self::NotOwner(id) => write!(f, "entity {id} is trashed by another action"),
            Self::KindMismatch { expected, found } => {
                write!(f, "expected a {expected} action, found {found}")
            }
        }
    }
}

impl std::error::Error for TransactionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Action(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EditActionError> for TransactionError {
    fn from(err: EditActionError) -> Self {
        Self::Action(err)
    }
}

impl From<TransactionError> for EditActionError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Action(inner) => inner,
            TransactionError::UnknownEntity(id) => Self::TargetNotFound(id.to_string()),
            other => Self::InvalidState(other.to_string()),
        }
    }
}

/// Result type for transaction engine operations.
pub type TransactionResult<T = ()> = Result<T, TransactionError>;
