//! Change notification from the engine to editor views.

use crate::entity::EntityId;

/// What changed when an action was applied, undone, or redone.
///
/// Tree views refresh on `hierarchy`, inspectors on `fields`. Both lists
/// are sorted and free of duplicates; ids may refer to entities that are
/// now trashed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeNotice {
    pub hierarchy: Vec<EntityId>,
    pub fields: Vec<EntityId>,
}

impl ChangeNotice {
    pub fn is_empty(&self) -> bool {
        self.hierarchy.is_empty() && self.fields.is_empty()
    }

    pub(crate) fn merge(&mut self, other: ChangeNotice) {
        self.hierarchy.extend(other.hierarchy);
        self.fields.extend(other.fields);
        self.normalize();
    }

    pub(crate) fn normalize(&mut self) {
        self.hierarchy.sort_unstable();
        self.hierarchy.dedup();
        self.fields.sort_unstable();
        self.fields.dedup();
    }
}

/// A view that mirrors a [`Document`](crate::Document) (scene tree,
/// property inspector) and must refresh after edits.
pub trait EditorObserver {
    fn update(&mut self, notice: &ChangeNotice);
}

impl<F: FnMut(&ChangeNotice)> EditorObserver for F {
    fn update(&mut self, notice: &ChangeNotice) {
        self(notice)
    }
}
