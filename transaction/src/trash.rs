//! Ownership of removed entities.
//!
//! When an undoable action removes entities from the live hierarchy they
//! move, with their whole subtree, into the document's [`Trash`]. Each
//! trashed entity records exactly one owner: the action that trashed it
//! (its designated deleter). Only that action may restore it, and only that
//! action destroys it for good when the history discards it.
//!
//! ```text
//! Alive --trash_objects(A)--> Trashed[owner = A] --restore_objects(A)--> Alive
//!                                   |
//!                                   +--on_remove(A)--> destroyed
//! ```

use std::collections::HashMap;

use redlilium_core::abstract_editor::EditActionError;

use crate::action::{ActionId, StructuralEntry};
use crate::document::Document;
use crate::entity::{Entity, EntityId};
use crate::error::{TransactionError, TransactionResult};

#[derive(Debug)]
struct TrashEntry {
    owner: ActionId,
    /// Name of the top entity, released while trashed.
    name: Option<String>,
    parent: EntityId,
    index: usize,
    /// The trashed entity first, then its descendants depth-first.
    subtree: Vec<Entity>,
}

/// Holding area for entities detached from the live hierarchy.
#[derive(Debug, Default)]
pub struct Trash {
    entries: HashMap<EntityId, TrashEntry>,
}

impl Trash {
    /// Number of trashed top-level entities (descendants not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    /// The designated deleter of a trashed entity.
    pub fn owner(&self, id: EntityId) -> Option<ActionId> {
        self.entries.get(&id).map(|e| e.owner)
    }

    /// Name the entity had before it was trashed.
    pub fn captured_name(&self, id: EntityId) -> Option<&str> {
        self.entries.get(&id).and_then(|e| e.name.as_deref())
    }

    /// Ids of all trashed top-level entities.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entries.keys().copied()
    }
}

impl Document {
    /// Moves one live entity and its subtree into the trash.
    ///
    /// Returns the parent, sibling index and name it had.
    pub(crate) fn trash_entity(
        &mut self,
        id: EntityId,
        owner: ActionId,
    ) -> TransactionResult<(EntityId, usize, Option<String>)> {
        if self.trash.contains(id) {
            return Err(TransactionError::AlreadyTrashed(id));
        }
        if id == self.root() {
            return Err(EditActionError::InvalidState("the root cannot be removed".into()).into());
        }
        let (parent, index) = self
            .detach(id)
            .ok_or(TransactionError::UnknownEntity(id))?;

        let mut subtree: Vec<Entity> = self
            .subtree(id)
            .into_iter()
            .filter_map(|sid| self.take_entity(sid))
            .collect();
        let name = subtree.first_mut().and_then(|top| top.name.take());

        log::debug!(
            "Trashed {id} ({} entities) from {parent}[{index}], owner {owner}",
            subtree.len()
        );
        self.trash.entries.insert(
            id,
            TrashEntry {
                owner,
                name: name.clone(),
                parent,
                index,
                subtree,
            },
        );
        Ok((parent, index, name))
    }

    /// Moves a trashed entity back to its recorded parent and index.
    ///
    /// Fails without changing anything if `owner` is not the designated
    /// deleter, the old parent is gone, or a name was taken meanwhile.
    pub(crate) fn restore_entity(&mut self, id: EntityId, owner: ActionId) -> TransactionResult {
        let entry = self
            .trash
            .entries
            .get(&id)
            .ok_or(TransactionError::UnknownEntity(id))?;
        if entry.owner != owner {
            return Err(TransactionError::NotOwner(id));
        }
        if !self.contains(entry.parent) {
            return Err(TransactionError::UnknownEntity(entry.parent));
        }
        let names = entry
            .name
            .iter()
            .chain(entry.subtree.iter().skip(1).filter_map(|e| e.name.as_ref()));
        for name in names {
            if self.name_in_use(name) {
                return Err(TransactionError::NameCollision(name.clone()));
            }
        }

        let Some(entry) = self.trash.entries.remove(&id) else {
            return Err(TransactionError::UnknownEntity(id));
        };
        for mut entity in entry.subtree {
            if entity.id() == id {
                entity.name = entry.name.clone();
            }
            self.insert_entity(entity);
        }
        self.attach_unchecked(id, entry.parent, entry.index)?;
        log::debug!(
            "Restored {id} to {}[{}], owner {owner} released",
            entry.parent,
            entry.index
        );
        Ok(())
    }

    /// Destroys a trashed entity for good if `owner` is its designated
    /// deleter. Returns `true` if something was destroyed.
    pub(crate) fn purge_trashed(&mut self, id: EntityId, owner: ActionId) -> bool {
        if self.trash.owner(id) != Some(owner) {
            return false;
        }
        let Some(entry) = self.trash.entries.remove(&id) else {
            return false;
        };
        log::info!(
            "Destroyed trashed entity {id} ({} entities), owner {owner}",
            entry.subtree.len()
        );
        true
    }
}

/// Trashes the entities of `entries`, visiting them in `order`.
///
/// Each visited entry is updated with the parent, index and name its
/// entity had. All or nothing: if one entity cannot be trashed, the ones
/// already moved are restored before the error is returned. Entries without
/// an entity are skipped.
pub fn trash_objects(
    doc: &mut Document,
    owner: ActionId,
    entries: &mut [StructuralEntry],
    order: &[usize],
) -> TransactionResult {
    for (step, &i) in order.iter().enumerate() {
        let Some(id) = entries[i].entity else {
            continue;
        };
        match doc.trash_entity(id, owner) {
            Ok((parent, index, name)) => {
                let entry = &mut entries[i];
                entry.parent = parent;
                entry.index = index;
                entry.name = name;
            }
            Err(err) => {
                for &j in order[..step].iter().rev() {
                    if let Some(prev) = entries[j].entity
                        && let Err(rollback) = doc.restore_entity(prev, owner)
                    {
                        log::error!("Failed to roll back trashing of {prev}: {rollback}");
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Restores the entities of `entries` from the trash, visiting them in
/// `order`, which must be the reverse of the order they were trashed in.
///
/// All or nothing: on failure the entities already restored are trashed
/// again under the same owner.
pub fn restore_objects(
    doc: &mut Document,
    owner: ActionId,
    entries: &[StructuralEntry],
    order: &[usize],
) -> TransactionResult {
    for (step, &i) in order.iter().enumerate() {
        let Some(id) = entries[i].entity else {
            continue;
        };
        if let Err(err) = doc.restore_entity(id, owner) {
            for &j in order[..step].iter().rev() {
                if let Some(prev) = entries[j].entity
                    && let Err(rollback) = doc.trash_entity(prev, owner)
                {
                    log::error!("Failed to roll back restore of {prev}: {rollback}");
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Called when the action `owner` is discarded: destroys every entity of
/// `entries` that `owner` still holds in the trash.
///
/// Entities that were restored (ownership passed back to the hierarchy) or
/// trashed by another action are left alone. Returns how many top-level
/// entities were destroyed.
pub fn on_remove(doc: &mut Document, owner: ActionId, entries: &[StructuralEntry]) -> usize {
    entries
        .iter()
        .filter_map(|e| e.entity)
        .filter(|&id| doc.purge_trashed(id, owner))
        .count()
}
