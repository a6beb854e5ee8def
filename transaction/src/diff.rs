//! Before/after field capture.
//!
//! A [`FieldDiff`] is filled in two passes around an open-ended edit:
//!
//! 1. [`watch`](FieldDiff::watch) snapshots the name and every fixed and
//!    dynamic field of an entity.
//! 2. The editor's domain logic mutates the entity however it likes.
//! 3. [`learn`](FieldDiff::learn) re-reads the fields and keeps only those
//!    whose value differs from the snapshot.
//!
//! Values are compared with [`Value::same_as`]; nested values are not
//! diffed structurally. Names are written back through
//! [`Document::rename`] so the name index stays consistent.

use std::collections::{BTreeMap, BTreeSet};

use crate::document::Document;
use crate::entity::{Entity, EntityId};
use crate::error::{TransactionError, TransactionResult};
use crate::value::Value;

/// The name and every field of one entity at `watch` time. Unset dynamic
/// fields are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSnapshot {
    name: Option<String>,
    values: BTreeMap<String, Value>,
}

impl FieldSnapshot {
    pub fn capture(entity: &Entity) -> Self {
        Self {
            name: entity.name().map(str::to_owned),
            values: entity
                .fields()
                .map(|(n, v)| (n.to_owned(), v.clone()))
                .collect(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Reads a captured field. Missing fields read as `Null`.
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A name change of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct NameChange {
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Field changes of one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDiff {
    /// Set when the entity was renamed.
    pub name: Option<NameChange>,
    /// Names of the fields that changed, sorted.
    pub fields: Vec<String>,
    /// Values before the edit, for every changed field that was set.
    pub old_values: BTreeMap<String, Value>,
    /// Values after the edit, for every changed field that is set.
    pub new_values: BTreeMap<String, Value>,
    /// Changed fields that were unset before the edit; undo clears them.
    pub old_null: BTreeSet<String>,
    /// Changed fields that are unset after the edit; redo clears them.
    pub new_null: BTreeSet<String>,
}

impl EntityDiff {
    fn between(before: &FieldSnapshot, after: &FieldSnapshot) -> Self {
        let names: BTreeSet<&String> = before.values.keys().chain(after.values.keys()).collect();
        let mut diff = Self::default();
        if before.name != after.name {
            diff.name = Some(NameChange {
                old: before.name.clone(),
                new: after.name.clone(),
            });
        }
        for name in names {
            let old = before.get(name);
            let new = after.get(name);
            if old.same_as(new) {
                continue;
            }
            diff.fields.push(name.clone());
            if old.is_null() {
                diff.old_null.insert(name.clone());
            } else {
                diff.old_values.insert(name.clone(), old.clone());
            }
            if new.is_null() {
                diff.new_null.insert(name.clone());
            } else {
                diff.new_values.insert(name.clone(), new.clone());
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.name.is_none()
    }

    fn write(entity: &mut Entity, values: &BTreeMap<String, Value>, nulls: &BTreeSet<String>) {
        for (name, value) in values {
            entity.set_field(name, value.clone());
        }
        for name in nulls {
            entity.clear_field(name);
        }
    }
}

/// Watched snapshots and learned differences for a group of entities.
#[derive(Debug, Clone, Default)]
pub struct FieldDiff {
    watched: BTreeMap<EntityId, FieldSnapshot>,
    diffs: BTreeMap<EntityId, EntityDiff>,
}

impl FieldDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots every field of a live entity and marks it observed.
    ///
    /// Watching an entity again replaces its snapshot and forgets any
    /// difference learned for it.
    pub fn watch(&mut self, doc: &Document, id: EntityId) -> TransactionResult {
        let entity = doc.get(id).ok_or(TransactionError::UnknownEntity(id))?;
        self.watched.insert(id, FieldSnapshot::capture(entity));
        self.diffs.remove(&id);
        Ok(())
    }

    /// [`watch`](Self::watch)es every entity of a collection.
    ///
    /// Stops at the first unknown entity; entities watched before it stay
    /// watched.
    pub fn watch_set(&mut self, doc: &Document, ids: &[EntityId]) -> TransactionResult {
        ids.iter().try_for_each(|&id| self.watch(doc, id))
    }

    /// Compares a watched entity against its snapshot.
    ///
    /// Returns `true` if any field differs. Learning again replaces the
    /// previous result, so repeated calls track the latest state.
    pub fn learn(&mut self, doc: &Document, id: EntityId) -> TransactionResult<bool> {
        let before = self
            .watched
            .get(&id)
            .ok_or(TransactionError::NotWatched(id))?;
        let entity = doc.get(id).ok_or(TransactionError::UnknownEntity(id))?;
        let diff = EntityDiff::between(before, &FieldSnapshot::capture(entity));
        if diff.is_empty() {
            self.diffs.remove(&id);
            Ok(false)
        } else {
            log::trace!(
                "Learned {} changed field(s) on {id}, renamed: {}",
                diff.fields.len(),
                diff.name.is_some()
            );
            self.diffs.insert(id, diff);
            Ok(true)
        }
    }

    /// [`learn`](Self::learn)s every watched entity of a collection.
    ///
    /// Entities that were never watched are ignored, so a selection that
    /// grew during the edit is fine. Watched entities that were removed
    /// during the edit are forgotten the same way. Returns `true` if any
    /// entity changed.
    pub fn learn_set(&mut self, doc: &Document, ids: &[EntityId]) -> TransactionResult<bool> {
        let mut changed = false;
        for &id in ids {
            if !self.watched.contains_key(&id) {
                continue;
            }
            if !doc.contains(id) {
                log::debug!("{id} was removed during the edit; forgetting it");
                self.forget(id);
                continue;
            }
            changed |= self.learn(doc, id)?;
        }
        Ok(changed)
    }

    /// Drops the snapshot and any learned difference of one entity.
    pub fn forget(&mut self, id: EntityId) {
        self.watched.remove(&id);
        self.diffs.remove(&id);
    }

    pub fn is_watching(&self, id: EntityId) -> bool {
        self.watched.contains_key(&id)
    }

    /// Returns `true` if at least one field of one entity changed.
    pub fn has_changes(&self) -> bool {
        !self.diffs.is_empty()
    }

    /// The learned difference for one entity.
    pub fn diff(&self, id: EntityId) -> Option<&EntityDiff> {
        self.diffs.get(&id)
    }

    /// Entities with at least one changed field.
    pub fn changed_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.diffs.keys().copied()
    }

    /// Writes the values from before the edit.
    pub fn apply_old(&self, doc: &mut Document) -> TransactionResult {
        self.check_alive(doc)?;
        self.rename_all(doc, false)?;
        for (&id, diff) in &self.diffs {
            if let Some(entity) = doc.get_mut(id) {
                EntityDiff::write(entity, &diff.old_values, &diff.old_null);
            }
        }
        Ok(())
    }

    /// Writes the values from after the edit.
    pub fn apply_new(&self, doc: &mut Document) -> TransactionResult {
        self.check_alive(doc)?;
        self.rename_all(doc, true)?;
        for (&id, diff) in &self.diffs {
            if let Some(entity) = doc.get_mut(id) {
                EntityDiff::write(entity, &diff.new_values, &diff.new_null);
            }
        }
        Ok(())
    }

    /// Moves every renamed entity to its old or new name. All names are
    /// released before any is taken, so swaps work. On a collision every
    /// entity gets its current name back.
    fn rename_all(&self, doc: &mut Document, forward: bool) -> TransactionResult {
        let renames: Vec<(EntityId, Option<&str>, Option<&str>)> = self
            .diffs
            .iter()
            .filter_map(|(&id, diff)| {
                let change = diff.name.as_ref()?;
                let (old, new) = (change.old.as_deref(), change.new.as_deref());
                Some(if forward { (id, old, new) } else { (id, new, old) })
            })
            .collect();

        for &(id, _, _) in &renames {
            doc.rename(id, None)?;
        }
        for (i, &(id, _, to)) in renames.iter().enumerate() {
            if let Err(err) = doc.rename(id, to) {
                let taken = renames[..i].iter().map(|&(done, _, _)| (done, None));
                let restore = renames.iter().map(|&(id, from, _)| (id, from));
                for (id, name) in taken.chain(restore) {
                    if let Err(rollback) = doc.rename(id, name) {
                        log::error!("Failed to restore the name of {id}: {rollback}");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn check_alive(&self, doc: &Document) -> TransactionResult {
        match self.diffs.keys().find(|&&id| !doc.contains(id)) {
            Some(&id) => Err(TransactionError::UnknownEntity(id)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::action::ActionId;
    use crate::entity::{EntityBlueprint, Schema};

    fn setup() -> (Document, EntityId) {
        let mut doc = Document::new();
        let schema = Arc::new(Schema::new("Shape").with_field("size", 4));
        let root = doc.root();
        let x = doc
            .spawn(&EntityBlueprint::new(schema).named("X"), root, 0)
            .unwrap();
        (doc, x)
    }

    #[test]
    fn watch_then_learn_reports_changed_field() {
        let (mut doc, x) = setup();
        let mut diff = FieldDiff::new();
        diff.watch(&doc, x).unwrap();

        doc.get_mut(x).unwrap().set_field("size", 10);
        assert!(diff.learn(&doc, x).unwrap());

        let d = diff.diff(x).unwrap();
        assert_eq!(d.fields, vec!["size".to_string()]);
        assert_eq!(d.old_values["size"], Value::I64(4));
        assert_eq!(d.new_values["size"], Value::I64(10));
        assert!(d.old_null.is_empty());
        assert!(d.new_null.is_empty());
    }

    #[test]
    fn untouched_entity_has_no_diff() {
        let (doc, x) = setup();
        let mut diff = FieldDiff::new();
        diff.watch(&doc, x).unwrap();
        assert!(!diff.learn(&doc, x).unwrap());
        assert!(!diff.has_changes());
    }

    #[test]
    fn setting_a_value_back_is_not_a_change() {
        let (mut doc, x) = setup();
        let mut diff = FieldDiff::new();
        diff.watch(&doc, x).unwrap();
        doc.get_mut(x).unwrap().set_field("size", 10);
        doc.get_mut(x).unwrap().set_field("size", 4);
        assert!(!diff.learn(&doc, x).unwrap());
    }

    #[test]
    fn tracks_null_transitions() {
        let (mut doc, x) = setup();
        doc.get_mut(x).unwrap().set_field("tooltip", "old");
        let mut diff = FieldDiff::new();
        diff.watch(&doc, x).unwrap();

        let e = doc.get_mut(x).unwrap();
        e.clear_field("tooltip");
        e.set_field("color", "red");
        e.clear_field("size");
        assert!(diff.learn(&doc, x).unwrap());

        let d = diff.diff(x).unwrap();
        assert_eq!(d.fields, vec!["color", "size", "tooltip"]);
        assert!(d.old_null.contains("color"));
        assert!(d.new_null.contains("tooltip"));
        assert!(d.new_null.contains("size"));
        assert!(!d.new_values.contains_key("tooltip"));
    }

    #[test]
    fn apply_old_and_new_round_trip() {
        let (mut doc, x) = setup();
        doc.get_mut(x).unwrap().set_field("tooltip", "old");
        let before = doc.snapshot();

        let mut diff = FieldDiff::new();
        diff.watch(&doc, x).unwrap();
        let e = doc.get_mut(x).unwrap();
        e.set_field("size", 10);
        e.clear_field("tooltip");
        e.set_field("color", "red");
        diff.learn(&doc, x).unwrap();
        let after = doc.snapshot();

        diff.apply_old(&mut doc).unwrap();
        assert_eq!(doc.snapshot(), before);
        diff.apply_new(&mut doc).unwrap();
        assert_eq!(doc.snapshot(), after);
    }

    #[test]
    fn rename_is_a_change() {
        let (mut doc, x) = setup();
        let mut diff = FieldDiff::new();
        diff.watch(&doc, x).unwrap();
        doc.rename(x, Some("Renamed")).unwrap();
        assert!(diff.learn(&doc, x).unwrap());

        let d = diff.diff(x).unwrap();
        assert!(d.fields.is_empty());
        assert_eq!(
            d.name,
            Some(NameChange {
                old: Some("X".into()),
                new: Some("Renamed".into()),
            })
        );

        diff.apply_old(&mut doc).unwrap();
        assert_eq!(doc.find("X"), Some(x));
        assert_eq!(doc.find("Renamed"), None);
        diff.apply_new(&mut doc).unwrap();
        assert_eq!(doc.find("Renamed"), Some(x));
    }

    #[test]
    fn swapped_names_round_trip() {
        let (mut doc, x) = setup();
        let root = doc.root();
        let y = doc
            .spawn(&EntityBlueprint::new(Arc::new(Schema::new("Shape"))).named("Y"), root, 1)
            .unwrap();
        let mut diff = FieldDiff::new();
        diff.watch_set(&doc, &[x, y]).unwrap();
        doc.rename(x, Some("tmp")).unwrap();
        doc.rename(y, Some("X")).unwrap();
        doc.rename(x, Some("Y")).unwrap();
        assert!(diff.learn_set(&doc, &[x, y]).unwrap());

        diff.apply_old(&mut doc).unwrap();
        assert_eq!((doc.find("X"), doc.find("Y")), (Some(x), Some(y)));
        diff.apply_new(&mut doc).unwrap();
        assert_eq!((doc.find("X"), doc.find("Y")), (Some(y), Some(x)));
    }

    #[test]
    fn name_collision_restores_names() {
        let (mut doc, x) = setup();
        let root = doc.root();
        let mut diff = FieldDiff::new();
        diff.watch(&doc, x).unwrap();
        doc.rename(x, Some("Renamed")).unwrap();
        diff.learn(&doc, x).unwrap();
        diff.apply_old(&mut doc).unwrap();

        let y = doc
            .spawn(&EntityBlueprint::new(Arc::new(Schema::new("Shape"))).named("Renamed"), root, 1)
            .unwrap();
        assert_eq!(
            diff.apply_new(&mut doc),
            Err(TransactionError::NameCollision("Renamed".into()))
        );
        assert_eq!(doc.find("X"), Some(x));
        assert_eq!(doc.find("Renamed"), Some(y));
    }

    #[test]
    fn learn_set_forgets_removed_entities() {
        let (mut doc, x) = setup();
        let root = doc.root();
        let y = doc
            .spawn(&EntityBlueprint::new(Arc::new(Schema::new("Shape"))), root, 1)
            .unwrap();
        let mut diff = FieldDiff::new();
        diff.watch_set(&doc, &[x, y]).unwrap();

        doc.get_mut(x).unwrap().set_field("size", 10);
        doc.trash_entity(y, ActionId::from_raw(1)).unwrap();
        assert!(diff.learn_set(&doc, &[x, y]).unwrap());
        assert!(!diff.is_watching(y));
        assert_eq!(diff.changed_entities().collect::<Vec<_>>(), vec![x]);
    }

    #[test]
    fn learn_requires_watch() {
        let (doc, x) = setup();
        let mut diff = FieldDiff::new();
        assert_eq!(diff.learn(&doc, x), Err(TransactionError::NotWatched(x)));
    }

    #[test]
    fn learn_set_ignores_unwatched() {
        let (mut doc, x) = setup();
        let root = doc.root();
        let y = doc
            .spawn(
                &EntityBlueprint::new(Arc::new(Schema::new("Shape"))),
                root,
                1,
            )
            .unwrap();
        let mut diff = FieldDiff::new();
        diff.watch_set(&doc, &[x]).unwrap();

        doc.get_mut(y).unwrap().set_field("size", 1);
        assert!(!diff.learn_set(&doc, &[x, y]).unwrap());
        assert!(!diff.is_watching(y));

        doc.get_mut(x).unwrap().set_field("size", 1);
        assert!(diff.learn_set(&doc, &[x, y]).unwrap());
        assert_eq!(diff.changed_entities().collect::<Vec<_>>(), vec![x]);
    }

    #[test]
    fn watch_unknown_entity_fails() {
        let (doc, _) = setup();
        let ghost = EntityId::from_raw(99);
        let mut diff = FieldDiff::new();
        assert_eq!(
            diff.watch(&doc, ghost),
            Err(TransactionError::UnknownEntity(ghost))
        );
    }
}
