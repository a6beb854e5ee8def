//! Action records: one undoable unit of work.
//!
//! An [`ActionRecord`] is a closed tagged variant over the kinds of edits
//! the engine understands. Dispatch for apply/undo/redo is a `match` on
//! [`ActionPayload`]; the record plugs into the generic
//! [`EditActionHistory`](redlilium_core::abstract_editor::EditActionHistory)
//! through its [`EditAction`] implementation.
//!
//! | Kind | apply / redo | undo |
//! |---|---|---|
//! | Structural-Add | spawn or restore from trash | trash (record owns) |
//! | Structural-Delete | trash (record owns) | restore |
//! | Reparent | move + verify | move back |
//! | Field-Diff | write new values | write old values |
//! | Compound | children forward | children in reverse |

use std::fmt;

use redlilium_core::abstract_editor::{EditAction, EditActionError, EditActionResult};

use crate::diff::FieldDiff;
use crate::document::Document;
use crate::entity::{EntityBlueprint, EntityId};
use crate::error::{TransactionError, TransactionResult};
use crate::observer::ChangeNotice;
use crate::trash;

/// Unique identity of an action record within one
/// [`TransactionContext`](crate::TransactionContext).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

/// The tag of an [`ActionPayload`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    StructuralAdd,
    StructuralDelete,
    Reparent,
    FieldDiff,
    Compound,
}

impl ActionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::StructuralAdd => "structural-add",
            Self::StructuralDelete => "structural-delete",
            Self::Reparent => "reparent",
            Self::FieldDiff => "field-diff",
            Self::Compound => "compound",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entity referenced by a structural add or delete.
///
/// `parent`, `index` and `name` describe where the entity lives when it is
/// alive; they are refreshed every time the entity is trashed.
#[derive(Debug, Clone)]
pub struct StructuralEntry {
    /// `None` until a blueprint entry is first applied.
    pub entity: Option<EntityId>,
    pub blueprint: Option<EntityBlueprint>,
    pub parent: EntityId,
    pub index: usize,
    pub name: Option<String>,
}

impl StructuralEntry {
    /// Entry for an entity that already exists.
    pub fn existing(id: EntityId) -> Self {
        Self {
            entity: Some(id),
            blueprint: None,
            parent: id,
            index: 0,
            name: None,
        }
    }

    /// Entry for an entity created from `blueprint` on first apply.
    pub fn blueprint(blueprint: EntityBlueprint, parent: EntityId, index: usize) -> Self {
        Self {
            entity: None,
            name: blueprint.name.clone(),
            blueprint: Some(blueprint),
            parent,
            index,
        }
    }
}

/// Move of one entity between two hierarchy positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReparentMove {
    pub entity: EntityId,
    /// Position before the move, captured on every apply.
    pub old: Option<(EntityId, usize)>,
    pub new_parent: EntityId,
    pub new_index: usize,
}

/// Kind-specific data of an action record.
#[derive(Debug)]
pub enum ActionPayload {
    StructuralAdd(Vec<StructuralEntry>),
    StructuralDelete(Vec<StructuralEntry>),
    Reparent(Option<ReparentMove>),
    FieldDiff(FieldDiff),
    Compound(Vec<ActionRecord>),
}

impl ActionPayload {
    fn empty(kind: ActionKind) -> Self {
        match kind {
            ActionKind::StructuralAdd => Self::StructuralAdd(Vec::new()),
            ActionKind::StructuralDelete => Self::StructuralDelete(Vec::new()),
            ActionKind::Reparent => Self::Reparent(None),
            ActionKind::FieldDiff => Self::FieldDiff(FieldDiff::new()),
            ActionKind::Compound => Self::Compound(Vec::new()),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::StructuralAdd(_) => ActionKind::StructuralAdd,
            Self::StructuralDelete(_) => ActionKind::StructuralDelete,
            Self::Reparent(_) => ActionKind::Reparent,
            Self::FieldDiff(_) => ActionKind::FieldDiff,
            Self::Compound(_) => ActionKind::Compound,
        }
    }
}

/// One undoable unit of work, possibly compound.
///
/// Created unpopulated by
/// [`TransactionContext::create_action`](crate::TransactionContext::create_action),
/// filled in by the editor, then committed.
#[derive(Debug)]
pub struct ActionRecord {
    id: ActionId,
    name: String,
    payload: ActionPayload,
}

impl ActionRecord {
    pub(crate) fn new(id: ActionId, kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            payload: ActionPayload::empty(kind),
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Name shown in the undo/redo menus.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &ActionPayload {
        &self.payload
    }

    /// Schedules creation of a new entity (Structural-Add only).
    pub fn add_blueprint(
        &mut self,
        blueprint: EntityBlueprint,
        parent: EntityId,
        index: usize,
    ) -> TransactionResult<&mut Self> {
        self.structural_entries(ActionKind::StructuralAdd)?
            .push(StructuralEntry::blueprint(blueprint, parent, index));
        Ok(self)
    }

    /// Records an entity the editor already created and attached
    /// (Structural-Add only). Its current position becomes the add target.
    pub fn add_existing(&mut self, doc: &Document, id: EntityId) -> TransactionResult<&mut Self> {
        let (parent, index) = doc.location(id).ok_or(TransactionError::UnknownEntity(id))?;
        let name = doc.get(id).and_then(|e| e.name().map(str::to_owned));
        self.structural_entries(ActionKind::StructuralAdd)?
            .push(StructuralEntry {
                entity: Some(id),
                blueprint: None,
                parent,
                index,
                name,
            });
        Ok(self)
    }

    /// Adds an entity to remove (Structural-Delete only).
    pub fn delete(&mut self, id: EntityId) -> TransactionResult<&mut Self> {
        self.structural_entries(ActionKind::StructuralDelete)?
            .push(StructuralEntry::existing(id));
        Ok(self)
    }

    /// Sets the move to perform (Reparent only).
    pub fn set_reparent(
        &mut self,
        entity: EntityId,
        new_parent: EntityId,
        new_index: usize,
    ) -> TransactionResult<&mut Self> {
        match &mut self.payload {
            ActionPayload::Reparent(slot) => {
                *slot = Some(ReparentMove {
                    entity,
                    old: None,
                    new_parent,
                    new_index,
                });
                Ok(self)
            }
            other => Err(mismatch(ActionKind::Reparent, other.kind())),
        }
    }

    /// The field diff being built (Field-Diff only).
    pub fn field_diff_mut(&mut self) -> TransactionResult<&mut FieldDiff> {
        match &mut self.payload {
            ActionPayload::FieldDiff(diff) => Ok(diff),
            other => Err(mismatch(ActionKind::FieldDiff, other.kind())),
        }
    }

    pub fn field_diff(&self) -> Option<&FieldDiff> {
        match &self.payload {
            ActionPayload::FieldDiff(diff) => Some(diff),
            _ => None,
        }
    }

    /// Entities touched by a structural add or delete. For blueprint
    /// entries this is only known after the first apply.
    pub fn structural_entities(&self) -> Vec<EntityId> {
        match &self.payload {
            ActionPayload::StructuralAdd(entries) | ActionPayload::StructuralDelete(entries) => {
                entries.iter().filter_map(|e| e.entity).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Child actions of a compound, in apply order.
    pub fn children(&self) -> &[ActionRecord] {
        match &self.payload {
            ActionPayload::Compound(children) => children,
            _ => &[],
        }
    }

    /// Returns `true` if committing this record would record nothing: a
    /// field diff without changes, a compound without children, or a
    /// structural/reparent record that was never populated.
    pub fn is_noop(&self) -> bool {
        match &self.payload {
            ActionPayload::StructuralAdd(entries) | ActionPayload::StructuralDelete(entries) => {
                entries.is_empty()
            }
            ActionPayload::Reparent(mv) => mv.is_none(),
            ActionPayload::FieldDiff(diff) => !diff.has_changes(),
            ActionPayload::Compound(children) => children.is_empty(),
        }
    }

    pub(crate) fn take_children(&mut self) -> Vec<ActionRecord> {
        match &mut self.payload {
            ActionPayload::Compound(children) => std::mem::take(children),
            _ => Vec::new(),
        }
    }

    pub(crate) fn push_child(&mut self, child: ActionRecord) -> TransactionResult {
        match &mut self.payload {
            ActionPayload::Compound(children) => {
                children.push(child);
                Ok(())
            }
            other => Err(mismatch(ActionKind::Compound, other.kind())),
        }
    }

    /// What observers need to refresh after this record ran in either
    /// direction.
    pub fn notice(&self) -> ChangeNotice {
        let mut notice = ChangeNotice::default();
        self.collect_notice(&mut notice);
        notice
    }

    fn collect_notice(&self, notice: &mut ChangeNotice) {
        match &self.payload {
            ActionPayload::StructuralAdd(entries) | ActionPayload::StructuralDelete(entries) => {
                for e in entries {
                    notice.hierarchy.extend(e.entity);
                    notice.hierarchy.push(e.parent);
                }
            }
            ActionPayload::Reparent(Some(mv)) => {
                notice.hierarchy.push(mv.entity);
                notice.hierarchy.push(mv.new_parent);
                notice.hierarchy.extend(mv.old.map(|(p, _)| p));
            }
            ActionPayload::Reparent(None) => {}
            ActionPayload::FieldDiff(diff) => notice.fields.extend(diff.changed_entities()),
            ActionPayload::Compound(children) => {
                for child in children {
                    child.collect_notice(notice);
                }
            }
        }
        notice.normalize();
    }

    fn structural_entries(&mut self, kind: ActionKind) -> TransactionResult<&mut Vec<StructuralEntry>> {
        match (&mut self.payload, kind) {
            (ActionPayload::StructuralAdd(entries), ActionKind::StructuralAdd)
            | (ActionPayload::StructuralDelete(entries), ActionKind::StructuralDelete) => {
                Ok(entries)
            }
            (other, _) => Err(mismatch(kind, other.kind())),
        }
    }

    // ---- Structural-Add ----

    fn apply_add(
        id: ActionId,
        doc: &mut Document,
        entries: &mut [StructuralEntry],
    ) -> TransactionResult {
        for i in 0..entries.len() {
            if let Err(err) = Self::apply_add_entry(id, doc, &mut entries[i]) {
                // Undo the entries already added, newest first.
                let done: Vec<usize> = (0..i).rev().collect();
                if let Err(rollback) = trash::trash_objects(doc, id, entries, &done) {
                    log::error!("Failed to roll back partial add: {rollback}");
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply_add_entry(
        id: ActionId,
        doc: &mut Document,
        entry: &mut StructuralEntry,
    ) -> TransactionResult {
        match entry.entity {
            None => {
                let blueprint = entry.blueprint.as_ref().ok_or_else(|| {
                    TransactionError::from(EditActionError::InvalidState(
                        "add entry without entity or blueprint".into(),
                    ))
                })?;
                let spawned = doc.spawn(blueprint, entry.parent, entry.index)?;
                entry.entity = Some(spawned);
                if let Some((parent, index)) = doc.location(spawned) {
                    entry.parent = parent;
                    entry.index = index;
                }
                Ok(())
            }
            Some(e) if doc.trash().owner(e) == Some(id) => doc.restore_entity(e, id),
            Some(e) if doc.location(e) == Some((entry.parent, entry.index)) => Ok(()),
            Some(e) if doc.is_trashed(e) => Err(TransactionError::NotOwner(e)),
            Some(e) => Err(EditActionError::InvalidState(format!(
                "{e} is not at its recorded position {}[{}]",
                entry.parent, entry.index
            ))
            .into()),
        }
    }

    // ---- Reparent ----

    fn apply_reparent(doc: &mut Document, mv: &mut ReparentMove) -> EditActionResult {
        let old = doc.detach(mv.entity).ok_or_else(|| {
            EditActionError::TargetNotFound(format!("{} is not in the hierarchy", mv.entity))
        })?;
        mv.old = Some(old);
        doc.attach(mv.entity, mv.new_parent, mv.new_index);

        let actual = doc.location(mv.entity);
        if actual == Some((mv.new_parent, mv.new_index)) {
            return Ok(());
        }
        log::warn!(
            "Reparent of {} to {}[{}] ended at {:?}; reverting",
            mv.entity,
            mv.new_parent,
            mv.new_index,
            actual
        );
        Self::undo_reparent(doc, mv)?;
        Err(EditActionError::Rejected(format!(
            "{} could not be moved to {}[{}]",
            mv.entity, mv.new_parent, mv.new_index
        )))
    }

    fn undo_reparent(doc: &mut Document, mv: &ReparentMove) -> EditActionResult {
        let (parent, index) = mv
            .old
            .ok_or_else(|| EditActionError::InvalidState("reparent was never applied".into()))?;
        doc.attach_unchecked(mv.entity, parent, index)?;
        Ok(())
    }

    // ---- Compound ----

    fn apply_children(doc: &mut Document, children: &mut [ActionRecord], redo: bool) -> EditActionResult {
        for i in 0..children.len() {
            let result = if redo {
                children[i].redo(doc)
            } else {
                children[i].apply(doc)
            };
            if let Err(err) = result {
                for done in children[..i].iter_mut().rev() {
                    if let Err(rollback) = done.undo(doc) {
                        log::error!("Failed to unwind \"{}\": {rollback}", done.name);
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn undo_children(doc: &mut Document, children: &mut [ActionRecord]) -> EditActionResult {
        for i in (0..children.len()).rev() {
            if let Err(err) = children[i].undo(doc) {
                for undone in children[i + 1..].iter_mut() {
                    if let Err(rollback) = undone.redo(doc) {
                        log::error!("Failed to re-apply \"{}\": {rollback}", undone.name);
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

impl EditAction<Document> for ActionRecord {
    fn apply(&mut self, doc: &mut Document) -> EditActionResult {
        let id = self.id;
        match &mut self.payload {
            ActionPayload::StructuralAdd(entries) => Ok(Self::apply_add(id, doc, entries)?),
            ActionPayload::StructuralDelete(entries) => {
                let order: Vec<usize> = (0..entries.len()).collect();
                Ok(trash::trash_objects(doc, id, entries, &order)?)
            }
            ActionPayload::Reparent(Some(mv)) => Self::apply_reparent(doc, mv),
            ActionPayload::Reparent(None) => {
                Err(EditActionError::InvalidState("reparent has no move".into()))
            }
            ActionPayload::FieldDiff(diff) => Ok(diff.apply_new(doc)?),
            ActionPayload::Compound(children) => Self::apply_children(doc, children, false),
        }
    }

    fn undo(&mut self, doc: &mut Document) -> EditActionResult {
        let id = self.id;
        match &mut self.payload {
            ActionPayload::StructuralAdd(entries) => {
                let order: Vec<usize> = (0..entries.len()).rev().collect();
                Ok(trash::trash_objects(doc, id, entries, &order)?)
            }
            ActionPayload::StructuralDelete(entries) => {
                let order: Vec<usize> = (0..entries.len()).rev().collect();
                Ok(trash::restore_objects(doc, id, entries, &order)?)
            }
            ActionPayload::Reparent(Some(mv)) => Self::undo_reparent(doc, mv),
            ActionPayload::Reparent(None) => {
                Err(EditActionError::InvalidState("reparent has no move".into()))
            }
            ActionPayload::FieldDiff(diff) => Ok(diff.apply_old(doc)?),
            ActionPayload::Compound(children) => Self::undo_children(doc, children),
        }
    }

    fn redo(&mut self, doc: &mut Document) -> EditActionResult {
        let id = self.id;
        match &mut self.payload {
            ActionPayload::StructuralAdd(entries) => {
                let order: Vec<usize> = (0..entries.len()).collect();
                Ok(trash::restore_objects(doc, id, entries, &order)?)
            }
            ActionPayload::Compound(children) => Self::apply_children(doc, children, true),
            _ => self.apply(doc),
        }
    }

    fn description(&self) -> &str {
        &self.name
    }

    fn on_discard(&mut self, doc: &mut Document) {
        let id = self.id;
        match &mut self.payload {
            ActionPayload::StructuralAdd(entries) | ActionPayload::StructuralDelete(entries) => {
                trash::on_remove(doc, id, entries);
            }
            ActionPayload::Compound(children) => {
                for child in children.iter_mut().rev() {
                    child.on_discard(doc);
                }
            }
            ActionPayload::Reparent(_) | ActionPayload::FieldDiff(_) => {}
        }
    }
}

fn mismatch(expected: ActionKind, found: ActionKind) -> TransactionError {
    TransactionError::KindMismatch {
        expected: expected.label(),
        found: found.label(),
    }
}
