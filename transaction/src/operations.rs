//! Editor-level edits built from primitive records.
//!
//! These are the operations tree views and toolbars call directly. Each one
//! records exactly one undo step.

use redlilium_core::abstract_editor::EditActionError;

use crate::action::ActionKind;
use crate::context::{Outcome, TransactionContext};
use crate::document::Document;
use crate::entity::{EntityBlueprint, EntityId};
use crate::error::{TransactionError, TransactionResult};

/// Creates an entity under `parent` at `index` (past the end appends) and
/// records it as one undo step.
pub fn add_entity(
    ctx: &mut TransactionContext,
    doc: &mut Document,
    blueprint: &EntityBlueprint,
    parent: EntityId,
    index: usize,
    name: &str,
) -> TransactionResult<EntityId> {
    let id = doc.spawn(blueprint, parent, index)?;
    let mut add = ctx.create_action(ActionKind::StructuralAdd, name);
    let owner = add.id();
    let recorded = match add.add_existing(doc, id).map(|_| ()) {
        Ok(()) => ctx.add_to_manager(doc, add).map(|_| ()),
        Err(err) => Err(err),
    };
    if let Err(err) = recorded {
        // Not in history, so nothing could ever undo it.
        if doc.trash_entity(id, owner).is_ok() {
            doc.purge_trashed(id, owner);
        }
        return Err(err);
    }
    Ok(id)
}

/// Deletes the selected entities with their subtrees as one undo step.
///
/// Entities below another selected entity go with it and are not listed
/// separately.
pub fn delete_selection(
    ctx: &mut TransactionContext,
    doc: &mut Document,
    selection: &[EntityId],
    name: &str,
) -> TransactionResult<Outcome> {
    let mut del = ctx.create_action(ActionKind::StructuralDelete, name);
    for id in top_level(doc, selection) {
        del.delete(id)?;
    }
    ctx.do_action(doc, del)
}

/// Moves the selected entities under `new_parent`, keeping their selection
/// order, starting at `index` (`None` appends). One undo step.
///
/// `index` counts the parent's current children. Selected entities that
/// already sit under `new_parent` leave their slots first, so the moved
/// block starts at `index` or at the end of what remains, whichever is
/// smaller. An index past the current end is refused.
///
/// Moves the document refuses are skipped; the rest still happen.
pub fn reparent_selection(
    ctx: &mut TransactionContext,
    doc: &mut Document,
    selection: &[EntityId],
    new_parent: EntityId,
    index: Option<usize>,
    name: &str,
) -> TransactionResult<Outcome> {
    if !doc.contains(new_parent) {
        return Err(TransactionError::UnknownEntity(new_parent));
    }
    let moving = top_level(doc, selection);
    let current_len = doc.get(new_parent).map_or(0, |p| p.children().len());
    ctx.push_compound(name);
    let mut placed = 0;
    for (k, &id) in moving.iter().enumerate() {
        let at = match index {
            None => append_index(doc, id, new_parent),
            // Left as is so the move fails verification.
            Some(i) if i > current_len => i,
            Some(i) => slot_index(doc, id, new_parent, i + placed, &moving[k + 1..]),
        };
        match reparent(ctx, doc, id, new_parent, at, name) {
            Ok(Outcome::Committed) => placed += 1,
            Ok(Outcome::Skipped) => {}
            Err(err) => {
                ctx.pop_compound(doc)?;
                return Err(err);
            }
        }
    }
    ctx.pop_compound(doc)
}

/// Inserts a new entity between `parent` and its direct child `child` as
/// one undo step "`name`".
///
/// Afterwards the new entity sits where `child` was and `child` is its
/// first child. Steps:
///
/// 1. move `child` to the end of the root (holding area)
/// 2. create the new entity at the end of `parent`
/// 3. move the new entity to `child`'s old index
/// 4. move `child` under the new entity
///
/// If any step fails or is refused, the steps before it are unwound and
/// nothing is recorded.
pub fn insert_between(
    ctx: &mut TransactionContext,
    doc: &mut Document,
    parent: EntityId,
    child: EntityId,
    blueprint: &EntityBlueprint,
    name: &str,
) -> TransactionResult<EntityId> {
    let (actual_parent, index) = doc
        .location(child)
        .ok_or(TransactionError::UnknownEntity(child))?;
    if actual_parent != parent {
        return Err(EditActionError::InvalidState(format!(
            "{child} is not a child of {parent}"
        ))
        .into());
    }

    ctx.push_compound(name);
    let inserted = insert_steps(ctx, doc, parent, child, index, blueprint, name);
    let popped = ctx.pop_compound(doc);
    let id = inserted?;
    popped?;
    Ok(id)
}

fn insert_steps(
    ctx: &mut TransactionContext,
    doc: &mut Document,
    parent: EntityId,
    child: EntityId,
    index: usize,
    blueprint: &EntityBlueprint,
    name: &str,
) -> TransactionResult<EntityId> {
    let root = doc.root();
    let holding = append_index(doc, child, root);
    let result = reparent(ctx, doc, child, root, holding, name);
    step(ctx, doc, result, "detaching the child")?;

    let end = doc.get(parent).map_or(0, |p| p.children().len());
    let id = match add_entity(ctx, doc, blueprint, parent, end, name) {
        Ok(id) => id,
        Err(err) => {
            ctx.abort_compounds(doc);
            return Err(err);
        }
    };

    let result = reparent(ctx, doc, id, parent, index, name);
    step(ctx, doc, result, "placing the new entity")?;
    let result = reparent(ctx, doc, child, id, 0, name);
    step(ctx, doc, result, "attaching the child")?;
    Ok(id)
}

fn step(
    ctx: &mut TransactionContext,
    doc: &mut Document,
    result: TransactionResult<Outcome>,
    what: &str,
) -> TransactionResult {
    match result {
        Ok(Outcome::Committed) => Ok(()),
        Ok(Outcome::Skipped) => {
            ctx.abort_compounds(doc);
            Err(EditActionError::Rejected(format!("{what} was refused")).into())
        }
        Err(err) => {
            ctx.abort_compounds(doc);
            Err(err)
        }
    }
}

fn reparent(
    ctx: &mut TransactionContext,
    doc: &mut Document,
    entity: EntityId,
    new_parent: EntityId,
    index: usize,
    name: &str,
) -> TransactionResult<Outcome> {
    let mut mv = ctx.create_action(ActionKind::Reparent, name);
    mv.set_reparent(entity, new_parent, index)?;
    ctx.do_action(doc, mv)
}

/// Index that appends `entity` to `parent` once it is detached from
/// wherever it is now.
fn append_index(doc: &Document, entity: EntityId, parent: EntityId) -> usize {
    let len = doc.get(parent).map_or(0, |p| p.children().len());
    match doc.location(entity) {
        Some((p, _)) if p == parent => len.saturating_sub(1),
        _ => len,
    }
}

/// Index under `parent`, once `entity` is detached, that puts `entity` in
/// final position `slot`. Children in `pending` are about to move away and
/// do not count.
fn slot_index(
    doc: &Document,
    entity: EntityId,
    parent: EntityId,
    slot: usize,
    pending: &[EntityId],
) -> usize {
    if slot == 0 {
        return 0;
    }
    let children = doc.get(parent).map_or(&[][..], |p| p.children());
    let mut kept = 0;
    let mut index = 0;
    for &child in children.iter().filter(|&&c| c != entity) {
        index += 1;
        if !pending.contains(&child) {
            kept += 1;
            if kept == slot {
                break;
            }
        }
    }
    index
}

/// Selected ids without duplicates and without entities that have a
/// selected ancestor, in selection order.
fn top_level(doc: &Document, selection: &[EntityId]) -> Vec<EntityId> {
    let mut out: Vec<EntityId> = Vec::with_capacity(selection.len());
    for &id in selection {
        if out.contains(&id) {
            continue;
        }
        let covered = selection
            .iter()
            .any(|&other| other != id && doc.is_ancestor(other, id));
        if !covered {
            out.push(id);
        }
    }
    out
}
