//! The per-editor transaction manager.
//!
//! Each editor instance owns one [`TransactionContext`] and passes it, with
//! its [`Document`], to every editing operation. The context sequences
//! [`ActionRecord`]s into a linear history, groups them into compounds,
//! brackets open-ended field edits, and tells views what to refresh.
//!
//! # Compounds
//!
//! While a compound is open, committed records become its children instead
//! of history entries. Compounds nest. A failing step aborts every open
//! compound: children already applied are undone in reverse and discarded,
//! later steps are refused, and popping records nothing. The history never
//! sees a partially applied compound.
//!
//! # Edit sessions
//!
//! ```ignore
//! ctx.on_pre_edit(&doc, &selection)?;        // snapshot fields
//! doc.get_mut(id).unwrap().set_field("size", 10);
//! ctx.on_post_edit(&mut doc, &selection)?;   // diff, commit if changed
//! ```

use std::fmt;

use redlilium_core::abstract_editor::{EditAction, EditActionError, EditActionHistory};

use crate::action::{ActionId, ActionKind, ActionRecord};
use crate::config::TransactionConfig;
use crate::document::Document;
use crate::entity::EntityId;
use crate::error::{TransactionError, TransactionResult};
use crate::observer::{ChangeNotice, EditorObserver};

/// Result of handing a record to the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The record is in the history or in the innermost open compound.
    Committed,
    /// Nothing was recorded: the record was empty, or its effect did not
    /// match the request and was reverted.
    Skipped,
}

struct CompoundFrame {
    record: ActionRecord,
    aborted: bool,
}

/// Undo/redo manager of one editor.
pub struct TransactionContext {
    history: EditActionHistory<Document>,
    compounds: Vec<CompoundFrame>,
    session: Option<ActionRecord>,
    observers: Vec<Box<dyn EditorObserver>>,
    next_action: u64,
    config: TransactionConfig,
}

impl TransactionContext {
    /// Creates a context with the default [`TransactionConfig`].
    pub fn new() -> Self {
        Self::with_config(TransactionConfig::default())
    }

    /// Creates a context whose history keeps at most `config.max_undo`
    /// entries.
    pub fn with_config(config: TransactionConfig) -> Self {
        Self {
            history: EditActionHistory::new(config.max_undo),
            compounds: Vec::new(),
            session: None,
            observers: Vec::new(),
            next_action: 1,
            config,
        }
    }

    /// The configuration the context was created with.
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// The underlying history, e.g. for a history panel.
    pub fn history(&self) -> &EditActionHistory<Document> {
        &self.history
    }

    /// Registers a view to be told about every change.
    pub fn add_observer(&mut self, observer: impl EditorObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Allocates an unpopulated record with a fresh id.
    ///
    /// The record joins the innermost open compound once it is handed to
    /// [`do_action`](Self::do_action) or
    /// [`add_to_manager`](Self::add_to_manager).
    pub fn create_action(&mut self, kind: ActionKind, name: impl Into<String>) -> ActionRecord {
        let id = ActionId::from_raw(self.next_action);
        self.next_action += 1;
        ActionRecord::new(id, kind, name)
    }

    /// Applies a populated record and commits it.
    ///
    /// Empty records are dropped with [`Outcome::Skipped`]. A record that
    /// reverted itself (a reparent that ended up elsewhere) is logged and
    /// dropped with [`Outcome::Skipped`]. Any other failure leaves the
    /// document and history as they were, aborts open compounds, and is
    /// returned.
    pub fn do_action(
        &mut self,
        doc: &mut Document,
        mut action: ActionRecord,
    ) -> TransactionResult<Outcome> {
        if self.compound_aborted() {
            action.on_discard(doc);
            return Err(TransactionError::CompoundAborted);
        }
        if action.is_noop() {
            log::debug!("Skipping empty action \"{}\"", action.name());
            action.on_discard(doc);
            return Ok(Outcome::Skipped);
        }

        match action.apply(doc) {
            Ok(()) => {
                let notice = action.notice();
                self.commit(doc, action)?;
                self.notify(&notice);
                Ok(Outcome::Committed)
            }
            Err(EditActionError::Rejected(reason)) => {
                log::warn!("Action \"{}\" was reverted: {reason}", action.name());
                action.on_discard(doc);
                Ok(Outcome::Skipped)
            }
            Err(err) => {
                log::error!("Action \"{}\" failed: {err}", action.name());
                action.on_discard(doc);
                self.abort_compounds(doc);
                Err(err.into())
            }
        }
    }

    /// Commits a record whose effect the editor already applied.
    pub fn add_to_manager(
        &mut self,
        doc: &mut Document,
        mut action: ActionRecord,
    ) -> TransactionResult<Outcome> {
        if self.compound_aborted() {
            action.on_discard(doc);
            return Err(TransactionError::CompoundAborted);
        }
        if action.is_noop() {
            return Ok(Outcome::Skipped);
        }
        let notice = action.notice();
        self.commit(doc, action)?;
        self.notify(&notice);
        Ok(Outcome::Committed)
    }

    /// Opens a (possibly nested) compound. Records committed until the
    /// matching [`pop_compound`](Self::pop_compound) become one undo step.
    pub fn push_compound(&mut self, name: impl Into<String>) {
        let aborted = self.compound_aborted();
        let record = self.create_action(ActionKind::Compound, name);
        log::trace!("Push compound \"{}\"", record.name());
        self.compounds.push(CompoundFrame { record, aborted });
    }

    /// Closes the innermost compound and commits it to the enclosing
    /// compound or the history. Empty and aborted compounds record nothing.
    pub fn pop_compound(&mut self, doc: &mut Document) -> TransactionResult<Outcome> {
        let frame = self
            .compounds
            .pop()
            .ok_or(TransactionError::NoOpenCompound)?;
        if frame.aborted {
            log::debug!("Dropping aborted compound \"{}\"", frame.record.name());
            return Ok(Outcome::Skipped);
        }
        if frame.record.is_noop() {
            return Ok(Outcome::Skipped);
        }
        self.commit(doc, frame.record)?;
        Ok(Outcome::Committed)
    }

    /// Unwinds and aborts every open compound. They stay open until popped
    /// but accept no further records.
    pub fn abort_compounds(&mut self, doc: &mut Document) {
        let mut notice = ChangeNotice::default();
        for frame in self.compounds.iter_mut().rev() {
            let mut children = frame.record.take_children();
            for child in children.iter_mut().rev() {
                if let Err(err) = child.undo(doc) {
                    log::error!("Failed to unwind \"{}\": {err}", child.name());
                }
                notice.merge(child.notice());
            }
            for child in children.iter_mut().rev() {
                child.on_discard(doc);
            }
            if !frame.aborted {
                log::warn!("Aborted compound \"{}\"", frame.record.name());
            }
            frame.aborted = true;
        }
        if !notice.is_empty() {
            self.notify(&notice);
        }
    }

    /// Number of open compounds.
    pub fn compound_depth(&self) -> usize {
        self.compounds.len()
    }

    /// Opens a field edit named after
    /// [`TransactionConfig::default_edit_name`], watching `selection`.
    pub fn on_pre_edit(&mut self, doc: &Document, selection: &[EntityId]) -> TransactionResult {
        let name = self.config.default_edit_name.clone();
        self.on_pre_edit_named(doc, selection, name)
    }

    /// Opens a field edit with a custom menu name.
    ///
    /// Only one session may be open at a time. A second call is refused
    /// with [`TransactionError::EditSessionOpen`] and the open session is
    /// left untouched.
    pub fn on_pre_edit_named(
        &mut self,
        doc: &Document,
        selection: &[EntityId],
        name: impl Into<String>,
    ) -> TransactionResult {
        if self.session.is_some() {
            log::warn!("on_pre_edit while an edit session is open; ignoring");
            return Err(TransactionError::EditSessionOpen);
        }
        let mut record = self.create_action(ActionKind::FieldDiff, name);
        record.field_diff_mut()?.watch_set(doc, selection)?;
        self.session = Some(record);
        Ok(())
    }

    /// Closes the open field edit: diffs `selection` against the snapshot
    /// and commits the result if anything changed.
    ///
    /// Entities in `selection` that were not watched are ignored, and so are
    /// watched entities removed during the edit. If the diff cannot be
    /// taken the session stays open.
    pub fn on_post_edit(
        &mut self,
        doc: &mut Document,
        selection: &[EntityId],
    ) -> TransactionResult<Outcome> {
        let mut record = self.session.take().ok_or(TransactionError::NoEditSession)?;
        let learned = record
            .field_diff_mut()
            .and_then(|diff| diff.learn_set(doc, selection));
        let changed = match learned {
            Ok(changed) => changed,
            Err(err) => {
                log::error!("Edit \"{}\" could not be diffed: {err}", record.name());
                self.session = Some(record);
                return Err(err);
            }
        };
        if !changed {
            log::trace!("Edit \"{}\" changed nothing", record.name());
            return Ok(Outcome::Skipped);
        }
        self.add_to_manager(doc, record)
    }

    /// Abandons the open field edit without recording anything. Changes the
    /// editor made meanwhile stay as they are.
    pub fn cancel_edit(&mut self) -> TransactionResult {
        self.session
            .take()
            .map(drop)
            .ok_or(TransactionError::NoEditSession)
    }

    /// Returns `true` between `on_pre_edit` and `on_post_edit`.
    pub fn has_edit_session(&self) -> bool {
        self.session.is_some()
    }

    /// Reverts the most recent history entry.
    pub fn undo(&mut self, doc: &mut Document) -> TransactionResult<ChangeNotice> {
        self.check_idle()?;
        let action = self.history.undo(doc).inspect_err(|err| {
            log::error!("Undo failed: {err}");
        })?;
        log::debug!("Undo \"{}\"", action.description());
        let notice = notice_of(action);
        self.notify(&notice);
        Ok(notice)
    }

    /// Re-applies the most recently undone entry.
    pub fn redo(&mut self, doc: &mut Document) -> TransactionResult<ChangeNotice> {
        self.check_idle()?;
        let action = self.history.redo(doc).inspect_err(|err| {
            log::error!("Redo failed: {err}");
        })?;
        log::debug!("Redo \"{}\"", action.description());
        let notice = notice_of(action);
        self.notify(&notice);
        Ok(notice)
    }

    /// Returns `true` if there is an entry to undo.
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Returns `true` if there is an entry to redo.
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Menu label of the entry the next [`undo`](Self::undo) reverts.
    pub fn next_undo_name(&self) -> Option<&str> {
        self.history.next_undo_description()
    }

    /// Menu label of the entry the next [`redo`](Self::redo) re-applies.
    pub fn next_redo_name(&self) -> Option<&str> {
        self.history.next_redo_description()
    }

    /// Number of entries on the undo stack.
    pub fn undo_count(&self) -> usize {
        self.history.undo_count()
    }

    /// Number of entries on the redo stack.
    pub fn redo_count(&self) -> usize {
        self.history.redo_count()
    }

    /// Undo entry names, most recent first.
    pub fn undo_names(&self) -> impl Iterator<Item = &str> {
        self.history.undo_descriptions()
    }

    /// Redo entry names, next first.
    pub fn redo_names(&self) -> impl Iterator<Item = &str> {
        self.history.redo_descriptions()
    }

    /// Marks the current history position as saved. See
    /// [`is_dirty`](Self::is_dirty).
    pub fn mark_saved(&mut self) {
        self.history.mark_saved();
    }

    /// Returns `true` if the document differs from the last save, including
    /// records sitting in an open compound.
    pub fn is_dirty(&self) -> bool {
        self.history.has_unsaved_changes()
            || self.compounds.iter().any(|f| !f.record.is_noop())
    }

    /// Tears the context down: drops the open edit session, discards open
    /// compounds as they stand, then discards the whole history. Trashed
    /// entities still owned by a discarded record are destroyed.
    pub fn clear(&mut self, doc: &mut Document) {
        self.session = None;
        while let Some(mut frame) = self.compounds.pop() {
            frame.record.on_discard(doc);
        }
        self.history.clear(doc);
        log::debug!("Transaction history cleared");
    }

    fn commit(&mut self, doc: &mut Document, record: ActionRecord) -> TransactionResult {
        match self.compounds.last_mut() {
            Some(frame) => {
                log::trace!(
                    "Add \"{}\" to compound \"{}\"",
                    record.name(),
                    frame.record.name()
                );
                frame.record.push_child(record)
            }
            None => {
                log::debug!("Commit \"{}\"", record.name());
                self.history.commit(Box::new(record), doc);
                Ok(())
            }
        }
    }

    fn compound_aborted(&self) -> bool {
        self.compounds.last().is_some_and(|f| f.aborted)
    }

    fn check_idle(&self) -> TransactionResult {
        if !self.compounds.is_empty() {
            return Err(TransactionError::CompoundOpen);
        }
        if self.session.is_some() {
            return Err(TransactionError::EditSessionOpen);
        }
        Ok(())
    }

    fn notify(&mut self, notice: &ChangeNotice) {
        for observer in &mut self.observers {
            observer.update(notice);
        }
    }
}

fn notice_of(action: &dyn EditAction<Document>) -> ChangeNotice {
    action
        .as_any()
        .downcast_ref::<ActionRecord>()
        .map(ActionRecord::notice)
        .unwrap_or_default()
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("history", &self.history)
            .field("open_compounds", &self.compounds.len())
            .field("edit_session", &self.session.is_some())
            .field("observers", &self.observers.len())
            .finish()
    }
}
