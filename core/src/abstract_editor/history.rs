//! Undo/redo action history.
//!
//! [`EditActionHistory`] manages a linear undo/redo stack of [`EditAction`] trait
//! objects. When a new action is committed after undoing, the redo stack is
//! cleared (standard editor behavior) and every dropped action is given a
//! chance to release what it owns through [`EditAction::on_discard`].

use std::collections::VecDeque;
use std::fmt;

use super::action::{EditAction, EditActionError, EditActionResult, Editable};

/// Default maximum number of undo steps.
pub const DEFAULT_MAX_UNDO: usize = 100;

/// Manages an undo/redo stack of editor actions.
///
/// The undo stack is a bounded [`VecDeque`]: when it exceeds `max_undo`,
/// the oldest action is evicted from the front. The redo stack is an
/// unbounded [`Vec`] (it can never grow larger than the undo stack was).
///
/// Together the two stacks form one linear history with a cursor between
/// them: everything on the undo stack is before the cursor, everything on
/// the redo stack after it.
///
/// # Example
///
/// ```ignore
/// let mut history = EditActionHistory::new(50);
/// let mut target = MyScene::new();
///
/// // Execute and record an action
/// history.execute(Box::new(my_action), &mut target).unwrap();
///
/// // Undo the last action
/// history.undo(&mut target).unwrap();
///
/// // Redo it
/// history.redo(&mut target).unwrap();
/// ```
pub struct EditActionHistory<T: Editable> {
    undo_stack: VecDeque<Box<dyn EditAction<T>>>,
    redo_stack: Vec<Box<dyn EditAction<T>>>,
    max_undo: usize,
    /// Tracks distance from the saved state.
    ///
    /// - `Some(0)`: the current state matches the last save.
    /// - `Some(n)` where `n > 0`: `n` undos needed to reach the saved state.
    /// - `Some(n)` where `n < 0`: `|n|` redos needed to reach the saved state.
    /// - `None`: the save point is permanently unreachable (e.g. after
    ///   capacity overflow dropped it, or the redo branch was discarded).
    save_distance: Option<i64>,
}

impl<T: Editable> EditActionHistory<T> {
    /// Creates a new empty action history with the given maximum undo depth.
    ///
    /// When the undo stack exceeds `max_undo`, the oldest action is dropped.
    /// A depth of zero is treated as one.
    pub fn new(max_undo: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_undo: max_undo.max(1),
            save_distance: Some(0),
        }
    }

    /// Applies an action to the target and commits it.
    ///
    /// If the action fails, nothing is pushed and the history is unchanged.
    /// The failed action is handed back to the caller inside the error
    /// tuple so that it can be discarded against the target.
    pub fn execute(
        &mut self,
        mut action: Box<dyn EditAction<T>>,
        target: &mut T,
    ) -> Result<(), (EditActionError, Box<dyn EditAction<T>>)> {
        if let Err(e) = action.apply(target) {
            return Err((e, action));
        }
        self.commit(action, target);
        Ok(())
    }

    /// Pushes an already-applied action onto the undo stack.
    ///
    /// Clears the redo stack (discarding each entry) and evicts the oldest
    /// undo entry if the stack grows beyond `max_undo`.
    pub fn commit(&mut self, action: Box<dyn EditAction<T>>, target: &mut T) {
        self.truncate_redo(target);

        // New entry pushed, save point moves one step further away.
        if let Some(d) = &mut self.save_distance {
            *d += 1;
        }

        self.undo_stack.push_back(action);
        self.evict_overflow(target);
    }

    /// Undoes the most recent action.
    ///
    /// Returns a reference to the undone action (now the next redo entry).
    /// Returns an error if the undo stack is empty or the undo failed; a
    /// failed undo leaves the action where it was.
    pub fn undo(&mut self, target: &mut T) -> EditActionResult<&(dyn EditAction<T> + 'static)> {
        let mut action = self
            .undo_stack
            .pop_back()
            .ok_or(EditActionError::NothingToUndo)?;
        if let Err(e) = action.undo(target) {
            self.undo_stack.push_back(action);
            return Err(e);
        }
        if let Some(d) = &mut self.save_distance {
            *d -= 1;
        }
        self.redo_stack.push(action);
        let top = self.redo_stack.len() - 1;
        Ok(self.redo_stack[top].as_ref())
    }

    /// Redoes the most recently undone action.
    ///
    /// Returns a reference to the redone action (now the next undo entry).
    /// Returns an error if the redo stack is empty or the redo failed; a
    /// failed redo leaves the action where it was.
    pub fn redo(&mut self, target: &mut T) -> EditActionResult<&(dyn EditAction<T> + 'static)> {
        let mut action = self.redo_stack.pop().ok_or(EditActionError::NothingToRedo)?;
        if let Err(e) = action.redo(target) {
            self.redo_stack.push(action);
            return Err(e);
        }
        if let Some(d) = &mut self.save_distance {
            *d += 1;
        }
        // Redo never grows the undo stack past what it was before the
        // matching undo, so no eviction is needed here.
        self.undo_stack.push_back(action);
        let top = self.undo_stack.len() - 1;
        Ok(self.undo_stack[top].as_ref())
    }

    /// Returns `true` if there are actions that can be undone.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Returns `true` if there are actions that can be redone.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Description of the action the next [`undo`](Self::undo) would revert.
    pub fn next_undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|a| a.description())
    }

    /// Description of the action the next [`redo`](Self::redo) would re-apply.
    pub fn next_redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|a| a.description())
    }

    /// Returns an iterator over undo action descriptions, most recent first.
    pub fn undo_descriptions(&self) -> impl Iterator<Item = &str> {
        self.undo_stack.iter().rev().map(|a| a.description())
    }

    /// Returns an iterator over redo action descriptions, most recent first.
    pub fn redo_descriptions(&self) -> impl Iterator<Item = &str> {
        self.redo_stack.iter().rev().map(|a| a.description())
    }

    /// Returns the number of actions in the undo stack.
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Returns the number of actions in the redo stack.
    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Returns the maximum undo depth.
    pub fn max_undo(&self) -> usize {
        self.max_undo
    }

    /// Records the current state as the saved state.
    ///
    /// After calling this, [`has_unsaved_changes`](Self::has_unsaved_changes)
    /// returns `false` until the history is modified by commit, undo, or redo.
    pub fn mark_saved(&mut self) {
        self.save_distance = Some(0);
    }

    /// Returns `true` if the current state differs from the last saved state.
    ///
    /// A fresh history counts as saved. Returns `true` if the history has been
    /// modified since the last save, or if the save point is permanently
    /// unreachable (e.g. dropped by capacity overflow or the redo branch
    /// was discarded).
    pub fn has_unsaved_changes(&self) -> bool {
        self.save_distance != Some(0)
    }

    /// Discards every action on both stacks.
    ///
    /// Redo entries are discarded first (most recently undone last), then
    /// undo entries from newest to oldest. If the current state was the saved
    /// state it remains so after clearing; otherwise the save point is lost.
    pub fn clear(&mut self, target: &mut T) {
        self.truncate_redo(target);
        while let Some(mut action) = self.undo_stack.pop_back() {
            action.on_discard(target);
        }
        if self.save_distance != Some(0) {
            self.save_distance = None;
        }
    }

    fn truncate_redo(&mut self, target: &mut T) {
        if self.redo_stack.is_empty() {
            return;
        }
        // Clearing the redo stack invalidates a save point that was in redo.
        if let Some(d) = self.save_distance
            && d < 0
        {
            self.save_distance = None;
        }
        for mut action in self.redo_stack.drain(..) {
            action.on_discard(target);
        }
    }

    fn evict_overflow(&mut self, target: &mut T) {
        while self.undo_stack.len() > self.max_undo {
            if let Some(mut oldest) = self.undo_stack.pop_front() {
                log::debug!("Evicting oldest history entry \"{}\"", oldest.description());
                oldest.on_discard(target);
            }
            // If the save point was beyond the oldest surviving entry, it's gone.
            if let Some(d) = self.save_distance
                && d > self.undo_stack.len() as i64
            {
                self.save_distance = None;
            }
        }
    }
}

impl<T: Editable> fmt::Debug for EditActionHistory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditActionHistory")
            .field("undo_count", &self.undo_stack.len())
            .field("redo_count", &self.redo_stack.len())
            .field("max_undo", &self.max_undo)
            .field("save_distance", &self.save_distance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: i32,
        discarded: Vec<i32>,
    }

    impl Editable for Counter {}

    #[derive(Debug)]
    struct Add {
        amount: i32,
    }

    impl EditAction<Counter> for Add {
        fn apply(&mut self, target: &mut Counter) -> EditActionResult {
            target.value += self.amount;
            Ok(())
        }

        fn undo(&mut self, target: &mut Counter) -> EditActionResult {
            target.value -= self.amount;
            Ok(())
        }

        fn description(&self) -> &str {
            "Add"
        }

        fn on_discard(&mut self, target: &mut Counter) {
            target.discarded.push(self.amount);
        }
    }

    #[derive(Debug)]
    struct FailingAction;

    impl EditAction<Counter> for FailingAction {
        fn apply(&mut self, _target: &mut Counter) -> EditActionResult {
            Err(EditActionError::Custom("always fails".into()))
        }

        fn undo(&mut self, _target: &mut Counter) -> EditActionResult {
            Err(EditActionError::Custom("always fails".into()))
        }

        fn description(&self) -> &str {
            "Failing"
        }
    }

    /// Applies fine, but refuses to be undone.
    #[derive(Debug)]
    struct Sticky;

    impl EditAction<Counter> for Sticky {
        fn apply(&mut self, target: &mut Counter) -> EditActionResult {
            target.value += 1;
            Ok(())
        }

        fn undo(&mut self, _target: &mut Counter) -> EditActionResult {
            Err(EditActionError::InvalidState("locked".into()))
        }

        fn description(&self) -> &str {
            "Sticky"
        }
    }

    fn add(history: &mut EditActionHistory<Counter>, counter: &mut Counter, amount: i32) {
        history
            .execute(Box::new(Add { amount }), counter)
            .map_err(|(e, _)| e)
            .unwrap();
    }

    #[test]
    fn execute_applies_and_pushes() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 5);

        assert_eq!(counter.value, 5);
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.redo_count(), 0);
    }

    #[test]
    fn commit_pushes_without_applying() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        history.commit(Box::new(Add { amount: 5 }), &mut counter);
        assert_eq!(counter.value, 0);
        assert_eq!(history.undo_count(), 1);

        history.undo(&mut counter).unwrap();
        assert_eq!(counter.value, -5);
    }

    #[test]
    fn undo_reverses_and_moves_to_redo() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 5);
        let undone = history.undo(&mut counter).unwrap();
        assert_eq!(undone.description(), "Add");

        assert_eq!(counter.value, 0);
        assert_eq!(history.undo_count(), 0);
        assert_eq!(history.redo_count(), 1);
    }

    #[test]
    fn redo_reapplies_and_moves_to_undo() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 5);
        history.undo(&mut counter).unwrap();
        history.redo(&mut counter).unwrap();

        assert_eq!(counter.value, 5);
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.redo_count(), 0);
    }

    #[test]
    fn commit_discards_redo_tail() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 5);
        history.undo(&mut counter).unwrap();
        assert_eq!(history.redo_count(), 1);

        add(&mut history, &mut counter, 3);
        assert_eq!(history.redo_count(), 0);
        assert!(!history.can_redo());
        assert_eq!(counter.value, 3);
        assert_eq!(counter.discarded, vec![5]);
    }

    #[test]
    fn undo_empty_returns_error() {
        let mut history = EditActionHistory::<Counter>::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        let result = history.undo(&mut counter).map(|_| ());
        assert_eq!(result, Err(EditActionError::NothingToUndo));
    }

    #[test]
    fn redo_empty_returns_error() {
        let mut history = EditActionHistory::<Counter>::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        let result = history.redo(&mut counter).map(|_| ());
        assert_eq!(result, Err(EditActionError::NothingToRedo));
    }

    #[test]
    fn capacity_evicts_oldest_and_discards_it() {
        let mut history = EditActionHistory::new(2);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 1);
        add(&mut history, &mut counter, 2);
        add(&mut history, &mut counter, 3);

        assert_eq!(history.undo_count(), 2);
        assert_eq!(counter.value, 6);
        assert_eq!(counter.discarded, vec![1]);

        history.undo(&mut counter).unwrap();
        history.undo(&mut counter).unwrap();
        assert_eq!(counter.value, 1); // only amount=1 remains applied
        assert!(history.undo(&mut counter).is_err());
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let mut history = EditActionHistory::new(0);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 1);
        assert_eq!(history.max_undo(), 1);
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn failed_execute_does_not_push() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        let result = history.execute(Box::new(FailingAction), &mut counter);
        let (err, returned) = result.unwrap_err();
        assert_eq!(err, EditActionError::Custom("always fails".into()));
        assert_eq!(returned.description(), "Failing");
        assert_eq!(history.undo_count(), 0);
        assert!(!history.has_unsaved_changes());
    }

    #[test]
    fn failed_undo_keeps_action_in_place() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        history
            .execute(Box::new(Sticky), &mut counter)
            .map_err(|(e, _)| e)
            .unwrap();
        assert!(history.undo(&mut counter).is_err());
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.redo_count(), 0);
        assert_eq!(history.next_undo_description(), Some("Sticky"));
    }

    #[test]
    fn next_descriptions_follow_cursor() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        assert_eq!(history.next_undo_description(), None);
        assert_eq!(history.next_redo_description(), None);

        add(&mut history, &mut counter, 1);
        history
            .execute(Box::new(Sticky), &mut counter)
            .map_err(|(e, _)| e)
            .unwrap();
        assert_eq!(history.next_undo_description(), Some("Sticky"));
        assert_eq!(history.next_redo_description(), None);

        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        add(&mut history, &mut counter, 1);
        history.undo(&mut counter).unwrap();
        assert_eq!(history.next_undo_description(), None);
        assert_eq!(history.next_redo_description(), Some("Add"));
    }

    #[test]
    fn descriptions() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 1);
        history
            .execute(Box::new(Sticky), &mut counter)
            .map_err(|(e, _)| e)
            .unwrap();
        add(&mut history, &mut counter, 2);
        history.undo(&mut counter).unwrap();

        let undo: Vec<_> = history.undo_descriptions().collect();
        let redo: Vec<_> = history.redo_descriptions().collect();
        assert_eq!(undo, vec!["Sticky", "Add"]);
        assert_eq!(redo, vec!["Add"]);
    }

    #[test]
    fn clear_discards_everything() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 1);
        add(&mut history, &mut counter, 2);
        add(&mut history, &mut counter, 3);
        history.undo(&mut counter).unwrap();

        history.clear(&mut counter);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        // Redo side first, then undo side newest to oldest.
        assert_eq!(counter.discarded, vec![3, 2, 1]);
    }

    #[test]
    fn debug_impl() {
        let history = EditActionHistory::<Counter>::new(DEFAULT_MAX_UNDO);
        let debug = format!("{history:?}");
        assert!(debug.contains("EditActionHistory"));
        assert!(debug.contains("undo_count"));
    }

    // --- Save point tracking ---

    #[test]
    fn no_unsaved_changes_on_fresh_history() {
        let history = EditActionHistory::<Counter>::new(DEFAULT_MAX_UNDO);
        assert!(!history.has_unsaved_changes());
    }

    #[test]
    fn unsaved_after_execute() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        history.mark_saved();
        add(&mut history, &mut counter, 1);
        assert!(history.has_unsaved_changes());
    }

    #[test]
    fn not_unsaved_after_undo_to_save_point() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        history.mark_saved();
        add(&mut history, &mut counter, 1);
        history.undo(&mut counter).unwrap();
        assert!(!history.has_unsaved_changes());
    }

    #[test]
    fn not_unsaved_after_undo_then_redo_to_save_point() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 1);
        history.mark_saved();
        history.undo(&mut counter).unwrap();
        assert!(history.has_unsaved_changes());
        history.redo(&mut counter).unwrap();
        assert!(!history.has_unsaved_changes());
    }

    #[test]
    fn save_lost_when_new_branch_after_undo() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 1);
        history.mark_saved();
        history.undo(&mut counter).unwrap();
        add(&mut history, &mut counter, 2);
        assert!(history.has_unsaved_changes());
        history.undo(&mut counter).unwrap();
        // The saved branch is gone; no position reaches it again.
        assert!(history.has_unsaved_changes());
    }

    #[test]
    fn save_lost_when_capacity_overflow() {
        let mut history = EditActionHistory::new(2);
        let mut counter = Counter::default();

        history.mark_saved();
        add(&mut history, &mut counter, 1);
        add(&mut history, &mut counter, 2);
        add(&mut history, &mut counter, 3);
        history.undo(&mut counter).unwrap();
        history.undo(&mut counter).unwrap();
        assert!(history.has_unsaved_changes());
    }

    #[test]
    fn clear_preserves_save_at_current_state() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        add(&mut history, &mut counter, 1);
        history.mark_saved();
        history.clear(&mut counter);
        assert!(!history.has_unsaved_changes());
    }

    #[test]
    fn clear_loses_unreachable_save() {
        let mut history = EditActionHistory::new(DEFAULT_MAX_UNDO);
        let mut counter = Counter::default();

        history.mark_saved();
        add(&mut history, &mut counter, 1);
        history.clear(&mut counter);
        assert!(history.has_unsaved_changes());
    }
}
