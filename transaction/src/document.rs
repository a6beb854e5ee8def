//! Entity store and parent-child hierarchy.
//!
//! A [`Document`] owns every live entity of one editor: a GUI layout, a
//! shape's node tree, a behavior tree. There is exactly one root; every
//! other live entity hangs somewhere below it. Operations keep the
//! `parent` link of a child and the `children` list of its parent in sync.
//!
//! Entities removed by an undoable action are not dropped. They move to
//! the document's [`Trash`](crate::Trash), see [`crate::trash`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use redlilium_core::abstract_editor::{EditActionError, Editable};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityBlueprint, EntityId, Schema};
use crate::error::{TransactionError, TransactionResult};
use crate::trash::Trash;
use crate::value::Value;

/// Capability check consulted whenever an entity is attached to a parent.
///
/// Receives `(parent, child)` and returns `false` to refuse the attachment.
pub type AttachPolicy = Box<dyn Fn(&Entity, &Entity) -> bool>;

/// The editable entity hierarchy of one editor.
pub struct Document {
    entities: HashMap<EntityId, Entity>,
    root: EntityId,
    names: HashMap<String, EntityId>,
    pub(crate) trash: Trash,
    next_id: u64,
    attach_policy: Option<AttachPolicy>,
}

impl Editable for Document {}

impl Document {
    /// Creates a document whose root uses an empty `"Root"` schema.
    pub fn new() -> Self {
        Self::with_root(Arc::new(Schema::new("Root")))
    }

    /// Creates a document with a root entity of the given schema.
    pub fn with_root(schema: Arc<Schema>) -> Self {
        let root = EntityId::from_raw(0);
        let mut entities = HashMap::new();
        entities.insert(root, Entity::new(root, schema, None));
        Self {
            entities,
            root,
            names: HashMap::new(),
            trash: Trash::default(),
            next_id: 1,
            attach_policy: None,
        }
    }

    pub fn root(&self) -> EntityId {
        self.root
    }

    /// Number of live entities, including the root.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns `true` if the entity is alive (not trashed, not destroyed).
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Mutable access for domain logic editing fields.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Looks up a live entity by name.
    pub fn find(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// Iterates over all live entities in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// The trash holding entities removed by undoable actions.
    pub fn trash(&self) -> &Trash {
        &self.trash
    }

    pub fn is_trashed(&self, id: EntityId) -> bool {
        self.trash.contains(id)
    }

    /// Installs the capability check used by [`spawn`](Self::spawn) and by
    /// reparent actions. Replaces any previous policy.
    pub fn set_attach_policy(&mut self, policy: impl Fn(&Entity, &Entity) -> bool + 'static) {
        self.attach_policy = Some(Box::new(policy));
    }

    pub fn clear_attach_policy(&mut self) {
        self.attach_policy = None;
    }

    /// Renames a live entity. `None` clears the name.
    pub fn rename(&mut self, id: EntityId, name: Option<&str>) -> TransactionResult {
        if let Some(name) = name
            && let Some(&owner) = self.names.get(name)
            && owner != id
        {
            return Err(TransactionError::NameCollision(name.to_owned()));
        }
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(TransactionError::UnknownEntity(id))?;
        if let Some(old) = entity.name.take() {
            self.names.remove(&old);
        }
        if let Some(name) = name {
            entity.name = Some(name.to_owned());
            self.names.insert(name.to_owned(), id);
        }
        Ok(())
    }

    /// Creates a new entity and attaches it under `parent` at `index`.
    ///
    /// An index past the end appends. Fails without creating anything if
    /// the parent is not alive, the name is taken, or the attach policy
    /// refuses the pair.
    pub fn spawn(
        &mut self,
        blueprint: &EntityBlueprint,
        parent: EntityId,
        index: usize,
    ) -> TransactionResult<EntityId> {
        let parent_entity = self
            .entities
            .get(&parent)
            .ok_or(TransactionError::UnknownEntity(parent))?;
        if let Some(name) = &blueprint.name
            && self.names.contains_key(name)
        {
            return Err(TransactionError::NameCollision(name.clone()));
        }

        let id = EntityId::from_raw(self.next_id);
        let entity = blueprint.build(id);
        if let Some(policy) = &self.attach_policy
            && !policy(parent_entity, &entity)
        {
            return Err(EditActionError::InvalidState(format!(
                "{} cannot be a child of {}",
                entity.schema().class(),
                parent_entity.schema().class()
            ))
            .into());
        }
        self.next_id += 1;

        if let Some(name) = &entity.name {
            self.names.insert(name.clone(), id);
        }
        self.entities.insert(id, entity);
        self.link(id, parent, index);
        Ok(id)
    }

    /// Parent and sibling index of a live, attached entity.
    pub fn location(&self, id: EntityId) -> Option<(EntityId, usize)> {
        let parent = self.entities.get(&id)?.parent?;
        let index = self
            .entities
            .get(&parent)?
            .children
            .iter()
            .position(|&c| c == id)?;
        Some((parent, index))
    }

    /// Returns `true` if `ancestor` is `id` itself or above it.
    pub fn is_ancestor(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.entities.get(&c).and_then(|e| e.parent);
        }
        false
    }

    /// The entity and all its live descendants, depth-first, entity first.
    pub fn subtree(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(entity) = self.entities.get(&current) else {
                continue;
            };
            out.push(current);
            stack.extend(entity.children.iter().rev());
        }
        out
    }

    /// Deterministic copy of every live entity, sorted by id.
    pub fn snapshot(&self) -> DocumentSnapshot {
        let mut entities: Vec<EntitySnapshot> = self
            .entities
            .values()
            .map(|e| EntitySnapshot {
                id: e.id(),
                class: e.schema().class().to_owned(),
                name: e.name.clone(),
                parent: e.parent,
                children: e.children.clone(),
                fields: e
                    .fields()
                    .map(|(n, v)| (n.to_owned(), v.clone()))
                    .collect(),
            })
            .collect();
        entities.sort_by_key(|e| e.id);
        DocumentSnapshot {
            root: self.root,
            entities,
        }
    }

    /// Unlinks an entity from its parent, returning where it was.
    pub(crate) fn detach(&mut self, id: EntityId) -> Option<(EntityId, usize)> {
        let (parent, index) = self.location(id)?;
        if let Some(p) = self.entities.get_mut(&parent) {
            p.children.remove(index);
        }
        if let Some(e) = self.entities.get_mut(&id) {
            e.parent = None;
        }
        Some((parent, index))
    }

    /// Attaches a detached entity, consulting the attach policy.
    ///
    /// Returns `false` and leaves the entity detached when the attachment is
    /// refused: unknown entities, cycles, an entity that still has a parent,
    /// or a policy veto. The caller decides whether that is an error.
    pub(crate) fn attach(&mut self, id: EntityId, parent: EntityId, index: usize) -> bool {
        if self.is_ancestor(id, parent) {
            return false;
        }
        let (Some(p), Some(c)) = (self.entities.get(&parent), self.entities.get(&id)) else {
            return false;
        };
        if c.parent.is_some() {
            return false;
        }
        if let Some(policy) = &self.attach_policy
            && !policy(p, c)
        {
            return false;
        }
        self.link(id, parent, index);
        true
    }

    /// Attaches a detached entity without consulting the attach policy.
    ///
    /// Used when putting an entity back where it already was.
    pub(crate) fn attach_unchecked(
        &mut self,
        id: EntityId,
        parent: EntityId,
        index: usize,
    ) -> TransactionResult {
        if !self.contains(id) {
            return Err(TransactionError::UnknownEntity(id));
        }
        if !self.contains(parent) {
            return Err(TransactionError::UnknownEntity(parent));
        }
        if self.is_ancestor(id, parent) {
            return Err(EditActionError::InvalidState(format!(
                "{id} cannot be attached below itself"
            ))
            .into());
        }
        self.detach(id);
        self.link(id, parent, index);
        Ok(())
    }

    pub(crate) fn take_entity(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        if let Some(name) = &entity.name {
            self.names.remove(name);
        }
        Some(entity)
    }

    pub(crate) fn name_in_use(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub(crate) fn insert_entity(&mut self, entity: Entity) {
        if let Some(name) = &entity.name {
            self.names.insert(name.clone(), entity.id());
        }
        self.entities.insert(entity.id(), entity);
    }

    fn link(&mut self, id: EntityId, parent: EntityId, index: usize) {
        if let Some(p) = self.entities.get_mut(&parent) {
            let at = index.min(p.children.len());
            p.children.insert(at, id);
        }
        if let Some(e) = self.entities.get_mut(&id) {
            e.parent = Some(parent);
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.root)
            .field("live", &self.entities.len())
            .field("trashed", &self.trash.len())
            .field("has_attach_policy", &self.attach_policy.is_some())
            .finish()
    }
}

/// Serializable copy of one live entity.
///
/// Equality compares field values with [`Value::same_as`], so a `NaN`
/// field equals itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub class: String,
    pub name: Option<String>,
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
    pub fields: Vec<(String, Value)>,
}

impl PartialEq for EntitySnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.class == other.class
            && self.name == other.name
            && self.parent == other.parent
            && self.children == other.children
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|((n, v), (m, w))| n == m && v.same_as(w))
    }
}

/// Serializable copy of every live entity in a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub root: EntityId,
    pub entities: Vec<EntitySnapshot>,
}

impl DocumentSnapshot {
    pub fn get(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entities[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> EntityBlueprint {
        EntityBlueprint::new(Arc::new(Schema::new("Node")))
    }

    #[test]
    fn new_document_has_only_root() {
        let doc = Document::new();
        assert_eq!(doc.len(), 1);
        assert!(doc.contains(doc.root()));
        assert_eq!(doc.location(doc.root()), None);
    }

    #[test]
    fn spawn_inserts_at_index() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.spawn(&node(), root, 0).unwrap();
        let b = doc.spawn(&node(), root, 0).unwrap();
        let c = doc.spawn(&node(), root, 99).unwrap();

        assert_eq!(doc.get(root).unwrap().children(), &[b, a, c]);
        assert_eq!(doc.location(a), Some((root, 1)));
        assert_eq!(doc.get(c).unwrap().parent(), Some(root));
    }

    #[test]
    fn spawn_rejects_taken_name() {
        let mut doc = Document::new();
        let root = doc.root();
        doc.spawn(&node().named("A"), root, 0).unwrap();
        let err = doc.spawn(&node().named("A"), root, 0).unwrap_err();
        assert_eq!(err, TransactionError::NameCollision("A".into()));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn spawn_under_unknown_parent_fails() {
        let mut doc = Document::new();
        let ghost = EntityId::from_raw(42);
        assert_eq!(
            doc.spawn(&node(), ghost, 0),
            Err(TransactionError::UnknownEntity(ghost))
        );
    }

    #[test]
    fn spawn_consults_attach_policy() {
        let mut doc = Document::new();
        doc.set_attach_policy(|parent, _child| parent.schema().class() != "Leaf");
        let root = doc.root();
        let leaf_bp = EntityBlueprint::new(Arc::new(Schema::new("Leaf")));
        let leaf = doc.spawn(&leaf_bp, root, 0).unwrap();

        let err = doc.spawn(&node(), leaf, 0).unwrap_err();
        assert!(matches!(
            err,
            TransactionError::Action(EditActionError::InvalidState(_))
        ));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn rename_and_find() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.spawn(&node().named("A"), root, 0).unwrap();
        let b = doc.spawn(&node(), root, 1).unwrap();

        assert_eq!(doc.find("A"), Some(a));
        assert_eq!(
            doc.rename(b, Some("A")),
            Err(TransactionError::NameCollision("A".into()))
        );
        doc.rename(a, Some("B")).unwrap();
        assert_eq!(doc.find("A"), None);
        assert_eq!(doc.find("B"), Some(a));
        doc.rename(a, None).unwrap();
        assert_eq!(doc.find("B"), None);
        assert_eq!(doc.get(a).unwrap().name(), None);
    }

    #[test]
    fn detach_and_attach() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.spawn(&node(), root, 0).unwrap();
        let b = doc.spawn(&node(), root, 1).unwrap();

        assert_eq!(doc.detach(a), Some((root, 0)));
        assert_eq!(doc.get(root).unwrap().children(), &[b]);
        assert!(doc.attach(a, b, 0));
        assert_eq!(doc.location(a), Some((b, 0)));
    }

    #[test]
    fn attach_refuses_cycles() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.spawn(&node(), root, 0).unwrap();
        let b = doc.spawn(&node(), a, 0).unwrap();

        doc.detach(a);
        assert!(!doc.attach(a, b, 0));
        assert!(!doc.attach(a, a, 0));
        assert!(doc.attach(a, root, 0));
    }

    #[test]
    fn attach_refuses_attached_entity() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.spawn(&node(), root, 0).unwrap();
        let b = doc.spawn(&node(), root, 1).unwrap();
        assert!(!doc.attach(a, b, 0));
    }

    #[test]
    fn attach_unchecked_ignores_policy() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.spawn(&node(), root, 0).unwrap();
        let b = doc.spawn(&node(), root, 1).unwrap();
        doc.set_attach_policy(|_, _| false);

        doc.detach(a);
        assert!(!doc.attach(a, b, 0));
        doc.attach_unchecked(a, b, 0).unwrap();
        assert_eq!(doc.location(a), Some((b, 0)));
    }

    #[test]
    fn subtree_is_depth_first() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.spawn(&node(), root, 0).unwrap();
        let a1 = doc.spawn(&node(), a, 0).unwrap();
        let a2 = doc.spawn(&node(), a, 1).unwrap();
        let a11 = doc.spawn(&node(), a1, 0).unwrap();

        assert_eq!(doc.subtree(a), vec![a, a1, a11, a2]);
        assert!(doc.is_ancestor(root, a11));
        assert!(!doc.is_ancestor(a2, a11));
    }

    #[test]
    fn snapshot_is_sorted_and_comparable() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.spawn(&node().with_field("size", 4), root, 0).unwrap();
        let before = doc.snapshot();

        assert_eq!(before.entities.len(), 2);
        assert_eq!(
            before.get(a).unwrap().fields,
            vec![("size".to_string(), Value::I64(4))]
        );

        doc.get_mut(a).unwrap().set_field("size", 10);
        assert_ne!(before, doc.snapshot());
        doc.get_mut(a).unwrap().set_field("size", 4);
        assert_eq!(before, doc.snapshot());
    }

    #[test]
    fn snapshot_equality_is_bit_exact() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.spawn(&node(), root, 0).unwrap();
        doc.get_mut(a).unwrap().set_field("scale", f64::NAN);
        assert_eq!(doc.snapshot(), doc.snapshot());

        doc.get_mut(a).unwrap().set_field("scale", 0.0);
        let positive = doc.snapshot();
        doc.get_mut(a).unwrap().set_field("scale", -0.0);
        assert_ne!(positive, doc.snapshot());
    }
}
