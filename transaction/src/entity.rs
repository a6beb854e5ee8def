//! Editable entities.
//!
//! An [`Entity`] carries a stable [`EntityId`], an optional unique name, the
//! fixed fields declared by its [`Schema`] (always present, in schema
//! order) and a map of dynamic fields added at runtime. Hierarchy links
//! (parent and ordered children) are maintained by the
//! [`Document`](crate::Document).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Stable identity of an entity within one [`Document`](crate::Document).
///
/// Ids are never reused, so an id held by an action always refers to the
/// same entity, whether it is alive or sitting in the trash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Builds an id from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fixed field layout shared by every entity of one class.
///
/// # Example
///
/// ```ignore
/// let button = Arc::new(
///     Schema::new("GuiButton")
///         .with_field("text", "Button")
///         .with_field("size", 4),
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    class: String,
    fields: Vec<(String, Value)>,
}

impl Schema {
    /// Creates a schema with no fixed fields.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a fixed field with its default value.
    pub fn with_field(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        let name = name.into();
        let default = default.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = default;
        } else {
            self.fields.push((name, default));
        }
        self
    }

    /// Class name shown in editors.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Fixed field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Position of a fixed field, if declared.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn defaults(&self) -> Vec<Value> {
        self.fields.iter().map(|(_, v)| v.clone()).collect()
    }
}

/// An addressable, mutable object tracked by the transaction engine.
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    schema: Arc<Schema>,
    pub(crate) name: Option<String>,
    fixed: Vec<Value>,
    dynamic: BTreeMap<String, Value>,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
}

impl Entity {
    pub(crate) fn new(id: EntityId, schema: Arc<Schema>, name: Option<String>) -> Self {
        let fixed = schema.defaults();
        Self {
            id,
            schema,
            name,
            fixed,
            dynamic: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Returns `true` if `name` is a fixed field of this entity's schema.
    pub fn is_fixed(&self, name: &str) -> bool {
        self.schema.field_index(name).is_some()
    }

    /// Reads a fixed or dynamic field. Unset dynamic fields read as `None`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self.schema.field_index(name) {
            Some(i) => self.fixed.get(i),
            None => self.dynamic.get(name),
        }
    }

    /// Writes a field.
    ///
    /// Fixed fields store the value verbatim, including [`Value::Null`].
    /// Dynamic fields are created on demand and removed when set to `Null`.
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(i) = self.schema.field_index(name) {
            self.fixed[i] = value;
        } else if value.is_null() {
            self.dynamic.remove(name);
        } else {
            self.dynamic.insert(name.to_owned(), value);
        }
    }

    /// Clears a field: fixed fields become `Null`, dynamic fields disappear.
    pub fn clear_field(&mut self, name: &str) {
        self.set_field(name, Value::Null);
    }

    /// Dynamic field names, sorted.
    pub fn dynamic_field_names(&self) -> impl Iterator<Item = &str> {
        self.dynamic.keys().map(String::as_str)
    }

    /// All fields: fixed fields in schema order, then dynamic fields sorted
    /// by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .field_names()
            .zip(self.fixed.iter())
            .chain(self.dynamic.iter().map(|(k, v)| (k.as_str(), v)))
    }
}

/// Everything needed to create an entity later, e.g. when an add action
/// is first applied.
#[derive(Debug, Clone)]
pub struct EntityBlueprint {
    pub schema: Arc<Schema>,
    pub name: Option<String>,
    pub fields: Vec<(String, Value)>,
}

impl EntityBlueprint {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            name: None,
            fields: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub(crate) fn build(&self, id: EntityId) -> Entity {
        let mut entity = Entity::new(id, self.schema.clone(), self.name.clone());
        for (name, value) in &self.fields {
            entity.set_field(name, value.clone());
        }
        entity
    }
}
