//! Interception Layer
//!
//! A [`ReactiveObject`] is the reactive view of a raw [`Object`]. Every access
//! through it passes through tracking or notification:
//!
//! - Reads record an edge for the current computation, then return the value.
//!   Nested objects come back as views taken from the runtime's wrapper cache,
//!   so reading the same nested object twice yields the same view.
//! - Writes store the new value and, only if it differs from the old one,
//!   invalidate the written key. Storing a view stores its underlying object;
//!   views are never wrapped twice.
//!
//! Wrapping is lazy: a nested object gets a view the first time it is read.
//! Cyclic graphs are therefore safe; nothing walks the graph eagerly.
//!
//! Sequence-specific operations live in `sequence.rs`.

use std::fmt;
use std::sync::{Arc, Weak};

use smallvec::smallvec;

use super::runtime::Runtime;
use super::sequence;
use crate::error::{Result, StateError};
use crate::graph::{Invalidation, PropKey};
use crate::value::{Object, ObjectData, ObjectId, ObjectKind, Value};

pub(crate) struct ViewInner {
    runtime: Runtime,
    target: Object,
}

/// Reactive view of a record or sequence.
///
/// Cloning shares the view. Equality is view identity.
#[derive(Clone)]
pub struct ReactiveObject(Arc<ViewInner>);

/// A key as written by callers: a field name or a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(Arc<str>),
    Index(usize),
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.into())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name.into())
    }
}

impl From<Arc<str>> for Key {
    fn from(name: Arc<str>) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
        }
    }
}

/// What a key addresses once the container kind is known.
pub(crate) enum Slot {
    Field(Arc<str>),
    Index(usize),
    Length,
}

impl Slot {
    pub(crate) fn resolve(key: Key, kind: ObjectKind) -> Result<Slot> {
        match (kind, key) {
            (ObjectKind::Record, Key::Name(name)) => Ok(Slot::Field(name)),
            (ObjectKind::Record, Key::Index(i)) => Ok(Slot::Field(i.to_string().into())),
            (ObjectKind::Sequence, Key::Index(i)) => Ok(Slot::Index(i)),
            (ObjectKind::Sequence, Key::Name(name)) => {
                if &*name == "length" {
                    Ok(Slot::Length)
                } else {
                    name.parse().map(Slot::Index).map_err(|_| StateError::InvalidKey {
                        key: name.to_string(),
                        kind,
                    })
                }
            }
        }
    }

    pub(crate) fn prop_key(&self) -> PropKey {
        match self {
            Slot::Field(name) => PropKey::Field(name.clone()),
            Slot::Index(i) => PropKey::Index(*i),
            Slot::Length => PropKey::Length,
        }
    }
}

/// The result of a reactive read.
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    /// A scalar. Never holds `Value::Object`.
    Value(Value),
    /// A nested record or sequence, as a reactive view.
    Object(ReactiveObject),
}

impl Prop {
    pub fn is_null(&self) -> bool {
        matches!(self, Prop::Value(Value::Null))
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Prop::Value(v) => Some(v),
            Prop::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Prop::Object(o) => Some(o),
            Prop::Value(_) => None,
        }
    }

    pub fn into_object(self) -> Option<ReactiveObject> {
        match self {
            Prop::Object(o) => Some(o),
            Prop::Value(_) => None,
        }
    }

    /// The raw value behind this read.
    pub fn to_value(&self) -> Value {
        match self {
            Prop::Value(v) => v.clone(),
            Prop::Object(o) => Value::Object(o.target().clone()),
        }
    }
}

impl From<Prop> for Value {
    fn from(prop: Prop) -> Self {
        match prop {
            Prop::Value(v) => v,
            Prop::Object(o) => Value::Object(o.target().clone()),
        }
    }
}

impl From<ReactiveObject> for Value {
    fn from(view: ReactiveObject) -> Self {
        Value::Object(view.target().clone())
    }
}

impl From<&ReactiveObject> for Value {
    fn from(view: &ReactiveObject) -> Self {
        Value::Object(view.target().clone())
    }
}

impl PartialEq<Value> for Prop {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Prop::Value(v), other) => v == other,
            (Prop::Object(o), Value::Object(raw)) => o.target().ptr_eq(raw),
            (Prop::Object(_), _) => false,
        }
    }
}

impl ReactiveObject {
    pub(crate) fn new(runtime: Runtime, target: Object) -> Self {
        Self(Arc::new(ViewInner { runtime, target }))
    }

    pub(crate) fn from_inner(inner: Arc<ViewInner>) -> Self {
        Self(inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<ViewInner> {
        Arc::downgrade(&self.0)
    }

    /// The raw object behind this view. Access through it is not tracked.
    pub fn target(&self) -> &Object {
        &self.0.target
    }

    pub fn runtime(&self) -> &Runtime {
        &self.0.runtime
    }

    pub fn id(&self) -> ObjectId {
        self.0.target.id()
    }

    pub fn kind(&self) -> ObjectKind {
        self.0.target.kind()
    }

    /// View identity.
    pub fn ptr_eq(&self, other: &ReactiveObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn track(&self, key: PropKey) {
        self.0.runtime.track(&self.0.target, key);
    }

    pub(crate) fn invalidate(&self, keys: &[PropKey]) {
        self.0.runtime.invalidate(&self.0.target, keys);
    }

    /// Turn a stored value into what a reader sees.
    pub(crate) fn prop(&self, value: Value) -> Prop {
        match value {
            Value::Object(obj) => Prop::Object(self.0.runtime.wrap(&obj)),
            scalar => Prop::Value(scalar),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read one key.
    ///
    /// Missing keys are tracked too, so a later write that creates them
    /// notifies. Names that cannot address a sequence read as `None` and are
    /// not tracked.
    pub fn get(&self, key: impl Into<Key>) -> Option<Prop> {
        let slot = Slot::resolve(key.into(), self.kind()).ok()?;
        self.track(slot.prop_key());

        let value = match (&*self.target().read(), &slot) {
            (ObjectData::Record(fields), Slot::Field(name)) => fields.get(&**name).cloned(),
            (ObjectData::Sequence(items), Slot::Index(i)) => items.get(*i).cloned(),
            (ObjectData::Sequence(items), Slot::Length) => Some(Value::from(items.len())),
            _ => None,
        }?;
        Some(self.prop(value))
    }

    /// Follow a dot-separated path such as `"user.tags.0"`.
    ///
    /// Every hop is a tracked read.
    pub fn get_path(&self, path: &str) -> Option<Prop> {
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut current = self.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// True if the key holds a value. Tracked like `get`.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.get(key).is_some()
    }

    /// Number of fields or items.
    ///
    /// Tracks the key set of a record, or the length of a sequence.
    pub fn len(&self) -> usize {
        match self.kind() {
            ObjectKind::Record => self.track(PropKey::Shape),
            ObjectKind::Sequence => self.track(PropKey::Length),
        }
        self.target().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys, in order. Tracks the container's shape.
    pub fn keys(&self) -> Vec<Key> {
        self.track(PropKey::Shape);
        if self.kind() == ObjectKind::Sequence {
            self.track(PropKey::Length);
        }
        match &*self.target().read() {
            ObjectData::Record(fields) => fields.keys().cloned().map(Key::Name).collect(),
            ObjectData::Sequence(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    /// All key/value pairs, in order. Tracks the shape and every key read.
    pub fn entries(&self) -> Vec<(Key, Prop)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.get(key.clone()).map(|prop| (key, prop)))
            .collect()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write one key.
    ///
    /// Writing the value already stored (same scalar, same object identity)
    /// notifies nobody. Writing `"length"` on a sequence resizes it.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let slot = Slot::resolve(key.into(), self.kind())?;
        let value = value.into();

        let keys: Invalidation = match slot {
            Slot::Length => {
                let len = value
                    .as_i64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| StateError::InvalidArguments {
                        method: "set_len",
                        reason: format!("length must be a non-negative integer, got {value:?}"),
                    })?;
                return self.set_len(len);
            }
            Slot::Index(index) => {
                let max_len = self.runtime().config().max_sequence_len;
                let mut data = self.target().write_checked()?;
                match &mut *data {
                    ObjectData::Sequence(items) => sequence::write_index(items, index, value, max_len)?,
                    ObjectData::Record(_) => Invalidation::new(),
                }
            }
            Slot::Field(name) => {
                let mut data = self.target().write_checked()?;
                match &mut *data {
                    ObjectData::Record(fields) => match fields.get_mut(&*name) {
                        Some(old) if old.same_value(&value) => Invalidation::new(),
                        Some(old) => {
                            *old = value;
                            smallvec![PropKey::Field(name)]
                        }
                        None => {
                            fields.insert(name.clone(), value);
                            smallvec![PropKey::Field(name), PropKey::Shape]
                        }
                    },
                    ObjectData::Sequence(_) => Invalidation::new(),
                }
            }
        };

        self.invalidate(&keys);
        Ok(())
    }

    /// Remove a record field, returning its old value.
    pub fn remove(&self, key: impl Into<Key>) -> Result<Option<Prop>> {
        let kind = self.kind();
        let Slot::Field(name) = Slot::resolve(key.into(), kind)? else {
            return Err(StateError::KindMismatch {
                expected: ObjectKind::Record,
                found: kind,
            });
        };

        let removed = {
            let mut data = self.target().write_checked()?;
            match &mut *data {
                ObjectData::Record(fields) => fields.shift_remove(&*name),
                ObjectData::Sequence(_) => None,
            }
        };
        let Some(old) = removed else {
            return Ok(None);
        };
        self.invalidate(&[PropKey::Field(name), PropKey::Shape]);
        Ok(Some(self.prop(old)))
    }

    /// A raw copy of this view's object, for passing to non-reactive code.
    pub fn to_value(&self) -> Value {
        Value::Object(self.target().clone())
    }
}

impl PartialEq for ReactiveObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ReactiveObject {}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReactiveObject({} {})", self.kind(), self.id())
    }
}
