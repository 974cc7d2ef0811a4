//! Dynamic Values
//!
//! The engine observes plain data: scalars plus two kinds of structured
//! containers, records (ordered string-keyed maps) and sequences.
//!
//! Structured containers are [`Object`]s. An `Object` is a shared handle with a
//! stable identity: cloning it clones the handle, not the data. This is what
//! makes shared sub-trees and cyclic graphs expressible, and it is the identity
//! the dependency graph and the wrapper cache are keyed by.
//!
//! Everything in this module is *raw*: reading or writing an `Object` directly
//! is invisible to the reactive runtime. Reactive access goes through
//! [`ReactiveObject`](crate::reactive::ReactiveObject).

mod json;

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Stable identity of a structured object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two kinds of structured container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Record,
    Sequence,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Record => f.write_str("record"),
            ObjectKind::Sequence => f.write_str("sequence"),
        }
    }
}

/// A dynamic value.
///
/// Scalars compare by value. Objects compare by identity, never by content.
/// Floats follow IEEE semantics, so `NaN` is never equal to itself.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Object(Object),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Whether this value is a record or a sequence.
    pub fn is_structured(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Strict identity used to decide whether a write changes anything.
    ///
    /// Unlike `==`, an `Int` is never the same as a `Float`, and `NaN` is the
    /// same as `NaN` while `0.0` and `-0.0` differ.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits(),
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => false,
            _ => self == other,
        }
    }

    /// Total order used by the default sequence sort.
    ///
    /// Values are grouped by type (null, booleans, numbers, strings, objects);
    /// numbers compare numerically with `NaN` last, objects by identity.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::Str(_) => 3,
                Value::Object(_) => 4,
            }
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let (a, b) = (self.as_f64().unwrap_or(f64::NAN), other.as_f64().unwrap_or(f64::NAN));
                a.total_cmp(&b)
            }
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.id().cmp(&b.id()),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident via $conv:expr),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant($conv(v))
                }
            }
        )*
    };
}

value_from! {
    bool => Bool via std::convert::identity,
    i32 => Int via i64::from,
    i64 => Int via std::convert::identity,
    u32 => Int via i64::from,
    usize => Int via |v: usize| v as i64,
    f32 => Float via f64::from,
    f64 => Float via std::convert::identity,
    &str => Str via Arc::from,
    String => Str via Arc::from,
    Arc<str> => Str via std::convert::identity,
    Object => Object via std::convert::identity,
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Backing storage of an object.
#[derive(Debug)]
pub(crate) enum ObjectData {
    Record(IndexMap<Arc<str>, Value>),
    Sequence(Vec<Value>),
}

impl ObjectData {
    pub(crate) fn kind(&self) -> ObjectKind {
        match self {
            ObjectData::Record(_) => ObjectKind::Record,
            ObjectData::Sequence(_) => ObjectKind::Sequence,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            ObjectData::Record(fields) => fields.len(),
            ObjectData::Sequence(items) => items.len(),
        }
    }
}

pub(crate) struct ObjectCell {
    id: ObjectId,
    kind: ObjectKind,
    frozen: AtomicBool,
    data: RwLock<ObjectData>,
}

/// A shared, identity-bearing record or sequence.
#[derive(Clone)]
pub struct Object(Arc<ObjectCell>);

impl Object {
    fn from_data(data: ObjectData) -> Self {
        Self(Arc::new(ObjectCell {
            id: ObjectId::next(),
            kind: data.kind(),
            frozen: AtomicBool::new(false),
            data: RwLock::new(data),
        }))
    }

    /// Create an empty record.
    pub fn record() -> Self {
        Self::from_data(ObjectData::Record(IndexMap::new()))
    }

    /// Create an empty sequence.
    pub fn sequence() -> Self {
        Self::from_data(ObjectData::Sequence(Vec::new()))
    }

    /// Create a record from key/value pairs, keeping their order.
    pub fn from_fields<K, V, I>(fields: I) -> Self
    where
        K: Into<Arc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::from_data(ObjectData::Record(
            fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }

    /// Create a sequence from values.
    pub fn from_values<V, I>(values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::from_data(ObjectData::Sequence(values.into_iter().map(Into::into).collect()))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.0.kind
    }

    /// Number of fields or items, read without tracking.
    pub fn len(&self) -> usize {
        self.0.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Reject all further writes to this object.
    ///
    /// Freezing is shallow: nested objects stay writable.
    pub fn freeze(&self) {
        self.0.frozen.store(true, AtomicOrdering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(AtomicOrdering::Acquire)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.0))
    }

    /// Raw field read. Not tracked.
    pub fn field(&self, name: &str) -> Option<Value> {
        match &*self.0.data.read() {
            ObjectData::Record(fields) => fields.get(name).cloned(),
            ObjectData::Sequence(_) => None,
        }
    }

    /// Raw item read. Not tracked.
    pub fn item(&self, index: usize) -> Option<Value> {
        match &*self.0.data.read() {
            ObjectData::Sequence(items) => items.get(index).cloned(),
            ObjectData::Record(_) => None,
        }
    }

    /// Raw field write. Does not notify anyone.
    ///
    /// Meant for building object graphs (including cyclic ones) before they
    /// are placed under reactivity.
    pub fn insert(&self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Result<Option<Value>> {
        let mut data = self.write_checked()?;
        match &mut *data {
            ObjectData::Record(fields) => Ok(fields.insert(name.into(), value.into())),
            ObjectData::Sequence(_) => Err(StateError::KindMismatch {
                expected: ObjectKind::Record,
                found: ObjectKind::Sequence,
            }),
        }
    }

    /// Raw append. Does not notify anyone.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let mut data = self.write_checked()?;
        match &mut *data {
            ObjectData::Sequence(items) => {
                items.push(value.into());
                Ok(())
            }
            ObjectData::Record(_) => Err(StateError::KindMismatch {
                expected: ObjectKind::Sequence,
                found: ObjectKind::Record,
            }),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, ObjectData> {
        self.0.data.read()
    }

    /// Write access, rejected for frozen objects.
    pub(crate) fn write_checked(&self) -> Result<RwLockWriteGuard<'_, ObjectData>> {
        if self.is_frozen() {
            return Err(StateError::Frozen(self.id()));
        }
        Ok(self.0.data.write())
    }
}

impl fmt::Debug for Object {
    // Never recurse: object graphs may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({} {}, len={})", self.kind(), self.id(), self.len())
    }
}

/// Non-owning handle to an [`Object`].
#[derive(Clone)]
pub struct WeakObject(Weak<ObjectCell>);

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }

    /// False once every strong handle to the object has been dropped.
    pub fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObject").field("live", &self.is_live()).finish()
    }
}
