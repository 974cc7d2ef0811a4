//! Sequence Mutation Policy
//!
//! A bulk sequence operation changes several keys at once. `push` occupies a
//! new index and changes the length; `shift` moves every remaining item. A
//! per-key write hook cannot see that, so each mutating operation goes
//! through a handler that:
//!
//! 1. performs the mutation on the raw storage,
//! 2. computes the invalidated keys from the pre-mutation length and the
//!    operation's arguments ([`SeqOp::invalidation`]),
//! 3. hands that set to the scheduler as one batch.
//!
//! Operations the table does not know go through [`ReactiveObject::mutate_with`],
//! which invalidates the length, every index and the shape. Precision is
//! traded for correctness there, never the reverse.
//!
//! Return values match the plain operation: `pop` returns the removed item,
//! `push` the new length, `reverse` the same view, and so on.

use std::cmp::Ordering;
use std::ops::{Bound, Range, RangeBounds};

use smallvec::smallvec;

use super::view::{Prop, ReactiveObject};
use crate::error::{Result, StateError};
use crate::graph::{Invalidation, PropKey};
use crate::value::{Object, ObjectData, ObjectKind, Value};

/// A mutating sequence operation, with arguments already clamped to the
/// sequence it was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqOp {
    Push { count: usize },
    Pop,
    Shift,
    Unshift { count: usize },
    Reverse,
    Sort,
    Splice { start: usize, removed: usize, inserted: usize },
    CopyWithin,
    Fill,
    /// Anything else. Invalidates everything.
    Other,
}

impl SeqOp {
    /// Keys changed by this operation on a sequence that held `old_len`
    /// items before and holds `new_len` after.
    ///
    /// Operations that changed nothing (popping an empty sequence, pushing
    /// zero items) invalidate nothing. Every other result ends with
    /// [`PropKey::Shape`].
    pub fn invalidation(self, old_len: usize, new_len: usize) -> Invalidation {
        let mut keys = Invalidation::new();
        match self {
            SeqOp::Push { count } => {
                if count == 0 {
                    return keys;
                }
                push_indices(&mut keys, old_len..old_len + count);
                keys.push(PropKey::Length);
            }
            SeqOp::Pop => {
                if old_len == 0 {
                    return keys;
                }
                keys.push(PropKey::Index(old_len - 1));
                keys.push(PropKey::Length);
            }
            SeqOp::Shift => {
                if old_len == 0 {
                    return keys;
                }
                keys.push(PropKey::Length);
                // Remaining items all moved; the last slot was vacated.
                push_indices(&mut keys, 0..old_len);
            }
            SeqOp::Unshift { count } => {
                if count == 0 {
                    return keys;
                }
                keys.push(PropKey::Length);
                push_indices(&mut keys, 0..new_len);
            }
            SeqOp::Reverse | SeqOp::Sort => {
                if old_len == 0 {
                    return keys;
                }
                push_indices(&mut keys, 0..old_len);
            }
            SeqOp::Splice {
                start,
                removed,
                inserted,
            } => {
                if removed == 0 && inserted == 0 {
                    return keys;
                }
                if removed == inserted {
                    push_indices(&mut keys, start..start + removed);
                } else {
                    // The tail shifted too.
                    push_indices(&mut keys, start..old_len.max(new_len));
                    keys.push(PropKey::Length);
                }
            }
            SeqOp::CopyWithin | SeqOp::Fill => {
                keys.push(PropKey::Length);
                push_indices(&mut keys, 0..old_len);
            }
            SeqOp::Other => {
                keys.push(PropKey::Length);
                push_indices(&mut keys, 0..old_len.max(new_len));
            }
        }
        keys.push(PropKey::Shape);
        keys
    }
}

fn push_indices(keys: &mut Invalidation, range: Range<usize>) {
    keys.extend(range.map(PropKey::Index));
}

/// Sequence methods reachable by name through [`ReactiveObject::invoke`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqMethod {
    Push,
    Pop,
    Shift,
    Unshift,
    Reverse,
    Sort,
    Splice,
    CopyWithin,
    Fill,
    Truncate,
    Clear,
    Len,
    Includes,
    IndexOf,
    Slice,
}

impl SeqMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "push" => SeqMethod::Push,
            "pop" => SeqMethod::Pop,
            "shift" => SeqMethod::Shift,
            "unshift" => SeqMethod::Unshift,
            "reverse" => SeqMethod::Reverse,
            "sort" => SeqMethod::Sort,
            "splice" => SeqMethod::Splice,
            "copyWithin" | "copy_within" => SeqMethod::CopyWithin,
            "fill" => SeqMethod::Fill,
            "truncate" => SeqMethod::Truncate,
            "clear" => SeqMethod::Clear,
            "len" | "length" => SeqMethod::Len,
            "includes" | "contains" => SeqMethod::Includes,
            "indexOf" | "index_of" => SeqMethod::IndexOf,
            "slice" => SeqMethod::Slice,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            SeqMethod::Push => "push",
            SeqMethod::Pop => "pop",
            SeqMethod::Shift => "shift",
            SeqMethod::Unshift => "unshift",
            SeqMethod::Reverse => "reverse",
            SeqMethod::Sort => "sort",
            SeqMethod::Splice => "splice",
            SeqMethod::CopyWithin => "copy_within",
            SeqMethod::Fill => "fill",
            SeqMethod::Truncate => "truncate",
            SeqMethod::Clear => "clear",
            SeqMethod::Len => "len",
            SeqMethod::Includes => "includes",
            SeqMethod::IndexOf => "index_of",
            SeqMethod::Slice => "slice",
        }
    }

    /// Read-only methods only track; they never invalidate.
    pub fn is_mutating(self) -> bool {
        !matches!(
            self,
            SeqMethod::Len | SeqMethod::Includes | SeqMethod::IndexOf | SeqMethod::Slice
        )
    }
}

/// Single-index write. Writing past the end pads with `Null`, up to
/// `max_len` items.
pub(crate) fn write_index(items: &mut Vec<Value>, index: usize, value: Value, max_len: usize) -> Result<Invalidation> {
    let old_len = items.len();
    if index < old_len {
        if items[index].same_value(&value) {
            return Ok(Invalidation::new());
        }
        items[index] = value;
        return Ok(smallvec![PropKey::Index(index)]);
    }

    check_len("set", index.saturating_add(1), max_len)?;
    items.resize(index, Value::Null);
    items.push(value);
    let mut keys: Invalidation = (old_len..=index).map(PropKey::Index).collect();
    keys.push(PropKey::Length);
    keys.push(PropKey::Shape);
    Ok(keys)
}

fn check_len(method: &'static str, len: usize, max_len: usize) -> Result<()> {
    if len > max_len {
        return Err(StateError::InvalidArguments {
            method,
            reason: format!("length {len} exceeds the maximum sequence length {max_len}"),
        });
    }
    Ok(())
}

fn clamp_range(range: &impl RangeBounds<usize>, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    }
    .min(len);
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    }
    .min(len);
    start..end.max(start)
}

/// Resolve a possibly negative position against `len`, counting negatives
/// from the end.
fn relative(n: i64, len: usize) -> usize {
    if n < 0 {
        len.saturating_sub(usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX))
    } else {
        usize::try_from(n).unwrap_or(usize::MAX).min(len)
    }
}

fn int_arg(method: SeqMethod, args: &[Value], index: usize) -> Result<Option<i64>> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| StateError::InvalidArguments {
            method: method.name(),
            reason: format!("argument {index} must be an integer, got {v:?}"),
        }),
    }
}

impl ReactiveObject {
    /// Run `f` on the raw items, then invalidate what its [`SeqOp`] says.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> (R, SeqOp)) -> Result<R> {
        self.try_mutate(|items| Ok(f(items)))
    }

    /// Like `mutate`, but `f` may reject the operation before changing anything.
    fn try_mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> Result<(R, SeqOp)>) -> Result<R> {
        let (result, keys) = {
            let mut data = self.target().write_checked()?;
            let ObjectData::Sequence(items) = &mut *data else {
                return Err(StateError::KindMismatch {
                    expected: ObjectKind::Sequence,
                    found: ObjectKind::Record,
                });
            };
            let old_len = items.len();
            let (result, op) = f(items)?;
            (result, op.invalidation(old_len, items.len()))
        };
        self.invalidate(&keys);
        Ok(result)
    }

    fn max_len(&self) -> usize {
        self.runtime().config().max_sequence_len
    }

    /// Append one item. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        self.extend([value.into()])
    }

    /// Append many items in one invalidation. Returns the new length.
    pub fn extend<V, I>(&self, values: I) -> Result<usize>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let max_len = self.max_len();
        self.try_mutate(|items| {
            let count = values.len();
            check_len("push", items.len().saturating_add(count), max_len)?;
            items.extend(values);
            Ok((items.len(), SeqOp::Push { count }))
        })
    }

    /// Remove the last item.
    pub fn pop(&self) -> Result<Option<Prop>> {
        let removed = self.mutate(|items| (items.pop(), SeqOp::Pop))?;
        Ok(removed.map(|v| self.prop(v)))
    }

    /// Remove the first item.
    pub fn shift(&self) -> Result<Option<Prop>> {
        let removed = self.mutate(|items| {
            let first = (!items.is_empty()).then(|| items.remove(0));
            (first, SeqOp::Shift)
        })?;
        Ok(removed.map(|v| self.prop(v)))
    }

    /// Insert one item at the front. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> Result<usize> {
        self.unshift_all([value.into()])
    }

    /// Insert items at the front, keeping their order. Returns the new length.
    pub fn unshift_all<V, I>(&self, values: I) -> Result<usize>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let max_len = self.max_len();
        self.try_mutate(|items| {
            let count = values.len();
            check_len("unshift", items.len().saturating_add(count), max_len)?;
            items.splice(0..0, values);
            Ok((items.len(), SeqOp::Unshift { count }))
        })
    }

    /// Reverse in place. Returns this view.
    pub fn reverse(&self) -> Result<ReactiveObject> {
        self.mutate(|items| {
            items.reverse();
            ((), SeqOp::Reverse)
        })?;
        Ok(self.clone())
    }

    /// Sort by [`Value::total_cmp`]. Returns this view.
    pub fn sort(&self) -> Result<ReactiveObject> {
        self.sort_by(Value::total_cmp)
    }

    /// Stable sort with a comparator over raw values. Returns this view.
    ///
    /// The comparator runs while the sequence is locked and must not access
    /// this sequence.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) -> Result<ReactiveObject> {
        self.mutate(|items| {
            items.sort_by(compare);
            ((), SeqOp::Sort)
        })?;
        Ok(self.clone())
    }

    /// Remove `delete_count` items at `start` and insert `values` there.
    ///
    /// `start` and `delete_count` are clamped to the sequence. Returns the
    /// removed items.
    pub fn splice<V, I>(&self, start: usize, delete_count: usize, values: I) -> Result<Vec<Prop>>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let inserted: Vec<Value> = values.into_iter().map(Into::into).collect();
        let max_len = self.max_len();
        let removed = self.try_mutate(|items| {
            let len = items.len();
            let start = start.min(len);
            let removed = delete_count.min(len - start);
            let count = inserted.len();
            check_len("splice", (len - removed).saturating_add(count), max_len)?;
            let out: Vec<Value> = items.splice(start..start + removed, inserted).collect();
            Ok((
                out,
                SeqOp::Splice {
                    start,
                    removed,
                    inserted: count,
                },
            ))
        })?;
        Ok(removed.into_iter().map(|v| self.prop(v)).collect())
    }

    /// Copy the items in `src` to position `dest`, overwriting. Bounds are
    /// clamped rather than panicking. Returns this view.
    pub fn copy_within(&self, src: impl RangeBounds<usize>, dest: usize) -> Result<ReactiveObject> {
        self.mutate(|items| {
            let len = items.len();
            let src = clamp_range(&src, len);
            let dest = dest.min(len);
            let count = src.len().min(len - dest);
            if count > 0 {
                let chunk = items[src.start..src.start + count].to_vec();
                items[dest..dest + count].clone_from_slice(&chunk);
            }
            ((), SeqOp::CopyWithin)
        })?;
        Ok(self.clone())
    }

    /// Overwrite the items in `range` with `value`. Returns this view.
    pub fn fill(&self, value: impl Into<Value>, range: impl RangeBounds<usize>) -> Result<ReactiveObject> {
        let value = value.into();
        self.mutate(|items| {
            let range = clamp_range(&range, items.len());
            items[range].fill(value);
            ((), SeqOp::Fill)
        })?;
        Ok(self.clone())
    }

    /// Grow (padding with `Null`) or shrink to exactly `len` items.
    ///
    /// Growing past the runtime's `max_sequence_len` is rejected.
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.resize_with(|_| len)
    }

    /// Shrink to at most `len` items.
    pub fn truncate(&self, len: usize) -> Result<()> {
        self.resize_with(|old| old.min(len))
    }

    pub fn clear(&self) -> Result<()> {
        self.resize_with(|_| 0)
    }

    fn resize_with(&self, new_len: impl FnOnce(usize) -> usize) -> Result<()> {
        let max_len = self.max_len();
        self.try_mutate(|items| {
            let old = items.len();
            let new = new_len(old);
            if new > old {
                check_len("set_len", new, max_len)?;
            }
            items.resize(new, Value::Null);
            Ok((
                (),
                SeqOp::Splice {
                    start: new.min(old),
                    removed: old.saturating_sub(new),
                    inserted: new.saturating_sub(old),
                },
            ))
        })
    }

    /// Apply an arbitrary mutation to the raw items.
    ///
    /// The effect of `f` is unknown, so the length, every index and the shape
    /// are invalidated.
    ///
    /// `f` runs while the sequence is locked and must not access this
    /// sequence, not even through this view's reads.
    pub fn mutate_with<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        self.mutate(|items| (f(items), SeqOp::Other))
    }

    // ------------------------------------------------------------------
    // Read-only
    // ------------------------------------------------------------------

    fn items_snapshot(&self) -> Vec<Value> {
        match &*self.target().read() {
            ObjectData::Sequence(items) => items.clone(),
            ObjectData::Record(_) => Vec::new(),
        }
    }

    /// Every item, in order. Tracks the shape, the length and every index.
    ///
    /// Records yield nothing; use `entries` for them.
    pub fn to_vec(&self) -> Vec<Prop> {
        self.track(PropKey::Shape);
        self.track(PropKey::Length);
        let items = self.items_snapshot();
        items
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                self.track(PropKey::Index(i));
                self.prop(v)
            })
            .collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Prop> {
        self.to_vec().into_iter()
    }

    /// Position of the first item equal to `needle`.
    ///
    /// Tracks the length and each index up to the match.
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        self.track(PropKey::Length);
        let items = self.items_snapshot();
        items.iter().enumerate().find_map(|(i, item)| {
            self.track(PropKey::Index(i));
            (item == needle).then_some(i)
        })
    }

    pub fn contains(&self, needle: &Value) -> bool {
        self.index_of(needle).is_some()
    }

    /// Items in `range`, clamped. Tracks the length and those indices.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Vec<Prop> {
        self.track(PropKey::Length);
        let items = self.items_snapshot();
        let range = clamp_range(&range, items.len());
        items[range.clone()]
            .iter()
            .zip(range)
            .map(|(v, i)| {
                self.track(PropKey::Index(i));
                self.prop(v.clone())
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Dynamic dispatch
    // ------------------------------------------------------------------

    /// Call a sequence method by name, for string-driven callers.
    ///
    /// Positions may be negative and count from the end. Methods that
    /// produce a new sequence (`splice`, `slice`) return it as a fresh view.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Prop> {
        let method = SeqMethod::from_name(name).ok_or_else(|| StateError::UnknownMethod(name.to_string()))?;
        let len = self.target().len();
        let position = |i: usize, default: usize| -> Result<usize> {
            Ok(int_arg(method, args, i)?.map_or(default, |n| relative(n, len)))
        };

        let prop = match method {
            SeqMethod::Push => Prop::Value(self.extend(args.iter().cloned())?.into()),
            SeqMethod::Pop => self.pop()?.unwrap_or(Prop::Value(Value::Null)),
            SeqMethod::Shift => self.shift()?.unwrap_or(Prop::Value(Value::Null)),
            SeqMethod::Unshift => Prop::Value(self.unshift_all(args.iter().cloned())?.into()),
            SeqMethod::Reverse => Prop::Object(self.reverse()?),
            SeqMethod::Sort => {
                if !args.is_empty() {
                    return Err(StateError::InvalidArguments {
                        method: method.name(),
                        reason: "comparators cannot be passed by name; use sort_by".into(),
                    });
                }
                Prop::Object(self.sort()?)
            }
            SeqMethod::Splice => {
                let start = position(0, 0)?;
                let delete = match int_arg(method, args, 1)? {
                    Some(n) => usize::try_from(n.max(0)).unwrap_or(usize::MAX),
                    None if args.len() > 1 => 0,
                    None => len - start,
                };
                let inserted = args.iter().skip(2).cloned();
                let removed = self.splice(start, delete, inserted)?;
                self.fresh_sequence(removed)
            }
            SeqMethod::CopyWithin => {
                let dest = position(0, 0)?;
                let start = position(1, 0)?;
                let end = position(2, len)?;
                Prop::Object(self.copy_within(start..end, dest)?)
            }
            SeqMethod::Fill => {
                let value = args.first().cloned().unwrap_or_default();
                let start = position(1, 0)?;
                let end = position(2, len)?;
                Prop::Object(self.fill(value, start..end)?)
            }
            SeqMethod::Truncate => {
                let n = int_arg(method, args, 0)?.ok_or_else(|| StateError::InvalidArguments {
                    method: method.name(),
                    reason: "missing length".into(),
                })?;
                self.truncate(usize::try_from(n.max(0)).unwrap_or(usize::MAX))?;
                Prop::Value(Value::Null)
            }
            SeqMethod::Clear => {
                self.clear()?;
                Prop::Value(Value::Null)
            }
            SeqMethod::Len => Prop::Value(self.len().into()),
            SeqMethod::Includes => {
                let needle = args.first().cloned().unwrap_or_default();
                Prop::Value(self.contains(&needle).into())
            }
            SeqMethod::IndexOf => {
                let needle = args.first().cloned().unwrap_or_default();
                let found = self.index_of(&needle).map_or(-1, |i| i as i64);
                Prop::Value(found.into())
            }
            SeqMethod::Slice => {
                let start = position(0, 0)?;
                let end = position(1, len)?;
                let items = self.slice(start..end);
                self.fresh_sequence(items)
            }
        };
        Ok(prop)
    }

    fn fresh_sequence(&self, items: Vec<Prop>) -> Prop {
        let seq = Object::from_values(items);
        Prop::Object(self.runtime().wrap(&seq))
    }
}
