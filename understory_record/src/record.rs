// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The command log.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::mem::size_of;

use crate::ops::{Op, OpKind};

/// An append-only log of [`Op`]s.
///
/// Payloads live in an arena of slots. A slot is never reused or moved, so an op
/// keeps its slot for the life of the log. A separate index maps log positions to
/// slots; [`Record::defrag`] compacts only that index.
///
/// Positions run `0..count()`. Dropping the log drops the remaining payloads in
/// position order.
#[derive(Clone, Default)]
pub struct Record {
    arena: Vec<Op>,
    index: Vec<usize>,
}

impl Debug for Record {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Record")
            .field("count", &self.index.len())
            .field("slots", &self.arena.len())
            .finish_non_exhaustive()
    }
}

impl Record {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live positions.
    pub fn count(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the log holds no positions.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Append `op` and return it for in-place adjustment.
    pub fn append(&mut self, op: Op) -> &mut Op {
        if self.index.len() == self.index.capacity() {
            let grow = self.index.capacity().max(4);
            self.index.reserve_exact(grow);
        }
        let slot = self.arena.len();
        self.arena.push(op);
        self.index.push(slot);
        &mut self.arena[slot]
    }

    /// Drop the op at position `i` and store `op` in its slot.
    ///
    /// Out-of-range positions are ignored (and assert in debug builds).
    pub fn replace(&mut self, i: usize, op: Op) {
        debug_assert!(i < self.count(), "replace at {i} past end {}", self.count());
        if let Some(&slot) = self.index.get(i) {
            self.arena[slot] = op;
        }
    }

    /// Turn position `i` into a [`Op::NoOp`].
    pub fn replace_with_noop(&mut self, i: usize) {
        self.replace(i, Op::NoOp);
    }

    /// The op at position `i`.
    pub fn get(&self, i: usize) -> Option<&Op> {
        self.index.get(i).map(|&slot| &self.arena[slot])
    }

    /// The kind at position `i`.
    pub fn kind(&self, i: usize) -> Option<OpKind> {
        self.get(i).map(Op::kind)
    }

    /// Call `f` with the op at position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= count()`.
    pub fn visit<R>(&self, i: usize, f: impl FnOnce(&Op) -> R) -> R {
        f(&self.arena[self.index[i]])
    }

    /// Call `f` with mutable access to the op at position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= count()`.
    pub fn mutate<R>(&mut self, i: usize, f: impl FnOnce(&mut Op) -> R) -> R {
        f(&mut self.arena[self.index[i]])
    }

    /// Ops in position order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Op> + '_ {
        self.index.iter().map(|&slot| &self.arena[slot])
    }

    /// Remove every `NoOp` position, keeping the relative order of the rest.
    ///
    /// The arena is untouched; no-op slots stay allocated until the log drops.
    pub fn defrag(&mut self) {
        let arena = &self.arena;
        self.index.retain(|&slot| !matches!(arena[slot], Op::NoOp));
    }

    /// Approximate bytes owned by the log, excluding shared resources.
    pub fn bytes_used(&self) -> usize {
        size_of::<Self>()
            + self.index.capacity() * size_of::<usize>()
            + self.arena.capacity() * size_of::<Op>()
            + self.iter().map(Op::heap_bytes).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Paint;
    use alloc::sync::Arc;
    use kurbo::Rect;

    fn rect_op(x: f64) -> Op {
        Op::DrawRect {
            rect: Rect::new(x, 0.0, x + 1.0, 1.0),
            paint: Paint::default(),
        }
    }

    #[test]
    fn append_and_visit_in_order() {
        let mut record = Record::new();
        for i in 0..10 {
            record.append(rect_op(f64::from(i)));
        }
        assert_eq!(record.count(), 10);
        let xs: Vec<f64> = record
            .iter()
            .map(|op| match op {
                Op::DrawRect { rect, .. } => rect.x0,
                _ => f64::NAN,
            })
            .collect();
        assert_eq!(xs, (0..10).map(f64::from).collect::<Vec<_>>());
        assert_eq!(record.visit(3, Op::kind), OpKind::DrawRect);
    }

    #[test]
    fn append_returns_constructed_payload() {
        let mut record = Record::new();
        if let Op::DrawRect { paint, .. } = record.append(rect_op(0.0)) {
            paint.anti_alias = true;
        }
        assert!(record.get(0).and_then(Op::paint).is_some_and(|p| p.anti_alias));
    }

    #[test]
    fn defrag_preserves_relative_order() {
        let mut record = Record::new();
        for i in 0..6 {
            record.append(rect_op(f64::from(i)));
        }
        record.replace_with_noop(1);
        record.replace_with_noop(4);
        record.defrag();
        assert_eq!(record.count(), 4);
        let xs: Vec<f64> = record
            .iter()
            .filter_map(|op| match op {
                Op::DrawRect { rect, .. } => Some(rect.x0),
                _ => None,
            })
            .collect();
        assert_eq!(xs, [0.0, 2.0, 3.0, 5.0]);
    }

    #[test]
    fn replace_changes_kind_in_place() {
        let mut record = Record::new();
        record.append(Op::Save);
        record.replace(0, rect_op(2.0));
        assert_eq!(record.kind(0), Some(OpKind::DrawRect));
        record.mutate(0, |op| {
            if let Op::DrawRect { rect, .. } = op {
                rect.x1 = 9.0;
            }
        });
        assert!(matches!(record.get(0), Some(Op::DrawRect { rect, .. }) if rect.x1 == 9.0));
    }

    #[test]
    fn dropping_the_log_releases_payloads() {
        let value: Arc<[u8]> = Arc::from([1_u8, 2, 3]);
        let mut record = Record::new();
        record.append(Op::DrawAnnotation {
            rect: Rect::new(0.0, 0.0, 1.0, 1.0),
            key: "link".into(),
            value: Some(value.clone()),
        });
        assert_eq!(Arc::strong_count(&value), 2);
        drop(record);
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn bytes_used_grows_with_owned_payloads() {
        let mut record = Record::new();
        let empty = record.bytes_used();
        record.append(rect_op(0.0));
        assert!(record.bytes_used() > empty);
    }
}
