// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend trait for spatial indexing implementations.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::types::Aabb2D;
use core::fmt::Debug;

/// Spatial backend abstraction.
///
/// Slots are caller-chosen `usize` keys (for recordings, the op index). Backends
/// never invent slots: every visited slot was passed to [`Backend::insert`] with
/// a non-empty box.
///
/// Backends may batch work: callers insert a group of slots and then call
/// [`Backend::finish`]. Queries issued before `finish` must still be correct,
/// although they may be slower.
pub trait Backend<T>
where
    T: Copy + PartialOrd + Debug,
{
    /// Insert a slot into the spatial structure.
    ///
    /// Empty boxes are accepted and dropped; such slots never match a query.
    fn insert(&mut self, slot: usize, aabb: Aabb2D<T>);

    /// Finish a batch of inserts.
    ///
    /// Bulk-loading backends build their acceleration structure here. The
    /// default implementation does nothing.
    fn finish(&mut self) {}

    /// Clear all spatial structures.
    fn clear(&mut self);

    /// Number of slots with a non-empty box.
    fn len(&self) -> usize;

    /// Returns `true` if no slot is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate heap memory held by the backend, in bytes.
    fn bytes_used(&self) -> usize;

    /// Visit slots whose AABB contains the point.
    fn visit_point<F: FnMut(usize)>(&self, x: T, y: T, f: F);

    /// Visit slots whose AABB overlaps the rectangle.
    ///
    /// Each matching slot is visited exactly once, in no particular order.
    fn visit_rect<F: FnMut(usize)>(&self, rect: Aabb2D<T>, f: F);

    /// Query slots whose AABB contains the point. Default: collects `visit_point`.
    fn query_point<'a>(&'a self, x: T, y: T) -> Box<dyn Iterator<Item = usize> + 'a> {
        let mut out = Vec::new();
        self.visit_point(x, y, |i| out.push(i));
        Box::new(out.into_iter())
    }

    /// Query slots whose AABB overlaps the rectangle. Default: collects `visit_rect`.
    fn query_rect<'a>(&'a self, rect: Aabb2D<T>) -> Box<dyn Iterator<Item = usize> + 'a> {
        let mut out = Vec::new();
        self.visit_rect(rect, |i| out.push(i));
        Box::new(out.into_iter())
    }
}
