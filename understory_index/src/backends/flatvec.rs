// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flat vector backend with linear scans. Small and simple; good for tiny sets.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::mem::size_of;

use crate::backend::Backend;
use crate::types::Aabb2D;

/// Flat vector backend with linear scans.
pub struct FlatVec<T: Copy + PartialOrd + Debug> {
    entries: Vec<Option<Aabb2D<T>>>,
    live: usize,
}

impl<T: Copy + PartialOrd + Debug> Default for FlatVec<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            live: 0,
        }
    }
}

impl<T: Copy + PartialOrd + Debug> Debug for FlatVec<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlatVec")
            .field("total_slots", &self.entries.len())
            .field("alive", &self.live)
            .finish_non_exhaustive()
    }
}

impl<T: Copy + PartialOrd + Debug> Backend<T> for FlatVec<T> {
    fn insert(&mut self, slot: usize, aabb: Aabb2D<T>) {
        if aabb.is_empty() {
            return;
        }
        if self.entries.len() <= slot {
            self.entries.resize_with(slot + 1, || None);
        }
        if self.entries[slot].replace(aabb).is_none() {
            self.live += 1;
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.live = 0;
    }

    fn len(&self) -> usize {
        self.live
    }

    fn bytes_used(&self) -> usize {
        self.entries.capacity() * size_of::<Option<Aabb2D<T>>>()
    }

    fn visit_point<F: FnMut(usize)>(&self, x: T, y: T, mut f: F) {
        for (i, slot) in self.entries.iter().enumerate() {
            if let Some(a) = slot.as_ref()
                && a.contains_point(x, y)
            {
                f(i);
            }
        }
    }

    fn visit_rect<F: FnMut(usize)>(&self, rect: Aabb2D<T>, mut f: F) {
        for (i, slot) in self.entries.iter().enumerate() {
            if let Some(a) = slot.as_ref()
                && a.overlaps(&rect)
            {
                f(i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn empty_boxes_are_dropped() {
        let mut flat = FlatVec::default();
        flat.insert(0, Aabb2D::new(0.0, 0.0, 0.0, 5.0));
        flat.insert(3, Aabb2D::new(0.0, 0.0, 5.0, 5.0));
        assert_eq!(flat.len(), 1);
        let hits: Vec<usize> = flat.query_rect(Aabb2D::new(-1.0, -1.0, 10.0, 10.0)).collect();
        assert_eq!(hits, vec![3]);
    }
}
