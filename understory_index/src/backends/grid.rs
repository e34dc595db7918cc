// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Uniform grid backend over `f64` coordinates.
//!
//! Each slot is registered in every cell its box touches. Boxes spanning more
//! than [`Grid::MAX_CELLS_PER_SLOT`] cells go to an overflow list that every
//! query scans.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::mem::size_of;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::backend::Backend;
use crate::types::Aabb2D;

type CellKey = (i32, i32);

/// Uniform grid backend.
pub struct Grid {
    cell_size: f64,
    boxes: Vec<Option<Aabb2D<f64>>>,
    cells: HashMap<CellKey, SmallVec<[usize; 4]>>,
    overflow: Vec<usize>,
    live: usize,
}

impl Debug for Grid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Grid")
            .field("cell_size", &self.cell_size)
            .field("cells", &self.cells.len())
            .field("overflow", &self.overflow.len())
            .field("alive", &self.live)
            .finish_non_exhaustive()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(256.0)
    }
}

impl Grid {
    /// Boxes covering more cells than this are kept in the overflow list.
    pub const MAX_CELLS_PER_SLOT: i64 = 64;

    /// Create a grid with square cells of the given size.
    ///
    /// Non-positive or non-finite sizes fall back to 256.
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            256.0
        };
        Self {
            cell_size,
            boxes: Vec::new(),
            cells: HashMap::new(),
            overflow: Vec::new(),
            live: 0,
        }
    }

    /// Cell size in coordinate units.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "cell coordinates are clamped to the i32 range first"
    )]
    fn cell_coord(&self, v: f64) -> i32 {
        // Floor by hand: `f64::floor` is not available without `std`.
        let t = (v / self.cell_size).clamp(f64::from(i32::MIN), f64::from(i32::MAX));
        let truncated = t as i32;
        if f64::from(truncated) > t {
            truncated - 1
        } else {
            truncated
        }
    }

    fn cell_range(&self, aabb: &Aabb2D<f64>) -> (CellKey, CellKey) {
        (
            (self.cell_coord(aabb.min_x), self.cell_coord(aabb.min_y)),
            (self.cell_coord(aabb.max_x), self.cell_coord(aabb.max_y)),
        )
    }

    fn cell_count((lo, hi): (CellKey, CellKey)) -> i64 {
        (i64::from(hi.0) - i64::from(lo.0) + 1) * (i64::from(hi.1) - i64::from(lo.1) + 1)
    }
}

impl Backend<f64> for Grid {
    fn insert(&mut self, slot: usize, aabb: Aabb2D<f64>) {
        if aabb.is_empty() {
            return;
        }
        if self.boxes.len() <= slot {
            self.boxes.resize_with(slot + 1, || None);
        }
        debug_assert!(self.boxes[slot].is_none(), "slot {slot} inserted twice");
        if self.boxes[slot].is_some() {
            return;
        }
        self.boxes[slot] = Some(aabb);
        self.live += 1;

        let range = self.cell_range(&aabb);
        if Self::cell_count(range) > Self::MAX_CELLS_PER_SLOT {
            self.overflow.push(slot);
            return;
        }
        let ((x0, y0), (x1, y1)) = range;
        for cy in y0..=y1 {
            for cx in x0..=x1 {
                self.cells.entry((cx, cy)).or_default().push(slot);
            }
        }
    }

    fn clear(&mut self) {
        self.boxes.clear();
        self.cells.clear();
        self.overflow.clear();
        self.live = 0;
    }

    fn len(&self) -> usize {
        self.live
    }

    fn bytes_used(&self) -> usize {
        self.boxes.capacity() * size_of::<Option<Aabb2D<f64>>>()
            + self.cells.capacity() * size_of::<(CellKey, SmallVec<[usize; 4]>)>()
            + self.overflow.capacity() * size_of::<usize>()
    }

    fn visit_point<F: FnMut(usize)>(&self, x: f64, y: f64, mut f: F) {
        let key = (self.cell_coord(x), self.cell_coord(y));
        let candidates = self.cells.get(&key).into_iter().flatten();
        for &slot in candidates.chain(self.overflow.iter()) {
            if let Some(aabb) = self.boxes[slot]
                && aabb.contains_point(x, y)
            {
                f(slot);
            }
        }
    }

    fn visit_rect<F: FnMut(usize)>(&self, rect: Aabb2D<f64>, mut f: F) {
        if rect.is_empty() {
            return;
        }
        let range = self.cell_range(&rect);
        let mut found: Vec<usize> = Vec::new();
        if Self::cell_count(range) > self.cells.len() as i64 {
            for slots in self.cells.values() {
                found.extend_from_slice(slots);
            }
        } else {
            let ((x0, y0), (x1, y1)) = range;
            for cy in y0..=y1 {
                for cx in x0..=x1 {
                    if let Some(slots) = self.cells.get(&(cx, cy)) {
                        found.extend_from_slice(slots);
                    }
                }
            }
        }
        found.extend_from_slice(&self.overflow);
        found.sort_unstable();
        found.dedup();
        for slot in found {
            if let Some(aabb) = self.boxes[slot]
                && aabb.overlaps(&rect)
            {
                f(slot);
            }
        }
    }
}
