// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spatial indexes over op bounds.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::mem::size_of;

use kurbo::Rect;
use understory_index::{Aabb2D, Backend, Grid, RTree};

use crate::bounds::OpMetadata;

/// A bounding-box hierarchy over the ops of a recording.
pub trait Bbh: Debug + Send + Sync {
    /// Index op `i` under `bounds[i]`. Called once, with one entry per op.
    fn insert(&mut self, bounds: &[Rect], metadata: &[OpMetadata]);

    /// Append to `results` the positions of ops whose bounds overlap `query`, in any order.
    fn search(&self, query: Rect, results: &mut Vec<usize>);

    /// Approximate memory used by the index.
    fn bytes_used(&self) -> usize;
}

/// Creates empty [`Bbh`]s for new recordings.
pub trait BbhFactory {
    /// A fresh, empty index.
    fn make(&self) -> Box<dyn Bbh>;
}

fn aabb(rect: &Rect) -> Aabb2D<f64> {
    Aabb2D::new(rect.x0, rect.y0, rect.x1, rect.y1)
}

/// A [`Bbh`] backed by an `understory_index` backend.
#[derive(Debug, Default)]
pub struct IndexBbh<B> {
    backend: B,
}

impl<B> IndexBbh<B> {
    /// Wrap a backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B> Bbh for IndexBbh<B>
where
    B: Backend<f64> + Debug + Send + Sync,
{
    fn insert(&mut self, bounds: &[Rect], _metadata: &[OpMetadata]) {
        for (i, rect) in bounds.iter().enumerate() {
            self.backend.insert(i, aabb(rect));
        }
        self.backend.finish();
    }

    fn search(&self, query: Rect, results: &mut Vec<usize>) {
        self.backend.visit_rect(aabb(&query), |i| results.push(i));
    }

    fn bytes_used(&self) -> usize {
        size_of::<Self>() + self.backend.bytes_used()
    }
}

/// Builds packed R-trees.
#[derive(Copy, Clone, Debug, Default)]
pub struct RTreeFactory;

impl BbhFactory for RTreeFactory {
    fn make(&self) -> Box<dyn Bbh> {
        Box::new(IndexBbh::new(RTree::<f64>::new()))
    }
}

/// Builds uniform grids.
#[derive(Copy, Clone, Debug)]
pub struct GridFactory {
    /// Cell size in picture units.
    pub cell_size: f64,
}

impl Default for GridFactory {
    fn default() -> Self {
        Self { cell_size: 256.0 }
    }
}

impl BbhFactory for GridFactory {
    fn make(&self) -> Box<dyn Bbh> {
        Box::new(IndexBbh::new(Grid::new(self.cell_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn bounds() -> Vec<Rect> {
        vec![
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::ZERO,
            Rect::new(100.0, 100.0, 110.0, 110.0),
            Rect::new(5.0, 5.0, 105.0, 105.0),
        ]
    }

    fn check(factory: &dyn BbhFactory) {
        let mut bbh = factory.make();
        let bounds = bounds();
        bbh.insert(&bounds, &vec![OpMetadata::default(); bounds.len()]);
        let mut hits = Vec::new();
        bbh.search(Rect::new(1.0, 1.0, 2.0, 2.0), &mut hits);
        hits.sort_unstable();
        assert_eq!(hits, vec![0]);
        hits.clear();
        bbh.search(Rect::new(0.0, 0.0, 200.0, 200.0), &mut hits);
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 2, 3]);
        assert!(bbh.bytes_used() > 0);
    }

    #[test]
    fn rtree_factory_indexes_non_empty_bounds() {
        check(&RTreeFactory);
    }

    #[test]
    fn grid_factory_indexes_non_empty_bounds() {
        check(&GridFactory { cell_size: 16.0 });
    }
}
