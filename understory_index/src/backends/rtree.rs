// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bulk-loaded (packed) R-tree.
//!
//! Inserted slots are buffered and packed into a static tree by
//! [`Backend::finish`]. Packing keeps insertion order: slots are grouped into
//! nodes of up to [`MAX_CHILDREN`] consecutive entries, level by level, until a
//! single root remains. This suits content whose insertion order is spatially
//! coherent, such as the ops of a drawing recording.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::mem::size_of;
use core::ops::Range;

use crate::backend::Backend;
use crate::types::Aabb2D;

/// Maximum number of children per node.
pub const MAX_CHILDREN: usize = 11;

#[derive(Copy, Clone, Debug)]
struct Branch<T> {
    bounds: Aabb2D<T>,
    /// Slot for level-0 branches, node index otherwise.
    target: usize,
}

#[derive(Clone, Debug)]
struct Node {
    /// Level 0 nodes hold slots directly.
    level: u16,
    branches: Range<usize>,
}

#[derive(Clone, Debug)]
struct Root<T> {
    branch: Branch<T>,
    /// 0 when the root branch is itself a slot.
    height: u16,
}

/// Packed R-tree backend.
pub struct RTree<T: Copy + PartialOrd + Debug> {
    leaves: Vec<Branch<T>>,
    branches: Vec<Branch<T>>,
    nodes: Vec<Node>,
    root: Option<Root<T>>,
    /// Number of leading `leaves` covered by the packed tree.
    packed: usize,
}

impl<T: Copy + PartialOrd + Debug> Default for RTree<T> {
    fn default() -> Self {
        Self {
            leaves: Vec::new(),
            branches: Vec::new(),
            nodes: Vec::new(),
            root: None,
            packed: 0,
        }
    }
}

impl<T: Copy + PartialOrd + Debug> Debug for RTree<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RTree")
            .field("slots", &self.leaves.len())
            .field("nodes", &self.nodes.len())
            .field("height", &self.root.as_ref().map(|r| r.height))
            .field("pending", &(self.leaves.len() - self.packed))
            .finish_non_exhaustive()
    }
}

impl<T: Copy + PartialOrd + Debug> RTree<T> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Height of the packed tree (0 for a single slot), or `None` when empty.
    pub fn height(&self) -> Option<u16> {
        self.root.as_ref().map(|r| r.height)
    }

    fn pack(&mut self) {
        self.branches.clear();
        self.nodes.clear();
        self.root = None;
        self.packed = self.leaves.len();

        let mut current: Vec<Branch<T>> = self.leaves.clone();
        let mut level: u16 = 0;
        while current.len() > 1 {
            let mut next = Vec::with_capacity(current.len().div_ceil(MAX_CHILDREN));
            for chunk in current.chunks(MAX_CHILDREN) {
                let start = self.branches.len();
                self.branches.extend_from_slice(chunk);
                let node = self.nodes.len();
                self.nodes.push(Node {
                    level,
                    branches: start..self.branches.len(),
                });
                let bounds = chunk
                    .iter()
                    .skip(1)
                    .fold(chunk[0].bounds, |acc, b| acc.union(&b.bounds));
                next.push(Branch {
                    bounds,
                    target: node,
                });
            }
            current = next;
            level += 1;
        }
        self.root = current.pop().map(|branch| Root {
            branch,
            height: level,
        });
    }

    fn search<F: FnMut(usize)>(&self, node: usize, rect: &Aabb2D<T>, f: &mut F) {
        let node = &self.nodes[node];
        for branch in &self.branches[node.branches.clone()] {
            if !branch.bounds.overlaps(rect) {
                continue;
            }
            if node.level == 0 {
                f(branch.target);
            } else {
                self.search(branch.target, rect, f);
            }
        }
    }
}

impl<T: Copy + PartialOrd + Debug> Backend<T> for RTree<T> {
    fn insert(&mut self, slot: usize, aabb: Aabb2D<T>) {
        if aabb.is_empty() {
            return;
        }
        self.leaves.push(Branch {
            bounds: aabb,
            target: slot,
        });
    }

    fn finish(&mut self) {
        if self.packed != self.leaves.len() || (self.root.is_none() && !self.leaves.is_empty()) {
            self.pack();
        }
    }

    fn clear(&mut self) {
        self.leaves.clear();
        self.branches.clear();
        self.nodes.clear();
        self.root = None;
        self.packed = 0;
    }

    fn len(&self) -> usize {
        self.leaves.len()
    }

    fn bytes_used(&self) -> usize {
        (self.leaves.capacity() + self.branches.capacity()) * size_of::<Branch<T>>()
            + self.nodes.capacity() * size_of::<Node>()
    }

    fn visit_point<F: FnMut(usize)>(&self, x: T, y: T, mut f: F) {
        // Point queries are rare for recordings; a scan keeps the tree code small.
        for leaf in &self.leaves {
            if leaf.bounds.contains_point(x, y) {
                f(leaf.target);
            }
        }
    }

    fn visit_rect<F: FnMut(usize)>(&self, rect: Aabb2D<T>, mut f: F) {
        if let Some(root) = &self.root
            && root.branch.bounds.overlaps(&rect)
        {
            if root.height == 0 {
                f(root.branch.target);
            } else {
                self.search(root.branch.target, &rect, &mut f);
            }
        }
        for leaf in &self.leaves[self.packed..] {
            if leaf.bounds.overlaps(&rect) {
                f(leaf.target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn grid_tree(n: usize) -> RTree<f64> {
        let mut tree = RTree::new();
        for i in 0..n {
            let x = (i % 10) as f64 * 10.0;
            let y = (i / 10) as f64 * 10.0;
            tree.insert(i, Aabb2D::new(x, y, x + 10.0, y + 10.0));
        }
        tree.finish();
        tree
    }

    #[test]
    fn finds_exactly_overlapping_slots() {
        let tree = grid_tree(100);
        let mut hits: Vec<usize> = tree.query_rect(Aabb2D::new(15.0, 15.0, 25.0, 25.0)).collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![11, 12, 21, 22]);
    }

    #[test]
    fn packs_multiple_levels() {
        let tree = grid_tree(500);
        assert_eq!(tree.height(), Some(3));
        let hits: Vec<usize> = tree.query_rect(Aabb2D::new(0.0, 0.0, 1.0, 1.0)).collect();
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn agrees_with_linear_scan() {
        let mut tree = RTree::new();
        let mut flat = crate::FlatVec::default();
        for i in 0..300_usize {
            // Scattered, overlapping boxes in no spatial order.
            let x = ((i * 37) % 200) as f64;
            let y = ((i * 91) % 170) as f64;
            let size = 1.0 + (i % 7) as f64 * 6.0;
            let aabb = Aabb2D::new(x, y, x + size, y + size);
            tree.insert(i, aabb);
            flat.insert(i, aabb);
        }
        tree.finish();
        for query in [
            Aabb2D::new(0.0, 0.0, 50.0, 50.0),
            Aabb2D::new(90.0, 10.0, 95.0, 160.0),
            Aabb2D::new(150.0, 150.0, 400.0, 400.0),
        ] {
            let mut expected: Vec<usize> = flat.query_rect(query).collect();
            let mut hits: Vec<usize> = tree.query_rect(query).collect();
            expected.sort_unstable();
            hits.sort_unstable();
            assert_eq!(hits, expected, "query {query:?}");
        }
    }

    #[test]
    fn single_slot_tree() {
        let mut tree = RTree::new();
        tree.insert(7, Aabb2D::new(0.0, 0.0, 1.0, 1.0));
        tree.finish();
        assert_eq!(tree.height(), Some(0));
        let hits: Vec<usize> = tree.query_rect(Aabb2D::new(0.5, 0.5, 2.0, 2.0)).collect();
        assert_eq!(hits, vec![7]);
    }

    #[test]
    fn queries_before_finish_see_pending_slots() {
        let mut tree = grid_tree(20);
        tree.insert(99, Aabb2D::new(500.0, 500.0, 510.0, 510.0));
        let hits: Vec<usize> = tree
            .query_rect(Aabb2D::new(505.0, 505.0, 506.0, 506.0))
            .collect();
        assert_eq!(hits, vec![99]);
        tree.finish();
        let hits: Vec<usize> = tree
            .query_rect(Aabb2D::new(505.0, 505.0, 506.0, 506.0))
            .collect();
        assert_eq!(hits, vec![99]);
    }
}
