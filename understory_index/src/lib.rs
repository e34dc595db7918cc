// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Index: 2D AABB spatial indexing with pluggable backends.
//!
//! Slots are `usize` keys chosen by the caller. Every backend implements
//! [`Backend`]: insert boxes, optionally finish a batch, then query by point or
//! rectangle.
//!
//! Backends:
//!
//! - [`FlatVec`]: linear scans. Best for a handful of slots.
//! - [`RTree`]: packed R-tree built from insertion order in [`Backend::finish`].
//!   Good for static content such as recorded drawing ops.
//! - [`Grid`] (feature `backend_grid`, on by default): uniform grid keyed by cell.
//!   Good for many small, evenly distributed boxes.
//!
//! Empty boxes are dropped on insert and never match; overlap tests use
//! non-zero-area intersection, so boxes that only touch do not match.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod backend;
mod types;

/// Backend implementations.
pub mod backends {
    pub mod flatvec;
    #[cfg(feature = "backend_grid")]
    pub mod grid;
    pub mod rtree;
}

pub use backend::Backend;
pub use backends::flatvec::FlatVec;
#[cfg(feature = "backend_grid")]
pub use backends::grid::Grid;
pub use backends::rtree::RTree;
pub use types::Aabb2D;
