// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Axis-aligned bounding box type shared by all backends.

use core::fmt::Debug;

/// Axis-aligned bounding box in 2D.
///
/// The box covers `[min_x, max_x) x [min_y, max_y)`. A box whose max is not
/// strictly greater than its min on either axis is empty and never matches a
/// query.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2D<T> {
    /// Minimum X coordinate.
    pub min_x: T,
    /// Minimum Y coordinate.
    pub min_y: T,
    /// Maximum X coordinate.
    pub max_x: T,
    /// Maximum Y coordinate.
    pub max_y: T,
}

#[inline]
fn max_of<T: PartialOrd>(a: T, b: T) -> T {
    if b > a { b } else { a }
}

#[inline]
fn min_of<T: PartialOrd>(a: T, b: T) -> T {
    if b < a { b } else { a }
}

impl<T: Copy + PartialOrd + Debug> Aabb2D<T> {
    /// Create a new box from min/max corners.
    #[inline]
    pub const fn new(min_x: T, min_y: T, max_x: T, max_y: T) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Returns `true` if the box covers no area.
    ///
    /// NaN coordinates also produce an empty box.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.min_x < self.max_x && self.min_y < self.max_y)
    }

    /// Intersection of two boxes. The result may be empty.
    #[inline]
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            min_x: max_of(self.min_x, other.min_x),
            min_y: max_of(self.min_y, other.min_y),
            max_x: min_of(self.max_x, other.max_x),
            max_y: min_of(self.max_y, other.max_y),
        }
    }

    /// Smallest box containing both boxes.
    ///
    /// Empty inputs are ignored, so the union of an empty box with `other` is `other`.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            min_x: min_of(self.min_x, other.min_x),
            min_y: min_of(self.min_y, other.min_y),
            max_x: max_of(self.max_x, other.max_x),
            max_y: max_of(self.max_y, other.max_y),
        }
    }

    /// Returns `true` if both boxes share a region of non-zero area.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Returns `true` if the point lies inside the half-open box.
    #[inline]
    pub fn contains_point(&self, x: T, y: T) -> bool {
        self.min_x <= x && x < self.max_x && self.min_y <= y && y < self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_ignores_empty_boxes() {
        let a = Aabb2D::new(0.0, 0.0, 10.0, 10.0);
        let empty = Aabb2D::new(50.0, 50.0, 50.0, 60.0);
        assert_eq!(a.union(&empty), a);
        assert_eq!(empty.union(&a), a);
    }

    #[test]
    fn touching_boxes_do_not_overlap() {
        let a = Aabb2D::new(0, 0, 10, 10);
        let b = Aabb2D::new(10, 0, 20, 10);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&Aabb2D::new(9, 9, 20, 20)));
    }

    #[test]
    fn point_containment_is_half_open() {
        let a = Aabb2D::new(0.0, 0.0, 1.0, 1.0);
        assert!(a.contains_point(0.0, 0.0));
        assert!(!a.contains_point(1.0, 0.5));
    }
}
