// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geometry helpers and the owned shape types carried by recorded ops.

use alloc::boxed::Box;
use alloc::vec::Vec;

use kurbo::{Affine, BezPath, Rect, Shape};

use crate::FillRule;

/// The canonical empty rectangle.
pub const EMPTY_RECT: Rect = Rect::ZERO;

/// A rectangle large enough to stand in for "unbounded".
pub const LARGEST_RECT: Rect = Rect::new(
    -(f32::MAX as f64),
    -(f32::MAX as f64),
    f32::MAX as f64,
    f32::MAX as f64,
);

/// Returns `true` if `rect` covers no area (including NaN coordinates).
#[inline]
pub fn rect_is_empty(rect: &Rect) -> bool {
    !(rect.x0 < rect.x1 && rect.y0 < rect.y1)
}

/// Union that ignores empty inputs.
#[inline]
pub fn union_rect(a: Rect, b: Rect) -> Rect {
    if rect_is_empty(&a) {
        b
    } else if rect_is_empty(&b) {
        a
    } else {
        a.union(b)
    }
}

/// Intersection; disjoint inputs produce [`EMPTY_RECT`].
#[inline]
pub fn intersect_rect(a: Rect, b: Rect) -> Rect {
    let r = a.intersect(b);
    if rect_is_empty(&r) { EMPTY_RECT } else { r }
}

/// Returns `true` if the two rectangles share a region of non-zero area.
#[inline]
pub fn rects_overlap(a: &Rect, b: &Rect) -> bool {
    !rect_is_empty(&a.intersect(*b))
}

/// Map a rectangle through `m`, returning the bounding box of the result.
#[inline]
pub(crate) fn map_rect(m: Affine, rect: Rect) -> Rect {
    m.transform_rect_bbox(rect)
}

/// Invert `m`, or `None` if it is singular or not finite.
pub(crate) fn invert(m: Affine) -> Option<Affine> {
    let det = m.determinant();
    if det == 0.0 || !det.is_finite() || m.as_coeffs().iter().any(|c| !c.is_finite()) {
        return None;
    }
    Some(m.inverse())
}

/// Rectangle bounding a set of points, or `None` for an empty set.
pub(crate) fn points_bounds(points: &[kurbo::Point]) -> Option<Rect> {
    let (first, rest) = points.split_first()?;
    let mut r = Rect::from_points(*first, *first);
    for p in rest {
        r = r.union_pt(*p);
    }
    Some(r)
}

/// An owned path with fill rule and inverse-fill flag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    /// Outline geometry.
    pub geometry: BezPath,
    /// Rule deciding which areas are inside.
    pub fill_rule: FillRule,
    /// When set, the path covers everything *outside* the outline.
    pub inverse: bool,
}

impl Path {
    /// Create a non-inverse, non-zero path.
    pub fn new(geometry: BezPath) -> Self {
        Self {
            geometry,
            fill_rule: FillRule::NonZero,
            inverse: false,
        }
    }

    /// Returns this path with the given fill rule.
    #[must_use]
    pub fn with_fill_rule(mut self, fill_rule: FillRule) -> Self {
        self.fill_rule = fill_rule;
        self
    }

    /// Returns this path with inverse filling toggled on.
    #[must_use]
    pub fn inverse_filled(mut self) -> Self {
        self.inverse = true;
        self
    }

    /// Tight bounds of the outline's control points, ignoring `inverse`.
    pub fn bounds(&self) -> Rect {
        if self.geometry.elements().is_empty() {
            return EMPTY_RECT;
        }
        self.geometry.bounding_box()
    }

    /// Returns `true` if the point is covered by the path.
    pub fn contains(&self, pt: kurbo::Point) -> bool {
        let winding = self.geometry.winding(pt);
        let inside = match self.fill_rule {
            FillRule::NonZero => winding != 0,
            FillRule::EvenOdd => winding % 2 != 0,
        };
        inside != self.inverse
    }
}

impl From<BezPath> for Path {
    fn from(geometry: BezPath) -> Self {
        Self::new(geometry)
    }
}

/// A region: union of axis-aligned rectangles.
///
/// Empty rectangles are dropped and inverted rectangles are normalized on construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Region {
    rects: Box<[Rect]>,
}

impl Region {
    /// Build a region from rectangles.
    pub fn from_rects(rects: impl IntoIterator<Item = Rect>) -> Self {
        let rects: Vec<Rect> = rects
            .into_iter()
            .map(|r| r.abs())
            .filter(|r| !rect_is_empty(r))
            .collect();
        Self {
            rects: rects.into_boxed_slice(),
        }
    }

    /// The rectangles making up the region.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Returns `true` if the region covers no area.
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Bounding box of the region.
    pub fn bounds(&self) -> Rect {
        self.rects.iter().fold(EMPTY_RECT, |acc, r| union_rect(acc, *r))
    }

    /// Returns `true` if the point lies in any of the rectangles.
    pub fn contains(&self, pt: kurbo::Point) -> bool {
        self.rects.iter().any(|r| r.contains(pt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    #[test]
    fn union_and_intersection_treat_empty_as_identity() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(union_rect(EMPTY_RECT, a), a);
        assert_eq!(union_rect(a, Rect::new(50.0, 50.0, 50.0, 60.0)), a);
        assert_eq!(intersect_rect(a, Rect::new(20.0, 20.0, 30.0, 30.0)), EMPTY_RECT);
    }

    #[test]
    fn singular_matrices_do_not_invert() {
        assert!(invert(Affine::scale_non_uniform(1.0, 0.0)).is_none());
        assert!(invert(Affine::translate((f64::NAN, 0.0))).is_none());
        let inv = invert(Affine::scale(2.0)).unwrap();
        assert_eq!(inv * Point::new(4.0, 4.0), Point::new(2.0, 2.0));
    }

    #[test]
    fn region_normalizes_rects() {
        let region = Region::from_rects([
            Rect::new(10.0, 10.0, 0.0, 0.0),
            Rect::new(5.0, 5.0, 5.0, 9.0),
            Rect::new(20.0, 0.0, 30.0, 5.0),
        ]);
        assert_eq!(region.rects().len(), 2);
        assert_eq!(region.bounds(), Rect::new(0.0, 0.0, 30.0, 10.0));
    }

    #[test]
    fn inverse_path_contains_outside_points() {
        let path = Path::new(Rect::new(0.0, 0.0, 10.0, 10.0).to_path(0.1)).inverse_filled();
        assert!(!path.contains(Point::new(5.0, 5.0)));
        assert!(path.contains(Point::new(50.0, 5.0)));
    }
}
