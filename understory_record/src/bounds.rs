// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conservative per-op bounds for building spatial indexes.
//!
//! One left-to-right pass keeps a stack of open save blocks. Draws get their
//! geometry bounds, outset for their paint and for the paints of enclosing
//! layers, mapped into recording space and clipped to the cull rect. Control ops
//! (saves, restores, clips, matrix changes) get the union of the draws in the
//! block they belong to, so skipping them is safe whenever those draws are
//! skipped too.

use alloc::vec;
use alloc::vec::Vec;

use kurbo::{Affine, Rect};
use smallvec::SmallVec;

use crate::geom::{
    EMPTY_RECT, LARGEST_RECT, intersect_rect, invert, map_rect, points_bounds, union_rect,
};
use crate::ops::Op;
use crate::paint::Paint;
use crate::record::Record;

/// Per-op facts recorded next to the bounds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OpMetadata {
    /// The op is visually significant on its own: a draw, or the restore of a layer.
    pub is_draw: bool,
}

/// Output of [`fill_bounds`], one entry per op.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordBounds {
    /// Bounds in recording space, inside the cull rect.
    pub rects: Vec<Rect>,
    /// Matching metadata.
    pub metadata: Vec<OpMetadata>,
}

impl RecordBounds {
    /// Union of every entry.
    pub fn union(&self) -> Rect {
        self.rects.iter().fold(EMPTY_RECT, |acc, r| union_rect(acc, *r))
    }
}

/// Compute bounds for every op in `record`.
pub fn fill_bounds(cull: Rect, record: &Record) -> RecordBounds {
    let mut visitor = FillBounds::new(cull, record.count());
    for op in record.iter() {
        visitor.step(op);
    }
    visitor.finish()
}

/// Bounds of a single draw op at identity, unclipped.
pub(crate) fn op_bounds(op: &Op) -> Rect {
    let mut visitor = FillBounds::new(LARGEST_RECT, 1);
    visitor.step(op);
    visitor.finish().rects.first().copied().unwrap_or(EMPTY_RECT)
}

struct SaveBlock<'a> {
    control_ops: usize,
    bounds: Rect,
    paint: Option<&'a Paint>,
    matrix: Affine,
    is_layer: bool,
}

struct FillBounds<'a> {
    cull: Rect,
    bounds: Vec<Rect>,
    metadata: Vec<OpMetadata>,
    matrix: Affine,
    current: usize,
    save_stack: SmallVec<[SaveBlock<'a>; 8]>,
    control_indices: Vec<usize>,
}

impl<'a> FillBounds<'a> {
    fn new(cull: Rect, count: usize) -> Self {
        Self {
            cull,
            bounds: vec![EMPTY_RECT; count],
            metadata: vec![OpMetadata::default(); count],
            matrix: Affine::IDENTITY,
            current: 0,
            save_stack: SmallVec::new(),
            control_indices: Vec::new(),
        }
    }

    fn step(&mut self, op: &'a Op) {
        self.update_matrix(op);
        self.track_bounds(op);
        self.current += 1;
    }

    fn finish(mut self) -> RecordBounds {
        while !self.save_stack.is_empty() {
            self.pop_save_block();
        }
        let cull = self.cull;
        while let Some(i) = self.control_indices.pop() {
            self.bounds[i] = cull;
        }
        RecordBounds {
            rects: self.bounds,
            metadata: self.metadata,
        }
    }

    fn update_matrix(&mut self, op: &Op) {
        match *op {
            Op::Restore { matrix } | Op::SetMatrix { matrix } => self.matrix = matrix,
            Op::Concat { matrix } => self.matrix = self.matrix * matrix,
            Op::Translate { dx, dy } => self.matrix = self.matrix * Affine::translate((dx, dy)),
            Op::Scale { sx, sy } => self.matrix = self.matrix * Affine::scale_non_uniform(sx, sy),
            _ => {}
        }
    }

    fn track_bounds(&mut self, op: &'a Op) {
        match op {
            Op::NoOp => {}
            Op::Save => self.push_save_block(None, false, None),
            Op::SaveLayer {
                paint, backdrop, ..
            } => {
                let initial = backdrop.is_some().then_some(self.cull);
                self.push_save_block(paint.as_ref(), true, initial);
            }
            Op::SaveBehind { subset } => {
                let area = match subset {
                    Some(subset) => intersect_rect(map_rect(self.matrix, subset.abs()), self.cull),
                    None => self.cull,
                };
                self.push_save_block(None, true, Some(area));
            }
            Op::Restore { .. } => {
                if self.save_stack.is_empty() {
                    self.bounds[self.current] = self.cull;
                    return;
                }
                let was_layer = self.save_stack.last().is_some_and(|b| b.is_layer);
                self.bounds[self.current] = self.pop_save_block();
                self.metadata[self.current].is_draw = was_layer;
            }
            Op::Flush
            | Op::SetMatrix { .. }
            | Op::Concat { .. }
            | Op::Translate { .. }
            | Op::Scale { .. }
            | Op::ClipRect { .. }
            | Op::ClipRRect { .. }
            | Op::ClipPath { .. }
            | Op::ClipRegion { .. }
            | Op::ClipShader { .. }
            | Op::ResetClip => self.push_control(),
            _ => {
                let bounds = self.draw_bounds(op);
                self.bounds[self.current] = bounds;
                self.metadata[self.current].is_draw = true;
                self.update_save_bounds(bounds);
            }
        }
    }

    fn push_save_block(&mut self, paint: Option<&'a Paint>, is_layer: bool, initial: Option<Rect>) {
        let bounds = initial.unwrap_or_else(|| {
            if paint.is_some_and(Paint::may_affect_transparent_black) {
                self.cull
            } else {
                EMPTY_RECT
            }
        });
        self.save_stack.push(SaveBlock {
            control_ops: 0,
            bounds,
            paint,
            matrix: self.matrix,
            is_layer,
        });
        self.push_control();
    }

    fn push_control(&mut self) {
        self.control_indices.push(self.current);
        if let Some(top) = self.save_stack.last_mut() {
            top.control_ops += 1;
        }
    }

    fn pop_save_block(&mut self) -> Rect {
        let Some(block) = self.save_stack.pop() else {
            return EMPTY_RECT;
        };
        for _ in 0..block.control_ops {
            if let Some(i) = self.control_indices.pop() {
                self.bounds[i] = block.bounds;
            }
        }
        self.update_save_bounds(block.bounds);
        block.bounds
    }

    fn update_save_bounds(&mut self, bounds: Rect) {
        if let Some(top) = self.save_stack.last_mut() {
            top.bounds = union_rect(top.bounds, bounds);
        }
    }

    fn draw_bounds(&self, op: &Op) -> Rect {
        match op {
            Op::DrawPaint { .. } | Op::DrawBehind { .. } => self.cull,
            Op::DrawRect { rect, paint } => self.adjust_and_map(*rect, Some(paint)),
            Op::DrawOval { oval, paint } | Op::DrawArc { oval, paint, .. } => {
                self.adjust_and_map(*oval, Some(paint))
            }
            Op::DrawRRect { rrect, paint } => self.adjust_and_map(rrect.rect(), Some(paint)),
            Op::DrawDRRect { outer, paint, .. } => self.adjust_and_map(outer.rect(), Some(paint)),
            Op::DrawRegion { region, paint } => self.adjust_and_map(region.bounds(), Some(paint)),
            Op::DrawPath { path, paint } => {
                if path.inverse {
                    self.cull
                } else {
                    self.adjust_and_map(path.bounds(), Some(paint))
                }
            }
            Op::DrawPoints { points, paint, .. } => {
                let Some(r) = points_bounds(points) else {
                    return EMPTY_RECT;
                };
                let half = paint.stroke.width.max(0.01) / 2.0;
                self.adjust_and_map(r.inflate(half, half), Some(paint))
            }
            Op::DrawImage {
                image, x, y, paint, ..
            } => self.adjust_and_map(
                image.bounds() + kurbo::Vec2::new(*x, *y),
                paint.as_ref(),
            ),
            Op::DrawImageRect { dst, paint, .. } => self.adjust_and_map(*dst, paint.as_ref()),
            Op::DrawTextBlob { blob, x, y, paint } => {
                self.adjust_and_map(blob.bounds() + kurbo::Vec2::new(*x, *y), Some(paint))
            }
            Op::DrawPicture {
                picture,
                matrix,
                paint,
            } => self.adjust_and_map(map_rect(*matrix, picture.cull_rect()), paint.as_ref()),
            Op::DrawDrawable { bounds, .. } => self.adjust_and_map(*bounds, None),
            Op::DrawVertices {
                vertices, paint, ..
            } => self.adjust_and_map(vertices.bounds(), Some(paint)),
            Op::DrawPatch { cubics, paint, .. } => match points_bounds(&cubics[..]) {
                Some(r) => self.adjust_and_map(r, Some(paint)),
                None => EMPTY_RECT,
            },
            Op::DrawAnnotation { rect, .. } => self.adjust_and_map(*rect, None),
            _ => EMPTY_RECT,
        }
    }

    fn adjust_and_map(&self, rect: Rect, paint: Option<&Paint>) -> Rect {
        let mut rect = rect.abs();
        if let Some(paint) = paint {
            match adjust_for_paint(paint, rect) {
                Some(adjusted) => rect = adjusted,
                None => return self.cull,
            }
        }
        let rect = map_rect(self.matrix, rect);
        match self.adjust_for_save_layer_paints(rect) {
            Some(adjusted) => intersect_rect(adjusted, self.cull),
            None => self.cull,
        }
    }

    fn adjust_for_save_layer_paints(&self, mut rect: Rect) -> Option<Rect> {
        for block in self.save_stack.iter().rev() {
            if !block.is_layer {
                continue;
            }
            let Some(paint) = block.paint else {
                continue;
            };
            let inverse = invert(block.matrix)?;
            let local = map_rect(inverse, rect);
            let adjusted = adjust_for_paint(paint, local)?;
            rect = map_rect(block.matrix, adjusted);
        }
        Some(rect)
    }
}

fn adjust_for_paint(paint: &Paint, rect: Rect) -> Option<Rect> {
    paint
        .can_compute_fast_bounds()
        .then(|| paint.compute_fast_bounds(rect))
}
