// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The drawing surface interface and a matrix/clip tracker shared by implementations.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use kurbo::{Affine, Point, Rect, RoundedRect};
use peniko::{BlendMode, Brush, Color, ImageSampler};

use crate::geom::{EMPTY_RECT, Path, Region, intersect_rect, invert, map_rect, rect_is_empty};
use crate::ops::{ClipOp, PointMode, SaveLayerFlags, SrcRectConstraint};
use crate::paint::{ImageFilter, Paint};
use crate::picture::Picture;
use crate::resources::{Drawable, Image, TextBlob, Vertices};

/// Arguments of [`Canvas::save_layer`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SaveLayerRec<'a> {
    /// Hint for the extent of the layer content, in local units.
    pub bounds: Option<Rect>,
    /// Paint applied when the layer is composited back.
    pub paint: Option<&'a Paint>,
    /// Filter applied to the content beneath the layer, which then seeds the layer.
    pub backdrop: Option<&'a ImageFilter>,
    /// Layer options.
    pub flags: SaveLayerFlags,
}

impl<'a> SaveLayerRec<'a> {
    /// A layer with the given bounds hint and paint.
    pub fn new(bounds: Option<Rect>, paint: Option<&'a Paint>) -> Self {
        Self {
            bounds,
            paint,
            ..Self::default()
        }
    }
}

/// A drawing surface.
///
/// The save count starts at 1; [`Canvas::save`] and friends return the count
/// before the save, suitable for [`Canvas::restore_to_count`].
///
/// Angles are in degrees.
pub trait Canvas {
    /// Push matrix and clip.
    fn save(&mut self) -> usize;
    /// Push matrix and clip and begin an offscreen layer.
    fn save_layer(&mut self, rec: &SaveLayerRec<'_>) -> usize;
    /// Save the content under `subset` so later draws can go behind it.
    fn save_behind(&mut self, subset: Option<Rect>) -> usize;
    /// Pop the most recent save. Ignored at save count 1.
    fn restore(&mut self);
    /// Current depth of the save stack, starting at 1.
    fn save_count(&self) -> usize;

    /// Restore until [`Canvas::save_count`] equals `count` (at least 1).
    fn restore_to_count(&mut self, count: usize) {
        let count = count.max(1);
        while self.save_count() > count {
            self.restore();
        }
    }

    /// The current local-to-device matrix.
    fn total_matrix(&self) -> Affine;
    /// Replace the matrix.
    fn set_matrix(&mut self, matrix: Affine);
    /// Pre-multiply the matrix.
    fn concat(&mut self, matrix: Affine);

    /// Pre-multiply a translation.
    fn translate(&mut self, dx: f64, dy: f64) {
        self.concat(Affine::translate((dx, dy)));
    }

    /// Pre-multiply a scale.
    fn scale(&mut self, sx: f64, sy: f64) {
        self.concat(Affine::scale_non_uniform(sx, sy));
    }

    /// Clip to a rectangle.
    fn clip_rect(&mut self, rect: Rect, op: ClipOp, anti_alias: bool);
    /// Clip to a rounded rectangle.
    fn clip_rrect(&mut self, rrect: RoundedRect, op: ClipOp, anti_alias: bool);
    /// Clip to a path.
    fn clip_path(&mut self, path: &Path, op: ClipOp, anti_alias: bool);
    /// Clip to a region, given in device units.
    fn clip_region(&mut self, region: &Region, op: ClipOp);
    /// Clip by the coverage of a shader.
    fn clip_shader(&mut self, shader: &Brush, op: ClipOp);
    /// Reset the clip to the surface bounds.
    fn reset_clip(&mut self);

    /// Conservative clip bounds in local units; empty when nothing can draw.
    fn local_clip_bounds(&self) -> Rect;
    /// Conservative clip bounds in device units.
    fn device_clip_bounds(&self) -> Rect;

    /// Fill the clip.
    fn draw_paint(&mut self, paint: &Paint);
    /// Fill the clip behind content drawn since the innermost `save_behind`.
    fn draw_behind(&mut self, paint: &Paint);
    /// Draw a rectangle.
    fn draw_rect(&mut self, rect: Rect, paint: &Paint);
    /// Draw the ellipse inscribed in `oval`.
    fn draw_oval(&mut self, oval: Rect, paint: &Paint);
    /// Draw an arc of the ellipse inscribed in `oval`.
    fn draw_arc(
        &mut self,
        oval: Rect,
        start_angle: f64,
        sweep_angle: f64,
        use_center: bool,
        paint: &Paint,
    );
    /// Draw a rounded rectangle.
    fn draw_rrect(&mut self, rrect: RoundedRect, paint: &Paint);
    /// Draw the area between two rounded rectangles.
    fn draw_drrect(&mut self, outer: RoundedRect, inner: RoundedRect, paint: &Paint);
    /// Draw a region.
    fn draw_region(&mut self, region: &Region, paint: &Paint);
    /// Draw a path.
    fn draw_path(&mut self, path: &Path, paint: &Paint);
    /// Draw points, lines or a polyline.
    fn draw_points(&mut self, mode: PointMode, points: &[Point], paint: &Paint);
    /// Draw an image with its top-left corner at `(x, y)`.
    fn draw_image(
        &mut self,
        image: &Image,
        x: f64,
        y: f64,
        sampler: ImageSampler,
        paint: Option<&Paint>,
    );
    /// Draw the `src` part of an image into `dst`.
    fn draw_image_rect(
        &mut self,
        image: &Image,
        src: Rect,
        dst: Rect,
        sampler: ImageSampler,
        paint: Option<&Paint>,
        constraint: SrcRectConstraint,
    );
    /// Draw a glyph run at `(x, y)`.
    fn draw_text_blob(&mut self, blob: &TextBlob, x: f64, y: f64, paint: &Paint);
    /// Draw a picture, optionally transformed and composited through `paint`.
    fn draw_picture(&mut self, picture: &Picture, matrix: Option<Affine>, paint: Option<&Paint>);
    /// Draw a drawable, optionally transformed.
    fn draw_drawable(&mut self, drawable: &Arc<dyn Drawable>, matrix: Option<Affine>);
    /// Draw a triangle mesh.
    fn draw_vertices(&mut self, vertices: &Vertices, blend: BlendMode, paint: &Paint);
    /// Draw a Coons patch.
    fn draw_patch(
        &mut self,
        cubics: &[Point; 12],
        colors: Option<&[Color; 4]>,
        tex_coords: Option<&[Point; 4]>,
        blend: BlendMode,
        paint: &Paint,
    );
    /// Attach metadata to a rectangle.
    fn draw_annotation(&mut self, rect: Rect, key: &str, value: Option<&Arc<[u8]>>);

    /// Submit pending work.
    fn flush(&mut self) {}
}

/// Draw `picture` through `canvas` by playing it back inline.
///
/// The matrix is concatenated and a non-`None` paint becomes a layer bounded by the
/// picture's cull rect. The save count is restored afterwards.
pub fn playback_picture(
    canvas: &mut dyn Canvas,
    picture: &Picture,
    matrix: Option<Affine>,
    paint: Option<&Paint>,
) {
    let save_count = canvas.save_count();
    if let Some(paint) = paint {
        let mut bounds = picture.cull_rect();
        if let Some(m) = matrix {
            bounds = map_rect(m, bounds);
        }
        canvas.save_layer(&SaveLayerRec::new(Some(bounds), Some(paint)));
    } else if matrix.is_some() {
        canvas.save();
    }
    if let Some(m) = matrix {
        canvas.concat(m);
    }
    picture.playback(canvas, None);
    canvas.restore_to_count(save_count);
}

/// Draw `drawable` directly into `canvas`, wrapped in a save/restore.
pub fn draw_drawable_inline(canvas: &mut dyn Canvas, drawable: &dyn Drawable, matrix: Option<Affine>) {
    let save_count = canvas.save();
    if let Some(m) = matrix {
        canvas.concat(m);
    }
    drawable.draw(canvas);
    canvas.restore_to_count(save_count);
}

#[derive(Copy, Clone, Debug)]
struct McState {
    matrix: Affine,
    clip: Rect,
}

/// Tracks the matrix and a conservative device-space clip rectangle per save level.
///
/// Clips are approximated by the bounds of their shape; difference clips and
/// shader clips leave the rectangle unchanged.
#[derive(Clone, Debug)]
pub struct MatrixClipStack {
    device_bounds: Rect,
    stack: Vec<McState>,
}

impl MatrixClipStack {
    /// Start with the identity matrix and the clip set to `device_bounds`.
    pub fn new(device_bounds: Rect) -> Self {
        Self {
            device_bounds,
            stack: vec![McState {
                matrix: Affine::IDENTITY,
                clip: device_bounds,
            }],
        }
    }

    fn top(&self) -> McState {
        self.stack.last().copied().unwrap_or(McState {
            matrix: Affine::IDENTITY,
            clip: self.device_bounds,
        })
    }

    fn top_mut(&mut self) -> &mut McState {
        if self.stack.is_empty() {
            self.stack.push(McState {
                matrix: Affine::IDENTITY,
                clip: self.device_bounds,
            });
        }
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// The surface bounds.
    pub fn device_bounds(&self) -> Rect {
        self.device_bounds
    }

    /// Depth of the stack, starting at 1.
    pub fn save_count(&self) -> usize {
        self.stack.len()
    }

    /// Push a copy of the current state; returns the count before the push.
    pub fn save(&mut self) -> usize {
        let count = self.save_count();
        self.stack.push(self.top());
        count
    }

    /// Pop one level. Returns `false` (and does nothing) at the base level.
    pub fn restore(&mut self) -> bool {
        if self.stack.len() <= 1 {
            return false;
        }
        self.stack.pop();
        true
    }

    /// Current matrix.
    pub fn matrix(&self) -> Affine {
        self.top().matrix
    }

    /// Replace the matrix.
    pub fn set_matrix(&mut self, matrix: Affine) {
        self.top_mut().matrix = matrix;
    }

    /// Pre-multiply the matrix.
    pub fn concat(&mut self, matrix: Affine) {
        let top = self.top_mut();
        top.matrix = top.matrix * matrix;
    }

    /// Intersect the clip with the device bounds of a local shape.
    ///
    /// `bounds` of `None` means the shape is unbounded (e.g. an inverse path).
    pub fn clip_local(&mut self, bounds: Option<Rect>, op: ClipOp) {
        if op != ClipOp::Intersect {
            return;
        }
        let Some(bounds) = bounds else {
            return;
        };
        let device = map_rect(self.matrix(), bounds.abs());
        let top = self.top_mut();
        top.clip = intersect_rect(top.clip, device);
    }

    /// Intersect the clip with a device-space rectangle.
    pub fn clip_device(&mut self, bounds: Rect, op: ClipOp) {
        if op == ClipOp::Intersect {
            let top = self.top_mut();
            top.clip = intersect_rect(top.clip, bounds);
        }
    }

    /// Reset the clip to the device bounds.
    pub fn reset_clip(&mut self) {
        let device_bounds = self.device_bounds;
        self.top_mut().clip = device_bounds;
    }

    /// Conservative clip bounds in device units.
    pub fn device_clip_bounds(&self) -> Rect {
        self.top().clip
    }

    /// Conservative clip bounds in local units, outset by one device pixel for
    /// anti-aliasing. Empty if the clip is empty or the matrix is singular.
    pub fn local_clip_bounds(&self) -> Rect {
        let top = self.top();
        if rect_is_empty(&top.clip) {
            return EMPTY_RECT;
        }
        match invert(top.matrix) {
            Some(inverse) => map_rect(inverse, top.clip.inflate(1.0, 1.0)),
            None => EMPTY_RECT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clips_intersect_in_device_space() {
        let mut mc = MatrixClipStack::new(Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(mc.save(), 1);
        mc.concat(Affine::scale(2.0));
        mc.clip_local(Some(Rect::new(10.0, 10.0, 20.0, 20.0)), ClipOp::Intersect);
        assert_eq!(mc.device_clip_bounds(), Rect::new(20.0, 20.0, 40.0, 40.0));
        assert_eq!(mc.local_clip_bounds(), Rect::new(9.5, 9.5, 20.5, 20.5));
        assert!(mc.restore());
        assert_eq!(mc.device_clip_bounds(), Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(!mc.restore());
    }

    #[test]
    fn difference_and_unbounded_clips_leave_rect() {
        let mut mc = MatrixClipStack::new(Rect::new(0.0, 0.0, 10.0, 10.0));
        mc.clip_local(Some(Rect::new(0.0, 0.0, 5.0, 5.0)), ClipOp::Difference);
        mc.clip_local(None, ClipOp::Intersect);
        assert_eq!(mc.device_clip_bounds(), Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn singular_matrix_has_empty_local_clip() {
        let mut mc = MatrixClipStack::new(Rect::new(0.0, 0.0, 10.0, 10.0));
        mc.concat(Affine::scale(0.0));
        assert_eq!(mc.local_clip_bounds(), EMPTY_RECT);
    }

    #[test]
    fn disjoint_clip_is_empty() {
        let mut mc = MatrixClipStack::new(Rect::new(0.0, 0.0, 10.0, 10.0));
        mc.clip_device(Rect::new(20.0, 20.0, 30.0, 30.0), ClipOp::Intersect);
        assert_eq!(mc.local_clip_bounds(), EMPTY_RECT);
    }
}
