// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replaying a [`Record`] into a [`Canvas`].

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::Debug;

use kurbo::Affine;

use crate::bbh::Bbh;
use crate::canvas::{Canvas, SaveLayerRec};
use crate::geom::rect_is_empty;
use crate::ops::Op;
use crate::picture::Picture;
use crate::record::Record;
use crate::resources::Drawable;

/// Polled once before each op during replay; returning `true` stops the replay.
pub trait AbortCallback {
    /// Returns `true` to stop.
    fn abort(&mut self) -> bool;
}

impl<F: FnMut() -> bool> AbortCallback for F {
    fn abort(&mut self) -> bool {
        self()
    }
}

/// Issues single ops against a canvas.
///
/// `SetMatrix` ops are relative to the initial matrix, which defaults to the
/// canvas matrix at construction. `Restore` ops never pop saves that were open
/// before construction.
pub struct Draw<'a> {
    canvas: &'a mut dyn Canvas,
    drawable_picts: &'a [Picture],
    drawables: &'a [Arc<dyn Drawable>],
    initial_matrix: Affine,
    base_save_count: usize,
}

impl Debug for Draw<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Draw")
            .field("drawable_picts", &self.drawable_picts.len())
            .field("drawables", &self.drawables.len())
            .field("initial_matrix", &self.initial_matrix)
            .finish_non_exhaustive()
    }
}

impl<'a> Draw<'a> {
    /// Create a visitor targeting `canvas`.
    ///
    /// `DrawDrawable` ops resolve against `drawable_picts` first and `drawables` second.
    pub fn new(
        canvas: &'a mut dyn Canvas,
        drawable_picts: &'a [Picture],
        drawables: &'a [Arc<dyn Drawable>],
        initial_matrix: Option<Affine>,
    ) -> Self {
        let initial_matrix = initial_matrix.unwrap_or_else(|| canvas.total_matrix());
        let base_save_count = canvas.save_count();
        Self {
            canvas,
            drawable_picts,
            drawables,
            initial_matrix,
            base_save_count,
        }
    }

    /// Issue the canvas call corresponding to `op`.
    pub fn draw(&mut self, op: &Op) {
        let canvas = &mut *self.canvas;
        match op {
            Op::NoOp => {}
            Op::Flush => canvas.flush(),
            Op::Save => {
                canvas.save();
            }
            Op::SaveLayer {
                bounds,
                paint,
                backdrop,
                flags,
            } => {
                canvas.save_layer(&SaveLayerRec {
                    bounds: *bounds,
                    paint: paint.as_ref(),
                    backdrop: backdrop.as_ref(),
                    flags: *flags,
                });
            }
            Op::SaveBehind { subset } => {
                canvas.save_behind(*subset);
            }
            Op::Restore { .. } => {
                if canvas.save_count() > self.base_save_count {
                    canvas.restore();
                }
            }
            Op::SetMatrix { matrix } => canvas.set_matrix(self.initial_matrix * *matrix),
            Op::Concat { matrix } => canvas.concat(*matrix),
            Op::Translate { dx, dy } => canvas.translate(*dx, *dy),
            Op::Scale { sx, sy } => canvas.scale(*sx, *sy),
            Op::ClipRect {
                rect,
                op,
                anti_alias,
            } => canvas.clip_rect(*rect, *op, *anti_alias),
            Op::ClipRRect {
                rrect,
                op,
                anti_alias,
            } => canvas.clip_rrect(*rrect, *op, *anti_alias),
            Op::ClipPath {
                path,
                op,
                anti_alias,
            } => canvas.clip_path(path, *op, *anti_alias),
            Op::ClipRegion { region, op } => canvas.clip_region(region, *op),
            Op::ClipShader { shader, op } => canvas.clip_shader(shader, *op),
            Op::ResetClip => canvas.reset_clip(),
            Op::DrawPaint { paint } => canvas.draw_paint(paint),
            Op::DrawBehind { paint } => canvas.draw_behind(paint),
            Op::DrawRect { rect, paint } => canvas.draw_rect(*rect, paint),
            Op::DrawOval { oval, paint } => canvas.draw_oval(*oval, paint),
            Op::DrawArc {
                oval,
                start_angle,
                sweep_angle,
                use_center,
                paint,
            } => canvas.draw_arc(*oval, *start_angle, *sweep_angle, *use_center, paint),
            Op::DrawRRect { rrect, paint } => canvas.draw_rrect(*rrect, paint),
            Op::DrawDRRect {
                outer,
                inner,
                paint,
            } => canvas.draw_drrect(*outer, *inner, paint),
            Op::DrawRegion { region, paint } => canvas.draw_region(region, paint),
            Op::DrawPath { path, paint } => canvas.draw_path(path, paint),
            Op::DrawPoints {
                mode,
                points,
                paint,
            } => canvas.draw_points(*mode, points, paint),
            Op::DrawImage {
                image,
                x,
                y,
                sampler,
                paint,
            } => canvas.draw_image(image, *x, *y, *sampler, paint.as_ref()),
            Op::DrawImageRect {
                image,
                src,
                dst,
                sampler,
                paint,
                constraint,
            } => canvas.draw_image_rect(image, *src, *dst, *sampler, paint.as_ref(), *constraint),
            Op::DrawTextBlob { blob, x, y, paint } => canvas.draw_text_blob(blob, *x, *y, paint),
            Op::DrawPicture {
                picture,
                matrix,
                paint,
            } => canvas.draw_picture(picture, Some(*matrix), paint.as_ref()),
            Op::DrawDrawable { index, matrix, .. } => {
                if let Some(picture) = self.drawable_picts.get(*index) {
                    canvas.draw_picture(picture, *matrix, None);
                } else if let Some(drawable) = self.drawables.get(*index) {
                    canvas.draw_drawable(drawable, *matrix);
                } else {
                    debug_assert!(false, "drawable {index} not supplied to replay");
                }
            }
            Op::DrawVertices {
                vertices,
                blend,
                paint,
            } => canvas.draw_vertices(vertices, *blend, paint),
            Op::DrawPatch {
                cubics,
                colors,
                tex_coords,
                blend,
                paint,
            } => canvas.draw_patch(cubics, colors.as_ref(), tex_coords.as_ref(), *blend, paint),
            Op::DrawAnnotation { rect, key, value } => {
                canvas.draw_annotation(*rect, key, value.as_ref());
            }
        }
    }
}

fn aborted(abort: &mut Option<&mut dyn AbortCallback>) -> bool {
    abort.as_mut().is_some_and(|cb| cb.abort())
}

/// Replay `record` into `canvas`.
///
/// With a spatial index, only ops whose bounds overlap the canvas's local clip
/// bounds are issued, in log order. The whole replay is wrapped in a save and a
/// `restore_to_count`, so the canvas is left as found even when `abort` stops it.
pub fn draw_record(
    record: &Record,
    canvas: &mut dyn Canvas,
    drawable_picts: &[Picture],
    drawables: &[Arc<dyn Drawable>],
    bbh: Option<&dyn Bbh>,
    mut abort: Option<&mut dyn AbortCallback>,
) {
    let save_count = canvas.save();
    if let Some(bbh) = bbh {
        let query = canvas.local_clip_bounds();
        if !rect_is_empty(&query) {
            let mut ops = Vec::new();
            bbh.search(query, &mut ops);
            ops.sort_unstable();
            ops.dedup();
            let mut draw = Draw::new(canvas, drawable_picts, drawables, None);
            for i in ops {
                if i >= record.count() {
                    continue;
                }
                if aborted(&mut abort) {
                    log::trace!("replay aborted before op {i}");
                    break;
                }
                record.visit(i, |op| draw.draw(op));
            }
        }
    } else {
        let mut draw = Draw::new(canvas, drawable_picts, drawables, None);
        for i in 0..record.count() {
            if aborted(&mut abort) {
                log::trace!("replay aborted before op {i}");
                break;
            }
            record.visit(i, |op| draw.draw(op));
        }
    }
    canvas.restore_to_count(save_count);
}

/// Replay positions `start..stop` of `record`, with `SetMatrix` ops relative to
/// `initial_matrix`. The canvas save count is restored afterwards, even when
/// `abort` stops the replay.
pub fn draw_record_partial(
    record: &Record,
    canvas: &mut dyn Canvas,
    drawable_picts: &[Picture],
    start: usize,
    stop: usize,
    initial_matrix: Affine,
    mut abort: Option<&mut dyn AbortCallback>,
) {
    let save_count = canvas.save();
    {
        let stop = stop.min(record.count());
        let mut draw = Draw::new(canvas, drawable_picts, &[], Some(initial_matrix));
        for i in start..stop {
            if aborted(&mut abort) {
                log::trace!("partial replay aborted before op {i}");
                break;
            }
            record.visit(i, |op| draw.draw(op));
        }
    }
    canvas.restore_to_count(save_count);
}
