// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use kurbo::{Affine, Point, Rect, RoundedRect};
use understory_record::{
    BlendMode, Brush, Canvas, ClipOp, Color, Drawable, Image, ImageSampler, MatrixClipStack, Op,
    OpKind, Paint, Path, Picture, PointMode, Region, SaveLayerRec, SrcRectConstraint, TextBlob,
    Vertices, draw_drawable_inline, playback_picture,
};

/// Canvas state captured after each call.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSnapshot {
    /// Current matrix.
    pub matrix: Affine,
    /// Save count, starting at 1.
    pub save_count: usize,
    /// Number of open layers (`save_layer` and `save_behind`).
    pub layer_depth: usize,
    /// Conservative device clip bounds.
    pub device_clip: Rect,
}

/// One canvas call, described as the [`Op`] a recorder would append.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The call.
    pub op: Op,
    /// State after the call.
    pub state: StateSnapshot,
}

/// A [`Canvas`] that logs every call it receives.
///
/// Restores at save count 1 are ignored and counted separately. Nested pictures and
/// drawables are logged as single events unless [`RefCanvas::unroll_pictures`] is
/// set, in which case they are played back inline.
#[derive(Debug)]
pub struct RefCanvas {
    events: Vec<Event>,
    mc: MatrixClipStack,
    layers: Vec<bool>,
    drawables: Vec<Arc<dyn Drawable>>,
    ignored_restores: usize,
    /// Play nested pictures and drawables back inline instead of logging them.
    pub unroll_pictures: bool,
}

impl Default for RefCanvas {
    fn default() -> Self {
        Self::new(Rect::new(0.0, 0.0, 1024.0, 1024.0))
    }
}

impl RefCanvas {
    /// A canvas with the given device bounds.
    pub fn new(device_bounds: Rect) -> Self {
        Self {
            events: Vec::new(),
            mc: MatrixClipStack::new(device_bounds),
            layers: Vec::new(),
            drawables: Vec::new(),
            ignored_restores: 0,
            unroll_pictures: false,
        }
    }

    /// Logged events, in call order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The logged calls without their snapshots.
    pub fn ops(&self) -> impl Iterator<Item = &Op> + '_ {
        self.events.iter().map(|e| &e.op)
    }

    /// Kinds of the logged calls.
    pub fn kinds(&self) -> Vec<OpKind> {
        self.ops().map(Op::kind).collect()
    }

    /// Number of logged draw calls.
    pub fn draw_count(&self) -> usize {
        self.ops().filter(|op| op.is_draw()).count()
    }

    /// Drawables received through [`Canvas::draw_drawable`], by the index logged for them.
    pub fn drawables(&self) -> &[Arc<dyn Drawable>] {
        &self.drawables
    }

    /// Restores that arrived at save count 1.
    pub fn ignored_restores(&self) -> usize {
        self.ignored_restores
    }

    /// Forget logged events; the matrix and clip state are kept.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            matrix: self.mc.matrix(),
            save_count: self.mc.save_count(),
            layer_depth: self.layers.iter().filter(|l| **l).count(),
            device_clip: self.mc.device_clip_bounds(),
        }
    }

    fn push(&mut self, op: Op) {
        let state = self.snapshot();
        self.events.push(Event { op, state });
    }

    fn push_save(&mut self, op: Op, is_layer: bool) -> usize {
        self.layers.push(is_layer);
        let count = self.mc.save();
        self.push(op);
        count
    }
}

impl Canvas for RefCanvas {
    fn save(&mut self) -> usize {
        self.push_save(Op::Save, false)
    }

    fn save_layer(&mut self, rec: &SaveLayerRec<'_>) -> usize {
        let op = Op::SaveLayer {
            bounds: rec.bounds,
            paint: rec.paint.cloned(),
            backdrop: rec.backdrop.cloned(),
            flags: rec.flags,
        };
        self.push_save(op, true)
    }

    fn save_behind(&mut self, subset: Option<Rect>) -> usize {
        self.push_save(Op::SaveBehind { subset }, true)
    }

    fn restore(&mut self) {
        if !self.mc.restore() {
            self.ignored_restores += 1;
            return;
        }
        self.layers.pop();
        let matrix = self.mc.matrix();
        self.push(Op::Restore { matrix });
    }

    fn save_count(&self) -> usize {
        self.mc.save_count()
    }

    fn total_matrix(&self) -> Affine {
        self.mc.matrix()
    }

    fn set_matrix(&mut self, matrix: Affine) {
        self.mc.set_matrix(matrix);
        self.push(Op::SetMatrix { matrix });
    }

    fn concat(&mut self, matrix: Affine) {
        self.mc.concat(matrix);
        self.push(Op::Concat { matrix });
    }

    fn clip_rect(&mut self, rect: Rect, op: ClipOp, anti_alias: bool) {
        self.mc.clip_local(Some(rect), op);
        self.push(Op::ClipRect {
            rect,
            op,
            anti_alias,
        });
    }

    fn clip_rrect(&mut self, rrect: RoundedRect, op: ClipOp, anti_alias: bool) {
        self.mc.clip_local(Some(rrect.rect()), op);
        self.push(Op::ClipRRect {
            rrect,
            op,
            anti_alias,
        });
    }

    fn clip_path(&mut self, path: &Path, op: ClipOp, anti_alias: bool) {
        self.mc.clip_local((!path.inverse).then(|| path.bounds()), op);
        self.push(Op::ClipPath {
            path: path.clone(),
            op,
            anti_alias,
        });
    }

    fn clip_region(&mut self, region: &Region, op: ClipOp) {
        self.mc.clip_device(region.bounds(), op);
        self.push(Op::ClipRegion {
            region: region.clone(),
            op,
        });
    }

    fn clip_shader(&mut self, shader: &Brush, op: ClipOp) {
        self.push(Op::ClipShader {
            shader: shader.clone(),
            op,
        });
    }

    fn reset_clip(&mut self) {
        self.mc.reset_clip();
        self.push(Op::ResetClip);
    }

    fn local_clip_bounds(&self) -> Rect {
        self.mc.local_clip_bounds()
    }

    fn device_clip_bounds(&self) -> Rect {
        self.mc.device_clip_bounds()
    }

    fn draw_paint(&mut self, paint: &Paint) {
        self.push(Op::DrawPaint {
            paint: paint.clone(),
        });
    }

    fn draw_behind(&mut self, paint: &Paint) {
        self.push(Op::DrawBehind {
            paint: paint.clone(),
        });
    }

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) {
        self.push(Op::DrawRect {
            rect,
            paint: paint.clone(),
        });
    }

    fn draw_oval(&mut self, oval: Rect, paint: &Paint) {
        self.push(Op::DrawOval {
            oval,
            paint: paint.clone(),
        });
    }

    fn draw_arc(
        &mut self,
        oval: Rect,
        start_angle: f64,
        sweep_angle: f64,
        use_center: bool,
        paint: &Paint,
    ) {
        self.push(Op::DrawArc {
            oval,
            start_angle,
            sweep_angle,
            use_center,
            paint: paint.clone(),
        });
    }

    fn draw_rrect(&mut self, rrect: RoundedRect, paint: &Paint) {
        self.push(Op::DrawRRect {
            rrect,
            paint: paint.clone(),
        });
    }

    fn draw_drrect(&mut self, outer: RoundedRect, inner: RoundedRect, paint: &Paint) {
        self.push(Op::DrawDRRect {
            outer,
            inner,
            paint: paint.clone(),
        });
    }

    fn draw_region(&mut self, region: &Region, paint: &Paint) {
        self.push(Op::DrawRegion {
            region: region.clone(),
            paint: paint.clone(),
        });
    }

    fn draw_path(&mut self, path: &Path, paint: &Paint) {
        self.push(Op::DrawPath {
            path: path.clone(),
            paint: paint.clone(),
        });
    }

    fn draw_points(&mut self, mode: PointMode, points: &[Point], paint: &Paint) {
        self.push(Op::DrawPoints {
            mode,
            points: points.into(),
            paint: paint.clone(),
        });
    }

    fn draw_image(
        &mut self,
        image: &Image,
        x: f64,
        y: f64,
        sampler: ImageSampler,
        paint: Option<&Paint>,
    ) {
        self.push(Op::DrawImage {
            image: image.clone(),
            x,
            y,
            sampler,
            paint: paint.cloned(),
        });
    }

    fn draw_image_rect(
        &mut self,
        image: &Image,
        src: Rect,
        dst: Rect,
        sampler: ImageSampler,
        paint: Option<&Paint>,
        constraint: SrcRectConstraint,
    ) {
        self.push(Op::DrawImageRect {
            image: image.clone(),
            src,
            dst,
            sampler,
            paint: paint.cloned(),
            constraint,
        });
    }

    fn draw_text_blob(&mut self, blob: &TextBlob, x: f64, y: f64, paint: &Paint) {
        self.push(Op::DrawTextBlob {
            blob: blob.clone(),
            x,
            y,
            paint: paint.clone(),
        });
    }

    fn draw_picture(&mut self, picture: &Picture, matrix: Option<Affine>, paint: Option<&Paint>) {
        if self.unroll_pictures {
            playback_picture(self, picture, matrix, paint);
            return;
        }
        self.push(Op::DrawPicture {
            picture: picture.clone(),
            matrix: matrix.unwrap_or(Affine::IDENTITY),
            paint: paint.cloned(),
        });
    }

    fn draw_drawable(&mut self, drawable: &Arc<dyn Drawable>, matrix: Option<Affine>) {
        if self.unroll_pictures {
            draw_drawable_inline(self, drawable.as_ref(), matrix);
            return;
        }
        self.drawables.push(Arc::clone(drawable));
        self.push(Op::DrawDrawable {
            index: self.drawables.len() - 1,
            matrix,
            bounds: drawable.bounds(),
        });
    }

    fn draw_vertices(&mut self, vertices: &Vertices, blend: BlendMode, paint: &Paint) {
        self.push(Op::DrawVertices {
            vertices: vertices.clone(),
            blend,
            paint: paint.clone(),
        });
    }

    fn draw_patch(
        &mut self,
        cubics: &[Point; 12],
        colors: Option<&[Color; 4]>,
        tex_coords: Option<&[Point; 4]>,
        blend: BlendMode,
        paint: &Paint,
    ) {
        self.push(Op::DrawPatch {
            cubics: Box::new(*cubics),
            colors: colors.copied(),
            tex_coords: tex_coords.copied(),
            blend,
            paint: paint.clone(),
        });
    }

    fn draw_annotation(&mut self, rect: Rect, key: &str, value: Option<&Arc<[u8]>>) {
        self.push(Op::DrawAnnotation {
            rect,
            key: key.into(),
            value: value.cloned(),
        });
    }

    fn flush(&mut self) {
        self.push(Op::Flush);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn snapshots_follow_state() {
        let mut canvas = RefCanvas::default();
        canvas.save_layer(&SaveLayerRec::default());
        canvas.concat(Affine::scale(2.0));
        canvas.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::default());
        canvas.restore();

        assert_eq!(
            canvas.kinds(),
            vec![
                OpKind::SaveLayer,
                OpKind::Concat,
                OpKind::DrawRect,
                OpKind::Restore
            ]
        );
        let draw = &canvas.events()[2];
        assert_eq!(draw.state.matrix, Affine::scale(2.0));
        assert_eq!(draw.state.save_count, 2);
        assert_eq!(draw.state.layer_depth, 1);
        let last = canvas.events().last().expect("at least one event");
        assert_eq!(last.state.save_count, 1);
        assert_eq!(canvas.draw_count(), 1);
    }

    #[test]
    fn base_level_restore_is_counted_not_logged() {
        let mut canvas = RefCanvas::default();
        canvas.restore();
        assert!(canvas.events().is_empty());
        assert_eq!(canvas.ignored_restores(), 1);
    }

    #[test]
    fn translate_goes_through_concat() {
        let mut canvas = RefCanvas::default();
        canvas.translate(3.0, 4.0);
        assert_eq!(
            canvas.ops().next(),
            Some(&Op::Concat {
                matrix: Affine::translate((3.0, 4.0))
            })
        );
    }
}
