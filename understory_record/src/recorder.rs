// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The recording canvas.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use kurbo::{Affine, Point, Rect, RoundedRect};
use peniko::{BlendMode, Brush, Color, ImageSampler};

use crate::canvas::{
    Canvas, MatrixClipStack, SaveLayerRec, draw_drawable_inline, playback_picture,
};
use crate::geom::{Path, Region, map_rect};
use crate::mini_recorder::MiniRecorder;
use crate::ops::{ClipOp, Op, PointMode, SrcRectConstraint};
use crate::paint::Paint;
use crate::picture::Picture;
use crate::record::Record;
use crate::resources::{Drawable, Image, TextBlob, Vertices};

/// How [`Recorder`] handles [`Canvas::draw_picture`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DrawPictureMode {
    /// Append a `DrawPicture` op that references the picture.
    #[default]
    Record,
    /// Replay the picture's ops (and drawables) inline.
    Playback,
}

bitflags::bitflags! {
    /// Recording options.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RecordFlags: u8 {
        /// Unroll nested pictures and drawables instead of referencing them.
        const PLAYBACK_DRAW_PICTURE = 1 << 0;
    }
}

/// Configuration for a recording.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecorderOptions {
    /// Run the peephole optimizer when the recording is finished.
    pub optimize: bool,
    /// Park a lone first draw in a [`MiniRecorder`].
    pub mini_recorder: bool,
    /// Recording flags.
    pub flags: RecordFlags,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            mini_recorder: true,
            flags: RecordFlags::empty(),
        }
    }
}

impl RecorderOptions {
    /// The [`DrawPictureMode`] selected by the flags.
    pub fn draw_picture_mode(&self) -> DrawPictureMode {
        if self.flags.contains(RecordFlags::PLAYBACK_DRAW_PICTURE) {
            DrawPictureMode::Playback
        } else {
            DrawPictureMode::Record
        }
    }
}

/// A [`Canvas`] that appends one op per call to a [`Record`].
///
/// The recorder keeps a [`MatrixClipStack`] so matrix and clip queries behave like
/// a real surface whose bounds are the cull rect. Draws whose paint can never
/// change the destination are dropped.
#[derive(Debug)]
pub struct Recorder {
    record: Option<Record>,
    mini: Option<MiniRecorder>,
    mc: MatrixClipStack,
    draw_picture_mode: DrawPictureMode,
    drawables: Vec<Arc<dyn Drawable>>,
    sub_picture_bytes: usize,
    // One entry per open save; `true` for layers.
    saves: Vec<bool>,
}

impl Recorder {
    /// Record into a fresh log, with `cull` as the surface bounds.
    pub fn new(cull: Rect) -> Self {
        Self::with_options(cull, &RecorderOptions::default())
    }

    /// Record into a fresh log with explicit options.
    pub fn with_options(cull: Rect, options: &RecorderOptions) -> Self {
        Self {
            record: Some(Record::new()),
            mini: options.mini_recorder.then(MiniRecorder::new),
            mc: MatrixClipStack::new(cull),
            draw_picture_mode: options.draw_picture_mode(),
            drawables: Vec::new(),
            sub_picture_bytes: 0,
            saves: Vec::new(),
        }
    }

    /// The log recorded so far, or `None` once detached.
    ///
    /// A draw parked in the mini recorder is not part of the log yet.
    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    /// Take the log. The recorder ignores all further calls.
    pub fn detach_record(&mut self) -> Option<Record> {
        self.flush_mini();
        self.record.take()
    }

    /// Returns `true` once the log has been detached.
    pub fn is_detached(&self) -> bool {
        self.record.is_none()
    }

    /// The drawables referenced by recorded `DrawDrawable` ops, by index.
    pub fn drawables(&self) -> &[Arc<dyn Drawable>] {
        &self.drawables
    }

    pub(crate) fn detach_drawables(&mut self) -> Vec<Arc<dyn Drawable>> {
        core::mem::take(&mut self.drawables)
    }

    /// If the only thing recorded is a parked draw, turn it into a picture.
    pub(crate) fn detach_mini_picture(&mut self, cull: Option<Rect>) -> Option<Picture> {
        let record = self.record.as_ref()?;
        let mini = self.mini.as_mut()?;
        if !record.is_empty() || mini.is_empty() {
            return None;
        }
        Some(mini.detach_as_picture(cull))
    }

    /// Approximate bytes used by the pictures referenced from the log.
    pub fn sub_picture_bytes(&self) -> usize {
        self.sub_picture_bytes
    }

    /// Number of open `SaveLayer`/`SaveBehind` scopes.
    pub fn layer_depth(&self) -> usize {
        self.saves.iter().filter(|is_layer| **is_layer).count()
    }

    /// How nested pictures are recorded.
    pub fn draw_picture_mode(&self) -> DrawPictureMode {
        self.draw_picture_mode
    }

    /// Change how nested pictures are recorded.
    pub fn set_draw_picture_mode(&mut self, mode: DrawPictureMode) {
        self.draw_picture_mode = mode;
    }

    fn flush_mini(&mut self) {
        if let Some(mini) = &mut self.mini
            && let Some(record) = &mut self.record
            && let Some(op) = mini.take_op()
        {
            record.append(op);
        }
    }

    fn append(&mut self, op: Op) {
        self.flush_mini();
        if let Some(record) = &mut self.record {
            record.append(op);
        }
    }

    /// Returns `false` if the draw was dropped.
    fn append_draw(&mut self, op: Op) -> bool {
        let Some(record) = &self.record else {
            return false;
        };
        if op.paint().is_some_and(Paint::nothing_to_draw) {
            return false;
        }
        if record.is_empty()
            && let Some(mini) = &mut self.mini
            && mini.try_record(&op)
        {
            return true;
        }
        self.append(op);
        true
    }

    fn push_save(&mut self, is_layer: bool) -> usize {
        self.saves.push(is_layer);
        self.mc.save()
    }
}

impl Canvas for Recorder {
    fn save(&mut self) -> usize {
        self.append(Op::Save);
        self.push_save(false)
    }

    fn save_layer(&mut self, rec: &SaveLayerRec<'_>) -> usize {
        self.append(Op::SaveLayer {
            bounds: rec.bounds,
            paint: rec.paint.cloned(),
            backdrop: rec.backdrop.cloned(),
            flags: rec.flags,
        });
        self.push_save(true)
    }

    fn save_behind(&mut self, subset: Option<Rect>) -> usize {
        self.append(Op::SaveBehind { subset });
        self.push_save(true)
    }

    fn restore(&mut self) {
        if !self.mc.restore() {
            log::warn!("restore without a matching save ignored");
            return;
        }
        self.saves.pop();
        let matrix = self.mc.matrix();
        self.append(Op::Restore { matrix });
    }

    fn save_count(&self) -> usize {
        self.mc.save_count()
    }

    fn total_matrix(&self) -> Affine {
        self.mc.matrix()
    }

    fn set_matrix(&mut self, matrix: Affine) {
        self.append(Op::SetMatrix { matrix });
        self.mc.set_matrix(matrix);
    }

    fn concat(&mut self, matrix: Affine) {
        self.append(Op::Concat { matrix });
        self.mc.concat(matrix);
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        self.append(Op::Translate { dx, dy });
        self.mc.concat(Affine::translate((dx, dy)));
    }

    fn scale(&mut self, sx: f64, sy: f64) {
        self.append(Op::Scale { sx, sy });
        self.mc.concat(Affine::scale_non_uniform(sx, sy));
    }

    fn clip_rect(&mut self, rect: Rect, op: ClipOp, anti_alias: bool) {
        self.append(Op::ClipRect {
            rect,
            op,
            anti_alias,
        });
        self.mc.clip_local(Some(rect), op);
    }

    fn clip_rrect(&mut self, rrect: RoundedRect, op: ClipOp, anti_alias: bool) {
        self.append(Op::ClipRRect {
            rrect,
            op,
            anti_alias,
        });
        self.mc.clip_local(Some(rrect.rect()), op);
    }

    fn clip_path(&mut self, path: &Path, op: ClipOp, anti_alias: bool) {
        self.append(Op::ClipPath {
            path: path.clone(),
            op,
            anti_alias,
        });
        let bounds = (!path.inverse).then(|| path.bounds());
        self.mc.clip_local(bounds, op);
    }

    fn clip_region(&mut self, region: &Region, op: ClipOp) {
        self.append(Op::ClipRegion {
            region: region.clone(),
            op,
        });
        self.mc.clip_device(region.bounds(), op);
    }

    fn clip_shader(&mut self, shader: &Brush, op: ClipOp) {
        self.append(Op::ClipShader {
            shader: shader.clone(),
            op,
        });
    }

    fn reset_clip(&mut self) {
        self.append(Op::ResetClip);
        self.mc.reset_clip();
    }

    fn local_clip_bounds(&self) -> Rect {
        self.mc.local_clip_bounds()
    }

    fn device_clip_bounds(&self) -> Rect {
        self.mc.device_clip_bounds()
    }

    fn draw_paint(&mut self, paint: &Paint) {
        self.append_draw(Op::DrawPaint {
            paint: paint.clone(),
        });
    }

    fn draw_behind(&mut self, paint: &Paint) {
        self.append_draw(Op::DrawBehind {
            paint: paint.clone(),
        });
    }

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) {
        self.append_draw(Op::DrawRect {
            rect,
            paint: paint.clone(),
        });
    }

    fn draw_oval(&mut self, oval: Rect, paint: &Paint) {
        self.append_draw(Op::DrawOval {
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
        self.append_draw(Op::DrawArc {
            oval,
            start_angle,
            sweep_angle,
            use_center,
            paint: paint.clone(),
        });
    }

    fn draw_rrect(&mut self, rrect: RoundedRect, paint: &Paint) {
        self.append_draw(Op::DrawRRect {
            rrect,
            paint: paint.clone(),
        });
    }

    fn draw_drrect(&mut self, outer: RoundedRect, inner: RoundedRect, paint: &Paint) {
        self.append_draw(Op::DrawDRRect {
            outer,
            inner,
            paint: paint.clone(),
        });
    }

    fn draw_region(&mut self, region: &Region, paint: &Paint) {
        self.append_draw(Op::DrawRegion {
            region: region.clone(),
            paint: paint.clone(),
        });
    }

    fn draw_path(&mut self, path: &Path, paint: &Paint) {
        self.append_draw(Op::DrawPath {
            path: path.clone(),
            paint: paint.clone(),
        });
    }

    fn draw_points(&mut self, mode: PointMode, points: &[Point], paint: &Paint) {
        self.append_draw(Op::DrawPoints {
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
        self.append_draw(Op::DrawImage {
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
        self.append_draw(Op::DrawImageRect {
            image: image.clone(),
            src,
            dst,
            sampler,
            paint: paint.cloned(),
            constraint,
        });
    }

    fn draw_text_blob(&mut self, blob: &TextBlob, x: f64, y: f64, paint: &Paint) {
        self.append_draw(Op::DrawTextBlob {
            blob: blob.clone(),
            x,
            y,
            paint: paint.clone(),
        });
    }

    fn draw_picture(&mut self, picture: &Picture, matrix: Option<Affine>, paint: Option<&Paint>) {
        let unroll = self.draw_picture_mode == DrawPictureMode::Playback
            || (paint.is_none() && picture.approximate_op_count(false) <= 1);
        if unroll {
            playback_picture(self, picture, matrix, paint);
            return;
        }
        let appended = self.append_draw(Op::DrawPicture {
            picture: picture.clone(),
            matrix: matrix.unwrap_or(Affine::IDENTITY),
            paint: paint.cloned(),
        });
        if appended {
            self.sub_picture_bytes += picture.approximate_bytes_used();
        }
    }

    fn draw_drawable(&mut self, drawable: &Arc<dyn Drawable>, matrix: Option<Affine>) {
        if self.draw_picture_mode == DrawPictureMode::Playback {
            draw_drawable_inline(self, drawable.as_ref(), matrix);
            return;
        }
        if self.record.is_none() {
            return;
        }
        let bounds = match matrix {
            Some(m) => map_rect(m, drawable.bounds()),
            None => drawable.bounds(),
        };
        self.drawables.push(Arc::clone(drawable));
        let index = self.drawables.len() - 1;
        self.append_draw(Op::DrawDrawable {
            index,
            matrix,
            bounds,
        });
    }

    fn draw_vertices(&mut self, vertices: &Vertices, blend: BlendMode, paint: &Paint) {
        self.append_draw(Op::DrawVertices {
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
        self.append_draw(Op::DrawPatch {
            cubics: Box::new(*cubics),
            colors: colors.copied(),
            tex_coords: tex_coords.copied(),
            blend,
            paint: paint.clone(),
        });
    }

    fn draw_annotation(&mut self, rect: Rect, key: &str, value: Option<&Arc<[u8]>>) {
        self.append_draw(Op::DrawAnnotation {
            rect,
            key: key.into(),
            value: value.cloned(),
        });
    }

    fn flush(&mut self) {
        self.append(Op::Flush);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpKind;
    use alloc::vec;

    const CULL: Rect = Rect::new(0.0, 0.0, 100.0, 100.0);

    fn no_mini() -> RecorderOptions {
        RecorderOptions {
            mini_recorder: false,
            ..RecorderOptions::default()
        }
    }

    fn kinds(recorder: &Recorder) -> Vec<OpKind> {
        recorder
            .record()
            .map(|r| r.iter().map(Op::kind).collect())
            .unwrap_or_default()
    }

    #[test]
    fn one_op_per_call() {
        let mut rec = Recorder::with_options(CULL, &no_mini());
        let paint = Paint::new(Color::from_rgba8(255, 0, 0, 255));
        assert_eq!(rec.save(), 1);
        rec.translate(5.0, 5.0);
        rec.clip_rect(Rect::new(0.0, 0.0, 10.0, 10.0), ClipOp::Intersect, true);
        rec.draw_rect(Rect::new(0.0, 0.0, 4.0, 4.0), &paint);
        rec.restore();
        assert_eq!(
            kinds(&rec),
            vec![
                OpKind::Save,
                OpKind::Translate,
                OpKind::ClipRect,
                OpKind::DrawRect,
                OpKind::Restore
            ]
        );
        assert_eq!(rec.save_count(), 1);
    }

    #[test]
    fn restore_records_restored_matrix() {
        let mut rec = Recorder::with_options(CULL, &no_mini());
        rec.translate(1.0, 2.0);
        rec.save();
        rec.scale(3.0, 3.0);
        rec.restore();
        let record = rec.detach_record().unwrap();
        assert_eq!(
            record.get(3),
            Some(&Op::Restore {
                matrix: Affine::translate((1.0, 2.0))
            })
        );
    }

    #[test]
    fn unbalanced_restore_is_ignored() {
        let mut rec = Recorder::with_options(CULL, &no_mini());
        rec.restore();
        assert!(rec.record().unwrap().is_empty());
        assert_eq!(rec.save_count(), 1);
    }

    #[test]
    fn invisible_draws_are_dropped() {
        let mut rec = Recorder::with_options(CULL, &no_mini());
        rec.draw_rect(CULL, &Paint::new(Color::TRANSPARENT));
        assert!(rec.record().unwrap().is_empty());
    }

    #[test]
    fn layer_depth_tracks_layers() {
        let mut rec = Recorder::new(CULL);
        rec.save();
        rec.save_layer(&SaveLayerRec::default());
        rec.save_behind(None);
        assert_eq!(rec.layer_depth(), 2);
        rec.restore_to_count(2);
        assert_eq!(rec.layer_depth(), 0);
        assert_eq!(rec.save_count(), 2);
    }

    #[test]
    fn first_simple_draw_is_parked() {
        let mut rec = Recorder::new(CULL);
        let paint = Paint::default();
        rec.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &paint);
        assert!(rec.record().unwrap().is_empty());
        rec.draw_oval(Rect::new(0.0, 0.0, 1.0, 1.0), &paint);
        assert_eq!(kinds(&rec), vec![OpKind::DrawRect, OpKind::DrawOval]);
    }

    #[test]
    fn detach_flushes_parked_draw_and_goes_inert() {
        let mut rec = Recorder::new(CULL);
        rec.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::default());
        let record = rec.detach_record().unwrap();
        assert_eq!(record.count(), 1);
        rec.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::default());
        rec.save();
        assert!(rec.is_detached());
        assert!(rec.detach_record().is_none());
    }

    #[test]
    fn local_clip_follows_matrix() {
        let mut rec = Recorder::new(CULL);
        rec.clip_rect(Rect::new(10.0, 10.0, 20.0, 20.0), ClipOp::Intersect, false);
        rec.translate(10.0, 10.0);
        assert_eq!(rec.local_clip_bounds(), Rect::new(-1.0, -1.0, 11.0, 11.0));
        assert_eq!(rec.device_clip_bounds(), Rect::new(10.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn small_pictures_are_unrolled() {
        let mut inner = Recorder::new(CULL);
        inner.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::default());
        let picture = inner
            .detach_mini_picture(None)
            .expect("parked draw becomes a picture");
        let mut rec = Recorder::with_options(CULL, &no_mini());
        rec.draw_picture(&picture, None, None);
        assert_eq!(kinds(&rec), vec![OpKind::DrawRect]);
        assert_eq!(rec.sub_picture_bytes(), 0);
    }

    #[test]
    fn dropped_pictures_add_no_bytes() {
        let mut inner = crate::PictureRecorder::new();
        let canvas = inner.begin_recording(CULL, None);
        canvas.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::default());
        canvas.draw_rect(Rect::new(5.0, 5.0, 9.0, 9.0), &Paint::default());
        let picture = inner.finish_recording_as_picture();
        assert_eq!(picture.approximate_op_count(false), 2);

        let mut rec = Recorder::with_options(CULL, &no_mini());
        rec.draw_picture(&picture, None, Some(&Paint::with_alpha(0.0)));
        assert!(kinds(&rec).is_empty());
        assert_eq!(rec.sub_picture_bytes(), 0);

        rec.draw_picture(&picture, None, Some(&Paint::with_alpha(0.5)));
        assert_eq!(kinds(&rec), vec![OpKind::DrawPicture]);
        assert_eq!(rec.sub_picture_bytes(), picture.approximate_bytes_used());
    }
}
