// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording sessions that end in a [`Picture`] or a [`RecordedDrawable`].

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt::Debug;

use kurbo::Rect;

use crate::bbh::{Bbh, BbhFactory};
use crate::bounds::fill_bounds;
use crate::canvas::Canvas;
use crate::draw::draw_record;
use crate::geom::EMPTY_RECT;
use crate::opts::optimize;
use crate::picture::Picture;
use crate::record::Record;
use crate::recorder::{Recorder, RecorderOptions};
use crate::resources::Drawable;

/// Drives one recording at a time.
///
/// ```
/// use kurbo::Rect;
/// use understory_record::{Canvas, Paint, PictureRecorder, RTreeFactory};
///
/// let mut recorder = PictureRecorder::new();
/// let canvas = recorder.begin_recording(Rect::new(0.0, 0.0, 100.0, 100.0), Some(&RTreeFactory));
/// canvas.draw_rect(Rect::new(10.0, 10.0, 20.0, 20.0), &Paint::default());
/// canvas.draw_rect(Rect::new(50.0, 50.0, 60.0, 60.0), &Paint::default());
/// let picture = recorder.finish_recording_as_picture();
/// assert_eq!(picture.approximate_op_count(false), 2);
/// assert_eq!(picture.cull_rect(), Rect::new(10.0, 10.0, 60.0, 60.0));
/// ```
#[derive(Debug, Default)]
pub struct PictureRecorder {
    recorder: Option<Recorder>,
    cull: Rect,
    bbh: Option<Box<dyn Bbh>>,
    options: RecorderOptions,
}

impl PictureRecorder {
    /// A recorder with no recording in progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording with default options. Any recording in progress is discarded.
    pub fn begin_recording(&mut self, cull: Rect, bbh: Option<&dyn BbhFactory>) -> &mut Recorder {
        self.begin_recording_with(cull, bbh, RecorderOptions::default())
    }

    /// Start recording with explicit options.
    pub fn begin_recording_with(
        &mut self,
        cull: Rect,
        bbh: Option<&dyn BbhFactory>,
        options: RecorderOptions,
    ) -> &mut Recorder {
        self.cull = cull;
        self.bbh = bbh.map(|factory| factory.make());
        self.options = options;
        self.recorder.insert(Recorder::with_options(cull, &options))
    }

    /// The canvas of the recording in progress.
    pub fn recording_canvas(&mut self) -> Option<&mut Recorder> {
        self.recorder.as_mut()
    }

    /// End the recording and freeze it.
    ///
    /// Open saves are closed, the log is optimized (unless disabled), drawables are
    /// snapshotted and, with a spatial index, every op is indexed under its bounds
    /// and the cull rect shrinks to their union. Without a recording in progress
    /// the result is an empty picture.
    pub fn finish_recording_as_picture(&mut self) -> Picture {
        let Some(mut recorder) = self.recorder.take() else {
            return Picture::empty(EMPTY_RECT);
        };
        recorder.restore_to_count(1);
        let bbh = self.bbh.take();
        let mut cull = self.cull;

        let mini_cull = if bbh.is_some() { None } else { Some(cull) };
        if let Some(picture) = recorder.detach_mini_picture(mini_cull) {
            return picture;
        }

        let sub_picture_bytes = recorder.sub_picture_bytes();
        let drawables = recorder.detach_drawables();
        let Some(mut record) = recorder.detach_record() else {
            return Picture::empty(cull);
        };
        if self.options.optimize {
            optimize(&mut record);
        }
        if record.is_empty() {
            return Picture::empty(cull);
        }

        let drawable_picts: Arc<[Picture]> = drawables.iter().map(|d| d.snapshot()).collect();
        let bbh = bbh.map(|bbh| {
            let (bbh, union) = index_record(bbh, cull, &record);
            cull = union;
            bbh
        });
        Picture::big(cull, Arc::new(record), bbh, drawable_picts, sub_picture_bytes)
    }

    /// End the recording as a drawable that keeps its drawables live.
    ///
    /// Returns `None` without a recording in progress.
    pub fn finish_recording_as_drawable(&mut self) -> Option<RecordedDrawable> {
        let mut recorder = self.recorder.take()?;
        recorder.restore_to_count(1);
        let sub_picture_bytes = recorder.sub_picture_bytes();
        let drawables = recorder.detach_drawables();
        let mut record = recorder.detach_record()?;
        if self.options.optimize {
            optimize(&mut record);
        }
        let bbh = self
            .bbh
            .take()
            .map(|bbh| index_record(bbh, self.cull, &record).0);
        Some(RecordedDrawable {
            record: Arc::new(record),
            bbh,
            drawables: drawables.into(),
            bounds: self.cull,
            sub_picture_bytes,
        })
    }
}

fn index_record(mut bbh: Box<dyn Bbh>, cull: Rect, record: &Record) -> (Arc<dyn Bbh>, Rect) {
    let bounds = fill_bounds(cull, record);
    bbh.insert(&bounds.rects, &bounds.metadata);
    (Arc::from(bbh), bounds.union())
}

/// A finished recording that replays its drawables live on every draw.
pub struct RecordedDrawable {
    record: Arc<Record>,
    bbh: Option<Arc<dyn Bbh>>,
    drawables: Arc<[Arc<dyn Drawable>]>,
    bounds: Rect,
    sub_picture_bytes: usize,
}

impl Debug for RecordedDrawable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecordedDrawable")
            .field("ops", &self.record.count())
            .field("drawables", &self.drawables.len())
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

impl RecordedDrawable {
    /// The recorded log.
    pub fn record(&self) -> &Record {
        &self.record
    }
}

impl Drawable for RecordedDrawable {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn draw(&self, canvas: &mut dyn Canvas) {
        draw_record(
            &self.record,
            canvas,
            &[],
            &self.drawables,
            self.bbh.as_deref(),
            None,
        );
    }

    fn snapshot(&self) -> Picture {
        let drawable_picts: Arc<[Picture]> =
            self.drawables.iter().map(|d| d.snapshot()).collect();
        Picture::big(
            self.bounds,
            Arc::clone(&self.record),
            self.bbh.clone(),
            drawable_picts,
            self.sub_picture_bytes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbh::RTreeFactory;
    use crate::canvas::SaveLayerRec;
    use crate::ops::{Op, OpKind};
    use crate::paint::Paint;
    use alloc::vec::Vec;
    use peniko::Color;

    const CULL: Rect = Rect::new(0.0, 0.0, 100.0, 100.0);

    #[derive(Debug)]
    struct Square(Color);

    impl Drawable for Square {
        fn bounds(&self) -> Rect {
            Rect::new(0.0, 0.0, 10.0, 10.0)
        }

        fn draw(&self, canvas: &mut dyn Canvas) {
            canvas.draw_rect(self.bounds(), &Paint::new(self.0));
            canvas.draw_rect(self.bounds(), &Paint::new(self.0));
        }
    }

    #[test]
    fn single_draw_becomes_mini_picture() {
        let mut rec = PictureRecorder::new();
        rec.begin_recording(CULL, None)
            .draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), &Paint::default());
        let picture = rec.finish_recording_as_picture();
        assert!(picture.mini_op().is_some());
        assert_eq!(picture.cull_rect(), CULL);
    }

    #[test]
    fn single_draw_with_bbh_is_bounded_by_the_draw() {
        let mut rec = PictureRecorder::new();
        rec.begin_recording(CULL, Some(&RTreeFactory))
            .draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), &Paint::default());
        let picture = rec.finish_recording_as_picture();
        assert_eq!(picture.cull_rect(), Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn empty_save_block_optimizes_away() {
        let mut rec = PictureRecorder::new();
        let canvas = rec.begin_recording(CULL, None);
        canvas.save();
        canvas.translate(5.0, 5.0);
        canvas.restore();
        let picture = rec.finish_recording_as_picture();
        assert_eq!(picture.approximate_op_count(false), 0);
    }

    #[test]
    fn open_saves_are_closed() {
        let mut rec = PictureRecorder::new();
        let options = RecorderOptions {
            optimize: false,
            mini_recorder: false,
            ..RecorderOptions::default()
        };
        let canvas = rec.begin_recording_with(CULL, None, options);
        canvas.save_layer(&SaveLayerRec::default());
        canvas.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::default());
        let picture = rec.finish_recording_as_picture();
        let kinds: Vec<OpKind> = picture.record().unwrap().iter().map(Op::kind).collect();
        assert_eq!(
            kinds,
            [OpKind::SaveLayer, OpKind::DrawRect, OpKind::Restore]
        );
    }

    #[test]
    fn drawables_are_snapshotted() {
        let mut rec = PictureRecorder::new();
        let square: Arc<dyn Drawable> = Arc::new(Square(Color::WHITE));
        let canvas = rec.begin_recording(CULL, None);
        canvas.draw_drawable(&square, None);
        canvas.draw_drawable(&square, Some(kurbo::Affine::translate((20.0, 0.0))));
        let picture = rec.finish_recording_as_picture();
        assert_eq!(picture.drawable_pictures().len(), 2);
        assert_eq!(picture.drawable_pictures()[0].approximate_op_count(false), 2);
        assert_eq!(
            picture.record().unwrap().get(1),
            Some(&Op::DrawDrawable {
                index: 1,
                matrix: Some(kurbo::Affine::translate((20.0, 0.0))),
                bounds: Rect::new(20.0, 0.0, 30.0, 10.0),
            })
        );
    }

    #[test]
    fn recorded_drawable_snapshots_share_the_log() {
        let mut rec = PictureRecorder::new();
        let canvas = rec.begin_recording(CULL, None);
        canvas.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::default());
        canvas.draw_oval(Rect::new(0.0, 0.0, 1.0, 1.0), &Paint::default());
        let drawable = rec.finish_recording_as_drawable().unwrap();
        assert_eq!(drawable.record().count(), 2);
        let picture = drawable.snapshot();
        assert_eq!(picture.approximate_op_count(false), 2);
        assert_eq!(picture.cull_rect(), CULL);
        assert!(rec.finish_recording_as_drawable().is_none());
    }

    #[test]
    fn finishing_twice_gives_empty_picture() {
        let mut rec = PictureRecorder::new();
        assert!(rec.finish_recording_as_picture().is_empty());
    }
}
