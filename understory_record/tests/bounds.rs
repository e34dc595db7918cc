// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounds computed for a realistic recording stay consistent with its structure.

use kurbo::{Affine, BezPath, Rect, RoundedRect};
use understory_record::{
    Canvas, ClipOp, Color, EMPTY_RECT, Op, Paint, Path, PictureRecorder, RTreeFactory, Record,
    Recorder, RecorderOptions, SaveLayerRec, fill_bounds, rect_is_empty, rects_overlap,
    union_rect,
};

const CULL: Rect = Rect::new(0.0, 0.0, 200.0, 200.0);

fn scene(canvas: &mut dyn Canvas) {
    let paint = Paint::new(Color::from_rgba8(20, 40, 200, 255));
    canvas.draw_rect(Rect::new(5.0, 5.0, 25.0, 25.0), &paint);
    canvas.save();
    canvas.translate(50.0, 10.0);
    canvas.clip_rect(Rect::new(0.0, 0.0, 60.0, 60.0), ClipOp::Intersect, false);
    canvas.draw_oval(Rect::new(10.0, 10.0, 30.0, 20.0), &paint);
    canvas.save_layer(&SaveLayerRec::new(None, Some(&Paint::with_alpha(0.5))));
    canvas.scale(2.0, 2.0);
    canvas.draw_rrect(
        RoundedRect::new(1.0, 1.0, 9.0, 9.0, 2.0),
        &Paint::stroked(Color::BLACK, 1.0),
    );
    canvas.restore();
    canvas.restore();
    canvas.save();
    canvas.concat(Affine::rotate(0.5).then_translate((120.0, 120.0).into()));
    let mut triangle = BezPath::new();
    triangle.move_to((0.0, 0.0));
    triangle.line_to((30.0, 0.0));
    triangle.line_to((0.0, 30.0));
    triangle.close_path();
    canvas.draw_path(&Path::new(triangle), &paint);
    canvas.restore();
    canvas.draw_rect(Rect::new(150.0, 20.0, 190.0, 40.0), &paint);
}

fn recorded_scene() -> Record {
    let options = RecorderOptions {
        mini_recorder: false,
        ..RecorderOptions::default()
    };
    let mut recorder = Recorder::with_options(CULL, &options);
    scene(&mut recorder);
    recorder.detach_record().expect("recorder not detached")
}

fn contains(outer: Rect, inner: Rect) -> bool {
    rect_is_empty(&inner)
        || (inner.x0 >= outer.x0
            && inner.y0 >= outer.y0
            && inner.x1 <= outer.x1
            && inner.y1 <= outer.y1)
}

fn matching_restore(record: &Record, save: usize) -> usize {
    let mut depth = 0;
    for (i, op) in record.iter().enumerate().skip(save) {
        if op.kind().is_save() {
            depth += 1;
        } else if matches!(op, Op::Restore { .. }) {
            depth -= 1;
            if depth == 0 {
                return i;
            }
        }
    }
    panic!("unbalanced save at {save}");
}

#[test]
fn every_bound_lies_inside_the_cull() {
    let record = recorded_scene();
    let bounds = fill_bounds(CULL, &record);
    assert_eq!(bounds.rects.len(), record.count());
    for (i, rect) in bounds.rects.iter().enumerate() {
        assert!(contains(CULL, *rect), "op {i} escapes the cull: {rect:?}");
    }
}

#[test]
fn save_blocks_cover_exactly_their_draws() {
    let record = recorded_scene();
    let bounds = fill_bounds(CULL, &record);
    let mut blocks = 0;
    for (i, op) in record.iter().enumerate() {
        if !op.kind().is_save() {
            continue;
        }
        let restore = matching_restore(&record, i);
        let draws = (i + 1..restore)
            .filter(|&k| bounds.metadata[k].is_draw)
            .fold(EMPTY_RECT, |acc, k| union_rect(acc, bounds.rects[k]));
        assert_eq!(bounds.rects[restore], draws, "block {i}..={restore}");
        assert_eq!(bounds.rects[i], draws, "block {i}..={restore}");
        for k in i + 1..restore {
            assert!(contains(draws, bounds.rects[k]), "op {k} escapes its block");
        }
        blocks += 1;
    }
    assert_eq!(blocks, 3);
}

#[test]
fn index_returns_every_overlapping_op() {
    let mut recorder = PictureRecorder::new();
    scene(recorder.begin_recording(CULL, Some(&RTreeFactory)));
    let picture = recorder.finish_recording_as_picture();
    let record = picture.record().expect("log-backed picture");
    let bbh = picture.bbh().expect("indexed picture");
    let bounds = fill_bounds(CULL, record);

    for query in [
        Rect::new(0.0, 0.0, 30.0, 30.0),
        Rect::new(55.0, 15.0, 70.0, 40.0),
        Rect::new(100.0, 100.0, 200.0, 200.0),
        Rect::new(0.0, 100.0, 50.0, 200.0),
    ] {
        let mut hits = Vec::new();
        bbh.search(query, &mut hits);
        for (i, rect) in bounds.rects.iter().enumerate() {
            if rects_overlap(rect, &query) {
                assert!(hits.contains(&i), "op {i} at {rect:?} missed by {query:?}");
            }
        }
    }
}

#[test]
fn picture_cull_shrinks_to_its_content() {
    let mut recorder = PictureRecorder::new();
    scene(recorder.begin_recording(CULL, Some(&RTreeFactory)));
    let picture = recorder.finish_recording_as_picture();
    let cull = picture.cull_rect();
    assert!(contains(CULL, cull));
    assert_eq!(cull.x0, 5.0);
    assert_eq!(cull.y0, 5.0);
    assert_eq!(cull.x1, 190.0);
}
