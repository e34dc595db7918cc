// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Record: deferred drawing as an inspectable, replayable log.
//!
//! Drawing calls made against a [`Recorder`] (a [`Canvas`]) are captured as
//! [`Op`] values in a [`Record`]. A finished recording becomes an immutable,
//! shareable [`Picture`] that can be replayed into any other [`Canvas`], possibly
//! from several threads at once.
//!
//! # Pipeline
//!
//! - **Record**: [`Recorder`] appends exactly one op per call, copying arrays and
//!   retaining shared resources ([`Image`], [`TextBlob`], [`Vertices`],
//!   [`Picture`], [`Drawable`]) by reference count. A lone simple draw is parked in
//!   a [`MiniRecorder`] so one-shape pictures need no log at all.
//! - **Optimize**: [`optimize`] rewrites a few save/layer shapes into cheaper
//!   equivalents (empty save blocks vanish, single-draw alpha layers fold their
//!   alpha into the draw) and then compacts the log.
//! - **Bound**: [`fill_bounds`] computes a conservative rectangle per op, with
//!   control ops covering the draws they scope.
//! - **Index**: a [`Bbh`] built by a [`BbhFactory`] ([`RTreeFactory`],
//!   [`GridFactory`]) stores those rectangles.
//! - **Replay**: [`draw_record`] walks the log, or only the ops the index finds
//!   under the target's local clip bounds, and leaves the target's save stack as
//!   it found it, even when an [`AbortCallback`] stops the replay early.
//!
//! [`PictureRecorder`] ties the stages together:
//!
//! ```
//! use kurbo::Rect;
//! use understory_record::{Canvas, Paint, PictureRecorder, SaveLayerRec};
//!
//! let mut recorder = PictureRecorder::new();
//! let canvas = recorder.begin_recording(Rect::new(0.0, 0.0, 64.0, 64.0), None);
//! let fade = Paint::with_alpha(0.5);
//! canvas.save_layer(&SaveLayerRec::new(None, Some(&fade)));
//! canvas.draw_rect(Rect::new(8.0, 8.0, 24.0, 24.0), &Paint::default());
//! canvas.restore();
//! let picture = recorder.finish_recording_as_picture();
//!
//! // The layer was folded into the draw.
//! assert_eq!(picture.approximate_op_count(false), 1);
//! ```
//!
//! Diagnostics go through the `log` facade: optimizer summaries at `debug`,
//! replay aborts at `trace`, and ignored unbalanced restores at `warn`.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod bbh;
mod bounds;
mod canvas;
mod draw;
mod geom;
mod mini_recorder;
mod ops;
mod opts;
mod paint;
mod picture;
mod picture_recorder;
mod record;
mod recorder;
mod resources;

pub use peniko::{
    BlendMode, Brush, Color, Fill as FillRule, ImageAlphaType, ImageFormat, ImageSampler,
};

pub use bbh::{Bbh, BbhFactory, GridFactory, IndexBbh, RTreeFactory};
pub use bounds::{OpMetadata, RecordBounds, fill_bounds};
pub use canvas::{Canvas, MatrixClipStack, SaveLayerRec, draw_drawable_inline, playback_picture};
pub use draw::{AbortCallback, Draw, draw_record, draw_record_partial};
pub use geom::{
    EMPTY_RECT, LARGEST_RECT, Path, Region, intersect_rect, rect_is_empty, rects_overlap,
    union_rect,
};
pub use mini_recorder::MiniRecorder;
pub use ops::{ClipOp, Op, OpKind, OpTags, PointMode, SaveLayerFlags, SrcRectConstraint};
pub use opts::{OptimizePass, OptimizeTrace, RewriteLog, optimize, optimize_with_trace};
pub use paint::{ColorFilter, ImageFilter, MaskFilter, Paint, PaintStyle};
pub use picture::Picture;
pub use picture_recorder::{PictureRecorder, RecordedDrawable};
pub use record::Record;
pub use recorder::{DrawPictureMode, RecordFlags, Recorder, RecorderOptions};
pub use resources::{Drawable, Image, TextBlob, VertexMode, Vertices};
