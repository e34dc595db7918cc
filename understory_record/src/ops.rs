// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The closed set of recorded operations.
//!
//! Every [`Op`] has a fieldless [`OpKind`], and every kind declares its
//! classification at compile time through [`OpKind::tags`].

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::mem::size_of;

use kurbo::{Affine, PathEl, Point, Rect, RoundedRect};
use peniko::{BlendMode, Brush, Color, ImageSampler};

use crate::geom::{Path, Region};
use crate::paint::{ImageFilter, Paint};
use crate::picture::Picture;
use crate::resources::{Image, TextBlob, Vertices};

/// How a clip combines with the current clip.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClipOp {
    /// Keep only the area inside the new shape.
    #[default]
    Intersect,
    /// Remove the area inside the new shape.
    Difference,
}

/// How [`Op::DrawPoints`] interprets its points.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PointMode {
    /// Each point on its own.
    #[default]
    Points,
    /// Pairs of points form segments.
    Lines,
    /// Consecutive points form a polyline.
    Polygon,
}

/// Whether image-rect sampling may read outside `src`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SrcRectConstraint {
    /// Sample only inside `src`.
    Strict,
    /// Filtering may read slightly outside `src`.
    #[default]
    Fast,
}

bitflags::bitflags! {
    /// Options for [`Op::SaveLayer`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SaveLayerFlags: u8 {
        /// Start the layer with a copy of the content beneath it.
        const INIT_WITH_PREVIOUS = 1 << 0;
        /// Request a half-float layer.
        const F16_COLOR_TYPE = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Compile-time classification of an [`OpKind`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct OpTags: u8 {
        /// Produces pixels.
        const DRAW = 1 << 0;
        /// Carries a paint (possibly optional).
        const HAS_PAINT = 1 << 1;
        /// May overlap itself, so its paint alpha cannot be pulled out into a layer.
        const MULTI_DRAW = 1 << 2;
        /// References an image.
        const HAS_IMAGE = 1 << 3;
        /// Draws glyphs.
        const HAS_TEXT = 1 << 4;
        /// Opens a save block closed by a restore.
        const SAVE = 1 << 5;
    }
}

/// Kind tag of an [`Op`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[expect(missing_docs, reason = "each kind mirrors the Op variant of the same name")]
pub enum OpKind {
    NoOp,
    Flush,
    Save,
    SaveLayer,
    SaveBehind,
    Restore,
    SetMatrix,
    Concat,
    Translate,
    Scale,
    ClipRect,
    ClipRRect,
    ClipPath,
    ClipRegion,
    ClipShader,
    ResetClip,
    DrawPaint,
    DrawBehind,
    DrawRect,
    DrawOval,
    DrawArc,
    DrawRRect,
    DrawDRRect,
    DrawRegion,
    DrawPath,
    DrawPoints,
    DrawImage,
    DrawImageRect,
    DrawTextBlob,
    DrawPicture,
    DrawDrawable,
    DrawVertices,
    DrawPatch,
    DrawAnnotation,
}

const PAINTED_DRAW: OpTags = OpTags::DRAW.union(OpTags::HAS_PAINT);

impl OpKind {
    /// Classification of this kind.
    pub const fn tags(self) -> OpTags {
        match self {
            Self::NoOp
            | Self::Flush
            | Self::Restore
            | Self::SetMatrix
            | Self::Concat
            | Self::Translate
            | Self::Scale
            | Self::ClipRect
            | Self::ClipRRect
            | Self::ClipPath
            | Self::ClipRegion
            | Self::ClipShader
            | Self::ResetClip => OpTags::empty(),
            Self::Save | Self::SaveBehind => OpTags::SAVE,
            Self::SaveLayer => OpTags::SAVE.union(OpTags::HAS_PAINT),
            Self::DrawPaint
            | Self::DrawBehind
            | Self::DrawRect
            | Self::DrawOval
            | Self::DrawArc
            | Self::DrawRRect
            | Self::DrawDRRect
            | Self::DrawRegion
            | Self::DrawPath
            | Self::DrawPicture => PAINTED_DRAW,
            Self::DrawPoints | Self::DrawVertices | Self::DrawPatch => {
                PAINTED_DRAW.union(OpTags::MULTI_DRAW)
            }
            Self::DrawImage | Self::DrawImageRect => PAINTED_DRAW.union(OpTags::HAS_IMAGE),
            Self::DrawTextBlob => PAINTED_DRAW
                .union(OpTags::HAS_TEXT)
                .union(OpTags::MULTI_DRAW),
            Self::DrawDrawable => OpTags::DRAW.union(OpTags::MULTI_DRAW),
            Self::DrawAnnotation => OpTags::DRAW,
        }
    }

    /// Returns `true` if this kind produces pixels.
    pub const fn is_draw(self) -> bool {
        self.tags().contains(OpTags::DRAW)
    }

    /// Returns `true` for `Save`, `SaveLayer` and `SaveBehind`.
    pub const fn is_save(self) -> bool {
        self.tags().contains(OpTags::SAVE)
    }

    /// Returns `true` for ops that only change the matrix or clip.
    pub const fn is_state_only(self) -> bool {
        matches!(
            self,
            Self::NoOp
                | Self::SetMatrix
                | Self::Concat
                | Self::Translate
                | Self::Scale
                | Self::ClipRect
                | Self::ClipRRect
                | Self::ClipPath
                | Self::ClipRegion
                | Self::ClipShader
                | Self::ResetClip
        )
    }
}

/// One recorded operation with its owned payload.
///
/// Geometry is in the local space active when the op was recorded.
#[derive(Clone, Debug, PartialEq)]
#[expect(missing_docs, reason = "payload fields mirror the Canvas call arguments")]
pub enum Op {
    /// Placeholder left behind by the optimizer; removed by [`Record::defrag`](crate::Record::defrag).
    NoOp,
    /// Ask the surface to submit pending work.
    Flush,
    /// Push matrix and clip.
    Save,
    /// Push matrix and clip and start an offscreen layer.
    SaveLayer {
        bounds: Option<Rect>,
        paint: Option<Paint>,
        backdrop: Option<ImageFilter>,
        flags: SaveLayerFlags,
    },
    /// Save the content under `subset` so it can be drawn behind later content.
    SaveBehind { subset: Option<Rect> },
    /// Pop one save; `matrix` is the matrix in effect after the pop.
    Restore { matrix: Affine },
    /// Replace the matrix, relative to the matrix the recording started with.
    SetMatrix { matrix: Affine },
    Concat { matrix: Affine },
    Translate { dx: f64, dy: f64 },
    Scale { sx: f64, sy: f64 },
    ClipRect {
        rect: Rect,
        op: ClipOp,
        anti_alias: bool,
    },
    ClipRRect {
        rrect: RoundedRect,
        op: ClipOp,
        anti_alias: bool,
    },
    ClipPath {
        path: Path,
        op: ClipOp,
        anti_alias: bool,
    },
    ClipRegion { region: Region, op: ClipOp },
    ClipShader { shader: Brush, op: ClipOp },
    ResetClip,
    /// Fill the whole clip.
    DrawPaint { paint: Paint },
    /// Fill the clip, drawing behind content since the innermost `SaveBehind`.
    DrawBehind { paint: Paint },
    DrawRect { rect: Rect, paint: Paint },
    DrawOval { oval: Rect, paint: Paint },
    /// Angles are in degrees.
    DrawArc {
        oval: Rect,
        start_angle: f64,
        sweep_angle: f64,
        use_center: bool,
        paint: Paint,
    },
    DrawRRect { rrect: RoundedRect, paint: Paint },
    DrawDRRect {
        outer: RoundedRect,
        inner: RoundedRect,
        paint: Paint,
    },
    DrawRegion { region: Region, paint: Paint },
    DrawPath { path: Path, paint: Paint },
    DrawPoints {
        mode: PointMode,
        points: Box<[Point]>,
        paint: Paint,
    },
    DrawImage {
        image: Image,
        x: f64,
        y: f64,
        sampler: ImageSampler,
        paint: Option<Paint>,
    },
    DrawImageRect {
        image: Image,
        src: Rect,
        dst: Rect,
        sampler: ImageSampler,
        paint: Option<Paint>,
        constraint: SrcRectConstraint,
    },
    DrawTextBlob {
        blob: TextBlob,
        x: f64,
        y: f64,
        paint: Paint,
    },
    DrawPicture {
        picture: Picture,
        matrix: Affine,
        paint: Option<Paint>,
    },
    /// `index` refers into the recorder's drawable list (or its snapshots);
    /// `bounds` is the drawable's bounds mapped by `matrix` at record time.
    DrawDrawable {
        index: usize,
        matrix: Option<Affine>,
        bounds: Rect,
    },
    DrawVertices {
        vertices: Vertices,
        blend: BlendMode,
        paint: Paint,
    },
    /// Coons patch: four cubics, clockwise from the top-left corner.
    DrawPatch {
        cubics: Box<[Point; 12]>,
        colors: Option<[Color; 4]>,
        tex_coords: Option<[Point; 4]>,
        blend: BlendMode,
        paint: Paint,
    },
    /// Attach metadata to a rectangle; draws no pixels itself.
    DrawAnnotation {
        rect: Rect,
        key: Box<str>,
        value: Option<Arc<[u8]>>,
    },
}

impl Op {
    /// The kind tag of this op.
    pub const fn kind(&self) -> OpKind {
        match self {
            Self::NoOp => OpKind::NoOp,
            Self::Flush => OpKind::Flush,
            Self::Save => OpKind::Save,
            Self::SaveLayer { .. } => OpKind::SaveLayer,
            Self::SaveBehind { .. } => OpKind::SaveBehind,
            Self::Restore { .. } => OpKind::Restore,
            Self::SetMatrix { .. } => OpKind::SetMatrix,
            Self::Concat { .. } => OpKind::Concat,
            Self::Translate { .. } => OpKind::Translate,
            Self::Scale { .. } => OpKind::Scale,
            Self::ClipRect { .. } => OpKind::ClipRect,
            Self::ClipRRect { .. } => OpKind::ClipRRect,
            Self::ClipPath { .. } => OpKind::ClipPath,
            Self::ClipRegion { .. } => OpKind::ClipRegion,
            Self::ClipShader { .. } => OpKind::ClipShader,
            Self::ResetClip => OpKind::ResetClip,
            Self::DrawPaint { .. } => OpKind::DrawPaint,
            Self::DrawBehind { .. } => OpKind::DrawBehind,
            Self::DrawRect { .. } => OpKind::DrawRect,
            Self::DrawOval { .. } => OpKind::DrawOval,
            Self::DrawArc { .. } => OpKind::DrawArc,
            Self::DrawRRect { .. } => OpKind::DrawRRect,
            Self::DrawDRRect { .. } => OpKind::DrawDRRect,
            Self::DrawRegion { .. } => OpKind::DrawRegion,
            Self::DrawPath { .. } => OpKind::DrawPath,
            Self::DrawPoints { .. } => OpKind::DrawPoints,
            Self::DrawImage { .. } => OpKind::DrawImage,
            Self::DrawImageRect { .. } => OpKind::DrawImageRect,
            Self::DrawTextBlob { .. } => OpKind::DrawTextBlob,
            Self::DrawPicture { .. } => OpKind::DrawPicture,
            Self::DrawDrawable { .. } => OpKind::DrawDrawable,
            Self::DrawVertices { .. } => OpKind::DrawVertices,
            Self::DrawPatch { .. } => OpKind::DrawPatch,
            Self::DrawAnnotation { .. } => OpKind::DrawAnnotation,
        }
    }

    /// Shorthand for `self.kind().tags()`.
    pub const fn tags(&self) -> OpTags {
        self.kind().tags()
    }

    /// Shorthand for `self.kind().is_draw()`.
    pub const fn is_draw(&self) -> bool {
        self.kind().is_draw()
    }

    /// The op's paint, if it has one.
    pub fn paint(&self) -> Option<&Paint> {
        match self {
            Self::DrawPaint { paint }
            | Self::DrawBehind { paint }
            | Self::DrawRect { paint, .. }
            | Self::DrawOval { paint, .. }
            | Self::DrawArc { paint, .. }
            | Self::DrawRRect { paint, .. }
            | Self::DrawDRRect { paint, .. }
            | Self::DrawRegion { paint, .. }
            | Self::DrawPath { paint, .. }
            | Self::DrawPoints { paint, .. }
            | Self::DrawTextBlob { paint, .. }
            | Self::DrawVertices { paint, .. }
            | Self::DrawPatch { paint, .. } => Some(paint),
            Self::SaveLayer { paint, .. }
            | Self::DrawImage { paint, .. }
            | Self::DrawImageRect { paint, .. }
            | Self::DrawPicture { paint, .. } => paint.as_ref(),
            _ => None,
        }
    }

    /// Mutable access to the op's paint, if it has one.
    pub fn paint_mut(&mut self) -> Option<&mut Paint> {
        match self {
            Self::DrawPaint { paint }
            | Self::DrawBehind { paint }
            | Self::DrawRect { paint, .. }
            | Self::DrawOval { paint, .. }
            | Self::DrawArc { paint, .. }
            | Self::DrawRRect { paint, .. }
            | Self::DrawDRRect { paint, .. }
            | Self::DrawRegion { paint, .. }
            | Self::DrawPath { paint, .. }
            | Self::DrawPoints { paint, .. }
            | Self::DrawTextBlob { paint, .. }
            | Self::DrawVertices { paint, .. }
            | Self::DrawPatch { paint, .. } => Some(paint),
            Self::SaveLayer { paint, .. }
            | Self::DrawImage { paint, .. }
            | Self::DrawImageRect { paint, .. }
            | Self::DrawPicture { paint, .. } => paint.as_mut(),
            _ => None,
        }
    }

    /// The paint slot of ops whose paint is optional.
    pub(crate) fn optional_paint_slot(&mut self) -> Option<&mut Option<Paint>> {
        match self {
            Self::SaveLayer { paint, .. }
            | Self::DrawImage { paint, .. }
            | Self::DrawImageRect { paint, .. }
            | Self::DrawPicture { paint, .. } => Some(paint),
            _ => None,
        }
    }

    /// Bytes owned by the payload outside the op itself.
    ///
    /// Shared resources (images, blobs, vertices, pictures) are not counted.
    pub fn heap_bytes(&self) -> usize {
        match self {
            Self::ClipPath { path, .. } | Self::DrawPath { path, .. } => {
                path.geometry.elements().len() * size_of::<PathEl>()
            }
            Self::ClipRegion { region, .. } | Self::DrawRegion { region, .. } => {
                region.rects().len() * size_of::<Rect>()
            }
            Self::DrawPoints { points, .. } => points.len() * size_of::<Point>(),
            Self::DrawPatch { .. } => size_of::<[Point; 12]>(),
            Self::DrawAnnotation { key, value, .. } => {
                key.len() + value.as_ref().map_or(0, |v| v.len())
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_classify_kinds() {
        assert!(OpKind::DrawRect.is_draw());
        assert!(!OpKind::Restore.is_draw());
        assert!(OpKind::SaveLayer.is_save());
        assert!(OpKind::SaveLayer.tags().contains(OpTags::HAS_PAINT));
        assert!(OpKind::DrawTextBlob.tags().contains(OpTags::MULTI_DRAW));
        assert!(!OpKind::DrawRect.tags().contains(OpTags::MULTI_DRAW));
        assert!(OpKind::ClipRect.is_state_only());
        assert!(!OpKind::Flush.is_state_only());
        assert!(!OpKind::DrawAnnotation.is_state_only());
    }

    #[test]
    fn paint_accessors_cover_optional_paints() {
        let mut op = Op::SaveLayer {
            bounds: None,
            paint: None,
            backdrop: None,
            flags: SaveLayerFlags::empty(),
        };
        assert!(op.paint().is_none());
        *op.optional_paint_slot().unwrap() = Some(Paint::with_alpha(0.5));
        assert_eq!(op.paint().map(Paint::alpha), Some(0.5));

        let mut rect = Op::DrawRect {
            rect: Rect::new(0.0, 0.0, 1.0, 1.0),
            paint: Paint::default(),
        };
        rect.paint_mut().unwrap().anti_alias = true;
        assert!(rect.paint().unwrap().anti_alias);
        assert!(rect.optional_paint_slot().is_none());
    }

    #[test]
    fn heap_bytes_counts_owned_arrays() {
        let op = Op::DrawPoints {
            mode: PointMode::Points,
            points: alloc::vec![Point::ZERO; 4].into_boxed_slice(),
            paint: Paint::default(),
        };
        assert_eq!(op.heap_bytes(), 4 * size_of::<Point>());
        assert_eq!(Op::Save.heap_bytes(), 0);
    }
}
