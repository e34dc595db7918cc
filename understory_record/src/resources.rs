// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference-counted resources retained (not copied) by recorded ops.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt::Debug;

use kurbo::{Point, Rect};
use peniko::{Color, ImageAlphaType, ImageFormat};

use crate::canvas::Canvas;
use crate::geom::{EMPTY_RECT, points_bounds};
use crate::picture::Picture;
use crate::picture_recorder::PictureRecorder;

#[derive(Debug, PartialEq)]
struct ImageInner {
    width: u32,
    height: u32,
    format: ImageFormat,
    alpha_type: ImageAlphaType,
    data: Box<[u8]>,
}

/// A decoded, immutable raster image.
///
/// Cloning shares the pixel buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    inner: Arc<ImageInner>,
}

impl Image {
    /// Wrap decoded pixels.
    pub fn new(
        width: u32,
        height: u32,
        format: ImageFormat,
        alpha_type: ImageAlphaType,
        data: impl Into<Box<[u8]>>,
    ) -> Self {
        Self {
            inner: Arc::new(ImageInner {
                width,
                height,
                format,
                alpha_type,
                data: data.into(),
            }),
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Pixel format.
    pub fn format(&self) -> ImageFormat {
        self.inner.format
    }

    /// Alpha encoding of the pixels.
    pub fn alpha_type(&self) -> ImageAlphaType {
        self.inner.alpha_type
    }

    /// Raw pixel bytes.
    pub fn data(&self) -> &[u8] {
        &self.inner.data
    }

    /// `(0, 0, width, height)`.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width()), f64::from(self.height()))
    }

    /// Returns `true` if both handles share the same pixels.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Debug, PartialEq)]
struct TextBlobInner {
    glyphs: Box<[u16]>,
    positions: Box<[Point]>,
    font_size: f32,
    bounds: Rect,
}

/// A pre-shaped run of positioned glyphs.
///
/// Shaping and font handling happen elsewhere; the blob carries conservative bounds
/// relative to its origin.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBlob {
    inner: Arc<TextBlobInner>,
}

impl TextBlob {
    /// Build a blob. `positions` is truncated to the glyph count.
    pub fn new(glyphs: &[u16], positions: &[Point], font_size: f32, bounds: Rect) -> Self {
        let len = glyphs.len().min(positions.len());
        Self {
            inner: Arc::new(TextBlobInner {
                glyphs: glyphs[..len].into(),
                positions: positions[..len].into(),
                font_size,
                bounds: bounds.abs(),
            }),
        }
    }

    /// Glyph ids.
    pub fn glyphs(&self) -> &[u16] {
        &self.inner.glyphs
    }

    /// Glyph origins relative to the blob origin.
    pub fn positions(&self) -> &[Point] {
        &self.inner.positions
    }

    /// Font size the glyphs were shaped at.
    pub fn font_size(&self) -> f32 {
        self.inner.font_size
    }

    /// Conservative ink bounds relative to the blob origin.
    pub fn bounds(&self) -> Rect {
        self.inner.bounds
    }
}

/// Triangle topology for [`Vertices`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum VertexMode {
    /// Independent triangles.
    #[default]
    Triangles,
    /// Triangle strip.
    TriangleStrip,
    /// Triangle fan.
    TriangleFan,
}

#[derive(Debug, PartialEq)]
struct VerticesInner {
    mode: VertexMode,
    positions: Box<[Point]>,
    tex_coords: Option<Box<[Point]>>,
    colors: Option<Box<[Color]>>,
    indices: Option<Box<[u16]>>,
    bounds: Rect,
}

/// An immutable triangle mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct Vertices {
    inner: Arc<VerticesInner>,
}

impl Vertices {
    /// Build a mesh. Per-vertex arrays whose length differs from `positions` are dropped.
    pub fn new(
        mode: VertexMode,
        positions: &[Point],
        tex_coords: Option<&[Point]>,
        colors: Option<&[Color]>,
        indices: Option<&[u16]>,
    ) -> Self {
        let n = positions.len();
        Self {
            inner: Arc::new(VerticesInner {
                mode,
                positions: positions.into(),
                tex_coords: tex_coords.filter(|t| t.len() == n).map(Into::into),
                colors: colors.filter(|c| c.len() == n).map(Into::into),
                indices: indices.map(Into::into),
                bounds: points_bounds(positions).unwrap_or(EMPTY_RECT),
            }),
        }
    }

    /// Triangle topology.
    pub fn mode(&self) -> VertexMode {
        self.inner.mode
    }

    /// Vertex positions.
    pub fn positions(&self) -> &[Point] {
        &self.inner.positions
    }

    /// Optional texture coordinates.
    pub fn tex_coords(&self) -> Option<&[Point]> {
        self.inner.tex_coords.as_deref()
    }

    /// Optional per-vertex colors.
    pub fn colors(&self) -> Option<&[Color]> {
        self.inner.colors.as_deref()
    }

    /// Optional index buffer.
    pub fn indices(&self) -> Option<&[u16]> {
        self.inner.indices.as_deref()
    }

    /// Bounds of the positions.
    pub fn bounds(&self) -> Rect {
        self.inner.bounds
    }
}

/// Content that draws itself on demand and may change between draws.
///
/// Recording a drawable keeps a live reference; finishing a recording as a
/// [`Picture`] freezes each drawable into a snapshot.
pub trait Drawable: Debug + Send + Sync {
    /// Conservative bounds of everything [`Drawable::draw`] may touch, in local units.
    fn bounds(&self) -> Rect;

    /// Issue the drawable's current content to `canvas`.
    fn draw(&self, canvas: &mut dyn Canvas);

    /// Freeze the current content into a picture.
    fn snapshot(&self) -> Picture {
        let mut recorder = PictureRecorder::new();
        self.draw(recorder.begin_recording(self.bounds(), None));
        recorder.finish_recording_as_picture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_blob_truncates_positions() {
        let blob = TextBlob::new(
            &[1, 2],
            &[Point::ZERO, Point::new(5.0, 0.0), Point::new(9.0, 0.0)],
            12.0,
            Rect::new(10.0, 0.0, 0.0, -12.0),
        );
        assert_eq!(blob.positions().len(), 2);
        assert_eq!(blob.bounds(), Rect::new(0.0, -12.0, 10.0, 0.0));
    }

    #[test]
    fn vertices_drop_mismatched_arrays() {
        let v = Vertices::new(
            VertexMode::Triangles,
            &[Point::ZERO, Point::new(4.0, 0.0), Point::new(0.0, 3.0)],
            Some(&[Point::ZERO]),
            None,
            None,
        );
        assert!(v.tex_coords().is_none());
        assert_eq!(v.bounds(), Rect::new(0.0, 0.0, 4.0, 3.0));
    }

    #[test]
    fn images_share_pixels() {
        let a = Image::new(
            1,
            1,
            ImageFormat::Rgba8,
            ImageAlphaType::Alpha,
            [0_u8, 0, 0, 255],
        );
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(b.bounds(), Rect::new(0.0, 0.0, 1.0, 1.0));
    }
}
