// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use kurbo::{
    Affine, BezPath, Ellipse, Point, Rect, RoundedRect, Shape, Stroke, StrokeOpts, Vec2,
};
use peniko::{Compose, ImageAlphaType};
use understory_record::{
    BlendMode, Brush, Canvas, ClipOp, Color, Drawable, EMPTY_RECT, Image, ImageSampler,
    MatrixClipStack, Paint, PaintStyle, Path, Picture, PointMode, Region, SaveLayerFlags,
    SaveLayerRec, SrcRectConstraint, TextBlob, Vertices, draw_drawable_inline, intersect_rect,
    playback_picture, rect_is_empty, union_rect,
};

const TOLERANCE: f64 = 0.05;

/// Premultiplied RGBA.
pub type Pixel = [f32; 4];

#[derive(Clone, Debug)]
enum ClipShape {
    Rect(Rect),
    RRect(RoundedRect),
    Path(Path),
    DeviceRegion(Region),
}

#[derive(Clone, Debug)]
struct Clip {
    // Device to local; `None` when the matrix was singular.
    inverse: Option<Affine>,
    shape: ClipShape,
    op: ClipOp,
}

impl Clip {
    fn contains(&self, device: Point) -> bool {
        let inside = match &self.shape {
            ClipShape::DeviceRegion(region) => region.contains(device),
            shape => self.inverse.is_some_and(|inverse| {
                let p = inverse * device;
                match shape {
                    ClipShape::Rect(rect) => rect.abs().contains(p),
                    ClipShape::RRect(rrect) => rrect.contains(p),
                    ClipShape::Path(path) => path.contains(p),
                    ClipShape::DeviceRegion(_) => false,
                }
            }),
        };
        match self.op {
            ClipOp::Intersect => inside,
            ClipOp::Difference => !inside,
        }
    }
}

#[derive(Debug)]
struct Layer {
    pixels: Vec<Pixel>,
    paint: Option<Paint>,
}

#[derive(Debug, Default)]
struct Level {
    clips: Vec<Clip>,
    layer: Option<Layer>,
}

/// A tiny software rasterizer implementing [`Canvas`].
///
/// Coverage is binary and sampled at pixel centers, so two ways of drawing the
/// same thing produce identical pixels up to float rounding. Clips are exact per
/// pixel. Layers composite back with their paint's alpha and blend mode.
///
/// Fills, strokes, paths, regions, arcs, points and nearest-sampled RGBA8 images are
/// rasterized. Shaders other than solid colors use the paint color, filters are
/// ignored, and text, vertices, patches and annotations draw nothing. Blend modes
/// other than `Clear`, `Copy`, `Dest` and `DestOver` composite as source-over.
#[derive(Debug)]
pub struct RasterCanvas {
    width: u32,
    height: u32,
    base: Vec<Pixel>,
    mc: MatrixClipStack,
    levels: Vec<Level>,
}

fn invert(m: Affine) -> Option<Affine> {
    let det = m.determinant();
    (det != 0.0 && det.is_finite()).then(|| m.inverse())
}

fn premultiply(color: Color) -> Pixel {
    let [r, g, b, a] = color.components;
    [r * a, g * a, b * a, a]
}

fn scale(px: Pixel, s: f32) -> Pixel {
    [px[0] * s, px[1] * s, px[2] * s, px[3] * s]
}

fn composite(dst: &mut Pixel, src: Pixel, compose: Compose) {
    match compose {
        Compose::Clear => *dst = [0.0; 4],
        Compose::Copy => *dst = src,
        Compose::Dest => {}
        Compose::DestOver => {
            let k = 1.0 - dst[3];
            for i in 0..4 {
                dst[i] += src[i] * k;
            }
        }
        _ => {
            let k = 1.0 - src[3];
            for i in 0..4 {
                dst[i] = src[i] + dst[i] * k;
            }
        }
    }
}

fn paint_pixel(paint: &Paint) -> Pixel {
    let color = match &paint.shader {
        Some(Brush::Solid(c)) => c.multiply_alpha(paint.alpha()),
        _ => paint.color,
    };
    premultiply(color)
}

fn stroke_style(paint: &Paint) -> Stroke {
    let mut stroke = paint.stroke.clone();
    if stroke.width <= 0.0 {
        stroke.width = 1.0;
    }
    stroke
}

impl RasterCanvas {
    /// A transparent surface of `width` x `height` pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            base: vec![[0.0; 4]; width as usize * height as usize],
            mc: MatrixClipStack::new(Rect::new(0.0, 0.0, f64::from(width), f64::from(height))),
            levels: vec![Level::default()],
        }
    }

    /// Surface width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Surface height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The premultiplied pixel at `(x, y)` of the base surface.
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        self.base
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .unwrap_or_default()
    }

    /// The base surface as premultiplied 8-bit RGBA, row by row.
    pub fn to_rgba8(&self) -> Vec<[u8; 4]> {
        self.base
            .iter()
            .map(|px| px.map(|c| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8))
            .collect()
    }

    /// Largest per-channel difference between two surfaces of the same size.
    pub fn max_difference(&self, other: &Self) -> f32 {
        if self.width != other.width || self.height != other.height {
            return f32::INFINITY;
        }
        self.base
            .iter()
            .zip(&other.base)
            .flat_map(|(a, b)| a.iter().zip(b).map(|(x, y)| if x > y { x - y } else { y - x }))
            .fold(0.0, f32::max)
    }

    fn top_clips(&self) -> &[Clip] {
        self.levels.last().map_or(&[], |l| l.clips.as_slice())
    }

    fn push_clip(&mut self, shape: ClipShape, op: ClipOp) {
        let clip = Clip {
            inverse: invert(self.mc.matrix()),
            shape,
            op,
        };
        if let Some(level) = self.levels.last_mut() {
            level.clips.push(clip);
        }
    }

    fn target(&mut self) -> &mut Vec<Pixel> {
        match self.levels.iter_mut().rev().find_map(|l| l.layer.as_mut()) {
            Some(layer) => &mut layer.pixels,
            None => &mut self.base,
        }
    }

    fn device_rect_to_pixels(&self, device: Rect) -> Option<(usize, usize, usize, usize)> {
        let surface = Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height));
        let r = intersect_rect(intersect_rect(device, surface), self.mc.device_clip_bounds());
        if rect_is_empty(&r) {
            return None;
        }
        let r = r.expand();
        Some((r.x0 as usize, r.y0 as usize, r.x1 as usize, r.y1 as usize))
    }

    /// Composite `shade(local point)` into every clipped pixel of `device`.
    fn fill(&mut self, device: Rect, compose: Compose, shade: impl Fn(Point) -> Option<Pixel>) {
        let Some(inverse) = invert(self.mc.matrix()) else {
            return;
        };
        let Some((x0, y0, x1, y1)) = self.device_rect_to_pixels(device) else {
            return;
        };
        let mut hits = Vec::new();
        let clips = self.top_clips();
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if !clips.iter().all(|c| c.contains(center)) {
                    continue;
                }
                if let Some(src) = shade(inverse * center) {
                    hits.push((y * self.width as usize + x, src));
                }
            }
        }
        let target = self.target();
        for (i, src) in hits {
            if let Some(dst) = target.get_mut(i) {
                composite(dst, src, compose);
            }
        }
    }

    fn surface_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }

    fn draw_shape(&mut self, shape: &impl Shape, paint: &Paint) {
        let color = paint_pixel(paint);
        let compose = paint.blend.compose;
        let filled = paint.style != PaintStyle::Stroke;
        let outline = (paint.style != PaintStyle::Fill).then(|| {
            kurbo::stroke(
                shape.path_elements(TOLERANCE),
                &stroke_style(paint),
                &StrokeOpts::default(),
                TOLERANCE,
            )
        });
        let mut local = if filled {
            shape.bounding_box()
        } else {
            EMPTY_RECT
        };
        if let Some(outline) = &outline {
            local = union_rect(local, outline.bounding_box());
        }
        let device = self.mc.matrix().transform_rect_bbox(local);
        // Fill and stroke are one coverage, composited once.
        self.fill(device, compose, |p| {
            let covered = (filled && shape.contains(p))
                || outline.as_ref().is_some_and(|o| o.winding(p) != 0);
            covered.then_some(color)
        });
    }

    fn draw_sampled(
        &mut self,
        image: &Image,
        src: Rect,
        dst: Rect,
        paint: Option<&Paint>,
    ) {
        let dst = dst.abs();
        if rect_is_empty(&dst) || rect_is_empty(&src) {
            return;
        }
        let alpha = paint.map_or(1.0, Paint::alpha);
        let compose = paint.map_or(Compose::SrcOver, |p| p.blend.compose);
        let straight = matches!(image.alpha_type(), ImageAlphaType::Alpha);
        let (w, h) = (image.width() as usize, image.height() as usize);
        let data = image.data();
        let sx = src.width() / dst.width();
        let sy = src.height() / dst.height();
        let device = self.mc.matrix().transform_rect_bbox(dst);
        self.fill(device, compose, |p| {
            if !dst.contains(p) {
                return None;
            }
            let u = src.x0 + (p.x - dst.x0) * sx;
            let v = src.y0 + (p.y - dst.y0) * sy;
            if u < 0.0 || v < 0.0 {
                return None;
            }
            let (tx, ty) = (u as usize, v as usize);
            if tx >= w || ty >= h {
                return None;
            }
            let i = (ty * w + tx) * 4;
            let texel = data.get(i..i + 4)?;
            let mut px = [0.0_f32; 4];
            for (c, byte) in px.iter_mut().zip(texel) {
                *c = f32::from(*byte) / 255.0;
            }
            if straight {
                px = [px[0] * px[3], px[1] * px[3], px[2] * px[3], px[3]];
            }
            Some(scale(px, alpha))
        });
    }

    fn push_level(&mut self, layer: Option<Layer>) -> usize {
        let clips = self.top_clips().to_vec();
        self.levels.push(Level { clips, layer });
        self.mc.save()
    }
}

impl Canvas for RasterCanvas {
    fn save(&mut self) -> usize {
        self.push_level(None)
    }

    fn save_layer(&mut self, rec: &SaveLayerRec<'_>) -> usize {
        let pixels = if rec.flags.contains(SaveLayerFlags::INIT_WITH_PREVIOUS) {
            self.target().clone()
        } else {
            vec![[0.0; 4]; self.base.len()]
        };
        self.push_level(Some(Layer {
            pixels,
            paint: rec.paint.cloned(),
        }))
    }

    fn save_behind(&mut self, _subset: Option<Rect>) -> usize {
        self.push_level(None)
    }

    fn restore(&mut self) {
        if self.levels.len() <= 1 {
            return;
        }
        let Some(level) = self.levels.pop() else {
            return;
        };
        self.mc.restore();
        let Some(layer) = level.layer else {
            return;
        };
        let alpha = layer.paint.as_ref().map_or(1.0, Paint::alpha);
        let compose = layer
            .paint
            .as_ref()
            .map_or(Compose::SrcOver, |p| p.blend.compose);
        let clips = self.top_clips().to_vec();
        let width = self.width as usize;
        let target = self.target();
        for (i, (dst, src)) in target.iter_mut().zip(&layer.pixels).enumerate() {
            let center = Point::new((i % width) as f64 + 0.5, (i / width) as f64 + 0.5);
            if clips.iter().all(|c| c.contains(center)) {
                composite(dst, scale(*src, alpha), compose);
            }
        }
    }

    fn save_count(&self) -> usize {
        self.mc.save_count()
    }

    fn total_matrix(&self) -> Affine {
        self.mc.matrix()
    }

    fn set_matrix(&mut self, matrix: Affine) {
        self.mc.set_matrix(matrix);
    }

    fn concat(&mut self, matrix: Affine) {
        self.mc.concat(matrix);
    }

    fn clip_rect(&mut self, rect: Rect, op: ClipOp, _anti_alias: bool) {
        self.mc.clip_local(Some(rect), op);
        self.push_clip(ClipShape::Rect(rect), op);
    }

    fn clip_rrect(&mut self, rrect: RoundedRect, op: ClipOp, _anti_alias: bool) {
        self.mc.clip_local(Some(rrect.rect()), op);
        self.push_clip(ClipShape::RRect(rrect), op);
    }

    fn clip_path(&mut self, path: &Path, op: ClipOp, _anti_alias: bool) {
        self.mc.clip_local((!path.inverse).then(|| path.bounds()), op);
        self.push_clip(ClipShape::Path(path.clone()), op);
    }

    fn clip_region(&mut self, region: &Region, op: ClipOp) {
        self.mc.clip_device(region.bounds(), op);
        self.push_clip(ClipShape::DeviceRegion(region.clone()), op);
    }

    fn clip_shader(&mut self, _shader: &Brush, _op: ClipOp) {}

    fn reset_clip(&mut self) {
        self.mc.reset_clip();
        if let Some(level) = self.levels.last_mut() {
            level.clips.clear();
        }
    }

    fn local_clip_bounds(&self) -> Rect {
        self.mc.local_clip_bounds()
    }

    fn device_clip_bounds(&self) -> Rect {
        self.mc.device_clip_bounds()
    }

    fn draw_paint(&mut self, paint: &Paint) {
        let color = paint_pixel(paint);
        let device = self.surface_rect();
        self.fill(device, paint.blend.compose, |_| Some(color));
    }

    fn draw_behind(&mut self, paint: &Paint) {
        let color = paint_pixel(paint);
        let device = self.surface_rect();
        self.fill(device, Compose::DestOver, |_| Some(color));
    }

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) {
        self.draw_shape(&rect.abs(), paint);
    }

    fn draw_oval(&mut self, oval: Rect, paint: &Paint) {
        self.draw_shape(&Ellipse::from_rect(oval.abs()), paint);
    }

    fn draw_arc(
        &mut self,
        oval: Rect,
        start_angle: f64,
        sweep_angle: f64,
        use_center: bool,
        paint: &Paint,
    ) {
        let oval = oval.abs();
        let center = oval.center();
        let radii = Vec2::new(oval.width() / 2.0, oval.height() / 2.0);
        let to_radians = core::f64::consts::PI / 180.0;
        let start = start_angle * to_radians;
        let arc = kurbo::Arc::new(center, radii, start, sweep_angle * to_radians, 0.0);
        let dir = Vec2::from_angle(start);
        let first = Point::new(center.x + radii.x * dir.x, center.y + radii.y * dir.y);
        let mut path = BezPath::new();
        if use_center {
            path.move_to(center);
            path.line_to(first);
        } else {
            path.move_to(first);
        }
        path.extend(arc.append_iter(TOLERANCE));
        path.close_path();
        self.draw_shape(&path, paint);
    }

    fn draw_rrect(&mut self, rrect: RoundedRect, paint: &Paint) {
        self.draw_shape(&rrect, paint);
    }

    fn draw_drrect(&mut self, outer: RoundedRect, inner: RoundedRect, paint: &Paint) {
        let color = paint_pixel(paint);
        let device = self.mc.matrix().transform_rect_bbox(outer.rect());
        self.fill(device, paint.blend.compose, |p| {
            (outer.contains(p) && !inner.contains(p)).then_some(color)
        });
    }

    fn draw_region(&mut self, region: &Region, paint: &Paint) {
        let color = paint_pixel(paint);
        let device = self.mc.matrix().transform_rect_bbox(region.bounds());
        self.fill(device, paint.blend.compose, |p| {
            region.contains(p).then_some(color)
        });
    }

    fn draw_path(&mut self, path: &Path, paint: &Paint) {
        if !path.inverse && path.fill_rule == understory_record::FillRule::NonZero {
            self.draw_shape(&path.geometry, paint);
            return;
        }
        let color = paint_pixel(paint);
        let device = if path.inverse {
            self.surface_rect()
        } else {
            self.mc.matrix().transform_rect_bbox(path.bounds())
        };
        self.fill(device, paint.blend.compose, |p| {
            path.contains(p).then_some(color)
        });
    }

    fn draw_points(&mut self, mode: PointMode, points: &[Point], paint: &Paint) {
        let mut stroked = paint.clone();
        stroked.style = PaintStyle::Stroke;
        match mode {
            PointMode::Points => {
                let half = stroke_style(paint).width / 2.0;
                let mut fill = paint.clone();
                fill.style = PaintStyle::Fill;
                for p in points {
                    let dot = Rect::new(p.x - half, p.y - half, p.x + half, p.y + half);
                    self.draw_shape(&dot, &fill);
                }
            }
            PointMode::Lines => {
                for pair in points.chunks_exact(2) {
                    let line = kurbo::Line::new(pair[0], pair[1]);
                    self.draw_shape(&line, &stroked);
                }
            }
            PointMode::Polygon => {
                let mut path = BezPath::new();
                for (i, p) in points.iter().enumerate() {
                    if i == 0 {
                        path.move_to(*p);
                    } else {
                        path.line_to(*p);
                    }
                }
                self.draw_shape(&path, &stroked);
            }
        }
    }

    fn draw_image(
        &mut self,
        image: &Image,
        x: f64,
        y: f64,
        _sampler: ImageSampler,
        paint: Option<&Paint>,
    ) {
        let src = image.bounds();
        let dst = src + Vec2::new(x, y);
        self.draw_sampled(image, src, dst, paint);
    }

    fn draw_image_rect(
        &mut self,
        image: &Image,
        src: Rect,
        dst: Rect,
        _sampler: ImageSampler,
        paint: Option<&Paint>,
        _constraint: SrcRectConstraint,
    ) {
        self.draw_sampled(image, src, dst, paint);
    }

    fn draw_text_blob(&mut self, _blob: &TextBlob, _x: f64, _y: f64, _paint: &Paint) {}

    fn draw_picture(&mut self, picture: &Picture, matrix: Option<Affine>, paint: Option<&Paint>) {
        playback_picture(self, picture, matrix, paint);
    }

    fn draw_drawable(&mut self, drawable: &Arc<dyn Drawable>, matrix: Option<Affine>) {
        draw_drawable_inline(self, drawable.as_ref(), matrix);
    }

    fn draw_vertices(&mut self, _vertices: &Vertices, _blend: BlendMode, _paint: &Paint) {}

    fn draw_patch(
        &mut self,
        _cubics: &[Point; 12],
        _colors: Option<&[Color; 4]>,
        _tex_coords: Option<&[Point; 4]>,
        _blend: BlendMode,
        _paint: &Paint,
    ) {
    }

    fn draw_annotation(&mut self, _rect: Rect, _key: &str, _value: Option<&Arc<[u8]>>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Paint {
        Paint::new(Color::from_rgba8(255, 0, 0, 255))
    }

    #[test]
    fn rect_covers_pixel_centers() {
        let mut canvas = RasterCanvas::new(4, 4);
        canvas.draw_rect(Rect::new(1.0, 1.0, 3.0, 3.0), &red());
        assert_eq!(canvas.pixel(0, 0), [0.0; 4]);
        assert_eq!(canvas.pixel(1, 1), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(canvas.pixel(2, 2), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(canvas.pixel(3, 3), [0.0; 4]);
    }

    #[test]
    fn fill_and_stroke_blend_once_where_they_overlap() {
        let color = Color::from_rgba8(255, 0, 0, 128);
        let rect = Rect::new(2.0, 2.0, 6.0, 6.0);
        let mut both = Paint::stroked(color, 2.0);
        both.style = PaintStyle::FillAndStroke;
        let mut canvas = RasterCanvas::new(8, 8);
        canvas.draw_rect(rect, &both);
        let mut fill_only = RasterCanvas::new(8, 8);
        fill_only.draw_rect(rect, &Paint::new(color));
        // (2, 2) is covered by both the fill and the stroke.
        assert_eq!(canvas.pixel(2, 2), fill_only.pixel(2, 2));
        // (1, 1) is covered by the stroke only.
        assert_eq!(canvas.pixel(1, 1), fill_only.pixel(2, 2));
        assert_eq!(fill_only.pixel(1, 1), [0.0; 4]);
    }

    #[test]
    fn layers_apply_alpha_on_restore() {
        let mut canvas = RasterCanvas::new(2, 2);
        let half = Paint::with_alpha(0.5);
        canvas.save_layer(&SaveLayerRec::new(None, Some(&half)));
        canvas.draw_rect(Rect::new(0.0, 0.0, 2.0, 2.0), &red());
        assert_eq!(canvas.pixel(0, 0), [0.0; 4]);
        canvas.restore();
        assert_eq!(canvas.pixel(0, 0), [0.5, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn clips_are_exact_under_rotation() {
        let mut canvas = RasterCanvas::new(8, 8);
        canvas.translate(4.0, 4.0);
        canvas.concat(Affine::rotate(core::f64::consts::FRAC_PI_4));
        canvas.clip_rect(Rect::new(-1.0, -1.0, 1.0, 1.0), ClipOp::Intersect, false);
        canvas.set_matrix(Affine::IDENTITY);
        canvas.draw_paint(&red());
        assert_eq!(canvas.pixel(0, 0), [0.0; 4]);
        assert_eq!(canvas.pixel(3, 3), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn difference_clip_removes_area() {
        let mut canvas = RasterCanvas::new(4, 1);
        canvas.clip_rect(Rect::new(0.0, 0.0, 2.0, 1.0), ClipOp::Difference, false);
        canvas.draw_paint(&red());
        assert_eq!(canvas.pixel(0, 0), [0.0; 4]);
        assert_eq!(canvas.pixel(3, 0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn restore_at_base_is_ignored() {
        let mut canvas = RasterCanvas::new(1, 1);
        canvas.restore();
        assert_eq!(canvas.save_count(), 1);
    }
}
