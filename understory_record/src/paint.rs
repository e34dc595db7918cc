// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint descriptors and the bounds/transparency queries the pipeline relies on.

use core::f64::consts::SQRT_2;

use kurbo::{Cap, Join, Rect, Stroke, Vec2};
use peniko::{BlendMode, Brush, Color, Compose, Mix};

use crate::geom::union_rect;

/// How geometry is painted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PaintStyle {
    /// Fill the interior.
    #[default]
    Fill,
    /// Stroke the outline using [`Paint::stroke`].
    Stroke,
    /// Fill, then stroke.
    FillAndStroke,
}

/// Coverage mask effects.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MaskFilter {
    /// Gaussian blur of the coverage mask.
    Blur {
        /// Standard deviation in local units.
        sigma: f32,
    },
}

impl MaskFilter {
    fn outset(&self) -> f64 {
        match self {
            Self::Blur { sigma } => 3.0 * f64::from(sigma.abs()),
        }
    }
}

/// Per-pixel color transforms applied to the source color before blending.
#[derive(Clone, Debug, PartialEq)]
pub enum ColorFilter {
    /// Multiply every channel by a color.
    Modulate(Color),
    /// Row-major 4x5 matrix over unpremultiplied RGBA in `0..=1`.
    Matrix([f32; 20]),
    /// Blend a constant color onto the source.
    Blend {
        /// Constant color used as the filter's source.
        color: Color,
        /// How the color combines with the incoming pixel.
        mode: BlendMode,
    },
}

impl ColorFilter {
    /// Returns `true` if a transparent black input can come out non-transparent.
    pub fn affects_transparent_black(&self) -> bool {
        match self {
            Self::Modulate(_) => false,
            Self::Matrix(m) => m[19] != 0.0,
            Self::Blend { color, mode } => {
                color.components[3] != 0.0
                    && !matches!(
                        mode.compose,
                        Compose::Dest | Compose::SrcIn | Compose::DestIn | Compose::SrcAtop
                    )
            }
        }
    }
}

/// Image filters, applied to the rendered output of a draw or layer.
///
/// Parameters are in user space.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageFilter {
    /// Gaussian blur.
    Blur {
        /// Standard deviation along X.
        std_deviation_x: f32,
        /// Standard deviation along Y.
        std_deviation_y: f32,
    },
    /// Blurred, offset, tinted copy drawn beneath the source.
    DropShadow {
        /// Shadow offset along X.
        dx: f32,
        /// Shadow offset along Y.
        dy: f32,
        /// Blur standard deviation along X.
        std_deviation_x: f32,
        /// Blur standard deviation along Y.
        std_deviation_y: f32,
        /// Shadow color.
        color: Color,
    },
    /// Translate the output.
    Offset {
        /// Offset along X.
        dx: f32,
        /// Offset along Y.
        dy: f32,
    },
    /// Fill the output with a color, ignoring the source. Unbounded.
    Flood {
        /// Flood color.
        color: Color,
    },
}

impl ImageFilter {
    /// Returns `true` if the filter's output for a bounded input is bounded.
    pub fn can_compute_fast_bounds(&self) -> bool {
        !matches!(self, Self::Flood { .. })
    }

    /// Returns `true` if the filter can produce pixels where its input is transparent black.
    pub fn affects_transparent_black(&self) -> bool {
        matches!(self, Self::Flood { .. })
    }

    /// Bounds of the filter output for input inside `rect`, or `None` if unbounded.
    pub fn map_bounds(&self, rect: Rect) -> Option<Rect> {
        match *self {
            Self::Blur {
                std_deviation_x,
                std_deviation_y,
            } => Some(rect.inflate(
                3.0 * f64::from(std_deviation_x.abs()),
                3.0 * f64::from(std_deviation_y.abs()),
            )),
            Self::DropShadow {
                dx,
                dy,
                std_deviation_x,
                std_deviation_y,
                ..
            } => {
                let shadow = (rect + Vec2::new(f64::from(dx), f64::from(dy))).inflate(
                    3.0 * f64::from(std_deviation_x.abs()),
                    3.0 * f64::from(std_deviation_y.abs()),
                );
                Some(union_rect(rect, shadow))
            }
            Self::Offset { dx, dy } => Some(rect + Vec2::new(f64::from(dx), f64::from(dy))),
            Self::Flood { .. } => None,
        }
    }
}

/// Style descriptor attached to draws and layers.
///
/// For layer paints only the alpha of [`Paint::color`] is used when the layer is composited.
#[derive(Clone, Debug, PartialEq)]
pub struct Paint {
    /// Solid color; its alpha also modulates `shader` output.
    pub color: Color,
    /// Optional shader replacing the solid color.
    pub shader: Option<Brush>,
    /// Fill, stroke, or both.
    pub style: PaintStyle,
    /// Stroke parameters; a width of zero is a hairline.
    pub stroke: Stroke,
    /// Blend mode used to composite onto the destination.
    pub blend: BlendMode,
    /// Anti-aliasing hint.
    pub anti_alias: bool,
    /// Optional coverage mask effect.
    pub mask_filter: Option<MaskFilter>,
    /// Optional color transform.
    pub color_filter: Option<ColorFilter>,
    /// Optional output filter.
    pub image_filter: Option<ImageFilter>,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            shader: None,
            style: PaintStyle::Fill,
            stroke: Stroke::new(0.0),
            blend: BlendMode::default(),
            anti_alias: false,
            mask_filter: None,
            color_filter: None,
            image_filter: None,
        }
    }
}

impl Paint {
    /// A fill paint of the given color.
    pub fn new(color: Color) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// A paint carrying only an alpha value, as used for opacity layers.
    pub fn with_alpha(alpha: f32) -> Self {
        Self::new(Color::BLACK.with_alpha(alpha))
    }

    /// A stroke paint.
    pub fn stroked(color: Color, width: f64) -> Self {
        Self {
            color,
            style: PaintStyle::Stroke,
            stroke: Stroke::new(width),
            ..Self::default()
        }
    }

    /// Alpha of the paint color in `0..=1`.
    pub fn alpha(&self) -> f32 {
        self.color.components[3]
    }

    /// Returns `true` for plain `SrcOver` compositing.
    pub fn is_src_over(&self) -> bool {
        self.blend == BlendMode::default()
    }

    /// Returns `true` if every pixel this paint touches ends up fully opaque.
    pub fn is_opaque(&self) -> bool {
        let shader_opaque = match &self.shader {
            None => true,
            Some(Brush::Solid(c)) => c.components[3] >= 1.0,
            Some(_) => false,
        };
        self.alpha() >= 1.0
            && shader_opaque
            && self.color_filter.is_none()
            && self.image_filter.is_none()
            && self.mask_filter.is_none()
            && matches!(self.blend.compose, Compose::SrcOver | Compose::Copy)
    }

    /// Returns `true` if drawing with this paint can never change the destination.
    pub fn nothing_to_draw(&self) -> bool {
        if self.blend.compose == Compose::Dest {
            return true;
        }
        let alpha_zero_is_noop = self.blend.mix == Mix::Normal
            && matches!(
                self.blend.compose,
                Compose::SrcOver
                    | Compose::SrcAtop
                    | Compose::DestOut
                    | Compose::DestOver
                    | Compose::Plus
            );
        alpha_zero_is_noop
            && self.alpha() == 0.0
            && !self
                .color_filter
                .as_ref()
                .is_some_and(ColorFilter::affects_transparent_black)
            && !self
                .image_filter
                .as_ref()
                .is_some_and(ImageFilter::affects_transparent_black)
    }

    /// Returns `true` if [`Paint::compute_fast_bounds`] gives a bounded result.
    pub fn can_compute_fast_bounds(&self) -> bool {
        self.image_filter
            .as_ref()
            .is_none_or(ImageFilter::can_compute_fast_bounds)
    }

    /// Conservative bounds of what this paint can touch when drawing geometry inside `rect`.
    ///
    /// Only meaningful when [`Paint::can_compute_fast_bounds`] holds; otherwise the input
    /// rect is returned after stroke and mask outsets.
    pub fn compute_fast_bounds(&self, rect: Rect) -> Rect {
        let mut r = rect;
        if self.style != PaintStyle::Fill {
            let radius = self.stroke_outset();
            r = r.inflate(radius, radius);
        }
        if let Some(mask) = &self.mask_filter {
            let outset = mask.outset();
            r = r.inflate(outset, outset);
        }
        if let Some(filter) = &self.image_filter
            && let Some(mapped) = filter.map_bounds(r)
        {
            r = mapped;
        }
        r
    }

    fn stroke_outset(&self) -> f64 {
        let width = self.stroke.width.abs();
        let mut radius = if width == 0.0 { 1.0 } else { width / 2.0 };
        let mut multiplier: f64 = 1.0;
        if self.stroke.join == Join::Miter {
            multiplier = multiplier.max(self.stroke.miter_limit);
        }
        if self.stroke.start_cap == Cap::Square || self.stroke.end_cap == Cap::Square {
            multiplier = multiplier.max(SQRT_2);
        }
        radius *= multiplier;
        radius
    }

    /// Returns `true` if this paint, used for a layer or draw, can change pixels where
    /// the source is transparent black.
    pub fn may_affect_transparent_black(&self) -> bool {
        if self
            .image_filter
            .as_ref()
            .is_some_and(ImageFilter::affects_transparent_black)
            || self
                .color_filter
                .as_ref()
                .is_some_and(ColorFilter::affects_transparent_black)
        {
            return true;
        }
        matches!(
            self.blend.compose,
            Compose::Clear
                | Compose::Copy
                | Compose::SrcIn
                | Compose::DestIn
                | Compose::SrcOut
                | Compose::DestAtop
        )
    }

    /// Alpha of a layer paint whose only effect is a uniform opacity, if it is one.
    pub fn uniform_alpha(&self) -> Option<f32> {
        (self.shader.is_none()
            && self.is_src_over()
            && self.mask_filter.is_none()
            && self.color_filter.is_none()
            && self.image_filter.is_none())
        .then(|| self.alpha())
    }

    /// Multiply the paint's alpha by `alpha`.
    pub fn multiply_alpha(&mut self, alpha: f32) {
        self.color = self.color.multiply_alpha(alpha);
    }
}

/// Returns `true` if drawing with `paint` behaves like `SrcOver` onto a transparent layer.
pub(crate) fn effectively_src_over(paint: Option<&Paint>) -> bool {
    let Some(paint) = paint else {
        return true;
    };
    if paint.is_src_over() {
        return true;
    }
    paint.shader.is_none()
        && paint.color_filter.is_none()
        && paint.image_filter.is_none()
        && paint.alpha() >= 1.0
        && paint.blend == BlendMode::new(Mix::Normal, Compose::Copy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_src_over_draws_nothing() {
        let mut paint = Paint::new(Color::TRANSPARENT);
        assert!(paint.nothing_to_draw());
        paint.color_filter = Some(ColorFilter::Matrix([
            1.0, 0.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, 0.5,
        ]));
        assert!(!paint.nothing_to_draw());
        paint.color_filter = None;
        paint.blend = BlendMode::new(Mix::Normal, Compose::Clear);
        assert!(!paint.nothing_to_draw());
        paint.blend = BlendMode::new(Mix::Normal, Compose::Dest);
        paint.color = Color::WHITE;
        assert!(paint.nothing_to_draw());
    }

    #[test]
    fn stroke_bounds_include_miter() {
        let mut paint = Paint::stroked(Color::BLACK, 2.0);
        paint.stroke.join = Join::Bevel;
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(paint.compute_fast_bounds(r), Rect::new(-1.0, -1.0, 11.0, 11.0));
        paint.stroke.join = Join::Miter;
        paint.stroke.miter_limit = 4.0;
        assert_eq!(paint.compute_fast_bounds(r), Rect::new(-4.0, -4.0, 14.0, 14.0));
    }

    #[test]
    fn flood_is_unbounded_and_affects_transparent() {
        let mut paint = Paint::default();
        paint.image_filter = Some(ImageFilter::Flood { color: Color::WHITE });
        assert!(!paint.can_compute_fast_bounds());
        assert!(paint.may_affect_transparent_black());
    }

    #[test]
    fn blend_modes_affecting_transparent_black() {
        let mut paint = Paint::default();
        assert!(!paint.may_affect_transparent_black());
        paint.blend = BlendMode::new(Mix::Normal, Compose::SrcIn);
        assert!(paint.may_affect_transparent_black());
        paint.blend = BlendMode::new(Mix::Multiply, Compose::SrcOver);
        assert!(!paint.may_affect_transparent_black());
    }

    #[test]
    fn uniform_alpha_rejects_effects() {
        let paint = Paint::with_alpha(0.5);
        assert_eq!(paint.uniform_alpha(), Some(0.5));
        let mut blurred = paint.clone();
        blurred.image_filter = Some(ImageFilter::Blur {
            std_deviation_x: 1.0,
            std_deviation_y: 1.0,
        });
        assert_eq!(blurred.uniform_alpha(), None);
        let mut shaded = paint;
        shaded.shader = Some(Brush::Solid(Color::WHITE));
        assert_eq!(shaded.uniform_alpha(), None);
    }
}
