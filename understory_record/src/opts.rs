// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Peephole optimization of recorded logs.
//!
//! Each pass matches a short op pattern and rewrites it in place, turning dead
//! ops into [`Op::NoOp`]. Patterns skip over existing no-ops, so one rewrite can
//! expose another. Passes repeat until nothing changes, then the log is
//! defragmented once.
//!
//! Rewrites are conservative: backdrops, non-`SrcOver` blending, color filters,
//! and draws that may overlap themselves all block folding.

use alloc::vec::Vec;
use core::ops::Range;

use crate::ops::{Op, OpKind, OpTags, SaveLayerFlags};
use crate::paint::{Paint, effectively_src_over};
use crate::record::Record;

/// Identifies the rewrite that fired.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OptimizePass {
    /// `Save, draws, Restore`: the save and restore are dropped.
    SaveOnlyDrawsRestore,
    /// `Save, matrix/clip ops, Restore`: everything is dropped.
    SaveNoDrawsRestore,
    /// `SaveLayer, draw, Restore`: the layer is dropped and its alpha moves into the draw.
    SaveLayerDrawRestore,
    /// `SaveLayer, Save, ClipRect, SaveLayer, Restore, Restore, Restore`: the outer
    /// opacity layer is folded into the inner filter layer.
    SvgOpacityAndFilterLayers,
    /// `SaveLayer, SaveLayer … Restore, Restore`: the outer opacity layer is folded
    /// into the inner layer.
    OpacityOverLayer,
}

/// Receives one callback per rewrite.
pub trait OptimizeTrace {
    /// `span` covers the log positions of the matched pattern.
    fn rewrite(&mut self, pass: OptimizePass, span: Range<usize>);
}

impl OptimizeTrace for () {
    fn rewrite(&mut self, _pass: OptimizePass, _span: Range<usize>) {}
}

/// Trace sink that keeps every rewrite.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewriteLog {
    /// Rewrites in the order they fired. Spans refer to positions before defrag.
    pub rewrites: Vec<(OptimizePass, Range<usize>)>,
}

impl RewriteLog {
    /// Number of rewrites of the given pass.
    pub fn count(&self, pass: OptimizePass) -> usize {
        self.rewrites.iter().filter(|(p, _)| *p == pass).count()
    }
}

impl OptimizeTrace for RewriteLog {
    fn rewrite(&mut self, pass: OptimizePass, span: Range<usize>) {
        self.rewrites.push((pass, span));
    }
}

/// Optimize `record` in place and defragment it.
pub fn optimize(record: &mut Record) {
    optimize_with_trace(record, &mut ());
}

/// [`optimize`], reporting each rewrite to `trace`.
pub fn optimize_with_trace(record: &mut Record, trace: &mut dyn OptimizeTrace) {
    let before = record.count();
    let mut rewrites = 0;
    loop {
        let round = noop_save_only_draws(record, trace)
            + noop_save_no_draws(record, trace)
            + fold_save_layer_draw_restores(record, trace)
            + fold_svg_opacity_and_filter_layers(record, trace)
            + fold_opacity_over_layers(record, trace);
        if round == 0 {
            break;
        }
        rewrites += round;
    }
    record.defrag();
    log::debug!(
        "optimized record: {rewrites} rewrites, {before} -> {} ops",
        record.count()
    );
}

/// Next position at or after `i` that is not a no-op.
fn next_live(record: &Record, mut i: usize) -> Option<usize> {
    while i < record.count() {
        if record.kind(i) != Some(OpKind::NoOp) {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn is_restore(record: &Record, i: usize) -> bool {
    record.kind(i) == Some(OpKind::Restore)
}

/// Position of the restore matching the save at `save`.
fn matching_restore(record: &Record, save: usize) -> Option<usize> {
    let mut depth = 0_usize;
    for i in save..record.count() {
        let kind = record.kind(i)?;
        if kind.is_save() {
            depth += 1;
        } else if kind == OpKind::Restore {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn noop_save_only_draws(record: &mut Record, trace: &mut dyn OptimizeTrace) -> usize {
    let mut rewrites = 0;
    let mut i = 0;
    while i < record.count() {
        if record.kind(i) != Some(OpKind::Save) {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while let Some(kind) = record.kind(j)
            && (kind == OpKind::NoOp || kind.is_draw())
        {
            j += 1;
        }
        if is_restore(record, j) {
            record.replace_with_noop(i);
            record.replace_with_noop(j);
            trace.rewrite(OptimizePass::SaveOnlyDrawsRestore, i..j + 1);
            rewrites += 1;
            i = j + 1;
        } else {
            i += 1;
        }
    }
    rewrites
}

fn noop_save_no_draws(record: &mut Record, trace: &mut dyn OptimizeTrace) -> usize {
    let mut rewrites = 0;
    let mut i = 0;
    while i < record.count() {
        if record.kind(i) != Some(OpKind::Save) {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while let Some(kind) = record.kind(j)
            && kind.is_state_only()
        {
            j += 1;
        }
        if is_restore(record, j) {
            for k in i..=j {
                record.replace_with_noop(k);
            }
            trace.rewrite(OptimizePass::SaveNoDrawsRestore, i..j + 1);
            rewrites += 1;
            i = j + 1;
        } else {
            i += 1;
        }
    }
    rewrites
}

/// Layer fields that decide whether a layer can be removed.
struct LayerInfo {
    paint: Option<Paint>,
    blocked: bool,
}

fn layer_info(record: &Record, i: usize) -> Option<LayerInfo> {
    match record.get(i)? {
        Op::SaveLayer {
            paint,
            backdrop,
            flags,
            ..
        } => Some(LayerInfo {
            paint: paint.clone(),
            blocked: backdrop.is_some() || flags.contains(SaveLayerFlags::INIT_WITH_PREVIOUS),
        }),
        _ => None,
    }
}

/// Returns `true` if `alpha` can be multiplied into `target` without changing output.
///
/// Layer paints apply image filters before alpha, so those are allowed for layers.
fn can_take_alpha(target: &Paint, target_is_layer: bool) -> bool {
    target.is_src_over()
        && target.color_filter.is_none()
        && (target_is_layer || target.image_filter.is_none())
}

/// Multiply `alpha` into the op's paint, creating an alpha-only paint for ops whose
/// paint is optional. Returns `false` (leaving the op untouched) if the fold is unsafe.
fn fold_alpha_into(op: &mut Op, alpha: f32) -> bool {
    let target_is_layer = matches!(op.kind(), OpKind::SaveLayer | OpKind::DrawPicture);
    if let Some(slot) = op.optional_paint_slot() {
        if let Some(paint) = slot.as_mut() {
            if !can_take_alpha(paint, target_is_layer) {
                return false;
            }
            paint.multiply_alpha(alpha);
        } else {
            *slot = Some(Paint::with_alpha(alpha));
        }
        return true;
    }
    match op.paint_mut() {
        Some(paint) if can_take_alpha(paint, target_is_layer) => {
            paint.multiply_alpha(alpha);
            true
        }
        _ => false,
    }
}

fn fold_save_layer_draw_restores(record: &mut Record, trace: &mut dyn OptimizeTrace) -> usize {
    let mut rewrites = 0;
    let mut i = 0;
    while i < record.count() {
        let Some(layer) = layer_info(record, i) else {
            i += 1;
            continue;
        };
        let Some(draw) = next_live(record, i + 1) else {
            break;
        };
        let Some(restore) = next_live(record, draw + 1) else {
            break;
        };
        let Some(kind) = record.kind(draw) else {
            break;
        };
        if layer.blocked || !kind.is_draw() || !is_restore(record, restore) {
            i += 1;
            continue;
        }
        let folded = match &layer.paint {
            None => record.visit(draw, |op| {
                // Pictures and drawables without a paint of their own may blend
                // with arbitrary modes inside the layer.
                let nested = matches!(op, Op::DrawDrawable { .. })
                    || matches!(op, Op::DrawPicture { paint: None, .. });
                !nested && effectively_src_over(op.paint())
            }),
            Some(paint) => match paint.uniform_alpha() {
                Some(alpha) if !kind.tags().contains(OpTags::MULTI_DRAW) => {
                    record.mutate(draw, |op| fold_alpha_into(op, alpha))
                }
                _ => false,
            },
        };
        if folded {
            record.replace_with_noop(i);
            record.replace_with_noop(restore);
            trace.rewrite(OptimizePass::SaveLayerDrawRestore, i..restore + 1);
            rewrites += 1;
            i = restore + 1;
        } else {
            i += 1;
        }
    }
    rewrites
}

/// Folds an opacity layer into the layer nested directly inside it, if safe.
fn fold_outer_into_inner(record: &mut Record, outer: &LayerInfo, inner: usize) -> bool {
    let Some(inner_info) = layer_info(record, inner) else {
        return false;
    };
    if outer.blocked || inner_info.blocked {
        return false;
    }
    match &outer.paint {
        None => effectively_src_over(inner_info.paint.as_ref()),
        Some(paint) => match paint.uniform_alpha() {
            Some(alpha) => record.mutate(inner, |op| fold_alpha_into(op, alpha)),
            None => false,
        },
    }
}

fn fold_svg_opacity_and_filter_layers(
    record: &mut Record,
    trace: &mut dyn OptimizeTrace,
) -> usize {
    const SHAPE: [OpKind; 7] = [
        OpKind::SaveLayer,
        OpKind::Save,
        OpKind::ClipRect,
        OpKind::SaveLayer,
        OpKind::Restore,
        OpKind::Restore,
        OpKind::Restore,
    ];
    let mut rewrites = 0;
    let mut i = 0;
    while i < record.count() {
        if record.kind(i) != Some(OpKind::SaveLayer) {
            i += 1;
            continue;
        }
        let mut positions = [i; 7];
        let mut matched = true;
        for k in 1..SHAPE.len() {
            match next_live(record, positions[k - 1] + 1) {
                Some(p) if record.kind(p) == Some(SHAPE[k]) => positions[k] = p,
                _ => {
                    matched = false;
                    break;
                }
            }
        }
        let Some(outer) = matched.then(|| layer_info(record, i)).flatten() else {
            i += 1;
            continue;
        };
        if fold_outer_into_inner(record, &outer, positions[3]) {
            record.replace_with_noop(positions[0]);
            record.replace_with_noop(positions[6]);
            trace.rewrite(OptimizePass::SvgOpacityAndFilterLayers, i..positions[6] + 1);
            rewrites += 1;
            i = positions[6] + 1;
        } else {
            i += 1;
        }
    }
    rewrites
}

fn fold_opacity_over_layers(record: &mut Record, trace: &mut dyn OptimizeTrace) -> usize {
    let mut rewrites = 0;
    let mut i = 0;
    while i < record.count() {
        let Some(outer) = layer_info(record, i) else {
            i += 1;
            continue;
        };
        let matched = next_live(record, i + 1)
            .filter(|&inner| record.kind(inner) == Some(OpKind::SaveLayer))
            .and_then(|inner| Some((inner, matching_restore(record, inner)?)))
            .and_then(|(inner, inner_restore)| {
                let outer_restore = next_live(record, inner_restore + 1)?;
                is_restore(record, outer_restore).then_some((inner, outer_restore))
            });
        let Some((inner, outer_restore)) = matched else {
            i += 1;
            continue;
        };
        if fold_outer_into_inner(record, &outer, inner) {
            record.replace_with_noop(i);
            record.replace_with_noop(outer_restore);
            trace.rewrite(OptimizePass::OpacityOverLayer, i..outer_restore + 1);
            rewrites += 1;
        }
        i += 1;
    }
    rewrites
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ClipOp;
    use crate::paint::ImageFilter;
    use kurbo::{Affine, Rect};
    use peniko::{BlendMode, Color, Compose, Mix};

    fn draw(color: Color) -> Op {
        Op::DrawRect {
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            paint: Paint::new(color),
        }
    }

    fn layer(paint: Option<Paint>) -> Op {
        Op::SaveLayer {
            bounds: None,
            paint,
            backdrop: None,
            flags: SaveLayerFlags::empty(),
        }
    }

    fn restore() -> Op {
        Op::Restore {
            matrix: Affine::IDENTITY,
        }
    }

    fn clip() -> Op {
        Op::ClipRect {
            rect: Rect::new(0.0, 0.0, 5.0, 5.0),
            op: ClipOp::Intersect,
            anti_alias: false,
        }
    }

    fn record(ops: impl IntoIterator<Item = Op>) -> Record {
        let mut record = Record::new();
        for op in ops {
            record.append(op);
        }
        record
    }

    fn kinds(record: &Record) -> Vec<OpKind> {
        record.iter().map(Op::kind).collect()
    }

    #[test]
    fn empty_save_block_vanishes() {
        let mut r = record([Op::Save, clip(), restore()]);
        let mut log = RewriteLog::default();
        optimize_with_trace(&mut r, &mut log);
        assert_eq!(r.count(), 0);
        assert_eq!(log.rewrites, [(OptimizePass::SaveNoDrawsRestore, 0..3)]);
    }

    #[test]
    fn saves_around_draws_only_are_dropped() {
        let mut r = record([Op::Save, draw(Color::WHITE), draw(Color::BLACK), restore()]);
        optimize(&mut r);
        assert_eq!(kinds(&r), [OpKind::DrawRect, OpKind::DrawRect]);
    }

    #[test]
    fn saves_with_matrix_and_draw_are_kept() {
        let mut r = record([
            Op::Save,
            Op::Translate { dx: 1.0, dy: 0.0 },
            draw(Color::WHITE),
            restore(),
        ]);
        optimize(&mut r);
        assert_eq!(r.count(), 4);
    }

    #[test]
    fn nested_empty_blocks_collapse_over_rounds() {
        let mut r = record([Op::Save, Op::Save, clip(), restore(), clip(), restore()]);
        optimize(&mut r);
        assert_eq!(r.count(), 0);
    }

    #[test]
    fn alpha_layer_folds_into_draw() {
        let layer_paint = Paint::new(Color::from_rgba8(0, 0, 0, 128));
        let mut r = record([
            layer(Some(layer_paint)),
            draw(Color::from_rgba8(255, 0, 0, 255)),
            restore(),
        ]);
        optimize(&mut r);
        assert_eq!(r.count(), 1);
        let paint = r.get(0).and_then(Op::paint).unwrap();
        assert_eq!(paint.color.to_rgba8().a, 128);
    }

    #[test]
    fn plain_layer_is_removed_for_src_over_draw() {
        let mut r = record([layer(None), draw(Color::WHITE), restore()]);
        optimize(&mut r);
        assert_eq!(kinds(&r), [OpKind::DrawRect]);
    }

    #[test]
    fn backdrop_blocks_folding() {
        let mut r = record([
            Op::SaveLayer {
                bounds: None,
                paint: None,
                backdrop: Some(ImageFilter::Blur {
                    std_deviation_x: 2.0,
                    std_deviation_y: 2.0,
                }),
                flags: SaveLayerFlags::empty(),
            },
            draw(Color::WHITE),
            restore(),
        ]);
        optimize(&mut r);
        assert_eq!(r.count(), 3);
    }

    #[test]
    fn non_src_over_draw_blocks_folding() {
        let mut paint = Paint::new(Color::WHITE);
        paint.blend = BlendMode::new(Mix::Multiply, Compose::SrcOver);
        let mut r = record([
            layer(Some(Paint::with_alpha(0.5))),
            Op::DrawRect {
                rect: Rect::new(0.0, 0.0, 1.0, 1.0),
                paint,
            },
            restore(),
        ]);
        optimize(&mut r);
        assert_eq!(r.count(), 3);
    }

    #[test]
    fn multi_draws_keep_their_layer() {
        let mut r = record([
            layer(Some(Paint::with_alpha(0.5))),
            Op::DrawPoints {
                mode: crate::PointMode::Lines,
                points: alloc::vec![kurbo::Point::ZERO; 4].into_boxed_slice(),
                paint: Paint::stroked(Color::WHITE, 4.0),
            },
            restore(),
        ]);
        optimize(&mut r);
        assert_eq!(r.count(), 3);
    }

    #[test]
    fn svg_shape_folds_opacity_into_filter_layer() {
        let mut filter = Paint::default();
        filter.image_filter = Some(ImageFilter::Blur {
            std_deviation_x: 1.0,
            std_deviation_y: 1.0,
        });
        let mut r = record([
            layer(Some(Paint::with_alpha(0.5))),
            Op::Save,
            clip(),
            layer(Some(filter)),
            restore(),
            restore(),
            restore(),
        ]);
        let mut log = RewriteLog::default();
        optimize_with_trace(&mut r, &mut log);
        assert_eq!(log.count(OptimizePass::SvgOpacityAndFilterLayers), 1);
        let inner = r
            .iter()
            .find(|op| op.kind() == OpKind::SaveLayer)
            .and_then(Op::paint)
            .unwrap();
        assert_eq!(inner.alpha(), 0.5);
        assert!(inner.image_filter.is_some());
    }

    #[test]
    fn opacity_layer_folds_into_nested_layer() {
        let mut r = record([
            layer(Some(Paint::with_alpha(0.5))),
            layer(None),
            draw(Color::WHITE),
            draw(Color::BLACK),
            restore(),
            restore(),
        ]);
        let mut log = RewriteLog::default();
        optimize_with_trace(&mut r, &mut log);
        assert_eq!(log.count(OptimizePass::OpacityOverLayer), 1);
        assert_eq!(
            kinds(&r),
            [OpKind::SaveLayer, OpKind::DrawRect, OpKind::DrawRect, OpKind::Restore]
        );
        assert_eq!(r.get(0).and_then(Op::paint).map(Paint::alpha), Some(0.5));
    }
}
