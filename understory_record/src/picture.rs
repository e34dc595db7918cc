// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Immutable, shareable recordings.

use alloc::sync::Arc;
use core::fmt::Debug;
use core::mem::size_of;
use core::sync::atomic::{AtomicU32, Ordering};

use kurbo::Rect;

use crate::bbh::Bbh;
use crate::canvas::Canvas;
use crate::draw::{AbortCallback, Draw, draw_record};
use crate::geom::EMPTY_RECT;
use crate::ops::Op;
use crate::record::Record;

fn next_unique_id() -> u32 {
    static NEXT_ID: AtomicU32 = AtomicU32::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

enum Repr {
    Empty,
    Mini(Op),
    Big(BigPicture),
}

struct BigPicture {
    record: Arc<Record>,
    bbh: Option<Arc<dyn Bbh>>,
    drawable_picts: Arc<[Picture]>,
    sub_picture_bytes: usize,
}

struct PictureInner {
    id: u32,
    cull: Rect,
    repr: Repr,
}

/// A finished recording.
///
/// Cloning is cheap and shares the recording; pictures are `Send + Sync` and may be
/// played back from several threads at once, each into its own canvas.
#[derive(Clone)]
pub struct Picture {
    inner: Arc<PictureInner>,
}

impl Debug for Picture {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let repr = match &self.inner.repr {
            Repr::Empty => "empty",
            Repr::Mini(_) => "mini",
            Repr::Big(_) => "big",
        };
        f.debug_struct("Picture")
            .field("id", &self.inner.id)
            .field("cull", &self.inner.cull)
            .field("repr", &repr)
            .field("ops", &self.approximate_op_count(false))
            .finish()
    }
}

impl PartialEq for Picture {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Picture {
    fn from_repr(cull: Rect, repr: Repr) -> Self {
        Self {
            inner: Arc::new(PictureInner {
                id: next_unique_id(),
                cull,
                repr,
            }),
        }
    }

    /// A picture with no content.
    pub fn empty(cull: Rect) -> Self {
        Self::from_repr(cull, Repr::Empty)
    }

    pub(crate) fn mini(cull: Rect, op: Op) -> Self {
        Self::from_repr(cull, Repr::Mini(op))
    }

    pub(crate) fn big(
        cull: Rect,
        record: Arc<Record>,
        bbh: Option<Arc<dyn Bbh>>,
        drawable_picts: Arc<[Picture]>,
        sub_picture_bytes: usize,
    ) -> Self {
        Self::from_repr(
            cull,
            Repr::Big(BigPicture {
                record,
                bbh,
                drawable_picts,
                sub_picture_bytes,
            }),
        )
    }

    /// Process-unique id, never 0.
    pub fn unique_id(&self) -> u32 {
        self.inner.id
    }

    /// Bounds outside which the picture draws nothing, in its own coordinates.
    pub fn cull_rect(&self) -> Rect {
        self.inner.cull
    }

    /// Number of recorded ops; with `nested`, ops of referenced pictures are added.
    pub fn approximate_op_count(&self, nested: bool) -> usize {
        match &self.inner.repr {
            Repr::Empty => 0,
            Repr::Mini(op) => 1 + if nested { nested_op_count(op) } else { 0 },
            Repr::Big(big) => {
                let own = big.record.count();
                if nested {
                    own + big.record.iter().map(nested_op_count).sum::<usize>()
                } else {
                    own
                }
            }
        }
    }

    /// Approximate memory owned by this picture and the pictures it references.
    pub fn approximate_bytes_used(&self) -> usize {
        let base = size_of::<PictureInner>();
        match &self.inner.repr {
            Repr::Empty => base,
            Repr::Mini(op) => base + size_of::<Op>() + op.heap_bytes(),
            Repr::Big(big) => {
                base + big.record.bytes_used()
                    + big.bbh.as_ref().map_or(0, |bbh| bbh.bytes_used())
                    + big.sub_picture_bytes
            }
        }
    }

    /// Replay into `canvas`, consulting the spatial index when there is one.
    ///
    /// The canvas save count is the same before and after, even when aborted.
    pub fn playback(&self, canvas: &mut dyn Canvas, abort: Option<&mut dyn AbortCallback>) {
        match &self.inner.repr {
            Repr::Empty => {}
            Repr::Mini(op) => {
                if abort.is_some_and(|cb| cb.abort()) {
                    return;
                }
                Draw::new(canvas, &[], &[], None).draw(op);
            }
            Repr::Big(big) => draw_record(
                &big.record,
                canvas,
                &big.drawable_picts,
                &[],
                big.bbh.as_deref(),
                abort,
            ),
        }
    }

    /// The recorded log, for multi-op pictures.
    pub fn record(&self) -> Option<&Record> {
        match &self.inner.repr {
            Repr::Big(big) => Some(&big.record),
            _ => None,
        }
    }

    /// The single op of a picture produced by the mini recorder.
    pub fn mini_op(&self) -> Option<&Op> {
        match &self.inner.repr {
            Repr::Mini(op) => Some(op),
            _ => None,
        }
    }

    /// The spatial index built for this picture, if any.
    pub fn bbh(&self) -> Option<&dyn Bbh> {
        match &self.inner.repr {
            Repr::Big(big) => big.bbh.as_deref(),
            _ => None,
        }
    }

    /// Snapshots of the drawables referenced by `DrawDrawable` ops, by index.
    pub fn drawable_pictures(&self) -> &[Self] {
        match &self.inner.repr {
            Repr::Big(big) => &big.drawable_picts,
            _ => &[],
        }
    }

    /// Returns `true` if the picture has no content.
    pub fn is_empty(&self) -> bool {
        self.approximate_op_count(false) == 0
    }
}

impl Default for Picture {
    fn default() -> Self {
        Self::empty(EMPTY_RECT)
    }
}

fn nested_op_count(op: &Op) -> usize {
    match op {
        Op::DrawPicture { picture, .. } => picture.approximate_op_count(true),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Paint;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn pictures_are_send_and_sync() {
        assert_send_sync::<Picture>();
    }

    #[test]
    fn ids_are_unique() {
        let a = Picture::empty(EMPTY_RECT);
        let b = Picture::empty(EMPTY_RECT);
        assert_ne!(a.unique_id(), b.unique_id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn nested_counts_include_children() {
        let child = Picture::mini(
            Rect::new(0.0, 0.0, 1.0, 1.0),
            Op::DrawRect {
                rect: Rect::new(0.0, 0.0, 1.0, 1.0),
                paint: Paint::default(),
            },
        );
        let mut record = Record::new();
        record.append(Op::DrawPicture {
            picture: child.clone(),
            matrix: kurbo::Affine::IDENTITY,
            paint: None,
        });
        record.append(Op::DrawPicture {
            picture: child,
            matrix: kurbo::Affine::IDENTITY,
            paint: None,
        });
        let parent = Picture::big(
            Rect::new(0.0, 0.0, 1.0, 1.0),
            Arc::new(record),
            None,
            Arc::from([]),
            0,
        );
        assert_eq!(parent.approximate_op_count(false), 2);
        assert_eq!(parent.approximate_op_count(true), 4);
        assert!(parent.approximate_bytes_used() > 0);
    }
}
