// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-op fast path in front of the recorder.

use kurbo::Rect;

use crate::bounds::op_bounds;
use crate::canvas::Canvas;
use crate::draw::Draw;
use crate::ops::{Op, OpKind};
use crate::picture::Picture;

#[derive(Clone, Debug, Default)]
enum MiniState {
    #[default]
    Empty,
    Holding(Op),
}

/// Holds at most one simple draw so one-shape pictures need no log.
#[derive(Clone, Debug, Default)]
pub struct MiniRecorder {
    state: MiniState,
}

impl MiniRecorder {
    /// Create an empty mini recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for kinds the mini recorder can hold.
    pub fn accepts(kind: OpKind) -> bool {
        matches!(
            kind,
            OpKind::DrawRect
                | OpKind::DrawPath
                | OpKind::DrawTextBlob
                | OpKind::DrawRRect
                | OpKind::DrawOval
        )
    }

    /// Returns `true` if no op is held.
    pub fn is_empty(&self) -> bool {
        matches!(self.state, MiniState::Empty)
    }

    /// The held op, if any.
    pub fn op(&self) -> Option<&Op> {
        match &self.state {
            MiniState::Empty => None,
            MiniState::Holding(op) => Some(op),
        }
    }

    /// Hold a copy of `op`. Fails if an op is already held or the kind is not accepted.
    pub fn try_record(&mut self, op: &Op) -> bool {
        if !self.is_empty() || !Self::accepts(op.kind()) {
            return false;
        }
        self.state = MiniState::Holding(op.clone());
        true
    }

    pub(crate) fn take_op(&mut self) -> Option<Op> {
        match core::mem::take(&mut self.state) {
            MiniState::Empty => None,
            MiniState::Holding(op) => Some(op),
        }
    }

    /// Draw the held op (if any) into `canvas` and become empty.
    pub fn flush_and_reset(&mut self, canvas: &mut dyn Canvas) {
        if let MiniState::Holding(op) = core::mem::take(&mut self.state) {
            Draw::new(canvas, &[], &[], None).draw(&op);
        }
    }

    /// Turn the held op into a picture and become empty.
    ///
    /// Without a `cull`, the picture's cull rect is the op's own bounds. With nothing
    /// held, the result is an empty picture.
    pub fn detach_as_picture(&mut self, cull: Option<Rect>) -> Picture {
        match core::mem::take(&mut self.state) {
            MiniState::Empty => Picture::empty(cull.unwrap_or_default()),
            MiniState::Holding(op) => {
                let cull = cull.unwrap_or_else(|| op_bounds(&op));
                Picture::mini(cull, op)
            }
        }
    }
}
