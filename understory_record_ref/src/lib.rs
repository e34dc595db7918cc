// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Record Reference Canvases.
//!
//! Two small [`Canvas`](understory_record::Canvas) implementations for tests and
//! debugging:
//!
//! - [`RefCanvas`] logs every call as an [`Event`]: the call, described as the
//!   [`Op`](understory_record::Op) a recorder would append, plus a snapshot of the
//!   matrix, save count and clip after it was applied. Use it to assert on what a
//!   replay issues.
//! - [`RasterCanvas`] rasterizes into premultiplied floating-point pixels with
//!   binary coverage and exact clips. Use it to check that two op sequences paint
//!   the same thing.
//!
//! Neither is a renderer: anti-aliasing, filters, shaders and text are not
//! modelled.

#![no_std]

extern crate alloc;

mod events;
mod raster;

pub use events::{Event, RefCanvas, StateSnapshot};
pub use raster::{Pixel, RasterCanvas};
