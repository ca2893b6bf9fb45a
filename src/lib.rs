// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This crate frames an MPEG-2 (ISO/IEC 13818-2) video elementary stream:
//! it turns a sequence of arbitrarily-sized byte chunks into a sequence of
//! coded pictures, each carrying the decoded attributes (timing, picture
//! type, random-access-point status) a downstream consumer needs without
//! having to parse the bitstream itself.
//!
//! The [start_code] module scans for the four-byte `00 00 01 XX` start
//! codes that introduce every structural element, resynchronizable across
//! chunk boundaries.
//!
//! The [buffer_stream] module queues incoming chunks and hands out sized,
//! possibly non-contiguous runs of bytes without copying until asked to.
//!
//! The [header] module decodes the fixed-size header records (sequence,
//! extension, GOP, picture) from raw bytes.
//!
//! The [sequence_cache] module deduplicates the sequence header chain
//! across frames and derives the output [`flow::FlowDef`] from it.
//!
//! The [timing] module computes picture duration, VBV delay, and
//! random-access-point propagation from decoded header fields.
//!
//! The [framer] module ties all of the above together into the
//! [`framer::Mpeg2Framer`] state machine: the crate's main entry point.

pub mod buffer_stream;
pub mod error;
pub mod flow;
pub mod framer;
pub mod header;
pub mod sequence_cache;
pub mod start_code;
pub mod timing;

pub use buffer_stream::{ByteChunk, ByteRope};
pub use error::{Mpeg2Error, Result};
pub use flow::{FlowDef, PictureAttributes, PictureType, Timestamp, TimestampSet, UNSET};
pub use framer::{Frame, FrameSink, Mpeg2Event, Mpeg2Framer};
