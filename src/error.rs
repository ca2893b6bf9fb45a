// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Error types for the MPEG-2 framer.

use thiserror::Error;

/// Errors produced while framing an MPEG-2 video elementary stream.
///
/// Every variant here maps to one of the error kinds in the framer design.
/// [`Mpeg2Error::InvalidStream`] drops just the affected sequence's flow-def
/// emission and otherwise keeps going as if nothing happened.
/// [`Mpeg2Error::HeaderDecodeShort`] and the other recoverable kinds cause a
/// full resynchronization back to ACQUIRING. [`Mpeg2Error::Alloc`] is the
/// only fatal kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Mpeg2Error {
    /// A header field carried a value this framer does not support (unknown
    /// framerate code, profile/level, chroma format or aspect ratio).
    #[error("invalid or unsupported stream field: {0}")]
    InvalidStream(&'static str),

    /// A header could not be fully decoded because the buffered region
    /// ended before all of its fixed-size fields were read.
    #[error("header decode ran past the end of the buffered region")]
    HeaderDecodeShort,

    /// A `BufferStream` operation was asked for more bytes than are
    /// currently queued.
    #[error("requested {requested} bytes but only {available} are buffered")]
    OutOfBounds { requested: usize, available: usize },

    /// A single in-construction frame grew past the configured size cap,
    /// indicating a malformed stream with no reachable terminator.
    #[error("frame exceeded the {limit}-byte size cap before a boundary was found")]
    FrameTooLarge { limit: usize },

    /// An unrecoverable allocation failure. The framer instance is dead
    /// after this is raised; no further input will be accepted.
    #[error("allocation failure, framer instance is no longer usable")]
    Alloc,

    /// The stream lost synchronization (an erroneous run of start codes, or
    /// an explicit sequence-end code) and the framer must resynchronize.
    #[error("synchronization lost, resynchronizing")]
    SyncLost,

    /// `input` was called on an instance that already raised `Alloc`.
    #[error("framer instance is dead after a prior fatal error")]
    Dead,
}

pub type Result<T> = std::result::Result<T, Mpeg2Error>;
