// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Small value types describing the framer's output: flow-level attributes
//! (one per sequence) and per-picture attributes (one per emitted frame).

use crate::error::{Mpeg2Error, Result};

/// A reduced fraction. Used for frame rate and sample aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: u64,
    pub den: u64,
}

impl Rational {
    pub fn new(num: u64, den: u64) -> Self {
        let g = gcd(num, den).max(1);
        Self { num: num / g, den: den / g }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// A monotonically-ordered clock value in 27 MHz ticks, as carried on chunk
/// and frame attributes. `UNSET` marks an absent channel.
pub type Timestamp = u64;

/// Sentinel value for an absent timestamp channel.
pub const UNSET: Timestamp = u64::MAX;

/// The six independently-tracked timestamp channels carried by a chunk and,
/// once frozen, by the frame built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampSet {
    pub pts_orig: Timestamp,
    pub pts: Timestamp,
    pub pts_sys: Timestamp,
    pub dts_orig: Timestamp,
    pub dts: Timestamp,
    pub dts_sys: Timestamp,
}

impl Default for TimestampSet {
    fn default() -> Self {
        Self {
            pts_orig: UNSET,
            pts: UNSET,
            pts_sys: UNSET,
            dts_orig: UNSET,
            dts: UNSET,
            dts_sys: UNSET,
        }
    }
}

/// Chroma subsampling format carried by the sequence extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaFormat {
    Yuv420,
    Yuv422,
    Yuv444,
}

impl ChromaFormat {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(ChromaFormat::Yuv420),
            2 => Ok(ChromaFormat::Yuv422),
            3 => Ok(ChromaFormat::Yuv444),
            _ => Err(Mpeg2Error::InvalidStream("chroma_format")),
        }
    }

    /// Horizontal/vertical subsampling shift of the two chroma planes
    /// relative to the luma plane.
    pub fn chroma_shift(&self) -> (u32, u32) {
        match self {
            ChromaFormat::Yuv420 => (1, 1),
            ChromaFormat::Yuv422 => (1, 0),
            ChromaFormat::Yuv444 => (0, 0),
        }
    }
}

/// The coded picture type, from `picture_coding_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    I,
    P,
    B,
    D,
}

impl PictureType {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(PictureType::I),
            2 => Ok(PictureType::P),
            3 => Ok(PictureType::B),
            4 => Ok(PictureType::D),
            _ => Err(Mpeg2Error::InvalidStream("picture_coding_type")),
        }
    }

}

/// Picture structure, from the picture coding extension. Absent when the
/// extension itself is absent, in which case the picture is a full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureStructure {
    TopField,
    BottomField,
    Frame,
}

impl PictureStructure {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(PictureStructure::TopField),
            2 => Ok(PictureStructure::BottomField),
            3 => Ok(PictureStructure::Frame),
            _ => Err(Mpeg2Error::InvalidStream("picture_structure")),
        }
    }
}

/// Flow-level attributes, derived once per cached sequence and attached to
/// the frame that carries a newly observed (or re-observed) sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowDef {
    pub fps: Rational,
    pub max_octetrate: u32,
    pub octetrate: u32,
    pub cpb_buffer: u32,
    pub hsize: u32,
    pub vsize: u32,
    pub hsize_visible: Option<u32>,
    pub vsize_visible: Option<u32>,
    pub sample_aspect_ratio: Rational,
    pub profile_level: u8,
    pub low_delay: bool,
    pub chroma: ChromaFormat,
    pub progressive_sequence: bool,
}

impl FlowDef {
    /// `macropixel` is always 1 for MPEG-2 video (no packed macropixel
    /// formats, unlike e.g. some MPEG-1 layers).
    pub fn macropixel(&self) -> u32 {
        1
    }

    /// The dotted flow-definition string, e.g.
    /// `block.mpeg2video.pic.planar8_8_420.`
    pub fn flow_def_string(&self) -> String {
        let chroma = match self.chroma {
            ChromaFormat::Yuv420 => "420",
            ChromaFormat::Yuv422 => "422",
            ChromaFormat::Yuv444 => "444",
        };
        format!("block.mpeg2video.pic.planar8_8_{chroma}.")
    }
}

/// Per-picture attributes attached to an emitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureAttributes {
    pub picture_number: u64,
    pub picture_type: PictureType,
    pub duration: u64,
    pub vbv_delay: Option<u64>,
    pub top_field: bool,
    pub bottom_field: bool,
    pub top_field_first: bool,
    pub progressive: bool,
    pub random_access_point: bool,
    pub discontinuity: bool,
    pub systime_rap: Timestamp,
    pub timestamps: TimestampSet,
}
