// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pure duration/VBV/random-access-point math, kept free of any framer or
//! buffer state so it can be called (and tested) on plain values.

use crate::flow::{PictureStructure, Timestamp, UNSET};

/// The 27 MHz system clock frequency used throughout MPEG-2 timing fields.
pub const UCLOCK_FREQ: u64 = 27_000_000;

/// Picture structure and field-repetition flags, decoded from the picture
/// coding extension when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldFlags {
    pub top_field: bool,
    pub bottom_field: bool,
    pub top_field_first: bool,
    pub progressive: bool,
    pub repeat_first_field: bool,
    pub picture_structure: Option<PictureStructure>,
}

/// Computes a picture's display duration in 27 MHz ticks from the
/// sequence's frame rate and this picture's field-repetition flags.
pub fn duration(fps_num: u64, fps_den: u64, progressive_sequence: bool, flags: &FieldFlags) -> u64 {
    let base = (UCLOCK_FREQ * fps_den) / fps_num;
    match flags.picture_structure {
        None => base,
        Some(PictureStructure::Frame) => {
            if progressive_sequence && flags.repeat_first_field {
                base * (1 + flags.top_field_first as u64)
            } else if flags.repeat_first_field {
                base + base / 2
            } else {
                base
            }
        }
        Some(PictureStructure::TopField) | Some(PictureStructure::BottomField) => base / 2,
    }
}

/// Derives [`FieldFlags`] from a decoded picture coding extension, or the
/// all-progressive default when the extension is absent.
pub fn field_flags_from_extension(
    picture_structure: PictureStructure,
    top_field_first: bool,
    repeat_first_field: bool,
    progressive_frame: bool,
) -> FieldFlags {
    let (top_field, bottom_field) = match picture_structure {
        PictureStructure::TopField => (true, false),
        PictureStructure::BottomField => (false, true),
        PictureStructure::Frame => (true, true),
    };
    FieldFlags {
        top_field,
        bottom_field,
        top_field_first,
        progressive: progressive_frame,
        repeat_first_field,
        picture_structure: Some(picture_structure),
    }
}

pub fn field_flags_progressive_default() -> FieldFlags {
    FieldFlags {
        top_field: true,
        bottom_field: true,
        top_field_first: false,
        progressive: true,
        repeat_first_field: false,
        picture_structure: None,
    }
}

/// Converts a raw 16-bit `vbv_delay` field to 27 MHz ticks. `0xFFFF` marks
/// the field as absent (the encoder didn't set a VBV delay for this
/// picture).
pub fn vbv_delay_ticks(raw: u16) -> Option<u64> {
    if raw == 0xFFFF {
        None
    } else {
        Some(raw as u64 * 300)
    }
}

use crate::flow::PictureType;

/// Propagates the random-access-point system time across picture types:
/// - I pictures shift the previous RAP into `systime_rap_ref` and adopt
///   `incoming` as the new `systime_rap`.
/// - P pictures shift the previous RAP into `systime_rap_ref` but keep
///   `systime_rap` unchanged.
/// - B pictures do neither; they attach whatever `systime_rap_ref` already
///   holds.
///
/// Returns the value to attach to this picture's output attributes.
pub fn apply_rap(
    systime_rap: &mut Timestamp,
    systime_rap_ref: &mut Timestamp,
    picture_type: PictureType,
    incoming: Timestamp,
) -> Timestamp {
    match picture_type {
        PictureType::I => {
            *systime_rap_ref = *systime_rap;
            *systime_rap = incoming;
            *systime_rap
        }
        PictureType::P => {
            *systime_rap_ref = *systime_rap;
            *systime_rap
        }
        PictureType::B | PictureType::D => *systime_rap_ref,
    }
}

/// For completeness with [`crate::flow::UNSET`]; kept alongside the RAP
/// helpers since both deal in the same sentinel.
pub fn is_unset(t: Timestamp) -> bool {
    t == UNSET
}
