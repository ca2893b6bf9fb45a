// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Byte-aligned 32-bit start-code scanning.
//!
//! MPEG-2 structural elements are all introduced by a four-byte start code
//! `00 00 01 XX`. This scans for the next one using a rolling 32-bit
//! accumulator so that a start code split across two input chunks is still
//! found, mirroring a byte-at-a-time NALU boundary search.

/// The context value a freshly-constructed scanner starts with. Chosen so
/// that no byte sequence read before the first real byte can spuriously
/// look like a match.
pub const IDLE_CONTEXT: u32 = 0xFFFF_FFFF;

pub const SEQUENCE_HEADER: u8 = 0xB3;
pub const EXTENSION: u8 = 0xB5;
pub const USER_DATA: u8 = 0xB2;
pub const GROUP_OF_PICTURES: u8 = 0xB8;
pub const PICTURE: u8 = 0x00;
pub const SEQUENCE_END: u8 = 0xB7;
pub const SLICE_MIN: u8 = 0x01;
pub const SLICE_MAX: u8 = 0xAF;

pub const EXT_SEQUENCE: u8 = 1;
pub const EXT_SEQUENCE_DISPLAY: u8 = 2;
pub const EXT_PICTURE_CODING: u8 = 8;

pub fn is_slice(id: u8) -> bool {
    (SLICE_MIN..=SLICE_MAX).contains(&id)
}

/// Scans `data` for the first complete `00 00 01 XX` start code, starting
/// from the rolling `context` left over from a previous call (or
/// [`IDLE_CONTEXT`] at the very start of a stream).
///
/// Returns `(position, new_context)`, where `position` is the index in
/// `data` immediately after the matched start code's fourth byte (`None` if
/// no match was found in `data`), and `new_context` is the accumulator to
/// pass to the next call.
pub fn scan(data: &[u8], mut context: u32) -> (Option<usize>, u32) {
    for (i, &byte) in data.iter().enumerate() {
        context = (context << 8) | byte as u32;
        if context & 0xFFFF_FF00 == 0x0000_0100 {
            return (Some(i + 1), context);
        }
    }
    (None, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_start_code_in_one_call() {
        let data = [0xAA, 0x00, 0x00, 0x01, 0xB3, 0x55];
        let (pos, ctx) = scan(&data, IDLE_CONTEXT);
        assert_eq!(pos, Some(5));
        assert_eq!(ctx & 0xFF, 0xB3);
    }

    #[test]
    fn finds_start_code_split_across_calls() {
        let first = [0xAA, 0x00, 0x00];
        let (pos, ctx) = scan(&first, IDLE_CONTEXT);
        assert_eq!(pos, None);

        let second = [0x01, 0xB3, 0x55];
        let (pos, ctx) = scan(&second, ctx);
        assert_eq!(pos, Some(2));
        assert_eq!(ctx & 0xFF, 0xB3);
    }

    #[test]
    fn no_spurious_match_on_idle_context() {
        let data = [0x00, 0x00, 0x01];
        let (pos, _ctx) = scan(&data, IDLE_CONTEXT);
        assert_eq!(pos, None);
    }

    #[test]
    fn back_to_back_start_codes() {
        let data = [0x00, 0x00, 0x01, 0xB3, 0x00, 0x00, 0x01, 0x00];
        let (pos1, ctx) = scan(&data, IDLE_CONTEXT);
        assert_eq!(pos1, Some(4));
        let (pos2, ctx) = scan(&data[pos1.unwrap()..], ctx);
        assert_eq!(pos2, Some(4));
        assert_eq!(ctx & 0xFF, 0x00);
    }
}
