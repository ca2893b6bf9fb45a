// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pure decoders from raw header bytes to typed records. None of these
//! touch the buffered stream or any framer state; each takes the bytes
//! immediately following a start code and returns a decoded record or an
//! error if the slice is shorter than it needs.
//!
//! Bit layouts follow ISO/IEC 13818-2 §6.2 field order; fields this framer
//! has no use for (reserved bits, motion vector ranges, quantiser matrices)
//! are read past and discarded rather than omitted from the bitstream walk,
//! so offsets of the fields we do keep stay correct.

use crate::error::{Mpeg2Error, Result};
use crate::flow::{ChromaFormat, PictureStructure, PictureType};

/// A big-endian bit cursor over a byte slice, in the style of a codec
/// bitstream parser's `BitReader`.
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        let mut value: u32 = 0;
        for _ in 0..n {
            let byte_idx = self.bit_pos / 8;
            let bit_idx = 7 - (self.bit_pos % 8);
            let byte = *self.data.get(byte_idx).ok_or(Mpeg2Error::HeaderDecodeShort)?;
            let bit = (byte >> bit_idx) & 1;
            value = (value << 1) | bit as u32;
            self.bit_pos += 1;
        }
        Ok(value)
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if self.bit_pos + n as usize > self.data.len() * 8 {
            return Err(Mpeg2Error::HeaderDecodeShort);
        }
        self.bit_pos += n as usize;
        Ok(())
    }
}

fn require_len(data: &[u8], min: usize) -> Result<()> {
    if data.len() < min {
        Err(Mpeg2Error::HeaderDecodeShort)
    } else {
        Ok(())
    }
}

/// The fixed-size portion of `sequence_header()`: 12 bytes, with the two
/// quantiser-matrix presence flags in the low two bits of byte 11.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    pub horizontal_size: u32,
    pub vertical_size: u32,
    pub aspect_ratio_information: u8,
    pub frame_rate_code: u8,
    pub bit_rate_value: u32,
    pub vbv_buffer_size_value: u32,
    pub load_intra_quantiser_matrix: bool,
    pub load_non_intra_quantiser_matrix: bool,
}

pub const SEQUENCE_HEADER_LEN: usize = 12;

pub fn decode_sequence_header(data: &[u8]) -> Result<SequenceHeader> {
    require_len(data, SEQUENCE_HEADER_LEN)?;
    // The six named fields pack tightly into the first 60 bits (7.5 bytes);
    // the remaining bits up to byte 11 are reserved padding, except for the
    // two matrix-load flags in byte 11's low bits.
    let mut r = BitReader::new(&data[..SEQUENCE_HEADER_LEN]);
    let horizontal_size = r.read_bits(12)?;
    let vertical_size = r.read_bits(12)?;
    let aspect_ratio_information = r.read_bits(4)? as u8;
    let frame_rate_code = r.read_bits(4)? as u8;
    let bit_rate_value = r.read_bits(18)?;
    let vbv_buffer_size_value = r.read_bits(10)?;
    let byte11 = data[11];
    Ok(SequenceHeader {
        horizontal_size,
        vertical_size,
        aspect_ratio_information,
        frame_rate_code,
        bit_rate_value,
        vbv_buffer_size_value,
        load_intra_quantiser_matrix: byte11 & 0b10 != 0,
        load_non_intra_quantiser_matrix: byte11 & 0b01 != 0,
    })
}

/// `sequence_extension()`: 6 bytes total, bit-for-bit per the standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceExtension {
    pub profile_and_level_indication: u8,
    pub progressive_sequence: bool,
    pub chroma_format: u8,
    pub horizontal_size_extension: u8,
    pub vertical_size_extension: u8,
    pub bit_rate_extension: u32,
    pub vbv_buffer_size_extension: u8,
    pub low_delay: bool,
    pub frame_rate_extension_n: u8,
    pub frame_rate_extension_d: u8,
}

pub const SEQUENCE_EXTENSION_LEN: usize = 6;

pub fn decode_sequence_extension(data: &[u8]) -> Result<SequenceExtension> {
    require_len(data, SEQUENCE_EXTENSION_LEN)?;
    let mut r = BitReader::new(&data[..SEQUENCE_EXTENSION_LEN]);
    r.skip_bits(4)?; // extension_start_code_identifier
    let profile_and_level_indication = r.read_bits(8)? as u8;
    let progressive_sequence = r.read_bit()?;
    let chroma_format = r.read_bits(2)? as u8;
    let horizontal_size_extension = r.read_bits(2)? as u8;
    let vertical_size_extension = r.read_bits(2)? as u8;
    let bit_rate_extension = r.read_bits(12)?;
    r.skip_bits(1)?; // marker_bit
    let vbv_buffer_size_extension = r.read_bits(8)? as u8;
    let low_delay = r.read_bit()?;
    let frame_rate_extension_n = r.read_bits(2)? as u8;
    let frame_rate_extension_d = r.read_bits(5)? as u8;
    Ok(SequenceExtension {
        profile_and_level_indication,
        progressive_sequence,
        chroma_format,
        horizontal_size_extension,
        vertical_size_extension,
        bit_rate_extension,
        vbv_buffer_size_extension,
        low_delay,
        frame_rate_extension_n,
        frame_rate_extension_d,
    })
}

/// `sequence_display_extension()`: 5 bytes, or 8 when `color_description`
/// is set (3 extra bytes for primaries/transfer/matrix, which this framer
/// has no use for and so does not decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceDisplayExtension {
    pub video_format: u8,
    pub color_description_present: bool,
    pub display_horizontal_size: u32,
    pub display_vertical_size: u32,
}

pub fn decode_sequence_display_extension(data: &[u8]) -> Result<SequenceDisplayExtension> {
    require_len(data, 5)?;
    let mut r = BitReader::new(data);
    r.skip_bits(4)?; // extension_start_code_identifier
    let video_format = r.read_bits(3)? as u8;
    let color_description_present = r.read_bit()?;
    if color_description_present {
        require_len(data, 8)?;
        r.skip_bits(24)?; // colour_primaries, transfer_characteristics, matrix_coefficients
    }
    let display_horizontal_size = r.read_bits(14)?;
    r.skip_bits(1)?; // marker_bit
    let display_vertical_size = r.read_bits(14)?;
    Ok(SequenceDisplayExtension {
        video_format,
        color_description_present,
        display_horizontal_size,
        display_vertical_size,
    })
}

/// `group_of_pictures_header()`: 4 bytes. `time_code` is not modeled since
/// nothing downstream of this framer consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GopHeader {
    pub closed_gop: bool,
    pub broken_link: bool,
}

pub const GOP_HEADER_LEN: usize = 4;

pub fn decode_gop_header(data: &[u8]) -> Result<GopHeader> {
    require_len(data, GOP_HEADER_LEN)?;
    let mut r = BitReader::new(&data[..GOP_HEADER_LEN]);
    r.skip_bits(25)?; // time_code
    let closed_gop = r.read_bit()?;
    let broken_link = r.read_bit()?;
    Ok(GopHeader { closed_gop, broken_link })
}

/// `picture_header()`: 4 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureHeader {
    pub temporal_reference: u16,
    pub picture_coding_type: u8,
    pub vbv_delay: u16,
}

pub const PICTURE_HEADER_LEN: usize = 4;

pub fn decode_picture_header(data: &[u8]) -> Result<PictureHeader> {
    require_len(data, PICTURE_HEADER_LEN)?;
    let mut r = BitReader::new(&data[..PICTURE_HEADER_LEN]);
    let temporal_reference = r.read_bits(10)? as u16;
    let picture_coding_type = r.read_bits(3)? as u8;
    let vbv_delay = r.read_bits(16)? as u16;
    Ok(PictureHeader { temporal_reference, picture_coding_type, vbv_delay })
}

/// `picture_coding_extension()`, truncated to the fields this framer needs:
/// 5 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureCodingExtension {
    pub intra_dc_precision: u8,
    pub picture_structure: u8,
    pub top_field_first: bool,
    pub repeat_first_field: bool,
    pub progressive_frame: bool,
}

pub const PICTURE_CODING_EXTENSION_LEN: usize = 5;

pub fn decode_picture_coding_extension(data: &[u8]) -> Result<PictureCodingExtension> {
    require_len(data, PICTURE_CODING_EXTENSION_LEN)?;
    let mut r = BitReader::new(&data[..PICTURE_CODING_EXTENSION_LEN]);
    r.skip_bits(4)?; // extension_start_code_identifier
    let intra_dc_precision = r.read_bits(2)? as u8;
    let picture_structure = r.read_bits(2)? as u8;
    let top_field_first = r.read_bit()?;
    r.skip_bit_placeholder()?;
    let repeat_first_field = r.read_bit()?;
    let progressive_frame = r.read_bit()?;
    Ok(PictureCodingExtension {
        intra_dc_precision,
        picture_structure,
        top_field_first,
        repeat_first_field,
        progressive_frame,
    })
}

impl<'a> BitReader<'a> {
    /// One reserved bit between `top_field_first` and `repeat_first_field`
    /// in the condensed layout this framer decodes.
    fn skip_bit_placeholder(&mut self) -> Result<()> {
        self.skip_bits(1)
    }
}

/// Level codes from `profile_and_level_indication`'s low nibble
/// (ISO/IEC 13818-2 Table 8-10), used to derive `max_octetrate`.
pub const LEVEL_MASK: u8 = 0x0F;
pub const LEVEL_LOW: u8 = 0x0A;
pub const LEVEL_MAIN: u8 = 0x08;
pub const LEVEL_HIGH_1440: u8 = 0x06;
pub const LEVEL_HIGH: u8 = 0x04;

pub fn max_octetrate_for_level(profile_and_level_indication: u8) -> Result<u32> {
    match profile_and_level_indication & LEVEL_MASK {
        LEVEL_LOW => Ok(500_000),
        LEVEL_MAIN => Ok(1_875_000),
        LEVEL_HIGH_1440 => Ok(7_500_000),
        LEVEL_HIGH => Ok(10_000_000),
        _ => Err(Mpeg2Error::InvalidStream("profile_and_level_indication")),
    }
}

pub fn chroma_format(code: u8) -> Result<ChromaFormat> {
    ChromaFormat::from_code(code)
}

pub fn picture_type(code: u8) -> Result<PictureType> {
    PictureType::from_code(code)
}

pub fn picture_structure(code: u8) -> Result<PictureStructure> {
    PictureStructure::from_code(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack_bits(spec: &[(u32, u32)]) -> Vec<u8> {
        let mut bit_pos = 0usize;
        let total_bits: u32 = spec.iter().map(|(_, n)| n).sum();
        let mut bytes = vec![0u8; ((total_bits + 7) / 8) as usize];
        for &(value, n) in spec {
            for i in (0..n).rev() {
                let bit = (value >> i) & 1;
                let byte_idx = bit_pos / 8;
                let bit_idx = 7 - (bit_pos % 8);
                bytes[byte_idx] |= (bit as u8) << bit_idx;
                bit_pos += 1;
            }
        }
        bytes
    }

    #[test]
    fn decodes_picture_header() {
        let bytes = pack_bits(&[(42, 10), (1, 3), (0xFFFF, 16), (0, 3)]);
        let hdr = decode_picture_header(&bytes).unwrap();
        assert_eq!(hdr.temporal_reference, 42);
        assert_eq!(hdr.picture_coding_type, 1);
        assert_eq!(hdr.vbv_delay, 0xFFFF);
    }

    #[test]
    fn decodes_gop_header_closed_broken() {
        let bytes = pack_bits(&[(0, 25), (1, 1), (1, 1), (0, 5)]);
        let gop = decode_gop_header(&bytes).unwrap();
        assert!(gop.closed_gop);
        assert!(gop.broken_link);
    }

    #[test]
    fn decodes_sequence_extension() {
        let bytes = pack_bits(&[
            (1, 4),  // ext id
            (0x44, 8), // profile/level: High/High
            (1, 1),  // progressive_sequence
            (1, 2),  // chroma_format = 4:2:0
            (0, 2),
            (0, 2),
            (0, 12),
            (1, 1), // marker_bit
            (10, 8),
            (1, 1), // low_delay
            (0, 2),
            (0, 5),
        ]);
        let ext = decode_sequence_extension(&bytes).unwrap();
        assert_eq!(ext.profile_and_level_indication, 0x44);
        assert!(ext.progressive_sequence);
        assert_eq!(ext.chroma_format, 1);
        assert!(ext.low_delay);
    }

    #[test]
    fn short_buffer_errors() {
        assert!(matches!(decode_gop_header(&[0, 0]), Err(Mpeg2Error::HeaderDecodeShort)));
    }
}
