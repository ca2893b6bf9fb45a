// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Deduplicates the sequence header/extension/display-extension trio
//! across frames and derives the output flow-def from it the first time (or
//! any time it changes).

use bytes::Bytes;
use log::warn;

use crate::error::Result;
use crate::flow::{ChromaFormat, FlowDef, Rational, Timestamp, UNSET};
use crate::header;

/// Standard `frame_rate_code` table (ISO/IEC 13818-2 Table 6-4), indices
/// 1..=8. Indices 9..=13 are nonstandard extensions several encoders emit
/// in the wild; this framer accepts them with a warning (see DESIGN.md).
fn frame_rate_table(code: u8) -> Result<(u64, u64)> {
    let standard = match code {
        1 => Some((24000, 1001)),
        2 => Some((24, 1)),
        3 => Some((25, 1)),
        4 => Some((30000, 1001)),
        5 => Some((30, 1)),
        6 => Some((50, 1)),
        7 => Some((60000, 1001)),
        8 => Some((60, 1)),
        _ => None,
    };
    if let Some(v) = standard {
        return Ok(v);
    }
    let nonstandard = match code {
        9 => Some((5000, 1001)),
        10 => Some((10000, 1001)),
        11 => Some((12000, 1001)),
        12 => Some((15000, 1001)),
        13 => Some((15000, 1001)), // Xing's nonstandard variant of code 12
        _ => None,
    };
    match nonstandard {
        Some(v) => {
            warn!("nonstandard frame_rate_code {code}, accepting for bug-compatibility");
            Ok(v)
        }
        None => Err(crate::error::Mpeg2Error::InvalidStream("frame_rate_code")),
    }
}

fn aspect_ratio(code: u8, hsize: u32, vsize: u32) -> Result<Rational> {
    if code == 1 {
        return Ok(Rational::new(1, 1));
    }
    let (k, m) = match code {
        2 => (4u64, 3u64),
        3 => (16, 9),
        4 => (221, 100),
        _ => return Err(crate::error::Mpeg2Error::InvalidStream("aspect_ratio_information")),
    };
    Ok(Rational::new(vsize as u64 * k, hsize as u64 * m))
}

/// Caches the currently-active sequence's three header blobs and the
/// flow-def and per-GOP state derived from them.
pub struct SequenceCache {
    header: Option<Bytes>,
    ext: Option<Bytes>,
    display: Option<Bytes>,
    flow_def: Option<FlowDef>,
    pub closed_gop: bool,
    pub broken_link: bool,
    pub last_picture_number: i64,
    pub last_temporal_reference: i32,
    pub systime_rap: Timestamp,
    pub systime_rap_ref: Timestamp,
}

impl SequenceCache {
    pub fn new() -> Self {
        Self {
            header: None,
            ext: None,
            display: None,
            flow_def: None,
            closed_gop: false,
            broken_link: false,
            last_picture_number: -1,
            last_temporal_reference: -1,
            systime_rap: UNSET,
            systime_rap_ref: UNSET,
        }
    }

    pub fn flow_def(&self) -> Option<&FlowDef> {
        self.flow_def.as_ref()
    }

    pub fn header_blob(&self) -> Option<&Bytes> {
        self.header.as_ref()
    }

    pub fn ext_blob(&self) -> Option<&Bytes> {
        self.ext.as_ref()
    }

    pub fn display_blob(&self) -> Option<&Bytes> {
        self.display.as_ref()
    }

    /// A GOP header was just decoded for the frame under construction:
    /// resets the per-GOP temporal-reference baseline and remembers
    /// whether this GOP is closed and/or broken-link. Both flags stay in
    /// effect for every picture of the GOP, not just the one carrying the
    /// header.
    pub fn observe_gop(&mut self, closed_gop: bool, broken_link: bool) {
        self.closed_gop = closed_gop;
        self.broken_link = broken_link;
        self.last_temporal_reference = -1;
        if closed_gop {
            self.systime_rap_ref = self.systime_rap;
        }
    }

    /// Computes this picture's absolute `picture_number` from its
    /// `temporal_reference`, advancing the running baseline only when the
    /// stream's temporal reference is itself advancing.
    pub fn picture_number(&mut self, temporal_reference: u16) -> u64 {
        let tref = temporal_reference as i64;
        let number = self.last_picture_number + (tref - self.last_temporal_reference as i64);
        if tref > self.last_temporal_reference as i64 {
            self.last_picture_number = number;
            self.last_temporal_reference = temporal_reference as i32;
        }
        number.max(0) as u64
    }

    /// Byte-compares `header`/`ext`/`display` against what's cached; if any
    /// differ, decodes the header chain into a fresh [`FlowDef`], caches the
    /// new blobs, and returns `true`. Returns `false` (no decode performed)
    /// when the incoming blobs are structurally identical to the cached
    /// ones, which is the common case of one sequence header repeated
    /// ahead of every GOP.
    pub fn observe(&mut self, header: Bytes, ext: Option<Bytes>, display: Option<Bytes>) -> Result<bool> {
        let changed = self.header.as_ref() != Some(&header) || self.ext != ext || self.display != display;
        if !changed {
            return Ok(false);
        }
        let flow_def = Self::parse(&header, ext.as_deref(), display.as_deref())?;
        self.flow_def = Some(flow_def);
        self.header = Some(header);
        self.ext = ext;
        self.display = display;
        Ok(true)
    }

    fn parse(header: &[u8], ext: Option<&[u8]>, display: Option<&[u8]>) -> Result<FlowDef> {
        let h = header::decode_sequence_header(header)?;
        // This framer targets the MPEG-2-with-extensions profile; a bare
        // sequence header with no extension carries no profile/level or
        // progressive-sequence flag to derive a flow-def from.
        let ext = ext.ok_or(crate::error::Mpeg2Error::InvalidStream("sequence_extension absent"))?;
        let e = header::decode_sequence_extension(ext)?;

        let hsize = h.horizontal_size | ((e.horizontal_size_extension as u32) << 12);
        let vsize = h.vertical_size | ((e.vertical_size_extension as u32) << 12);
        let bit_rate_units = h.bit_rate_value as u64 | ((e.bit_rate_extension as u64) << 18);
        let vbv_buffer_units = h.vbv_buffer_size_value as u32 | ((e.vbv_buffer_size_extension as u32) << 10);

        let (base_num, base_den) = frame_rate_table(h.frame_rate_code)?;
        let fps = if e.frame_rate_extension_n != 0 || e.frame_rate_extension_d != 0 {
            Rational::new(
                base_num * (e.frame_rate_extension_n as u64 + 1),
                base_den * (e.frame_rate_extension_d as u64 + 1),
            )
        } else {
            Rational::new(base_num, base_den)
        };

        if h.aspect_ratio_information == 0 || h.aspect_ratio_information > 4 {
            return Err(crate::error::Mpeg2Error::InvalidStream("aspect_ratio_information"));
        }
        let sample_aspect_ratio = aspect_ratio(h.aspect_ratio_information, hsize, vsize)?;

        let chroma = ChromaFormat::from_code(e.chroma_format)?;
        let max_octetrate = header::max_octetrate_for_level(e.profile_and_level_indication)?;

        let (hsize_visible, vsize_visible) = match display {
            Some(d) => {
                let disp = header::decode_sequence_display_extension(d)?;
                (Some(disp.display_horizontal_size), Some(disp.display_vertical_size))
            }
            None => (None, None),
        };

        Ok(FlowDef {
            fps,
            max_octetrate,
            octetrate: (bit_rate_units * 50) as u32,
            cpb_buffer: vbv_buffer_units * 2048,
            hsize,
            vsize,
            hsize_visible,
            vsize_visible,
            sample_aspect_ratio,
            profile_level: e.profile_and_level_indication,
            low_delay: e.low_delay,
            chroma,
            progressive_sequence: e.progressive_sequence,
        })
    }
}

impl Default for SequenceCache {
    fn default() -> Self {
        Self::new()
    }
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

    fn seq_header_bytes(hsize: u32, vsize: u32, aspect: u8, frate: u8, bitrate: u32, vbv: u32) -> Vec<u8> {
        pack_bits(&[
            (hsize, 12),
            (vsize, 12),
            (aspect as u32, 4),
            (frate as u32, 4),
            (bitrate, 18),
            (vbv, 10),
            (0, 36), // reserved/padding, ending with the two matrix-load bits in byte 11
        ])
    }

    fn seq_ext_bytes(profile_level: u8, progressive: bool, chroma: u8) -> Vec<u8> {
        pack_bits(&[
            (1, 4),
            (profile_level as u32, 8),
            (progressive as u32, 1),
            (chroma as u32, 2),
            (0, 2),
            (0, 2),
            (0, 12),
            (1, 1),
            (0, 8),
            (0, 1),
            (0, 2),
            (0, 5),
        ])
    }

    #[test]
    fn scenario1_flow_def_math() {
        let header = seq_header_bytes(720, 480, 2, 4, 1000, 100);
        let ext = seq_ext_bytes(0x44, true, 1);
        let mut cache = SequenceCache::new();
        let changed = cache
            .observe(Bytes::from(header), Some(Bytes::from(ext)), None)
            .unwrap();
        assert!(changed);
        let flow = cache.flow_def().unwrap();
        assert_eq!(flow.hsize, 720);
        assert_eq!(flow.vsize, 480);
        assert_eq!(flow.fps, Rational::new(30000, 1001));
        assert_eq!(flow.sample_aspect_ratio, Rational::new(8, 9));
        assert!(flow.progressive_sequence);
    }

    #[test]
    fn unchanged_sequence_does_not_redecode() {
        let header = seq_header_bytes(720, 480, 2, 4, 1000, 100);
        let ext = seq_ext_bytes(0x44, true, 1);
        let mut cache = SequenceCache::new();
        cache
            .observe(Bytes::from(header.clone()), Some(Bytes::from(ext.clone())), None)
            .unwrap();
        let changed_again = cache.observe(Bytes::from(header), Some(Bytes::from(ext)), None).unwrap();
        assert!(!changed_again);
    }

    #[test]
    fn picture_number_matches_temporal_reference_sequence() {
        let mut cache = SequenceCache::new();
        cache.observe_gop(true, false);
        assert_eq!(cache.picture_number(2), 2);
        assert_eq!(cache.picture_number(5), 5);
        assert_eq!(cache.picture_number(0), 0);
        assert_eq!(cache.picture_number(1), 1);
    }
}
