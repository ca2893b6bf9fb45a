// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The driving state machine: consumes chunks, scans for start codes, and
//! emits one [`Frame`] per coded picture. Shaped like a stateless decoder's
//! main loop — a `decode()` entry point driving a small state enum and
//! reporting a set of lifecycle events back to the caller — generalized
//! from "decode a coded frame" to "frame a coded picture".

use std::ops::Range;

use log::{error, info, warn};

use crate::buffer_stream::{BufferStream, ByteChunk, ByteRope};
use crate::error::{Mpeg2Error, Result};
use crate::flow::{FlowDef, PictureAttributes, PictureType, Timestamp, TimestampSet, UNSET};
use crate::header;
use crate::sequence_cache::SequenceCache;
use crate::start_code;
use crate::timing;

/// Default cap on how large a single in-construction frame may grow before
/// the framer gives up waiting for a boundary and resynchronizes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerState {
    Acquiring,
    Between,
    Inside,
}

#[derive(Debug, Clone, Copy)]
struct FrameBuildState {
    acquired: bool,
    next_frame_sequence: bool,
    sequence_ext_offset: Option<usize>,
    sequence_display_offset: Option<usize>,
    gop_offset: Option<usize>,
    picture_offset: Option<usize>,
    picture_ext_offset: Option<usize>,
    slice_seen: bool,
    frame_error: bool,
    pending_timestamps: TimestampSet,
    pending_systime_rap: Timestamp,
}

impl FrameBuildState {
    fn new() -> Self {
        Self {
            acquired: false,
            next_frame_sequence: false,
            sequence_ext_offset: None,
            sequence_display_offset: None,
            gop_offset: None,
            picture_offset: None,
            picture_ext_offset: None,
            slice_seen: false,
            frame_error: false,
            pending_timestamps: TimestampSet::default(),
            pending_systime_rap: UNSET,
        }
    }

    /// Resets everything specific to the frame that was just emitted (or
    /// abandoned), while keeping `acquired` and the pending timestamp
    /// channels, which belong to the stream as a whole rather than to one
    /// frame.
    fn begin_frame(&mut self) {
        self.next_frame_sequence = false;
        self.sequence_ext_offset = None;
        self.sequence_display_offset = None;
        self.gop_offset = None;
        self.picture_offset = None;
        self.picture_ext_offset = None;
        self.slice_seen = false;
        self.frame_error = false;
    }
}

/// An emitted coded picture: a byte rope (start codes and all, in stream
/// order) plus its decoded attributes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: ByteRope,
    pub flow_def_changed: Option<FlowDef>,
    pub attributes: PictureAttributes,
}

impl Frame {
    pub fn into_bytes(self) -> bytes::Bytes {
        self.bytes.to_contiguous()
    }

    pub fn iter(&self) -> impl Iterator<Item = &bytes::Bytes> {
        self.bytes.segments().iter()
    }
}

/// The synchronous downstream callback a [`Mpeg2Framer`] emits frames to.
pub trait FrameSink {
    fn frame_ready(&mut self, frame: Frame);
}

/// Lifecycle and resync events a call to [`Mpeg2Framer::input`] or
/// [`Mpeg2Framer::drain`] can report alongside any frames it emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Mpeg2Event {
    Ready,
    Dead,
    SyncAcquired,
    SyncLost,
    Fatal(Mpeg2Error),
}

struct HeaderSpans {
    header: Range<usize>,
    ext: Option<Range<usize>>,
    display: Option<Range<usize>>,
    gop: Option<Range<usize>>,
}

/// Computes the byte range of each structural element's *body* (excluding
/// its own four-byte start code) within the frame's prefix region
/// `[0, picture_offset)`.
fn header_spans(build: &FrameBuildState, picture_offset: usize) -> HeaderSpans {
    let mut markers = vec![picture_offset];
    if let Some(g) = build.gop_offset {
        markers.push(g);
    }
    if let Some(d) = build.sequence_display_offset {
        markers.push(d);
    }
    if let Some(e) = build.sequence_ext_offset {
        markers.push(e);
    }
    markers.sort_unstable();
    let next_after = |off: usize| markers.iter().copied().find(|&m| m > off).unwrap_or(picture_offset);

    let header_end = *markers.first().unwrap_or(&picture_offset);
    HeaderSpans {
        header: 4.min(header_end)..header_end,
        ext: build.sequence_ext_offset.map(|off| (off + 4)..next_after(off)),
        display: build.sequence_display_offset.map(|off| (off + 4)..next_after(off)),
        gop: build.gop_offset.map(|off| (off + 4)..next_after(off)),
    }
}

/// Drives start-code scanning and frame assembly for one MPEG-2 video
/// elementary stream. Not `Sync`/reentrant: `input` must run to completion
/// before the next call.
pub struct Mpeg2Framer {
    stream: BufferStream,
    state: FramerState,
    build: FrameBuildState,
    cache: SequenceCache,
    sink: Option<Box<dyn FrameSink>>,
    insert_sequence: bool,
    dead: bool,
    max_frame_size: usize,
}

impl Mpeg2Framer {
    pub fn new() -> Self {
        Self {
            stream: BufferStream::new(),
            state: FramerState::Acquiring,
            build: FrameBuildState::new(),
            cache: SequenceCache::new(),
            sink: None,
            insert_sequence: false,
            dead: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn set_output(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    pub fn get_output(&self) -> bool {
        self.sink.is_some()
    }

    pub fn get_sequence_insertion(&self) -> bool {
        self.insert_sequence
    }

    pub fn set_sequence_insertion(&mut self, insert: bool) {
        self.insert_sequence = insert;
    }

    pub fn get_flow_def(&self) -> Option<&FlowDef> {
        self.cache.flow_def()
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }

    /// Feeds one upstream chunk in. Runs the scan/emit loop until buffered
    /// data is exhausted, synchronously calling the output sink for every
    /// frame boundary found, and returns the lifecycle events raised along
    /// the way.
    pub fn input(&mut self, chunk: ByteChunk) -> Result<Vec<Mpeg2Event>> {
        if self.dead {
            return Err(Mpeg2Error::Dead);
        }
        let mut events = Vec::new();

        if chunk.discontinuity {
            if self.build.slice_seen {
                self.build.frame_error = true;
            } else {
                self.stream.reset();
                self.build.begin_frame();
                self.state = FramerState::Acquiring;
                info!("discontinuity before any slice seen, resynchronizing");
                events.push(Mpeg2Event::SyncLost);
            }
        }

        let timestamps = chunk.timestamps;
        let systime_rap = chunk.systime_rap;
        self.stream.append(chunk);
        // Bind this chunk's timestamps to the frame under construction only
        // while its picture start code hasn't been located yet: once it has,
        // a prior chunk already supplied the correct binding PTS (the
        // picture start code can only ever be found in the chunk whose
        // bytes contain it, before any later chunk arrives), and later
        // chunks carry only trailing slice/end data for the same frame.
        if self.build.picture_offset.is_none() {
            self.build.pending_timestamps = timestamps;
            self.build.pending_systime_rap = systime_rap;
        }

        if let Err(e) = self.drive(&mut events) {
            self.dead = true;
            error!("{e}, framer instance is now dead");
            events.push(Mpeg2Event::Fatal(e.clone()));
            return Err(e);
        }

        Ok(events)
    }

    /// Forces emission of whatever frame is currently under construction,
    /// for end-of-stream. A no-op if no picture header has been seen yet.
    pub fn drain(&mut self) -> Result<Vec<Mpeg2Event>> {
        if self.dead {
            return Err(Mpeg2Error::Dead);
        }
        let mut events = Vec::new();
        if self.state == FramerState::Inside && self.build.picture_offset.is_some() {
            self.stream.next_frame_size = self.stream.total_size();
            if let Err(e) = self.emit_frame(&mut events) {
                self.recover_from_error(&e, &mut events);
            }
        }
        Ok(events)
    }

    fn drive(&mut self, events: &mut Vec<Mpeg2Event>) -> Result<()> {
        loop {
            // The cap bounds one in-construction frame, not the run of
            // garbage that may precede acquisition; a long stretch of
            // non-sequence start codes while still hunting for the first
            // SEQUENCE_HEADER must not spuriously trip it.
            if self.state != FramerState::Acquiring && self.stream.next_frame_size > self.max_frame_size {
                self.recover_from_error(&Mpeg2Error::FrameTooLarge { limit: self.max_frame_size }, events);
                continue;
            }
            let Some(word) = self.stream.scan_for_start_code() else {
                break;
            };
            let id = (word & 0xFF) as u8;

            if id == start_code::EXTENSION && self.stream.total_size() <= self.stream.next_frame_size {
                // The selector byte hasn't arrived yet; rewind the match and
                // wait for more input before deciding what this extension is.
                self.stream.next_frame_size -= 4;
                break;
            }

            let code_start = self.stream.next_frame_size - 4;
            let result = match self.state {
                FramerState::Acquiring => self.handle_acquiring(id, events),
                FramerState::Between => self.handle_between(id, code_start, events),
                FramerState::Inside => self.handle_inside(id, code_start, events),
            };
            if let Err(e) = result {
                if e == Mpeg2Error::Alloc {
                    return Err(e);
                }
                self.recover_from_error(&e, events);
            }
        }
        Ok(())
    }

    fn peek_extension_selector(&self) -> Result<u8> {
        let byte = self.stream.peek(self.stream.next_frame_size, 1)?;
        Ok(byte[0] >> 4)
    }

    fn handle_acquiring(&mut self, id: u8, events: &mut Vec<Mpeg2Event>) -> Result<()> {
        match id {
            start_code::SEQUENCE_HEADER => {
                self.stream.sync_to_last_start_code()?;
                self.build.begin_frame();
                self.build.acquired = true;
                self.build.next_frame_sequence = true;
                self.state = FramerState::Between;
                info!("sequence header found, sync acquired");
                events.push(Mpeg2Event::SyncAcquired);
            }
            start_code::PICTURE => {
                // Pending timestamps were latched for data we're about to
                // discard; they no longer describe anything meaningful.
                self.build.pending_timestamps = TimestampSet::default();
                self.build.pending_systime_rap = UNSET;
            }
            _ => {
                self.stream.sync_to_last_start_code()?;
            }
        }
        Ok(())
    }

    fn handle_between(&mut self, id: u8, code_start: usize, _events: &mut Vec<Mpeg2Event>) -> Result<()> {
        match id {
            start_code::EXTENSION => {
                let selector = self.peek_extension_selector()?;
                match selector {
                    start_code::EXT_SEQUENCE => self.build.sequence_ext_offset = Some(code_start),
                    start_code::EXT_SEQUENCE_DISPLAY => self.build.sequence_display_offset = Some(code_start),
                    _ => {}
                }
                Ok(())
            }
            start_code::GROUP_OF_PICTURES => {
                self.build.gop_offset = Some(code_start);
                Ok(())
            }
            start_code::PICTURE => {
                self.build.picture_offset = Some(code_start);
                self.state = FramerState::Inside;
                Ok(())
            }
            start_code::USER_DATA => Ok(()),
            _ => Err(Mpeg2Error::SyncLost),
        }
    }

    fn handle_inside(&mut self, id: u8, code_start: usize, events: &mut Vec<Mpeg2Event>) -> Result<()> {
        match id {
            start_code::EXTENSION => {
                let selector = self.peek_extension_selector()?;
                if selector == start_code::EXT_PICTURE_CODING {
                    self.build.picture_ext_offset = Some(code_start);
                }
                Ok(())
            }
            start_code::SEQUENCE_HEADER | start_code::GROUP_OF_PICTURES | start_code::PICTURE => {
                // This start code belongs to the next frame, not the one
                // about to be emitted.
                self.stream.next_frame_size -= 4;
                self.emit_frame(events)?;
                self.build.begin_frame();
                // The marker's 4 bytes are already scanned and accounted for
                // as the new frame's local offset 0; resume scanning right
                // after them rather than rediscovering the same match.
                self.stream.next_frame_size = 4;
                match id {
                    start_code::SEQUENCE_HEADER => {
                        self.build.next_frame_sequence = true;
                        self.state = FramerState::Between;
                    }
                    start_code::GROUP_OF_PICTURES => {
                        self.build.gop_offset = Some(0);
                        self.state = FramerState::Between;
                    }
                    start_code::PICTURE => {
                        self.build.picture_offset = Some(0);
                        self.state = FramerState::Inside;
                    }
                    _ => unreachable!(),
                }
                Ok(())
            }
            start_code::SEQUENCE_END => {
                self.emit_frame(events)?;
                self.build.begin_frame();
                self.state = FramerState::Acquiring;
                info!("sequence-end code, sync lost");
                events.push(Mpeg2Event::SyncLost);
                Ok(())
            }
            start_code::USER_DATA => Ok(()),
            id if start_code::is_slice(id) => {
                self.build.slice_seen = true;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn recover_from_error(&mut self, e: &Mpeg2Error, events: &mut Vec<Mpeg2Event>) {
        match e {
            Mpeg2Error::InvalidStream(_) => {
                // An unsupported framerate/profile/level/chroma/aspect code.
                // By the time this surfaces, emit_frame's extract() calls
                // already consumed the offending sequence/picture's bytes,
                // so there is nothing left to skip but the stale build
                // state. Abort just this sequence's flow-def emission and
                // keep going from wherever we already were: no sync lost,
                // no change of state.
                warn!("{e}, dropping this sequence, staying acquired");
                self.build.begin_frame();
            }
            Mpeg2Error::SyncLost => {
                warn!("{e}, resynchronizing");
                self.stream.reset();
                self.build.begin_frame();
                self.state = FramerState::Acquiring;
                events.push(Mpeg2Event::SyncLost);
            }
            _ => {
                warn!("{e}, resynchronizing");
                self.stream.next_frame_size = 0;
                self.stream.reset_scan_context();
                self.build.begin_frame();
                self.state = FramerState::Acquiring;
                events.push(Mpeg2Event::SyncLost);
            }
        }
    }

    fn emit_frame(&mut self, events: &mut Vec<Mpeg2Event>) -> Result<()> {
        let total_len = self.stream.next_frame_size;
        let picture_offset = self.build.picture_offset.ok_or(Mpeg2Error::SyncLost)?;

        let prefix = self.stream.extract(picture_offset)?;

        let frozen_timestamps = self.build.pending_timestamps;
        let frozen_systime_rap = self.build.pending_systime_rap;
        self.build.pending_timestamps = TimestampSet::default();
        self.build.pending_systime_rap = UNSET;

        let payload = self.stream.extract(total_len - picture_offset)?;

        let spans = header_spans(&self.build, picture_offset);

        let mut new_flow_def = None;
        if self.build.next_frame_sequence {
            let header_blob = prefix.slice(spans.header.clone());
            let ext_blob = spans.ext.clone().map(|r| prefix.slice(r));
            let display_blob = spans.display.clone().map(|r| prefix.slice(r));
            if self.cache.observe(header_blob, ext_blob, display_blob)? {
                new_flow_def = self.cache.flow_def().cloned();
            }
        }

        if let Some(gop_range) = spans.gop.clone() {
            let gop_blob = prefix.slice(gop_range);
            let gop = header::decode_gop_header(&gop_blob)?;
            self.cache.observe_gop(gop.closed_gop, gop.broken_link);
        }

        let pic_header_data = payload.slice(4..4 + header::PICTURE_HEADER_LEN);
        let pic = header::decode_picture_header(&pic_header_data)?;
        let picture_type = header::picture_type(pic.picture_coding_type)?;

        let field_flags = if let Some(pext_off) = self.build.picture_ext_offset {
            let local = (pext_off - picture_offset) + 4;
            let pext_data = payload.slice(local..local + header::PICTURE_CODING_EXTENSION_LEN);
            let pext = header::decode_picture_coding_extension(&pext_data)?;
            if pext.intra_dc_precision > 0 {
                warn!("intra_dc_precision > 0 in picture coding extension");
            }
            let structure = header::picture_structure(pext.picture_structure)?;
            timing::field_flags_from_extension(
                structure,
                pext.top_field_first,
                pext.repeat_first_field,
                pext.progressive_frame,
            )
        } else {
            timing::field_flags_progressive_default()
        };

        let (fps_num, fps_den, progressive_sequence) = match self.cache.flow_def() {
            Some(f) => (f.fps.num, f.fps.den, f.progressive_sequence),
            None => return Err(Mpeg2Error::SyncLost),
        };
        let duration = timing::duration(fps_num, fps_den, progressive_sequence, &field_flags);
        let vbv_delay = timing::vbv_delay_ticks(pic.vbv_delay);

        let picture_number = self.cache.picture_number(pic.temporal_reference);

        let systime_rap = timing::apply_rap(
            &mut self.cache.systime_rap,
            &mut self.cache.systime_rap_ref,
            picture_type,
            frozen_systime_rap,
        );

        let mut segments = ByteRope::new();
        if self.insert_sequence && !self.build.next_frame_sequence && picture_type == PictureType::I {
            if let Some(header_blob) = self.cache.header_blob() {
                segments.push(header_blob.clone());
                if let Some(ext) = self.cache.ext_blob() {
                    segments.push(ext.clone());
                }
                if let Some(disp) = self.cache.display_blob() {
                    segments.push(disp.clone());
                }
            }
        }
        segments.extend(prefix);
        segments.extend(payload);

        let frame = Frame {
            bytes: segments,
            flow_def_changed: new_flow_def,
            attributes: PictureAttributes {
                picture_number,
                picture_type,
                duration,
                vbv_delay,
                top_field: field_flags.top_field,
                bottom_field: field_flags.bottom_field,
                top_field_first: field_flags.top_field_first,
                progressive: field_flags.progressive,
                random_access_point: self.build.next_frame_sequence
                    || (self.insert_sequence && picture_type == PictureType::I),
                discontinuity: self.cache.broken_link || (!self.cache.closed_gop && self.build.frame_error),
                systime_rap,
                timestamps: frozen_timestamps,
            },
        };

        if let Some(sink) = self.sink.as_mut() {
            sink.frame_ready(frame);
        }
        let _ = events;

        self.propagate_dts(frozen_timestamps, duration);

        Ok(())
    }

    fn propagate_dts(&mut self, emitted: TimestampSet, duration: u64) {
        let pending = &mut self.build.pending_timestamps;
        if pending.dts_orig == UNSET && emitted.dts_orig != UNSET {
            pending.dts_orig = emitted.dts_orig + duration;
        }
        if pending.dts == UNSET && emitted.dts != UNSET {
            pending.dts = emitted.dts + duration;
        }
        if pending.dts_sys == UNSET && emitted.dts_sys != UNSET {
            pending.dts_sys = emitted.dts_sys + duration;
        }
    }
}

impl Default for Mpeg2Framer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

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
        let mut v = vec![0x00, 0x00, 0x01, start_code::SEQUENCE_HEADER];
        v.extend(pack_bits(&[
            (hsize, 12),
            (vsize, 12),
            (aspect as u32, 4),
            (frate as u32, 4),
            (bitrate, 18),
            (vbv, 10),
            (0, 36),
        ]));
        v
    }

    fn seq_ext_bytes(profile_level: u8, progressive: bool, chroma: u8) -> Vec<u8> {
        let mut v = vec![0x00, 0x00, 0x01, start_code::EXTENSION];
        v.extend(pack_bits(&[
            (start_code::EXT_SEQUENCE as u32, 4),
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
        ]));
        v
    }

    fn gop_bytes(closed: bool, broken_link: bool) -> Vec<u8> {
        let mut v = vec![0x00, 0x00, 0x01, start_code::GROUP_OF_PICTURES];
        v.extend(pack_bits(&[(0, 25), (closed as u32, 1), (broken_link as u32, 1), (0, 5)]));
        v
    }

    fn picture_bytes(temporal_reference: u16, coding_type: u8) -> Vec<u8> {
        let mut v = vec![0x00, 0x00, 0x01, start_code::PICTURE];
        v.extend(pack_bits(&[(temporal_reference as u32, 10), (coding_type as u32, 3), (0xFFFF, 16), (0, 3)]));
        v
    }

    fn picture_ext_bytes(structure: u8, top_field_first: bool, repeat_first_field: bool, progressive: bool) -> Vec<u8> {
        let mut v = vec![0x00, 0x00, 0x01, start_code::EXTENSION];
        v.extend(pack_bits(&[
            (start_code::EXT_PICTURE_CODING as u32, 4),
            (0, 2),
            (structure as u32, 2),
            (top_field_first as u32, 1),
            (0, 1),
            (repeat_first_field as u32, 1),
            (progressive as u32, 1),
            (0, 28),
        ]));
        v
    }

    fn slice_bytes(id: u8) -> Vec<u8> {
        vec![0x00, 0x00, 0x01, id, 0xAA, 0xBB]
    }

    fn minimal_i_stream() -> Vec<u8> {
        let mut v = seq_header_bytes(720, 480, 2, 4, 1000, 100);
        v.extend(seq_ext_bytes(0x44, true, 1));
        v.extend(gop_bytes(true, false));
        v.extend(picture_bytes(0, 1));
        v.extend(picture_ext_bytes(3, true, false, true));
        v.extend(slice_bytes(0x01));
        v
    }

    /// A `FrameSink` that hands its collected frames back through a shared
    /// handle, so tests can both own the framer and read what it emitted.
    struct RecordingSink(std::rc::Rc<std::cell::RefCell<Vec<Frame>>>);

    impl FrameSink for RecordingSink {
        fn frame_ready(&mut self, frame: Frame) {
            self.0.borrow_mut().push(frame);
        }
    }

    /// Builds a fresh framer wired to a `RecordingSink`, returning both the
    /// framer and the handle its collected frames can be read from.
    fn new_recording_framer() -> (Mpeg2Framer, std::rc::Rc<std::cell::RefCell<Vec<Frame>>>) {
        let collected = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut framer = Mpeg2Framer::new();
        framer.set_output(Box::new(RecordingSink(collected.clone())));
        (framer, collected)
    }

    /// Runs `chunks` through a fresh framer with a private sink, returning
    /// the frames it collected.
    fn run(chunks: Vec<Vec<u8>>) -> Vec<Frame> {
        let (mut framer, collected) = new_recording_framer();
        for chunk in chunks {
            framer.input(ByteChunk::new(Bytes::from(chunk))).unwrap();
        }
        framer.drain().unwrap();
        let frames = collected.borrow();
        frames.clone()
    }

    #[test]
    fn scenario1_minimal_i_only_stream() {
        let mut stream = minimal_i_stream();
        stream.extend(vec![0x00, 0x00, 0x01, start_code::SEQUENCE_END]);
        let frames = run(vec![stream]);
        assert_eq!(frames.len(), 1);
        let f = &frames[0];
        assert_eq!(f.attributes.picture_number, 0);
        assert_eq!(f.attributes.picture_type, PictureType::I);
        assert_eq!(f.attributes.duration, 900_900);
        assert!(f.attributes.random_access_point);
        assert!(f.flow_def_changed.is_some());
    }

    #[test]
    fn scenario3_cross_chunk_start_code_split() {
        let stream = minimal_i_stream();
        // Split right inside the sequence-header start code.
        let mid = 2;
        let (a, b) = stream.split_at(mid);
        let frames = run(vec![a.to_vec(), b.to_vec()]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].attributes.picture_type, PictureType::I);
    }

    #[test]
    fn pts_binds_to_the_chunk_holding_its_picture_start_code() {
        // Chunk A carries the whole first picture but no terminator, so it
        // stays queued while its slice data is scanned. Chunk B arrives
        // later carrying the second picture's start code plus its own PTS;
        // that PTS must bind to the second picture, not be lost because
        // chunk A was still the physical queue head when B was appended.
        let mut chunk_a = seq_header_bytes(720, 480, 2, 4, 1000, 100);
        chunk_a.extend(seq_ext_bytes(0x44, true, 1));
        chunk_a.extend(gop_bytes(true, false));
        chunk_a.extend(picture_bytes(0, 1));
        chunk_a.extend(picture_ext_bytes(3, true, false, true));
        chunk_a.extend(slice_bytes(0x01));

        let mut chunk_b = picture_bytes(1, 1);
        chunk_b.extend(picture_ext_bytes(3, true, false, true));
        chunk_b.extend(slice_bytes(0x01));
        chunk_b.extend(vec![0x00, 0x00, 0x01, start_code::SEQUENCE_END]);

        let (mut framer, collected) = new_recording_framer();
        let a_timestamps = TimestampSet { pts: 1000, ..TimestampSet::default() };
        let b_timestamps = TimestampSet { pts: 2000, ..TimestampSet::default() };
        framer
            .input(ByteChunk::new(Bytes::from(chunk_a)).with_timestamps(a_timestamps))
            .unwrap();
        framer
            .input(ByteChunk::new(Bytes::from(chunk_b)).with_timestamps(b_timestamps))
            .unwrap();
        framer.drain().unwrap();

        let frames = collected.borrow();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].attributes.timestamps.pts, 1000);
        assert_eq!(frames[1].attributes.timestamps.pts, 2000);
    }

    #[test]
    fn scenario2_ibp_reorder_picture_numbers_and_rap() {
        let mut stream = seq_header_bytes(720, 480, 2, 4, 1000, 100);
        stream.extend(seq_ext_bytes(0x44, true, 1));
        stream.extend(gop_bytes(true, false));
        stream.extend(picture_bytes(2, 1));
        stream.extend(picture_ext_bytes(3, true, false, true));
        stream.extend(slice_bytes(0x01));
        stream.extend(picture_bytes(5, 2));
        stream.extend(picture_ext_bytes(3, true, false, true));
        stream.extend(slice_bytes(0x01));
        stream.extend(picture_bytes(0, 3));
        stream.extend(picture_ext_bytes(3, true, false, true));
        stream.extend(slice_bytes(0x01));
        stream.extend(picture_bytes(1, 3));
        stream.extend(picture_ext_bytes(3, true, false, true));
        stream.extend(slice_bytes(0x01));

        let frames = run(vec![stream]);
        assert_eq!(frames.len(), 4);
        let numbers: Vec<u64> = frames.iter().map(|f| f.attributes.picture_number).collect();
        assert_eq!(numbers, vec![2, 5, 0, 1]);

        let rap0 = frames[0].attributes.systime_rap;
        assert_eq!(frames[1].attributes.systime_rap, rap0);
        assert_eq!(frames[2].attributes.systime_rap, rap0);
        assert_eq!(frames[3].attributes.systime_rap, rap0);
    }

    #[test]
    fn scenario4_insert_sequence_ahead_of_i_picture() {
        let (mut framer, collected) = new_recording_framer();
        framer.set_sequence_insertion(true);

        let mut first_gop = seq_header_bytes(720, 480, 2, 4, 1000, 100);
        first_gop.extend(seq_ext_bytes(0x44, true, 1));
        first_gop.extend(gop_bytes(true, false));
        first_gop.extend(picture_bytes(0, 1));
        first_gop.extend(picture_ext_bytes(3, true, false, true));
        first_gop.extend(slice_bytes(0x01));

        // Second GOP's I picture carries no sequence header of its own.
        let mut second_gop = gop_bytes(true, false);
        second_gop.extend(picture_bytes(0, 1));
        second_gop.extend(picture_ext_bytes(3, true, false, true));
        second_gop.extend(slice_bytes(0x01));
        second_gop.extend(vec![0x00, 0x00, 0x01, start_code::SEQUENCE_END]);

        framer.input(ByteChunk::new(Bytes::from(first_gop))).unwrap();
        framer.input(ByteChunk::new(Bytes::from(second_gop))).unwrap();
        framer.drain().unwrap();

        let frames = collected.borrow();
        assert_eq!(frames.len(), 2);
        let second = frames[1].clone().into_bytes();
        assert_eq!(&second[0..4], &[0x00, 0x00, 0x01, start_code::SEQUENCE_HEADER]);
    }

    #[test]
    fn scenario5_discontinuity_before_slice_is_destructive() {
        let (mut framer, _collected) = new_recording_framer();

        let mut partial = seq_header_bytes(720, 480, 2, 4, 1000, 100);
        partial.extend(seq_ext_bytes(0x44, true, 1));
        partial.extend(gop_bytes(true, false));
        partial.extend(picture_bytes(0, 1));
        // No slice yet: discontinuity here must be destructive.
        let events = framer
            .input(ByteChunk::new(Bytes::from(partial)).with_discontinuity(false))
            .unwrap();
        assert!(events.is_empty());

        let events = framer
            .input(ByteChunk::new(Bytes::from_static(b"\x00")).with_discontinuity(true))
            .unwrap();
        assert_eq!(events, vec![Mpeg2Event::SyncLost]);
    }

    #[test]
    fn scenario6_broken_link_gop_marks_discontinuity() {
        let mut stream = seq_header_bytes(720, 480, 2, 4, 1000, 100);
        stream.extend(seq_ext_bytes(0x44, true, 1));
        stream.extend(gop_bytes(false, true));
        stream.extend(picture_bytes(0, 3));
        stream.extend(picture_ext_bytes(3, true, false, true));
        stream.extend(slice_bytes(0x01));
        let frames = run(vec![stream]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].attributes.discontinuity);
    }
}
