// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Queued byte storage: input chunks come in, sized runs come out, without
//! ever copying bytes that are already contiguous.

use std::collections::VecDeque;
use std::ops::Range;

use bytes::{Bytes, BytesMut};

use crate::error::{Mpeg2Error, Result};
use crate::flow::{Timestamp, TimestampSet, UNSET};
use crate::start_code::{self, IDLE_CONTEXT};

/// One input buffer as handed to [`crate::Mpeg2Framer::input`], carrying its
/// bytes plus whatever upstream metadata was attached to it.
#[derive(Debug, Clone)]
pub struct ByteChunk {
    pub bytes: Bytes,
    pub timestamps: TimestampSet,
    pub systime_rap: Timestamp,
    pub discontinuity: bool,
}

impl ByteChunk {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            timestamps: TimestampSet::default(),
            systime_rap: UNSET,
            discontinuity: false,
        }
    }

    pub fn with_timestamps(mut self, timestamps: TimestampSet) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn with_systime_rap(mut self, systime_rap: Timestamp) -> Self {
        self.systime_rap = systime_rap;
        self
    }

    pub fn with_discontinuity(mut self, discontinuity: bool) -> Self {
        self.discontinuity = discontinuity;
        self
    }
}

/// An ordered run of byte segments that together form one contiguous
/// logical span, without requiring that span to be contiguous in memory.
///
/// This is how extracted frame content is represented: a prefix pulled from
/// one chunk and a payload pulled from the next are two segments in the same
/// rope, no copy needed unless a caller explicitly asks for one.
#[derive(Debug, Clone, Default)]
pub struct ByteRope(Vec<Bytes>);

impl ByteRope {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, bytes: Bytes) {
        if !bytes.is_empty() {
            self.0.push(bytes);
        }
    }

    pub fn extend(&mut self, other: ByteRope) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| b.is_empty())
    }

    pub fn segments(&self) -> &[Bytes] {
        &self.0
    }

    /// Copies a sub-range of the rope's logical bytes out as one contiguous
    /// [`Bytes`]. Used to hand small header regions to the bit reader.
    pub fn slice(&self, range: Range<usize>) -> Bytes {
        if range.start >= range.end {
            return Bytes::new();
        }
        let mut out = BytesMut::with_capacity(range.end - range.start);
        let mut pos = 0usize;
        for seg in &self.0 {
            let seg_end = pos + seg.len();
            if seg_end > range.start && pos < range.end {
                let start = range.start.saturating_sub(pos);
                let end = (range.end - pos).min(seg.len());
                out.extend_from_slice(&seg[start..end]);
            }
            pos = seg_end;
            if pos >= range.end {
                break;
            }
        }
        out.freeze()
    }

    /// Splits the rope into two ropes at `at`, each covering its own share
    /// of the original segments without copying.
    pub fn split_at(&self, at: usize) -> (ByteRope, ByteRope) {
        let mut left = ByteRope::new();
        let mut right = ByteRope::new();
        let mut pos = 0usize;
        for seg in &self.0 {
            let seg_end = pos + seg.len();
            if seg_end <= at {
                left.push(seg.clone());
            } else if pos >= at {
                right.push(seg.clone());
            } else {
                let split = at - pos;
                left.push(seg.slice(0..split));
                right.push(seg.slice(split..seg.len()));
            }
            pos = seg_end;
        }
        (left, right)
    }

    /// Concatenates all segments into one contiguous buffer. A no-op clone
    /// when there is already exactly one segment.
    pub fn to_contiguous(&self) -> Bytes {
        match self.0.len() {
            0 => Bytes::new(),
            1 => self.0[0].clone(),
            _ => {
                let mut out = BytesMut::with_capacity(self.len());
                for seg in &self.0 {
                    out.extend_from_slice(seg);
                }
                out.freeze()
            }
        }
    }
}

/// The queued-bytes half of the logical stream state: chunks waiting to be
/// consumed, how far into the head chunk we've already taken, how many
/// bytes have been scanned toward the frame currently under construction,
/// and the rolling start-code accumulator.
pub struct BufferStream {
    queue: VecDeque<ByteChunk>,
    head_offset: usize,
    pub next_frame_size: usize,
    scan_context: u32,
}

impl BufferStream {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            head_offset: 0,
            next_frame_size: 0,
            scan_context: IDLE_CONTEXT,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queues `chunk`.
    pub fn append(&mut self, chunk: ByteChunk) {
        self.queue.push_back(chunk);
    }

    pub fn total_size(&self) -> usize {
        self.queue
            .iter()
            .enumerate()
            .map(|(i, c)| if i == 0 { c.bytes.len() - self.head_offset } else { c.bytes.len() })
            .sum()
    }

    /// Returns the longest contiguous run of unread bytes starting at
    /// logical `offset`, without copying. Used by the start-code scanner,
    /// which only needs to see runs long enough to find its next match.
    pub fn read_span(&self, offset: usize) -> &[u8] {
        let mut remaining = offset;
        for (i, chunk) in self.queue.iter().enumerate() {
            let start = if i == 0 { self.head_offset } else { 0 };
            let len = chunk.bytes.len() - start;
            if remaining < len {
                return &chunk.bytes[start + remaining..];
            }
            remaining -= len;
        }
        &[]
    }

    /// Copies `len` bytes starting at logical `offset` into a plain `Vec`.
    /// Used for the small, fixed-size header regions the bit reader parses;
    /// unlike [`Self::extract`] this does not consume the bytes.
    pub fn peek(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        if offset + len > self.total_size() {
            return Err(Mpeg2Error::OutOfBounds { requested: offset + len, available: self.total_size() });
        }
        let mut out = Vec::with_capacity(len);
        let mut remaining = len;
        let mut pos = offset;
        while remaining > 0 {
            let span = self.read_span(pos);
            let take = span.len().min(remaining);
            out.extend_from_slice(&span[..take]);
            pos += take;
            remaining -= take;
        }
        Ok(out)
    }

    /// Removes and returns the first `n` bytes of the queue as a rope,
    /// possibly spanning several queued chunks.
    pub fn extract(&mut self, n: usize) -> Result<ByteRope> {
        if n > self.total_size() {
            return Err(Mpeg2Error::OutOfBounds { requested: n, available: self.total_size() });
        }
        let mut rope = ByteRope::new();
        let mut remaining = n;
        while remaining > 0 {
            let front = self.queue.front().expect("total_size() guarantees enough queued bytes");
            let avail = front.bytes.len() - self.head_offset;
            let take = avail.min(remaining);
            let start = self.head_offset;
            rope.push(front.bytes.slice(start..start + take));
            self.head_offset += take;
            remaining -= take;
            if self.head_offset == front.bytes.len() {
                self.queue.pop_front();
                self.head_offset = 0;
            }
        }
        self.next_frame_size = self.next_frame_size.saturating_sub(n);
        Ok(rope)
    }

    /// Drops the first `n` bytes without returning them.
    pub fn consume(&mut self, n: usize) -> Result<()> {
        self.extract(n).map(|_| ())
    }

    /// Scans forward from the current `next_frame_size` mark for the next
    /// start code, advancing `next_frame_size` as bytes are scanned whether
    /// or not a match is found. Returns the matched 32-bit accumulator
    /// value (whose low byte is the start code id) once a match lands,
    /// `None` if buffered data ran out first.
    pub fn scan_for_start_code(&mut self) -> Option<u32> {
        loop {
            let span = self.read_span(self.next_frame_size);
            if span.is_empty() {
                return None;
            }
            let (pos, new_context) = start_code::scan(span, self.scan_context);
            self.scan_context = new_context;
            match pos {
                Some(p) => {
                    self.next_frame_size += p;
                    return Some(new_context);
                }
                None => {
                    self.next_frame_size += span.len();
                }
            }
        }
    }

    /// Drops everything buffered before the start code that
    /// `scan_for_start_code` just landed on (its four bytes become the new
    /// byte 0), keeping the scanner's rolling context valid across the cut.
    pub fn sync_to_last_start_code(&mut self) -> Result<()> {
        let drop = self.next_frame_size.saturating_sub(4);
        self.consume(drop)?;
        self.next_frame_size = self.next_frame_size.min(4);
        Ok(())
    }

    /// Clears all buffered state, as on a destructive resync.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.head_offset = 0;
        self.next_frame_size = 0;
        self.scan_context = IDLE_CONTEXT;
    }

    /// Resets only the rolling start-code accumulator, as on a non-destructive
    /// resync where queued bytes are kept but the frame under construction is
    /// abandoned. `next_frame_size` is the caller's responsibility to zero.
    pub fn reset_scan_context(&mut self) {
        self.scan_context = IDLE_CONTEXT;
    }
}

impl Default for BufferStream {
    fn default() -> Self {
        Self::new()
    }
}
