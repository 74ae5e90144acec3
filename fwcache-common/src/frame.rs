// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Splitting of a byte stream into COBS frames.
//!
//! A link read may end in the middle of a frame or hold several frames; bytes
//! past the first complete frame stay buffered for the next call.

use crate::protocol::MAX_FRAME_SIZE;

/// Bytes taken from the link per read.
pub const READ_SIZE: usize = 64;

pub struct FrameReader {
    input: [u8; READ_SIZE],
    input_len: usize,
    input_pos: usize,
    frame: [u8; MAX_FRAME_SIZE],
    frame_len: usize,
    /// Set after an overlong frame until its delimiter arrives.
    discarding: bool,
}

impl FrameReader {
    pub const fn new() -> Self {
        Self {
            input: [0; READ_SIZE],
            input_len: 0,
            input_pos: 0,
            frame: [0; MAX_FRAME_SIZE],
            frame_len: 0,
            discarding: false,
        }
    }

    /// Whether every byte of the last read has been consumed.
    pub fn needs_input(&self) -> bool {
        self.input_pos == self.input_len
    }

    /// Fill the input buffer with `read`, which returns the byte count.
    ///
    /// Only call this once [`needs_input`](Self::needs_input) is true.
    pub fn refill<E>(&mut self, read: impl FnOnce(&mut [u8]) -> Result<usize, E>) -> Result<(), E> {
        let count = read(&mut self.input)?;
        self.input_len = count.min(READ_SIZE);
        self.input_pos = 0;
        Ok(())
    }

    /// Next complete frame, delimiter stripped, still COBS encoded.
    ///
    /// Empty and overlong frames are skipped. `None` once the buffered input
    /// is used up.
    pub fn next_frame(&mut self) -> Option<&mut [u8]> {
        while self.input_pos < self.input_len {
            let byte = self.input[self.input_pos];
            self.input_pos += 1;

            if byte != 0x00 {
                self.append(byte);
                continue;
            }
            let len = core::mem::take(&mut self.frame_len);
            if core::mem::take(&mut self.discarding) || len == 0 {
                continue;
            }
            return Some(&mut self.frame[..len]);
        }
        None
    }

    fn append(&mut self, byte: u8) {
        if self.discarding {
            return;
        }
        if self.frame_len < MAX_FRAME_SIZE {
            self.frame[self.frame_len] = byte;
            self.frame_len += 1;
        } else {
            log_warn!("Frame: exceeds {} bytes, dropped", MAX_FRAME_SIZE);
            self.frame_len = 0;
            self.discarding = true;
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
