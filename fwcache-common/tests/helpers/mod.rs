// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use fwcache_common::error::StorageError;
use fwcache_common::storage::ByteLink;
use fwcache_common::{CacheLayout, FirmwareCache, Storage};

pub const DATA: u8 = 0x00;
pub const END_OF_FILE: u8 = 0x01;
pub const EXTENDED_LINEAR_ADDRESS: u8 = 0x04;

/// One MiB of NOR flash in RAM.
///
/// Programming a byte that was not erased since its last write panics, so a
/// test fails as soon as the cache skips an erase.
pub struct RamStorage {
    pub bytes: Vec<u8>,
    programmed: Vec<bool>,
    pub reads: usize,
    pub writes: usize,
    pub erases: usize,
    /// Fail the write with this index (counted from 0) and every later one.
    pub fail_write_from: Option<usize>,
    pub fail_erase: Option<StorageError>,
}

impl RamStorage {
    pub fn new() -> Self {
        let size = CacheLayout::DEFAULT.device_size as usize;
        Self {
            bytes: vec![0xFF; size],
            programmed: vec![false; size],
            reads: 0,
            writes: 0,
            erases: 0,
            fail_write_from: None,
            fail_erase: None,
        }
    }
}

impl Storage for RamStorage {
    fn subsection_size(&self) -> u32 {
        CacheLayout::DEFAULT.subsection_size
    }

    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), StorageError> {
        if self.fail_write_from.is_some_and(|first| self.writes >= first) {
            self.writes += 1;
            return Err(StorageError::Timeout);
        }
        self.writes += 1;
        let start = address as usize;
        for (i, byte) in bytes.iter().enumerate() {
            assert!(
                !self.programmed[start + i],
                "byte 0x{:06x} programmed twice without erase",
                start + i
            );
            self.programmed[start + i] = true;
            self.bytes[start + i] = *byte;
        }
        Ok(())
    }

    fn read(&mut self, address: u32, bytes: &mut [u8]) -> Result<(), StorageError> {
        self.reads += 1;
        let start = address as usize;
        bytes.copy_from_slice(&self.bytes[start..start + bytes.len()]);
        Ok(())
    }

    fn erase_subsection(&mut self, address: u32) -> Result<(), StorageError> {
        if let Some(error) = self.fail_erase {
            return Err(error);
        }
        self.erases += 1;
        let size = self.subsection_size() as usize;
        let start = address as usize / size * size;
        self.bytes[start..start + size].fill(0xFF);
        self.programmed[start..start + size].fill(false);
        Ok(())
    }
}

pub fn new_cache() -> FirmwareCache<RamStorage> {
    FirmwareCache::new(RamStorage::new())
}

pub fn record(record_type: u8, address: u16, data: &[u8]) -> Vec<u8> {
    let mut chunk = vec![record_type];
    chunk.extend_from_slice(&address.to_le_bytes());
    chunk.extend_from_slice(data);
    chunk
}

pub fn data_record(address: u16, data: &[u8]) -> Vec<u8> {
    record(DATA, address, data)
}

pub fn eof_record() -> Vec<u8> {
    record(END_OF_FILE, 0, &[])
}

pub fn extended_address_record(upper: u16) -> Vec<u8> {
    record(EXTENDED_LINEAR_ADDRESS, 0, &upper.to_be_bytes())
}

/// Deterministic test image.
pub fn image(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Data records of at most 16 bytes covering `image`, then end of file.
pub fn records_for(image: &[u8]) -> Vec<Vec<u8>> {
    let mut records: Vec<Vec<u8>> = image
        .chunks(16)
        .enumerate()
        .map(|(i, data)| data_record((i * 16) as u16, data))
        .collect();
    records.push(eof_record());
    records
}

/// Byte link fed from a script; every `send` is logged.
///
/// `stalls` is the number of `WouldBlock` answers given before each successful
/// send or receive. `None` blocks forever.
pub struct ScriptedLink {
    pub sent: Rc<RefCell<Vec<u8>>>,
    pub replies: VecDeque<u8>,
    pub stalls: Option<u32>,
    pending: u32,
}

impl ScriptedLink {
    pub fn new(replies: &[u8]) -> Self {
        Self {
            sent: Rc::new(RefCell::new(Vec::new())),
            replies: replies.iter().copied().collect(),
            stalls: Some(0),
            pending: 0,
        }
    }

    fn stall(&mut self) -> bool {
        match self.stalls {
            None => true,
            Some(stalls) if self.pending < stalls => {
                self.pending += 1;
                true
            }
            Some(_) => {
                self.pending = 0;
                false
            }
        }
    }
}

impl ByteLink for ScriptedLink {
    type Error = ();

    fn send(&mut self, byte: u8) -> nb::Result<(), ()> {
        if self.stall() {
            return Err(nb::Error::WouldBlock);
        }
        self.sent.borrow_mut().push(byte);
        Ok(())
    }

    fn receive(&mut self) -> nb::Result<u8, ()> {
        if self.stall() {
            return Err(nb::Error::WouldBlock);
        }
        Ok(self.replies.pop_front().unwrap_or(0))
    }
}

/// Chip select that records its level changes.
#[derive(Clone, Default)]
pub struct RecordingPin {
    pub levels: Rc<RefCell<Vec<bool>>>,
}

impl RecordingPin {
    pub fn is_high(&self) -> bool {
        self.levels.borrow().last().copied().unwrap_or(true)
    }
}

impl embedded_hal::digital::ErrorType for RecordingPin {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}
