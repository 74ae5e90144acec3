// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Addressed storage for the firmware buckets.
//!
//! [`Storage`] is the raw primitive the cache consumes. [`SpiFlash`] implements
//! it for a serial NOR flash driven one byte at a time over a [`ByteLink`].
//! Every byte exchange and every busy poll is bounded by an iteration count;
//! running out of iterations is reported as [`StorageError::Timeout`] instead
//! of carrying on with a truncated transfer.

use crate::error::StorageError;
use embedded_hal::digital::OutputPin;

/// Byte-range access to a medium made of independently erasable subsections.
///
/// Writes are only defined inside subsections erased since their last write.
pub trait Storage {
    /// Erase granularity in bytes.
    fn subsection_size(&self) -> u32;

    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), StorageError>;

    fn read(&mut self, address: u32, bytes: &mut [u8]) -> Result<(), StorageError>;

    /// Erase the subsection containing `address`.
    fn erase_subsection(&mut self, address: u32) -> Result<(), StorageError>;
}

/// Non-blocking full-duplex byte exchange, as provided by an SPI peripheral.
///
/// Every `send` must be followed by a `receive` collecting the byte clocked in
/// at the same time.
pub trait ByteLink {
    type Error;

    fn send(&mut self, byte: u8) -> nb::Result<(), Self::Error>;

    fn receive(&mut self) -> nb::Result<u8, Self::Error>;
}

/// Iterations granted to every single byte exchange.
pub const DEFAULT_RETRY_LIMIT: u32 = 1_000;
/// Status polls granted to a page program or subsector erase.
pub const DEFAULT_BUSY_POLL_LIMIT: u32 = 200_000;

/// JEDEC manufacturer ID of Micron serial NOR parts.
pub const MICRON_MANUFACTURER_ID: u8 = 0x20;

const PAGE_SIZE: u32 = 256;
const SUBSECTOR_SIZE: u32 = 4096;
const ADDRESS_SPACE: u64 = 1 << 24;
const STATUS_WRITE_IN_PROGRESS: u8 = 1 << 0;

#[derive(Debug, Clone, Copy)]
enum Command {
    PageProgram = 0x02,
    Read = 0x03,
    ReadStatus = 0x05,
    WriteEnable = 0x06,
    SubsectorErase = 0x20,
    ReadId = 0x9F,
}

/// Serial NOR flash driver, generic over the byte link and its chip select.
pub struct SpiFlash<LINK, CS> {
    link: LINK,
    cs: CS,
    retry_limit: u32,
    busy_poll_limit: u32,
}

/// Poll `attempt` until it stops yielding `WouldBlock`, at most `limit` times.
fn bounded<T, E>(
    limit: u32,
    mut attempt: impl FnMut() -> nb::Result<T, E>,
) -> Result<T, StorageError> {
    for _ in 0..limit.max(1) {
        match attempt() {
            Ok(value) => return Ok(value),
            Err(nb::Error::WouldBlock) => continue,
            Err(nb::Error::Other(_)) => return Err(StorageError::Bus),
        }
    }
    Err(StorageError::Timeout)
}

fn check_range(address: u32, len: usize) -> Result<(), StorageError> {
    if address as u64 + len as u64 > ADDRESS_SPACE {
        Err(StorageError::OutOfBounds)
    } else {
        Ok(())
    }
}

impl<LINK, CS> SpiFlash<LINK, CS>
where
    LINK: ByteLink,
    CS: OutputPin,
{
    pub fn new(link: LINK, cs: CS) -> Self {
        Self::with_limits(link, cs, DEFAULT_RETRY_LIMIT, DEFAULT_BUSY_POLL_LIMIT)
    }

    pub fn with_limits(link: LINK, cs: CS, retry_limit: u32, busy_poll_limit: u32) -> Self {
        Self {
            link,
            cs,
            retry_limit,
            busy_poll_limit,
        }
    }

    /// Read the JEDEC ID and check its manufacturer byte.
    pub fn probe(&mut self, manufacturer_id: u8) -> Result<(), StorageError> {
        let id = self.transaction(|flash| {
            flash.exchange(Command::ReadId as u8)?;
            flash.exchange(0)
        })?;
        if id == manufacturer_id {
            Ok(())
        } else {
            log_warn!("Flash: manufacturer ID 0x{:02x} != 0x{:02x}", id, manufacturer_id);
            Err(StorageError::UnexpectedDevice)
        }
    }

    fn exchange(&mut self, byte: u8) -> Result<u8, StorageError> {
        let limit = self.retry_limit;
        let link = &mut self.link;
        bounded(limit, || link.send(byte))?;
        bounded(limit, || link.receive())
    }

    /// Run `body` with chip select asserted; it is released on every path.
    fn transaction<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        self.cs.set_low().map_err(|_| StorageError::Bus)?;
        let result = body(self);
        let released = self.cs.set_high().map_err(|_| StorageError::Bus);
        let value = result?;
        released.map(|()| value)
    }

    fn send_command(&mut self, command: Command, address: Option<u32>) -> Result<(), StorageError> {
        self.exchange(command as u8)?;
        if let Some(address) = address {
            for byte in &address.to_be_bytes()[1..] {
                self.exchange(*byte)?;
            }
        }
        Ok(())
    }

    fn write_enable(&mut self) -> Result<(), StorageError> {
        self.transaction(|flash| flash.send_command(Command::WriteEnable, None))
    }

    fn status(&mut self) -> Result<u8, StorageError> {
        self.transaction(|flash| {
            flash.send_command(Command::ReadStatus, None)?;
            flash.exchange(0)
        })
    }

    fn wait_until_ready(&mut self) -> Result<(), StorageError> {
        for _ in 0..self.busy_poll_limit.max(1) {
            if self.status()? & STATUS_WRITE_IN_PROGRESS == 0 {
                return Ok(());
            }
        }
        log_warn!("Flash: busy poll exhausted");
        Err(StorageError::Timeout)
    }

    /// Program bytes that all lie inside one page.
    fn program_page(&mut self, address: u32, bytes: &[u8]) -> Result<(), StorageError> {
        self.write_enable()?;
        self.transaction(|flash| {
            flash.send_command(Command::PageProgram, Some(address))?;
            bytes.iter().try_for_each(|byte| flash.exchange(*byte).map(drop))
        })?;
        self.wait_until_ready()
    }
}

impl<LINK, CS> Storage for SpiFlash<LINK, CS>
where
    LINK: ByteLink,
    CS: OutputPin,
{
    fn subsection_size(&self) -> u32 {
        SUBSECTOR_SIZE
    }

    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), StorageError> {
        check_range(address, bytes.len())?;

        let mut address = address;
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let room = (PAGE_SIZE - address % PAGE_SIZE) as usize;
            let (page, rest) = remaining.split_at(room.min(remaining.len()));
            self.program_page(address, page)?;
            address += page.len() as u32;
            remaining = rest;
        }
        Ok(())
    }

    fn read(&mut self, address: u32, bytes: &mut [u8]) -> Result<(), StorageError> {
        check_range(address, bytes.len())?;
        self.transaction(|flash| {
            flash.send_command(Command::Read, Some(address))?;
            for byte in bytes.iter_mut() {
                *byte = flash.exchange(0)?;
            }
            Ok(())
        })
    }

    fn erase_subsection(&mut self, address: u32) -> Result<(), StorageError> {
        check_range(address, 1)?;
        let start = address - address % SUBSECTOR_SIZE;
        log_trace!("Flash: erase subsector 0x{:06x}", start);

        self.write_enable()?;
        self.transaction(|flash| flash.send_command(Command::SubsectorErase, Some(start)))?;
        self.wait_until_ready()
    }
}
