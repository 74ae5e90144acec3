// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte link of the flash driver over a non-blocking SPI peripheral.

use embedded_hal_nb::spi::FullDuplex;
use fwcache_common::ByteLink;

pub struct SpiLink<SPI>(pub SPI);

impl<SPI: FullDuplex<u8>> ByteLink for SpiLink<SPI> {
    type Error = SPI::Error;

    fn send(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
        self.0.write(byte)
    }

    fn receive(&mut self) -> nb::Result<u8, Self::Error> {
        self.0.read()
    }
}
