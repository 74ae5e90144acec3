// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USB CDC link standing in for the module bus: COBS-framed postcard requests
//! in, replies out.

use fwcache_common::protocol::MAX_FRAME_SIZE;
use fwcache_common::{FrameReader, Reply, Request};
use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

#[derive(Debug, defmt::Format)]
pub enum TransportError {
    StringTooLong,
}

pub struct UsbTransport {
    serial: SerialPort<'static, UsbBus>,
    usb_dev: UsbDevice<'static, UsbBus>,
    frames: FrameReader,
}

impl UsbTransport {
    pub fn new(usb_bus: &'static UsbBusAllocator<UsbBus>) -> Result<Self, TransportError> {
        let serial = SerialPort::new(usb_bus);
        let usb_dev = UsbDeviceBuilder::new(usb_bus, UsbVidPid(0x2E8A, 0x000A))
            .strings(&[StringDescriptors::default()
                .manufacturer("ADNT")
                .product("fwcache controller")
                .serial_number("0001")])
            .map_err(|_| TransportError::StringTooLong)?
            .device_class(usbd_serial::USB_CLASS_CDC)
            .build();

        Ok(Self {
            serial,
            usb_dev,
            frames: FrameReader::new(),
        })
    }

    /// Poll USB device. Must be called frequently.
    pub fn poll(&mut self) -> bool {
        self.usb_dev.poll(&mut [&mut self.serial])
    }

    /// Try to receive one complete request. Bytes read past its frame are
    /// kept for the next call.
    pub fn try_receive(&mut self) -> Option<Request> {
        if self.frames.needs_input() {
            let serial = &mut self.serial;
            self.frames.refill(|buf| serial.read(buf)).ok()?;
        }

        while let Some(frame) = self.frames.next_frame() {
            let len = frame.len();
            match postcard::from_bytes_cobs::<Request>(frame) {
                Ok(request) => return Some(request),
                Err(_) => defmt::warn!("USB: undecodable frame of {} bytes", len),
            }
        }
        None
    }

    /// Send a reply as a COBS-framed postcard message.
    pub fn send(&mut self, reply: &Reply) {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let encoded = match postcard::to_slice_cobs(reply, &mut buf) {
            Ok(data) => data,
            Err(_) => {
                defmt::error!("USB: reply does not fit a frame");
                return;
            }
        };

        self.write_all(encoded);
    }

    /// Write all bytes to USB serial, handling WouldBlock by polling.
    fn write_all(&mut self, data: &[u8]) {
        let mut offset = 0;
        while offset < data.len() {
            match self.serial.write(&data[offset..]) {
                Ok(n) => offset += n,
                Err(UsbError::WouldBlock) => {
                    self.poll();
                }
                Err(_) => break,
            }
        }
    }
}
