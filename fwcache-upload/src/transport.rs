// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Serial link to the controller with COBS-framed postcard messages.

use std::io::{Read, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serialport::SerialPort;

use fwcache_common::protocol::MAX_FRAME_SIZE;
use fwcache_common::{Reply, Request};

const BAUD_RATE: u32 = 115_200;

pub struct Transport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl Transport {
    pub fn new(port_name: &str, timeout_ms: u64) -> Result<Self> {
        let timeout = Duration::from_millis(timeout_ms);
        let port = serialport::new(port_name, BAUD_RATE)
            .timeout(timeout)
            .open()
            .with_context(|| format!("Failed to open serial port {port_name}"))?;

        Ok(Self { port, timeout })
    }

    /// Send a request and wait for its reply.
    pub fn send_recv(&mut self, request: &Request) -> Result<Reply> {
        let timeout = self.timeout;
        self.send_recv_timeout(request, timeout)
    }

    /// Like [`Transport::send_recv`] with a one-off read timeout, for requests
    /// that erase flash.
    pub fn send_recv_timeout(&mut self, request: &Request, timeout: Duration) -> Result<Reply> {
        let frame = postcard::to_stdvec_cobs(request).context("Failed to encode request")?;
        self.port
            .write_all(&frame)
            .context("Failed to write request")?;
        self.port.flush()?;

        self.port.set_timeout(timeout)?;
        let reply = self.read_frame();
        self.port.set_timeout(self.timeout)?;

        let mut frame = reply?;
        postcard::from_bytes_cobs(&mut frame).context("Failed to decode reply")
    }

    /// Read bytes up to and including the next frame delimiter.
    fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut frame = Vec::with_capacity(MAX_FRAME_SIZE);
        let mut byte = [0u8; 1];
        loop {
            self.port
                .read_exact(&mut byte)
                .context("No reply from controller")?;
            frame.push(byte[0]);
            if byte[0] == 0x00 {
                return Ok(frame);
            }
            if frame.len() > MAX_FRAME_SIZE {
                bail!("Reply frame exceeds {MAX_FRAME_SIZE} bytes");
            }
        }
    }
}
