// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Intel HEX files as the controller sees them: one chunk per record, and the
//! flat image those chunks build in a bucket.

use anyhow::{bail, Context, Result};
use ihex::{Reader, ReaderOptions, Record};

use fwcache_common::hex::MAX_RECORD_DATA;

/// Value of flash bytes no record wrote.
pub const ERASED: u8 = 0xFF;

#[derive(Debug)]
pub struct HexImage {
    /// Every record, end of file included, in file order.
    pub records: Vec<Record>,
    /// Bytes from offset 0 to the last byte written.
    pub data: Vec<u8>,
}

impl HexImage {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let reader = Reader::new_with_options(
            &text,
            ReaderOptions {
                stop_after_first_error: true,
                stop_after_eof: false,
            },
        );

        let mut records = Vec::new();
        let mut data = Vec::new();
        let mut written: Vec<bool> = Vec::new();
        let mut upper: u32 = 0;
        let mut ended = false;

        for (number, record) in reader.enumerate().map(|(i, r)| (i + 1, r)) {
            let record = record.with_context(|| format!("record {number}"))?;
            if ended {
                bail!("record {number}: record after end of file");
            }

            match &record {
                Record::Data { offset, value } => {
                    if value.len() > MAX_RECORD_DATA {
                        bail!(
                            "record {number}: {} data bytes, at most {MAX_RECORD_DATA} fit a chunk",
                            value.len()
                        );
                    }
                    let start = (upper << 16 | *offset as u32) as usize;
                    let end = start + value.len();
                    if end > data.len() {
                        data.resize(end, ERASED);
                        written.resize(end, false);
                    }
                    if written[start..end].iter().any(|&w| w) {
                        bail!("record {number}: overlaps an earlier record at offset {start:#x}");
                    }
                    data[start..end].copy_from_slice(value);
                    written[start..end].fill(true);
                }
                Record::ExtendedLinearAddress(value) => {
                    if *value > 0xFF {
                        bail!("record {number}: address {value:#06x}0000 is beyond 24 bits");
                    }
                    upper = *value as u32;
                }
                Record::EndOfFile => ended = true,
                Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {}
                Record::ExtendedSegmentAddress(_) => {
                    bail!("record {number}: extended segment addresses are not supported")
                }
            }
            records.push(record);
        }

        if !ended {
            bail!("missing end of file record");
        }
        Ok(Self { records, data })
    }

    pub fn length(&self) -> u32 {
        self.data.len() as u32
    }
}

/// `push_chunk` payload of a record: type, address (little-endian), data.
pub fn to_chunk(record: &Record) -> Vec<u8> {
    let (record_type, address, data): (u8, u16, Vec<u8>) = match record {
        Record::Data { offset, value } => (0x00, *offset, value.clone()),
        Record::EndOfFile => (0x01, 0, Vec::new()),
        Record::ExtendedSegmentAddress(segment) => (0x02, 0, segment.to_be_bytes().to_vec()),
        Record::StartSegmentAddress { cs, ip } => {
            (0x03, 0, [cs.to_be_bytes(), ip.to_be_bytes()].concat())
        }
        Record::ExtendedLinearAddress(upper) => (0x04, 0, upper.to_be_bytes().to_vec()),
        Record::StartLinearAddress(entry) => (0x05, 0, entry.to_be_bytes().to_vec()),
    };

    let mut chunk = vec![record_type];
    chunk.extend_from_slice(&address.to_le_bytes());
    chunk.extend_from_slice(&data);
    chunk
}
