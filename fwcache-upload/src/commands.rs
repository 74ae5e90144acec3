// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for firmware cache operations.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};

use fwcache_common::{Opcode, Reply, Request, MAX_PULL_CHUNK};

use crate::image::{to_chunk, HexImage};
use crate::transport::Transport;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// `push_start` erases a whole bucket before it replies.
const ERASE_TIMEOUT: Duration = Duration::from_secs(10);

fn progress_bar(len: u64, template: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Send `request`, turning a failure reply into an error.
fn call(transport: &mut Transport, request: &Request) -> Result<Reply> {
    match transport.send_recv(request)? {
        Reply::Failed(status) => bail!("Command 0x{:02x} failed: {}", request.command, status),
        reply => Ok(reply),
    }
}

/// The `N` integers of a value reply.
fn ints<const N: usize>(reply: &Reply) -> Result<[u16; N]> {
    reply
        .ints()
        .and_then(|values| values.as_slice().try_into().ok())
        .with_context(|| format!("Expected {N} integers, got {reply:?}"))
}

fn read_hex(file: &Path) -> Result<HexImage> {
    let text =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    HexImage::parse(&text).with_context(|| format!("Invalid HEX file {}", file.display()))
}

/// Push a HEX file into the next free bucket.
pub fn push(transport: &mut Transport, file: &Path, module_type: u8) -> Result<()> {
    let image = read_hex(file)?;
    let length = image.length();

    println!(
        "Firmware: {} ({} records, {} bytes, CRC32: 0x{:08x})",
        file.display(),
        image.records.len(),
        length,
        CRC32.checksum(&image.data)
    );
    println!("Module type: {}", module_type);
    println!();

    print!("Starting push (erasing bucket)... ");
    std::io::stdout().flush()?;

    let request = Request::with_ints(
        Opcode::PushStart,
        &[module_type as u16, (length >> 16) as u16, length as u16],
    );
    let bucket = match transport.send_recv_timeout(&request, ERASE_TIMEOUT)? {
        Reply::Failed(status) => bail!("push_start failed: {}", status),
        reply => ints::<1>(&reply)?[0],
    };
    println!("OK, bucket {}", bucket);

    let pb = progress_bar(
        image.records.len() as u64,
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({eta})",
    )?;

    for (i, record) in image.records.iter().enumerate() {
        let request = Request::with_buffer(Opcode::PushChunk, &to_chunk(record))
            .context("Record does not fit a bus message")?;
        if let Err(e) = call(transport, &request) {
            pb.abandon();
            let _ = transport.send_recv(&Request::new(Opcode::PushCancel));
            return Err(e.context(format!("Record {} rejected", i + 1)));
        }
        pb.inc(1);
    }

    pb.finish_with_message("Push complete");
    println!();
    println!("Firmware stored in bucket {}.", bucket);

    Ok(())
}

/// Read the whole image of `bucket`.
fn pull_image(transport: &mut Transport, bucket: u8) -> Result<Vec<u8>> {
    let [_, hi, lo] = ints::<3>(&call(
        transport,
        &Request::with_ints(Opcode::GetFirmwareInfo, &[bucket as u16]),
    )?)?;
    let length = (hi as u32) << 16 | lo as u32;

    let pb = progress_bar(
        length as u64,
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    )?;

    let mut image = Vec::with_capacity(length as usize);
    while (image.len() as u32) < length {
        let offset = u16::try_from(image.len())
            .context("Image offset does not fit the pull request")?;
        let reply = call(
            transport,
            &Request::with_ints(Opcode::PullFirmwareChunk, &[bucket as u16, offset]),
        )?;
        let chunk = reply
            .buffer()
            .with_context(|| format!("Expected a buffer, got {reply:?}"))?;
        if chunk.is_empty() || chunk.len() > MAX_PULL_CHUNK {
            pb.abandon();
            bail!("Unexpected chunk of {} bytes at offset {}", chunk.len(), offset);
        }
        image.extend_from_slice(chunk);
        pb.set_position(image.len() as u64);
    }

    pb.finish_and_clear();
    Ok(image)
}

/// Pull `bucket` into a raw binary file.
pub fn pull(transport: &mut Transport, bucket: u8, output: &Path, pic12: bool) -> Result<()> {
    let mut image = pull_image(transport, bucket)?;
    if pic12 {
        // 12-bit instruction words: the high byte only carries 6 bits.
        image.iter_mut().skip(1).step_by(2).for_each(|byte| *byte &= 0x3F);
    }

    fs::write(output, &image).with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Bucket {}: {} bytes written to {} (CRC32: 0x{:08x})",
        bucket,
        image.len(),
        output.display(),
        CRC32.checksum(&image)
    );

    Ok(())
}

/// Compare `bucket` with a HEX file.
pub fn verify(transport: &mut Transport, bucket: u8, file: &Path) -> Result<()> {
    let expected = read_hex(file)?;
    let actual = pull_image(transport, bucket)?;

    if actual.len() != expected.data.len() {
        bail!(
            "Length mismatch: bucket holds {} bytes, file describes {}",
            actual.len(),
            expected.data.len()
        );
    }
    if let Some(offset) = actual
        .iter()
        .zip(&expected.data)
        .position(|(a, b)| a != b)
    {
        bail!(
            "Mismatch at offset 0x{:06x}: 0x{:02x} != 0x{:02x}",
            offset,
            actual[offset],
            expected.data[offset]
        );
    }

    println!(
        "Bucket {} matches {} (CRC32: 0x{:08x})",
        bucket,
        file.display(),
        CRC32.checksum(&actual)
    );
    Ok(())
}

pub fn info(transport: &mut Transport, bucket: u8) -> Result<()> {
    let reply = call(
        transport,
        &Request::with_ints(Opcode::GetFirmwareInfo, &[bucket as u16]),
    )?;
    let [module_type, hi, lo] = ints::<3>(&reply)?;

    println!("Bucket {}:", bucket);
    println!("  Module type: {}", module_type);
    println!("  Length:      {} bytes", (hi as u32) << 16 | lo as u32);
    Ok(())
}

pub fn count(transport: &mut Transport) -> Result<()> {
    let [count] = ints::<1>(&call(transport, &Request::new(Opcode::GetFirmwareCount))?)?;
    println!("{} firmware image(s) cached", count);
    Ok(())
}

pub fn layout(transport: &mut Transport, bucket: u8) -> Result<()> {
    let reply = call(
        transport,
        &Request::with_ints(Opcode::GetBucketLayout, &[bucket as u16]),
    )?;
    let [hi, lo, first, subsections] = ints::<4>(&reply)?;

    println!("Bucket {}:", bucket);
    println!("  Base address: 0x{:06x}", (hi as u32) << 16 | lo as u32);
    println!(
        "  Subsections:  {}..{}",
        first,
        first as u32 + subsections as u32
    );
    Ok(())
}

pub fn clear(transport: &mut Transport) -> Result<()> {
    call(transport, &Request::new(Opcode::ClearFirmwareCache))?;
    println!("Firmware cache cleared.");
    Ok(())
}

pub fn cancel(transport: &mut Transport) -> Result<()> {
    call(transport, &Request::new(Opcode::PushCancel))?;
    println!("Push cancelled.");
    Ok(())
}

/// Print the `push_chunk` payload of every record, without a device.
pub fn encode(file: &Path) -> Result<()> {
    let image = read_hex(file)?;
    for record in &image.records {
        let chunk = to_chunk(record);
        let text: Vec<String> = chunk.iter().map(|byte| format!("{byte:02x}")).collect();
        println!("{}", text.join(" "));
    }
    println!(
        "{} records, image length {} bytes",
        image.records.len(),
        image.length()
    );
    Ok(())
}
