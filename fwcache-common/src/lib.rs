// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Core of the fwcache firmware cache controller.
//!
//! A host pushes firmware images over the module bus one Intel HEX record at a
//! time; the controller stages them in fixed-size buckets of an external SPI
//! NOR flash and serves them back in bus-sized chunks.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std` mode for the controller firmware
//! - `std` feature: Enables `std` support for host tools
//! - `defmt` feature: Routes internal logging through `defmt`

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod macros;

pub mod bucket;
pub mod cache;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod hex;
pub mod layout;
pub mod protocol;
pub mod storage;

// Re-export commonly used types
pub use cache::{BucketLayout, FirmwareCache, PushHandle, PushProgress};
pub use dispatch::dispatch;
pub use error::{CacheError, StorageError};
pub use frame::FrameReader;
pub use layout::CacheLayout;
pub use protocol::{Opcode, Param, Reply, Request, Status};
pub use protocol::{BUCKET_COUNT, FIRMWARE_CACHE_FEATURE, MAX_PULL_CHUNK};
pub use storage::{ByteLink, SpiFlash, Storage};
