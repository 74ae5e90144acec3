// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Partitioning of the flash address space into firmware buckets.

use crate::protocol::BUCKET_COUNT;

/// Where the bucket region lives in flash and how it is cut up.
///
/// Bucket `i` owns `[region_origin + i * bucket_capacity, region_origin + (i + 1) * bucket_capacity)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CacheLayout {
    /// First byte of bucket 0.
    pub region_origin: u32,
    /// Erase granularity of the medium.
    pub subsection_size: u32,
    /// Subsections reserved for every bucket.
    pub subsections_per_bucket: u32,
    /// Total size of the medium.
    pub device_size: u32,
}

impl CacheLayout {
    /// 1 MiB serial NOR with 4 KiB subsectors; buckets of 64 KiB starting at
    /// subsection 100.
    pub const DEFAULT: Self = Self {
        region_origin: 100 * 4096,
        subsection_size: 4096,
        subsections_per_bucket: 16,
        device_size: 1024 * 1024,
    };

    /// Bytes reserved for each bucket, independent of the image it holds.
    pub const fn bucket_capacity(&self) -> u32 {
        self.subsection_size * self.subsections_per_bucket
    }

    pub const fn bucket_base(&self, index: usize) -> u32 {
        self.region_origin + index as u32 * self.bucket_capacity()
    }

    /// Index of the first subsection of bucket `index`, counted from address 0.
    pub const fn first_subsection(&self, index: usize) -> u32 {
        self.bucket_base(index) / self.subsection_size
    }

    /// Addresses to erase, in steps of the device's erase `unit`, to clear
    /// the whole of bucket `index`.
    ///
    /// `None` when the bucket does not start and end on `unit` boundaries.
    pub fn erase_addresses(&self, index: usize, unit: u32) -> Option<impl Iterator<Item = u32>> {
        let base = self.bucket_base(index);
        let capacity = self.bucket_capacity();
        if unit == 0 || base % unit != 0 || capacity % unit != 0 {
            return None;
        }
        Some((0..capacity / unit).map(move |i| base + i * unit))
    }

    /// Whether `bucket_count` buckets fit on the device with subsection-aligned
    /// boundaries.
    pub const fn fits(&self, bucket_count: usize) -> bool {
        if self.subsection_size == 0 || self.subsections_per_bucket == 0 {
            return false;
        }
        if self.region_origin % self.subsection_size != 0 {
            return false;
        }
        let end = self.region_origin as u64 + bucket_count as u64 * self.bucket_capacity() as u64;
        end <= self.device_size as u64
    }
}

impl Default for CacheLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

const _: () = assert!(CacheLayout::DEFAULT.fits(BUCKET_COUNT));
