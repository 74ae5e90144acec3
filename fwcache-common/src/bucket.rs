// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Fixed table of firmware buckets and their lifecycle.

use crate::error::CacheError;
use crate::layout::CacheLayout;
use crate::storage::Storage;

/// Lifecycle of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BucketState {
    /// Never allocated, cancelled, or cleared.
    Empty,
    /// A push is writing into it.
    Receiving,
    /// Holds a finished image, available for pull.
    Complete,
}

/// One cached firmware image and the flash region reserved for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bucket {
    pub module_type: u8,
    pub base_address: u32,
    pub declared_length: u32,
    /// Bits 16..24 of the record addresses, set by extended-address records.
    pub high_address_byte: u8,
    pub state: BucketState,
    /// Allocation that filled the slot; tells successive pushes into the
    /// same slot apart.
    pub generation: u32,
}

impl Bucket {
    const EMPTY: Self = Self {
        module_type: 0,
        base_address: 0,
        declared_length: 0,
        high_address_byte: 0,
        state: BucketState::Empty,
        generation: 0,
    };

    /// Image offset of a record address under the current high address byte.
    pub fn offset_of(&self, record_address: u16) -> u32 {
        (self.high_address_byte as u32) << 16 | record_address as u32
    }
}

/// Allocator for the bucket region.
///
/// Complete buckets always occupy indices `0..count()`: allocation takes the
/// lowest empty slot and only the single receiving bucket can be cancelled.
pub struct BucketTable<const N: usize> {
    buckets: [Bucket; N],
    committed: usize,
    layout: CacheLayout,
    allocations: u32,
}

impl<const N: usize> BucketTable<N> {
    pub const fn new(layout: CacheLayout) -> Self {
        Self {
            buckets: [Bucket::EMPTY; N],
            committed: 0,
            layout,
            allocations: 0,
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// `OutOfRange` when an image of `declared_length` bytes cannot fit a bucket.
    pub fn check_length(&self, declared_length: u32) -> Result<(), CacheError> {
        if declared_length > self.layout.bucket_capacity() {
            log_warn!(
                "Bucket: length {} exceeds capacity {}",
                declared_length,
                self.layout.bucket_capacity()
            );
            return Err(CacheError::OutOfRange);
        }
        Ok(())
    }

    /// Reserve the lowest empty bucket for an image of `declared_length` bytes
    /// and erase its whole region, one device erase unit at a time.
    ///
    /// An erase failure leaves the bucket empty.
    pub fn allocate<S: Storage>(
        &mut self,
        storage: &mut S,
        module_type: u8,
        declared_length: u32,
    ) -> Result<usize, CacheError> {
        let index = self
            .buckets
            .iter()
            .position(|bucket| bucket.state == BucketState::Empty)
            .ok_or(CacheError::CacheFull)?;
        self.check_length(declared_length)?;

        let unit = storage.subsection_size();
        let Some(addresses) = self.layout.erase_addresses(index, unit) else {
            log_warn!("Bucket {}: not aligned to the {}-byte erase unit", index, unit);
            return Err(CacheError::Storage);
        };
        for address in addresses {
            storage.erase_subsection(address)?;
        }

        self.allocations = self.allocations.wrapping_add(1);
        self.buckets[index] = Bucket {
            module_type,
            base_address: self.layout.bucket_base(index),
            declared_length,
            high_address_byte: 0,
            state: BucketState::Receiving,
            generation: self.allocations,
        };
        log_debug!(
            "Bucket {}: allocated, type={}, length={}",
            index,
            module_type,
            declared_length
        );
        Ok(index)
    }

    /// Commit the receiving bucket `index`.
    pub fn finalize(&mut self, index: usize) -> Result<(), CacheError> {
        let bucket = self.receiving_mut(index)?;
        bucket.state = BucketState::Complete;
        self.committed += 1;
        log_debug!("Bucket {}: committed, count={}", index, self.committed);
        Ok(())
    }

    /// Abandon the receiving bucket `index`. Its region is erased again at the
    /// next allocation.
    pub fn cancel(&mut self, index: usize) -> Result<(), CacheError> {
        let bucket = self.receiving_mut(index)?;
        *bucket = Bucket::EMPTY;
        log_debug!("Bucket {}: cancelled", index);
        Ok(())
    }

    /// Forget every bucket. Flash is left as is.
    pub fn clear_all(&mut self) {
        self.buckets = [Bucket::EMPTY; N];
        self.committed = 0;
    }

    /// Module type and declared length of committed bucket `index`.
    pub fn info(&self, index: usize) -> Result<(u8, u32), CacheError> {
        self.committed(index)
            .map(|bucket| (bucket.module_type, bucket.declared_length))
    }

    /// Number of committed buckets.
    pub fn count(&self) -> usize {
        self.committed
    }

    pub fn bucket(&self, index: usize) -> Option<&Bucket> {
        self.buckets.get(index)
    }

    /// Index of the bucket currently receiving, if any.
    pub fn receiving(&self) -> Option<usize> {
        self.buckets
            .iter()
            .position(|bucket| bucket.state == BucketState::Receiving)
    }

    pub fn committed(&self, index: usize) -> Result<&Bucket, CacheError> {
        if index < self.committed {
            Ok(&self.buckets[index])
        } else {
            Err(CacheError::InvalidIndex)
        }
    }

    /// Whether bucket `index` is receiving the push of allocation `generation`.
    pub fn is_receiving(&self, index: usize, generation: u32) -> bool {
        matches!(
            self.buckets.get(index),
            Some(bucket) if bucket.state == BucketState::Receiving && bucket.generation == generation
        )
    }

    pub(crate) fn receiving_mut(&mut self, index: usize) -> Result<&mut Bucket, CacheError> {
        match self.buckets.get_mut(index) {
            Some(bucket) if bucket.state == BucketState::Receiving => Ok(bucket),
            _ => Err(CacheError::NotStarted),
        }
    }
}
