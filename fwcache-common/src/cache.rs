// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware cache: push and pull of whole images through the bucket table.

use crate::bucket::BucketTable;
use crate::error::CacheError;
use crate::hex::{self, Applied};
use crate::layout::CacheLayout;
use crate::protocol::{BUCKET_COUNT, MAX_PULL_CHUNK};
use crate::storage::Storage;

/// Token for the push opened by [`FirmwareCache::push_start`].
///
/// A handle stays tied to its own push: once that push is committed,
/// cancelled or superseded, the handle is refused even if a later push
/// reuses the same bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PushHandle {
    index: usize,
    generation: u32,
}

impl PushHandle {
    /// Bucket the push writes into.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// State of a push after a chunk was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PushProgress {
    Receiving,
    /// End of file reached; carries the new firmware count.
    Committed(usize),
}

/// Where a bucket sits in flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BucketLayout {
    pub base_address: u32,
    pub first_subsection: u32,
    pub subsection_count: u32,
}

pub struct FirmwareCache<S, const N: usize = BUCKET_COUNT> {
    storage: S,
    table: BucketTable<N>,
}

impl<S: Storage, const N: usize> FirmwareCache<S, N> {
    pub fn new(storage: S) -> Self {
        Self::with_layout(storage, CacheLayout::DEFAULT)
    }

    pub fn with_layout(storage: S, layout: CacheLayout) -> Self {
        Self {
            storage,
            table: BucketTable::new(layout),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn table(&self) -> &BucketTable<N> {
        &self.table
    }

    /// Open a push of `declared_length` bytes for `module_type`.
    ///
    /// A push still open is cancelled once the length is known to fit, so an
    /// oversized request leaves it untouched. The new bucket is erased before
    /// this returns.
    pub fn push_start(
        &mut self,
        module_type: u8,
        declared_length: u32,
    ) -> Result<PushHandle, CacheError> {
        self.table.check_length(declared_length)?;
        if let Some(open) = self.table.receiving() {
            log_warn!("Cache: push into bucket {} superseded", open);
            self.table.cancel(open)?;
        }
        let index = self
            .table
            .allocate(&mut self.storage, module_type, declared_length)?;
        Ok(self.handle(index))
    }

    /// The push currently open, if any.
    pub fn active_push(&self) -> Option<PushHandle> {
        self.table.receiving().map(|index| self.handle(index))
    }

    fn handle(&self, index: usize) -> PushHandle {
        let generation = self
            .table
            .bucket(index)
            .map_or(0, |bucket| bucket.generation);
        PushHandle { index, generation }
    }

    fn check_open(&self, handle: PushHandle) -> Result<(), CacheError> {
        if self.table.is_receiving(handle.index, handle.generation) {
            Ok(())
        } else {
            log_warn!("Cache: handle for bucket {} is stale", handle.index);
            Err(CacheError::NotStarted)
        }
    }

    /// Feed one record to the push.
    pub fn push_chunk(
        &mut self,
        handle: PushHandle,
        chunk: &[u8],
    ) -> Result<PushProgress, CacheError> {
        self.check_open(handle)?;
        match hex::apply(&mut self.table, &mut self.storage, handle.index, chunk)? {
            Applied::Pending => Ok(PushProgress::Receiving),
            Applied::Committed => Ok(PushProgress::Committed(self.table.count())),
        }
    }

    pub fn push_cancel(&mut self, handle: PushHandle) -> Result<(), CacheError> {
        self.check_open(handle)?;
        self.table.cancel(handle.index)
    }

    /// Read committed image `index` from `offset` into `buf`.
    ///
    /// Returns the number of bytes read: the rest of the image, capped by
    /// [`MAX_PULL_CHUNK`] and the size of `buf`. Zero at the end of the image.
    pub fn pull_chunk(
        &mut self,
        index: usize,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, CacheError> {
        let bucket = *self.table.committed(index)?;
        if offset > bucket.declared_length {
            return Err(CacheError::OutOfRange);
        }
        let len = ((bucket.declared_length - offset) as usize)
            .min(MAX_PULL_CHUNK)
            .min(buf.len());
        if len > 0 {
            self.storage
                .read(bucket.base_address + offset, &mut buf[..len])?;
        }
        Ok(len)
    }

    /// Module type and declared length of committed image `index`.
    pub fn info(&self, index: usize) -> Result<(u8, u32), CacheError> {
        self.table.info(index)
    }

    pub fn count(&self) -> usize {
        self.table.count()
    }

    /// Flash placement of bucket `index`, committed or not.
    pub fn bucket_layout(&self, index: usize) -> Result<BucketLayout, CacheError> {
        if index >= N {
            return Err(CacheError::InvalidIndex);
        }
        let layout = self.table.layout();
        Ok(BucketLayout {
            base_address: layout.bucket_base(index),
            first_subsection: layout.first_subsection(index),
            subsection_count: layout.subsections_per_bucket,
        })
    }

    /// Drop every image and any open push.
    pub fn clear(&mut self) {
        self.table.clear_all();
        log_debug!("Cache: cleared");
    }
}
