// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error kinds reported by the storage driver and the firmware cache.

use core::fmt;

/// Failure of a raw storage operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// A byte transfer or a busy poll exhausted its retry budget.
    Timeout,
    /// The serial link or chip select reported an error.
    Bus,
    /// The address range does not fit the device.
    OutOfBounds,
    /// The device answered with an unexpected manufacturer ID.
    UnexpectedDevice,
}

/// Failure of a firmware cache operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CacheError {
    /// Every bucket is in use.
    CacheFull,
    /// No push is in progress, or the handle names a push that is no longer open.
    NotStarted,
    /// An offset or length does not fit the bucket.
    OutOfRange,
    /// The bucket index does not name a committed image.
    InvalidIndex,
    /// The storage driver ran out of retries.
    StorageTimeout,
    /// Any other storage failure.
    Storage,
    /// The chunk is not a well-formed hex record.
    MalformedRecord,
}

impl From<StorageError> for CacheError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Timeout => CacheError::StorageTimeout,
            _ => CacheError::Storage,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Timeout => write!(f, "storage transfer timed out"),
            StorageError::Bus => write!(f, "storage bus error"),
            StorageError::OutOfBounds => write!(f, "address outside the storage device"),
            StorageError::UnexpectedDevice => write!(f, "unexpected storage device ID"),
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::CacheFull => write!(f, "firmware cache is full"),
            CacheError::NotStarted => write!(f, "no firmware push in progress"),
            CacheError::OutOfRange => write!(f, "offset outside the firmware image"),
            CacheError::InvalidIndex => write!(f, "no firmware in that bucket"),
            CacheError::StorageTimeout => write!(f, "storage timed out"),
            CacheError::Storage => write!(f, "storage failure"),
            CacheError::MalformedRecord => write!(f, "malformed hex record"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StorageError {}

#[cfg(feature = "std")]
impl std::error::Error for CacheError {}
