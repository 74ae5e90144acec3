// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Streaming decoder for the hex records carried by `push_chunk`.
//!
//! Each chunk holds one record, reduced from an Intel HEX line to
//! `record_type:u8, address:u16 (little-endian), data[..16]`; the byte count
//! is implied by the chunk length and the checksum is not carried.

use crate::bucket::BucketTable;
use crate::error::CacheError;
use crate::storage::Storage;

/// Bytes before the data field of a chunk.
pub const HEADER_LEN: usize = 3;
/// Largest data field the bus can carry in one chunk.
pub const MAX_RECORD_DATA: usize = 16;
/// Largest encoded chunk.
pub const MAX_RECORD_LEN: usize = HEADER_LEN + MAX_RECORD_DATA;

/// Intel HEX record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RecordType {
    Data = 0x00,
    EndOfFile = 0x01,
    ExtendedSegmentAddress = 0x02,
    StartSegmentAddress = 0x03,
    ExtendedLinearAddress = 0x04,
    StartLinearAddress = 0x05,
}

impl TryFrom<u8> for RecordType {
    type Error = CacheError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Data),
            0x01 => Ok(Self::EndOfFile),
            0x02 => Ok(Self::ExtendedSegmentAddress),
            0x03 => Ok(Self::StartSegmentAddress),
            0x04 => Ok(Self::ExtendedLinearAddress),
            0x05 => Ok(Self::StartLinearAddress),
            _ => Err(CacheError::MalformedRecord),
        }
    }
}

/// A decoded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexRecord<'a> {
    Data { address: u16, data: &'a [u8] },
    /// New value for bits 16..24 of subsequent data addresses.
    ExtendedAddress { high: u8 },
    EndOfFile,
    /// Entry point records; they carry nothing to store.
    StartAddress,
}

impl<'a> HexRecord<'a> {
    pub fn decode(chunk: &'a [u8]) -> Result<Self, CacheError> {
        if chunk.len() < HEADER_LEN || chunk.len() > MAX_RECORD_LEN {
            return Err(CacheError::MalformedRecord);
        }
        let address = u16::from_le_bytes([chunk[1], chunk[2]]);
        let data = &chunk[HEADER_LEN..];

        match RecordType::try_from(chunk[0])? {
            RecordType::Data => Ok(Self::Data { address, data }),
            RecordType::EndOfFile => Ok(Self::EndOfFile),
            RecordType::ExtendedLinearAddress => data
                .get(1)
                .map(|&high| Self::ExtendedAddress { high })
                .ok_or(CacheError::MalformedRecord),
            RecordType::StartSegmentAddress | RecordType::StartLinearAddress => {
                Ok(Self::StartAddress)
            }
            RecordType::ExtendedSegmentAddress => Err(CacheError::MalformedRecord),
        }
    }
}

/// What applying a record did to the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The bucket is still receiving.
    Pending,
    /// End of file: the bucket is committed.
    Committed,
}

/// Apply one chunk to receiving bucket `index`.
///
/// Without a receiving bucket the chunk is not looked at. A malformed chunk
/// changes nothing. A data record outside the declared
/// length, or a failed flash write, cancels the bucket.
pub fn apply<S: Storage, const N: usize>(
    table: &mut BucketTable<N>,
    storage: &mut S,
    index: usize,
    chunk: &[u8],
) -> Result<Applied, CacheError> {
    let bucket = table.receiving_mut(index)?;
    let record = HexRecord::decode(chunk)?;

    match record {
        HexRecord::Data { address, data } => {
            let offset = bucket.offset_of(address);
            let end = offset as u64 + data.len() as u64;
            if offset >= bucket.declared_length || end > bucket.declared_length as u64 {
                log_warn!(
                    "Bucket {}: record at 0x{:06x} beyond length {}, aborting",
                    index,
                    offset,
                    bucket.declared_length
                );
                table.cancel(index)?;
                return Err(CacheError::OutOfRange);
            }

            let target = bucket.base_address + offset;
            if let Err(error) = storage.write(target, data) {
                log_warn!("Bucket {}: write at 0x{:06x} failed: {}", index, target, error);
                table.cancel(index)?;
                return Err(error.into());
            }
            log_trace!("Bucket {}: {} bytes at 0x{:06x}", index, data.len(), offset);
            Ok(Applied::Pending)
        }
        HexRecord::ExtendedAddress { high } => {
            bucket.high_address_byte = high;
            Ok(Applied::Pending)
        }
        HexRecord::StartAddress => Ok(Applied::Pending),
        HexRecord::EndOfFile => {
            table.finalize(index)?;
            Ok(Applied::Committed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::layout::CacheLayout;

    struct Discard;

    impl Storage for Discard {
        fn subsection_size(&self) -> u32 {
            CacheLayout::DEFAULT.subsection_size
        }

        fn write(&mut self, _: u32, _: &[u8]) -> Result<(), StorageError> {
            Ok(())
        }

        fn read(&mut self, _: u32, _: &mut [u8]) -> Result<(), StorageError> {
            Ok(())
        }

        fn erase_subsection(&mut self, _: u32) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn chunk_without_receiving_bucket_is_not_started_even_if_malformed() {
        let mut table = BucketTable::<2>::new(CacheLayout::DEFAULT);
        let mut storage = Discard;

        assert_eq!(
            apply(&mut table, &mut storage, 0, &[0x00, 0x00]),
            Err(CacheError::NotStarted)
        );
        assert_eq!(
            apply(&mut table, &mut storage, 0, &[0x02, 0, 0, 0x10, 0x00]),
            Err(CacheError::NotStarted)
        );

        let index = table.allocate(&mut storage, 0, 16).unwrap();
        assert_eq!(
            apply(&mut table, &mut storage, index, &[0x00, 0x00]),
            Err(CacheError::MalformedRecord)
        );
        assert_eq!(table.receiving(), Some(index));
    }

    #[test]
    fn decodes_data_records_with_little_endian_address() {
        let chunk = [0x00, 0x34, 0x12, 0xAA, 0xBB];
        assert_eq!(
            HexRecord::decode(&chunk),
            Ok(HexRecord::Data {
                address: 0x1234,
                data: &[0xAA, 0xBB]
            })
        );
    }

    #[test]
    fn extended_address_takes_the_low_byte_of_the_upper_word() {
        let chunk = [0x04, 0x00, 0x00, 0x00, 0x03];
        assert_eq!(
            HexRecord::decode(&chunk),
            Ok(HexRecord::ExtendedAddress { high: 0x03 })
        );
        assert_eq!(
            HexRecord::decode(&[0x04, 0x00, 0x00, 0x00]),
            Err(CacheError::MalformedRecord)
        );
    }

    #[test]
    fn end_of_file_and_start_address_records() {
        assert_eq!(HexRecord::decode(&[0x01, 0, 0]), Ok(HexRecord::EndOfFile));
        assert_eq!(
            HexRecord::decode(&[0x05, 0, 0, 0x00, 0x00, 0x01, 0x00]),
            Ok(HexRecord::StartAddress)
        );
    }

    #[test]
    fn rejects_short_long_and_unknown_chunks() {
        assert_eq!(HexRecord::decode(&[0x00, 0x00]), Err(CacheError::MalformedRecord));
        assert_eq!(
            HexRecord::decode(&[0u8; MAX_RECORD_LEN + 1]),
            Err(CacheError::MalformedRecord)
        );
        assert_eq!(HexRecord::decode(&[0x07, 0, 0]), Err(CacheError::MalformedRecord));
        assert_eq!(
            HexRecord::decode(&[0x02, 0, 0, 0x10, 0x00]),
            Err(CacheError::MalformedRecord)
        );
    }
}
