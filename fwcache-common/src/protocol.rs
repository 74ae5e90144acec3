// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Wire model of the module bus: typed parameter lists, requests and replies.
//!
//! Frames are `postcard`-serialized and COBS-delimited on the link; the bus
//! itself is outside this crate.

use core::fmt;
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Feature number of the firmware cache on the controller.
pub const FIRMWARE_CACHE_FEATURE: u8 = 7;

/// Largest payload of a single bus message.
pub const BUS_MAX_MESSAGE_SIZE: usize = 20;
/// Capacity of a buffer parameter.
pub const BUFFER_CAPACITY: usize = BUS_MAX_MESSAGE_SIZE;
/// Largest chunk returned by `pull_firmware_chunk`.
pub const MAX_PULL_CHUNK: usize = BUS_MAX_MESSAGE_SIZE - 2;
/// Most parameters a request or reply carries.
pub const MAX_PARAMS: usize = 4;
/// Buckets in the cache table.
pub const BUCKET_COUNT: usize = 8;
/// Upper bound of an encoded frame, COBS overhead and delimiter included.
pub const MAX_FRAME_SIZE: usize = 64;

pub type Buffer = Vec<u8, BUFFER_CAPACITY>;
pub type ParamList = Vec<Param, MAX_PARAMS>;

/// A typed bus parameter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Int16(u16),
    Buffer(Buffer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamKind {
    Int16,
    Buffer,
}

impl Param {
    /// Buffer parameter holding `bytes`, if they fit.
    pub fn buffer(bytes: &[u8]) -> Option<Self> {
        Buffer::from_slice(bytes).ok().map(Param::Buffer)
    }

    pub fn kind(&self) -> ParamKind {
        match self {
            Param::Int16(_) => ParamKind::Int16,
            Param::Buffer(_) => ParamKind::Buffer,
        }
    }
}

/// Firmware cache commands.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    PushStart = 0x00,
    PushChunk = 0x01,
    PushCancel = 0x02,
    GetFirmwareInfo = 0x03,
    PullFirmwareChunk = 0x04,
    GetFirmwareCount = 0x05,
    GetBucketLayout = 0x06,
    ClearFirmwareCache = 0x0A,
}

impl TryFrom<u8> for Opcode {
    type Error = Status;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::PushStart),
            0x01 => Ok(Self::PushChunk),
            0x02 => Ok(Self::PushCancel),
            0x03 => Ok(Self::GetFirmwareInfo),
            0x04 => Ok(Self::PullFirmwareChunk),
            0x05 => Ok(Self::GetFirmwareCount),
            0x06 => Ok(Self::GetBucketLayout),
            0x0A => Ok(Self::ClearFirmwareCache),
            _ => Err(Status::UnknownCommand),
        }
    }
}

impl Opcode {
    /// Parameter kinds the command expects, in order.
    pub const fn signature(self) -> &'static [ParamKind] {
        use ParamKind::{Buffer, Int16};
        match self {
            Opcode::PushStart => &[Int16, Int16, Int16],
            Opcode::PushChunk => &[Buffer],
            Opcode::GetFirmwareInfo | Opcode::GetBucketLayout => &[Int16],
            Opcode::PullFirmwareChunk => &[Int16, Int16],
            Opcode::PushCancel | Opcode::GetFirmwareCount | Opcode::ClearFirmwareCache => &[],
        }
    }
}

/// Why a request did not succeed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    UnknownFeature = 0x01,
    UnknownCommand = 0x02,
    WrongParameterCount = 0x03,
    WrongParameterType = 0x04,
    CacheFull = 0x10,
    NotStarted = 0x11,
    OutOfRange = 0x12,
    InvalidIndex = 0x13,
    StorageTimeout = 0x14,
    StorageFault = 0x15,
    MalformedRecord = 0x16,
}

impl From<CacheError> for Status {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::CacheFull => Status::CacheFull,
            CacheError::NotStarted => Status::NotStarted,
            CacheError::OutOfRange => Status::OutOfRange,
            CacheError::InvalidIndex => Status::InvalidIndex,
            CacheError::StorageTimeout => Status::StorageTimeout,
            CacheError::Storage => Status::StorageFault,
            CacheError::MalformedRecord => Status::MalformedRecord,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::UnknownFeature => "unknown feature",
            Status::UnknownCommand => "unknown command",
            Status::WrongParameterCount => "wrong number of parameters",
            Status::WrongParameterType => "wrong parameter type",
            Status::CacheFull => "firmware cache is full",
            Status::NotStarted => "no firmware push in progress",
            Status::OutOfRange => "offset outside the firmware image",
            Status::InvalidIndex => "no firmware in that bucket",
            Status::StorageTimeout => "storage timed out",
            Status::StorageFault => "storage failure",
            Status::MalformedRecord => "malformed hex record",
        };
        f.write_str(text)
    }
}

/// A command addressed to one feature of the controller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub feature: u8,
    pub command: u8,
    pub params: ParamList,
}

impl Request {
    /// Firmware cache request without parameters.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            feature: FIRMWARE_CACHE_FEATURE,
            command: opcode as u8,
            params: ParamList::new(),
        }
    }

    /// Firmware cache request with integer parameters; extras past
    /// [`MAX_PARAMS`] are dropped.
    pub fn with_ints(opcode: Opcode, values: &[u16]) -> Self {
        Self {
            params: values
                .iter()
                .take(MAX_PARAMS)
                .map(|value| Param::Int16(*value))
                .collect(),
            ..Self::new(opcode)
        }
    }

    /// Firmware cache request carrying one buffer, if `bytes` fit.
    pub fn with_buffer(opcode: Opcode, bytes: &[u8]) -> Option<Self> {
        let mut request = Self::new(opcode);
        request.params.push(Param::buffer(bytes)?).ok()?;
        Some(request)
    }
}

/// Outcome of a request: success with or without a value, or a failure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Done,
    Value(ParamList),
    Failed(Status),
}

impl Reply {
    /// The integer results, when every returned parameter is an integer.
    pub fn ints(&self) -> Option<Vec<u16, MAX_PARAMS>> {
        let Reply::Value(params) = self else {
            return None;
        };
        params
            .iter()
            .map(|param| match param {
                Param::Int16(value) => Some(*value),
                Param::Buffer(_) => None,
            })
            .collect()
    }

    /// The buffer result of a single-buffer reply.
    pub fn buffer(&self) -> Option<&[u8]> {
        match self {
            Reply::Value(params) => match params.as_slice() {
                [Param::Buffer(buffer)] => Some(buffer),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_round_trip_through_their_wire_value() {
        for opcode in [
            Opcode::PushStart,
            Opcode::PushChunk,
            Opcode::PushCancel,
            Opcode::GetFirmwareInfo,
            Opcode::PullFirmwareChunk,
            Opcode::GetFirmwareCount,
            Opcode::GetBucketLayout,
            Opcode::ClearFirmwareCache,
        ] {
            assert_eq!(Opcode::try_from(opcode as u8), Ok(opcode));
        }
        assert_eq!(Opcode::try_from(0x07), Err(Status::UnknownCommand));
    }

    #[test]
    fn request_builders_fill_the_parameter_list() {
        let request = Request::with_ints(Opcode::PushStart, &[3, 0, 10]);
        assert_eq!(request.feature, FIRMWARE_CACHE_FEATURE);
        assert_eq!(request.command, 0x00);
        assert_eq!(request.params.len(), 3);

        let request = Request::with_ints(Opcode::PushStart, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(request.params.len(), MAX_PARAMS);
        assert_eq!(request.params[3], Param::Int16(4));

        assert!(Request::with_buffer(Opcode::PushChunk, &[0u8; BUFFER_CAPACITY]).is_some());
        assert!(Request::with_buffer(Opcode::PushChunk, &[0u8; BUFFER_CAPACITY + 1]).is_none());
    }

    #[test]
    fn reply_accessors() {
        let mut params = ParamList::new();
        params.push(Param::Int16(3)).unwrap();
        params.push(Param::Int16(10)).unwrap();
        let reply = Reply::Value(params);
        assert_eq!(reply.ints().unwrap().as_slice(), &[3, 10]);
        assert_eq!(reply.buffer(), None);

        let mut params = ParamList::new();
        params.push(Param::buffer(&[1, 2]).unwrap()).unwrap();
        let reply = Reply::Value(params);
        assert_eq!(reply.buffer(), Some(&[1u8, 2][..]));
        assert_eq!(reply.ints(), None);
        assert_eq!(Reply::Done.ints(), None);
    }
}
