// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bus front end of the firmware cache: validates a request, runs the matching
//! cache operation and marshals its result.

use crate::cache::{FirmwareCache, PushHandle};
use crate::error::CacheError;
use crate::protocol::{
    Opcode, Param, ParamList, Reply, Request, Status, FIRMWARE_CACHE_FEATURE, MAX_PARAMS,
    MAX_PULL_CHUNK,
};
use crate::storage::Storage;

fn ints(values: &[u16]) -> Reply {
    Reply::Value(
        values
            .iter()
            .take(MAX_PARAMS)
            .map(|value| Param::Int16(*value))
            .collect(),
    )
}

fn split(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

fn int(params: &ParamList, position: usize) -> u16 {
    match params.get(position) {
        Some(Param::Int16(value)) => *value,
        _ => 0,
    }
}

/// Low byte of an int16 parameter, used for module types and bucket indices.
fn low_byte(params: &ParamList, position: usize) -> u8 {
    int(params, position) as u8
}

fn check_signature(opcode: Opcode, params: &ParamList) -> Result<(), Status> {
    let expected = opcode.signature();
    if params.len() != expected.len() {
        return Err(Status::WrongParameterCount);
    }
    if params
        .iter()
        .zip(expected)
        .any(|(param, kind)| param.kind() != *kind)
    {
        return Err(Status::WrongParameterType);
    }
    Ok(())
}

fn reply_with(result: Result<Reply, CacheError>) -> Reply {
    result.unwrap_or_else(|error| Reply::Failed(error.into()))
}

fn open_push<S: Storage, const N: usize>(
    cache: &FirmwareCache<S, N>,
) -> Result<PushHandle, CacheError> {
    cache.active_push().ok_or(CacheError::NotStarted)
}

/// Dispatch a request to its handler.
pub fn dispatch<S: Storage, const N: usize>(
    cache: &mut FirmwareCache<S, N>,
    request: &Request,
) -> Reply {
    if request.feature != FIRMWARE_CACHE_FEATURE {
        log_warn!("Dispatch: unknown feature {}", request.feature);
        return Reply::Failed(Status::UnknownFeature);
    }
    let opcode = match Opcode::try_from(request.command) {
        Ok(opcode) => opcode,
        Err(status) => {
            log_warn!("Dispatch: unknown command 0x{:02x}", request.command);
            return Reply::Failed(status);
        }
    };
    if let Err(status) = check_signature(opcode, &request.params) {
        log_warn!("Dispatch: {} rejected, {}", opcode, status);
        return Reply::Failed(status);
    }
    log_trace!("Dispatch: {}", opcode);

    let params = &request.params;
    match opcode {
        Opcode::PushStart => handle_push_start(cache, params),
        Opcode::PushChunk => handle_push_chunk(cache, params),
        Opcode::PushCancel => reply_with(
            open_push(cache)
                .and_then(|push| cache.push_cancel(push))
                .map(|()| Reply::Done),
        ),
        Opcode::GetFirmwareInfo => handle_get_info(cache, params),
        Opcode::PullFirmwareChunk => handle_pull_chunk(cache, params),
        Opcode::GetFirmwareCount => ints(&[cache.count() as u16]),
        Opcode::GetBucketLayout => handle_get_layout(cache, params),
        Opcode::ClearFirmwareCache => {
            cache.clear();
            Reply::Done
        }
    }
}

/// `module_type, length_hi, length_lo` → `bucket_index`.
fn handle_push_start<S: Storage, const N: usize>(
    cache: &mut FirmwareCache<S, N>,
    params: &ParamList,
) -> Reply {
    let module_type = low_byte(params, 0);
    let length = (int(params, 1) as u32) << 16 | int(params, 2) as u32;
    reply_with(
        cache
            .push_start(module_type, length)
            .map(|push| ints(&[push.index() as u16])),
    )
}

fn handle_push_chunk<S: Storage, const N: usize>(
    cache: &mut FirmwareCache<S, N>,
    params: &ParamList,
) -> Reply {
    let Some(Param::Buffer(chunk)) = params.first() else {
        return Reply::Failed(Status::WrongParameterType);
    };
    reply_with(
        open_push(cache)
            .and_then(|push| cache.push_chunk(push, chunk))
            .map(|_| Reply::Done),
    )
}

/// `index` → `module_type, length_hi, length_lo`.
fn handle_get_info<S: Storage, const N: usize>(
    cache: &FirmwareCache<S, N>,
    params: &ParamList,
) -> Reply {
    reply_with(
        cache
            .info(low_byte(params, 0) as usize)
            .map(|(module_type, length)| {
                let [hi, lo] = split(length);
                ints(&[module_type as u16, hi, lo])
            }),
    )
}

/// `index, offset` → up to [`MAX_PULL_CHUNK`] bytes.
fn handle_pull_chunk<S: Storage, const N: usize>(
    cache: &mut FirmwareCache<S, N>,
    params: &ParamList,
) -> Reply {
    let index = low_byte(params, 0) as usize;
    let offset = int(params, 1) as u32;
    let mut buf = [0u8; MAX_PULL_CHUNK];
    reply_with(
        cache
            .pull_chunk(index, offset, &mut buf)
            .map(|len| Reply::Value(Param::buffer(&buf[..len]).into_iter().collect())),
    )
}

/// `index` → `base_hi, base_lo, first_subsection, subsection_count`.
fn handle_get_layout<S: Storage, const N: usize>(
    cache: &FirmwareCache<S, N>,
    params: &ParamList,
) -> Reply {
    reply_with(
        cache
            .bucket_layout(low_byte(params, 0) as usize)
            .map(|layout| {
                let [hi, lo] = split(layout.base_address);
                ints(&[
                    hi,
                    lo,
                    layout.first_subsection as u16,
                    layout.subsection_count as u16,
                ])
            }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_checks_count_before_type() {
        let request = Request::with_ints(Opcode::PullFirmwareChunk, &[0]);
        assert_eq!(
            check_signature(Opcode::PullFirmwareChunk, &request.params),
            Err(Status::WrongParameterCount)
        );

        let request = Request::with_ints(Opcode::PushChunk, &[0]);
        assert_eq!(
            check_signature(Opcode::PushChunk, &request.params),
            Err(Status::WrongParameterType)
        );

        let request = Request::with_buffer(Opcode::PushChunk, &[1, 0, 0]).unwrap();
        assert_eq!(check_signature(Opcode::PushChunk, &request.params), Ok(()));
    }

    #[test]
    fn value_replies_never_exceed_the_parameter_list() {
        assert_eq!(ints(&[7, 8]).ints().unwrap().as_slice(), &[7, 8]);
        assert_eq!(ints(&[1, 2, 3, 4, 5]).ints().unwrap().len(), MAX_PARAMS);
    }

    #[test]
    fn split_is_high_word_first() {
        assert_eq!(split(0x0006_4000), [0x0006, 0x4000]);
    }
}
