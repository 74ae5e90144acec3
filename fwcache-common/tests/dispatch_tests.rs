// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bus requests through the dispatcher.

mod helpers;

use fwcache_common::protocol::{Param, ParamList, MAX_FRAME_SIZE};
use fwcache_common::{dispatch, Opcode, Reply, Request, Status, FIRMWARE_CACHE_FEATURE};
use helpers::*;

fn ints(reply: &Reply) -> Vec<u16> {
    reply.ints().expect("integer reply").to_vec()
}

fn chunk(bytes: &[u8]) -> Request {
    Request::with_buffer(Opcode::PushChunk, bytes).unwrap()
}

#[test]
fn test_bus_scenario() {
    let mut cache = new_cache();

    let reply = dispatch(&mut cache, &Request::with_ints(Opcode::PushStart, &[3, 0, 10]));
    assert_eq!(ints(&reply), [0]);

    let data: Vec<u8> = (1..=10).collect();
    assert_eq!(dispatch(&mut cache, &chunk(&data_record(0, &data))), Reply::Done);
    assert_eq!(dispatch(&mut cache, &chunk(&eof_record())), Reply::Done);

    let reply = dispatch(&mut cache, &Request::new(Opcode::GetFirmwareCount));
    assert_eq!(ints(&reply), [1]);

    let reply = dispatch(&mut cache, &Request::with_ints(Opcode::GetFirmwareInfo, &[0]));
    assert_eq!(ints(&reply), [3, 0, 10]);

    let reply = dispatch(
        &mut cache,
        &Request::with_ints(Opcode::PullFirmwareChunk, &[0, 0]),
    );
    assert_eq!(reply.buffer(), Some(data.as_slice()));
}

#[test]
fn test_length_is_split_across_two_words() {
    let mut cache = new_cache();

    let reply = dispatch(&mut cache, &Request::with_ints(Opcode::PushStart, &[1, 1, 0]));
    assert_eq!(ints(&reply), [0]);
    cache.push_chunk(cache.active_push().unwrap(), &eof_record()).unwrap();

    let reply = dispatch(&mut cache, &Request::with_ints(Opcode::GetFirmwareInfo, &[0]));
    assert_eq!(ints(&reply), [1, 1, 0]);

    let reply = dispatch(&mut cache, &Request::with_ints(Opcode::PushStart, &[1, 1, 1]));
    assert_eq!(reply, Reply::Failed(Status::OutOfRange));
}

#[test]
fn test_module_type_and_index_use_the_low_byte() {
    let mut cache = new_cache();
    dispatch(&mut cache, &Request::with_ints(Opcode::PushStart, &[0x1203, 0, 1]));
    dispatch(&mut cache, &chunk(&data_record(0, &[0xEE])));
    dispatch(&mut cache, &chunk(&eof_record()));

    let reply = dispatch(&mut cache, &Request::with_ints(Opcode::GetFirmwareInfo, &[0x0100]));
    assert_eq!(ints(&reply), [0x03, 0, 1]);
}

#[test]
fn test_pull_steps_through_the_image() {
    let mut cache = new_cache();
    let original = image(50, 4);
    dispatch(&mut cache, &Request::with_ints(Opcode::PushStart, &[2, 0, 50]));
    for record in records_for(&original) {
        assert_eq!(dispatch(&mut cache, &chunk(&record)), Reply::Done);
    }

    let mut pulled = Vec::new();
    loop {
        let request = Request::with_ints(Opcode::PullFirmwareChunk, &[0, pulled.len() as u16]);
        let reply = dispatch(&mut cache, &request);
        let bytes = reply.buffer().expect("buffer reply");
        if bytes.is_empty() {
            break;
        }
        assert!(bytes.len() <= 18);
        pulled.extend_from_slice(bytes);
    }
    assert_eq!(pulled, original);
}

#[test]
fn test_push_cancel_over_the_bus() {
    let mut cache = new_cache();

    assert_eq!(
        dispatch(&mut cache, &Request::new(Opcode::PushCancel)),
        Reply::Failed(Status::NotStarted)
    );
    assert_eq!(
        dispatch(&mut cache, &chunk(&eof_record())),
        Reply::Failed(Status::NotStarted)
    );

    dispatch(&mut cache, &Request::with_ints(Opcode::PushStart, &[1, 0, 4]));
    assert_eq!(dispatch(&mut cache, &Request::new(Opcode::PushCancel)), Reply::Done);
    assert_eq!(cache.active_push(), None);
    assert_eq!(cache.count(), 0);
}

#[test]
fn test_errors_are_reported_as_status() {
    let mut cache = new_cache();
    dispatch(&mut cache, &Request::with_ints(Opcode::PushStart, &[1, 0, 4]));

    assert_eq!(
        dispatch(&mut cache, &chunk(&data_record(4, &[1]))),
        Reply::Failed(Status::OutOfRange)
    );
    assert_eq!(
        dispatch(&mut cache, &Request::with_ints(Opcode::GetFirmwareInfo, &[0])),
        Reply::Failed(Status::InvalidIndex)
    );

    dispatch(&mut cache, &Request::with_ints(Opcode::PushStart, &[1, 0, 4]));
    assert_eq!(
        dispatch(&mut cache, &chunk(&[0x09, 0, 0])),
        Reply::Failed(Status::MalformedRecord)
    );
}

#[test]
fn test_request_validation() {
    let mut cache = new_cache();

    let mut request = Request::new(Opcode::GetFirmwareCount);
    request.feature = FIRMWARE_CACHE_FEATURE + 1;
    assert_eq!(dispatch(&mut cache, &request), Reply::Failed(Status::UnknownFeature));

    let mut request = Request::new(Opcode::GetFirmwareCount);
    request.command = 0x09;
    assert_eq!(dispatch(&mut cache, &request), Reply::Failed(Status::UnknownCommand));

    let request = Request::with_ints(Opcode::PushStart, &[1, 0]);
    assert_eq!(
        dispatch(&mut cache, &request),
        Reply::Failed(Status::WrongParameterCount)
    );

    let mut params = ParamList::new();
    params.push(Param::Int16(0)).unwrap();
    params.push(Param::buffer(&[0]).unwrap()).unwrap();
    let request = Request {
        feature: FIRMWARE_CACHE_FEATURE,
        command: Opcode::PullFirmwareChunk as u8,
        params,
    };
    assert_eq!(
        dispatch(&mut cache, &request),
        Reply::Failed(Status::WrongParameterType)
    );

    // Rejected requests never reach the cache.
    assert_eq!(cache.storage().erases, 0);
}

#[test]
fn test_clear_and_count() {
    let mut cache = new_cache();
    for module_type in 0..3 {
        dispatch(&mut cache, &Request::with_ints(Opcode::PushStart, &[module_type, 0, 1]));
        dispatch(&mut cache, &chunk(&data_record(0, &[0])));
        dispatch(&mut cache, &chunk(&eof_record()));
    }
    assert_eq!(ints(&dispatch(&mut cache, &Request::new(Opcode::GetFirmwareCount))), [3]);

    assert_eq!(
        dispatch(&mut cache, &Request::new(Opcode::ClearFirmwareCache)),
        Reply::Done
    );
    assert_eq!(ints(&dispatch(&mut cache, &Request::new(Opcode::GetFirmwareCount))), [0]);
}

#[test]
fn test_bucket_layout_query() {
    let mut cache = new_cache();

    let reply = dispatch(&mut cache, &Request::with_ints(Opcode::GetBucketLayout, &[1]));
    // 0x6_4000 + 64 KiB
    assert_eq!(ints(&reply), [0x0007, 0x4000, 116, 16]);

    let reply = dispatch(&mut cache, &Request::with_ints(Opcode::GetBucketLayout, &[8]));
    assert_eq!(reply, Reply::Failed(Status::InvalidIndex));
}

#[test]
fn test_frames_fit_the_link_buffer() {
    let request = chunk(&[0xFF; 19]);
    let frame = postcard::to_stdvec_cobs(&request).unwrap();
    assert!(frame.len() <= MAX_FRAME_SIZE);

    let mut params = ParamList::new();
    params.push(Param::buffer(&[0xFF; 18]).unwrap()).unwrap();
    let frame = postcard::to_stdvec_cobs(&Reply::Value(params)).unwrap();
    assert!(frame.len() <= MAX_FRAME_SIZE);

    let mut frame = postcard::to_stdvec_cobs(&request).unwrap();
    let decoded: Request = postcard::from_bytes_cobs(&mut frame).unwrap();
    assert_eq!(decoded, request);
}
