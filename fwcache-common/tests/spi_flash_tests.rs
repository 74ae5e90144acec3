// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The cache running on the serial flash driver.

mod helpers;

use fwcache_common::{CacheError, FirmwareCache, SpiFlash, Storage};
use helpers::*;

#[test]
fn test_push_start_on_dead_link_times_out() {
    let mut link = ScriptedLink::new(&[]);
    link.stalls = None;
    let pin = RecordingPin::default();
    let mut cache: FirmwareCache<_> = FirmwareCache::new(SpiFlash::new(link, pin.clone()));

    assert_eq!(cache.push_start(1, 16), Err(CacheError::StorageTimeout));
    assert_eq!(cache.active_push(), None);
    assert!(pin.is_high());
}

#[test]
fn test_slow_link_still_completes() {
    let mut link = ScriptedLink::new(&[]);
    link.stalls = Some(50);
    let sent = link.sent.clone();
    let mut flash = SpiFlash::new(link, RecordingPin::default());

    // Status reads return 0: never busy.
    assert_eq!(flash.erase_subsection(0x6_4123), Ok(()));
    let sent = sent.borrow();
    assert_eq!(&sent[..5], &[0x06, 0x20, 0x06, 0x40, 0x00]);
}

#[test]
fn test_pushed_record_is_programmed_with_page_program() {
    let link = ScriptedLink::new(&[]);
    let sent = link.sent.clone();
    let mut cache: FirmwareCache<_> = FirmwareCache::new(SpiFlash::new(link, RecordingPin::default()));
    let push = cache.push_start(1, 4).unwrap();
    sent.borrow_mut().clear();

    cache.push_chunk(push, &data_record(0, &[1, 2, 3, 4])).unwrap();

    // Write enable, then page program at the bucket base.
    let sent = sent.borrow();
    assert_eq!(&sent[..9], &[0x06, 0x02, 0x06, 0x40, 0x00, 1, 2, 3, 4]);
}
