//! ACS representation and arena tests.
//!
//! Verifies the raw-byte serialisation round trip, the labelled printing,
//! and the arena life cycle: pinned constants and borrowed snapshots
//! survive a collection, unreachable states are reclaimed, and multi-level
//! states keep their levels alive.

use std::io::{Seek, SeekFrom, Write};

use wcet_dcache::acs::{load_ages, save_ages, write_ages, StateArena, BOT_AGE};
use wcet_dcache::cache::{CacheGeometry, SetCollection};
use wcet_dcache::common::Address;

use crate::common::harness::{cache, ram_and_mmio, RAM_BASE};

// ──────────────────────────────────────────────────────────
// Serialisation
// ──────────────────────────────────────────────────────────

/// Saving then loading an age vector through a real file reproduces it.
#[test]
fn save_load_roundtrip_through_file() {
    let ages: Box<[u8]> = vec![0, 1, 2, BOT_AGE].into();
    let mut file = tempfile::tempfile().unwrap();
    save_ages(&ages, &mut file).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    let loaded = load_ages(4, &mut file).unwrap();
    assert_eq!(ages, loaded);
}

/// Loading from a truncated stream surfaces an I/O error.
#[test]
fn truncated_load_fails() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&[1, 2]).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    assert!(load_ages(4, &mut file).is_err());
}

// ──────────────────────────────────────────────────────────
// Printing
// ──────────────────────────────────────────────────────────

/// Ages print labelled with block addresses; bottom ages print as `_`.
#[test]
fn ages_print_with_block_labels() {
    let geometry = CacheGeometry::new(&cache(6, 1, 2)).unwrap();
    let mut coll = SetCollection::new(geometry, ram_and_mmio());
    coll.intern(Address(RAM_BASE)).unwrap();
    coll.intern(Address(RAM_BASE + 64)).unwrap();

    let mut out = String::new();
    write_ages(&[0, BOT_AGE], &coll, 0, &mut out).unwrap();
    assert_eq!(out, "{ 0x80000000: 0, 0x80000040: _ }");
}

// ──────────────────────────────────────────────────────────
// Arena life cycle
// ──────────────────────────────────────────────────────────

/// Unreachable states are swept; pinned ones survive.
#[test]
fn collect_sweeps_unpinned_states() {
    let mut arena = StateArena::new(1);
    let kept = arena.alloc_acs(4, 0);
    let _lost = arena.alloc_acs(4, 1);
    arena.pin(kept);
    assert_eq!(arena.bytes(), 8);

    arena.collect([]);
    assert_eq!(arena.bytes(), 4);
    assert_eq!(arena.ages(kept), &[0, 0, 0, 0]);
}

/// Borrowed snapshots survive until released.
#[test]
fn borrows_keep_states_alive() {
    let mut arena = StateArena::new(1);
    let s = arena.alloc_acs(4, 7);
    arena.borrow(s);

    arena.collect([]);
    assert_eq!(arena.ages(s), &[7, 7, 7, 7]);

    arena.release(s);
    arena.collect([]);
    assert_eq!(arena.bytes(), 0);
}

/// Explicit roots passed at collection time are kept.
#[test]
fn external_roots_are_kept() {
    let mut arena = StateArena::new(1);
    let s = arena.alloc_acs(2, 3);
    arena.collect([s]);
    assert_eq!(arena.ages(s), &[3, 3]);
}

/// Marking a multi-level state keeps its levels alive.
#[test]
fn multi_marks_levels_recursively() {
    let mut arena = StateArena::new(1);
    let level = arena.alloc_acs(4, 2);
    let multi = arena.alloc_multi(&[level]);
    arena.pin(multi);

    arena.collect([]);
    assert_eq!(arena.levels(multi), &[level]);
    assert_eq!(arena.ages(level), &[2, 2, 2, 2]);
}

/// Freed slots are reused by later allocations.
#[test]
fn freed_slots_are_reused() {
    let mut arena = StateArena::new(1);
    let a = arena.alloc_acs(4, 0);
    arena.collect([]);
    let b = arena.alloc_acs(4, 1);
    assert_eq!(a, b, "slot of the swept state is recycled");
    assert_eq!(arena.ages(b), &[1, 1, 1, 1]);
}

/// The threshold drives the collection proposal.
#[test]
fn should_collect_follows_threshold() {
    let mut arena = StateArena::new(8);
    arena.alloc_acs(4, 0);
    assert!(!arena.should_collect());
    arena.alloc_acs(8, 0);
    assert!(arena.should_collect());
}
