//! PERS domain unit tests.
//!
//! Persistence tracking distinguishes "never referenced" (bottom age) from
//! real ages. Tests check that a first reference ages nothing, the
//! bottom-preserving join, and the escape to top when more blocks are
//! loaded than ways exist.

use wcet_dcache::access::{Access, AccessAction};
use wcet_dcache::acs::BOT_AGE;
use wcet_dcache::cache::BlockId;
use wcet_dcache::common::Address;
use wcet_dcache::domain::{Domain, PersDomain};

use crate::common::harness::{cache, ram_and_mmio, self_loop, MapProvider, World, RAM_BASE};

fn setup() -> (World, BlockId, BlockId) {
    let s = self_loop();
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    let a = w.collection.intern(Address(RAM_BASE)).unwrap();
    let b = w.collection.intern(Address(RAM_BASE + 64)).unwrap();
    (w, a, b)
}

fn domain(w: &World) -> PersDomain {
    PersDomain::new(&w.collection, 0, 2, 1 << 20)
}

fn load(b: BlockId) -> Access {
    Access::block(Address(0x100), AccessAction::Load, b)
}

/// At entry no block has been referenced.
#[test]
fn entry_is_all_unreferenced() {
    let (w, ..) = setup();
    let d = domain(&w);
    assert_eq!(d.arena().ages(d.entry()), &[BOT_AGE, BOT_AGE]);
}

/// The first reference to a block ages no sibling.
#[test]
fn first_reference_ages_nothing() {
    let (w, a, b) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    let s1 = d.update_access(&prog, &load(a), d.entry());
    assert_eq!(d.arena().ages(s1), &[0, BOT_AGE]);

    let s2 = d.update_access(&prog, &load(b), s1);
    assert_eq!(d.arena().ages(s2), &[1, 0]);
}

/// Unreferenced blocks never age, even under unknown accesses.
#[test]
fn bottom_ages_never_move() {
    let (w, a, _) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    let s1 = d.update_access(&prog, &load(a), d.entry());
    let any = Access::any(Address(0x100), AccessAction::Load);
    let s2 = d.update_access(&prog, &any, s1);
    assert_eq!(d.arena().ages(s2), &[1, BOT_AGE]);
}

/// Join keeps the referenced side's age where the other side never
/// referenced the block.
#[test]
fn join_preserves_known_ages_over_bottom() {
    let (w, ..) = setup();
    let mut d = domain(&w);

    let s1 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s1).copy_from_slice(&[BOT_AGE, 0]);
    let s2 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s2).copy_from_slice(&[1, BOT_AGE]);

    let j = d.join(s1, s2);
    assert_eq!(d.arena().ages(j), &[1, 0]);
}

/// Both sides unreferenced stays unreferenced.
#[test]
fn join_keeps_bottom_when_both_bottom() {
    let (w, ..) = setup();
    let mut d = domain(&w);

    let s1 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s1).copy_from_slice(&[BOT_AGE, 0]);
    let s2 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s2).copy_from_slice(&[BOT_AGE, 1]);

    let j = d.join(s1, s2);
    assert_eq!(d.arena().ages(j), &[BOT_AGE, 1]);
}

/// More loaded blocks than ways cannot all persist: the join escapes.
#[test]
fn overloaded_join_escapes_to_top() {
    let s = self_loop();
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 1), ram_and_mmio(), s.cfgs, s.loops, &provider);
    w.collection.intern(Address(RAM_BASE)).unwrap();
    w.collection.intern(Address(RAM_BASE + 64)).unwrap();
    w.collection.intern(Address(RAM_BASE + 128)).unwrap();

    let mut d = PersDomain::new(&w.collection, 0, 1, 1 << 20);
    let s1 = d.arena_mut().alloc_acs(3, 0);
    d.arena_mut()
        .ages_mut(s1)
        .copy_from_slice(&[0, BOT_AGE, BOT_AGE]);
    let s2 = d.arena_mut().alloc_acs(3, 0);
    d.arena_mut()
        .ages_mut(s2)
        .copy_from_slice(&[BOT_AGE, 0, BOT_AGE]);

    assert_eq!(d.join(s1, s2), d.top());
}

/// Purging records the eviction without escaping to top.
#[test]
fn purge_records_eviction() {
    let (w, a, _) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    let s1 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s1).copy_from_slice(&[1, 2]);

    let p = Access::block(Address(0x100), AccessAction::Purge, a);
    let s2 = d.update_access(&prog, &p, s1);
    assert_eq!(d.arena().ages(s2), &[2, 2]);
}

/// A re-reference after the first one ages younger siblings normally.
#[test]
fn rereference_ages_younger_siblings() {
    let (w, a, b) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    let s1 = d.update_access(&prog, &load(a), d.entry());
    let s2 = d.update_access(&prog, &load(b), s1);
    assert_eq!(d.arena().ages(s2), &[1, 0]);

    // Touching a again pushes b down.
    let s3 = d.update_access(&prog, &load(a), s2);
    assert_eq!(d.arena().ages(s3), &[0, 1]);
}
