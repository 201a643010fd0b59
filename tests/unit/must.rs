//! MUST domain unit tests.
//!
//! The MUST transfer keeps an upper bound on ages: every test starts from
//! the pessimistic entry state (all blocks evicted) or a hand-crafted age
//! vector and checks the aging, the max-join and the saturation escapes to
//! top.

use wcet_dcache::access::{Access, AccessAction, AccessKind};
use wcet_dcache::cache::BlockId;
use wcet_dcache::common::Address;
use wcet_dcache::domain::{Domain, MustDomain};

use crate::common::harness::{cache, ram_and_mmio, self_loop, MapProvider, World, RAM_BASE};

/// A world with one set, two ways and interned blocks A and B.
fn setup() -> (World, BlockId, BlockId) {
    let s = self_loop();
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    let a = w.collection.intern(Address(RAM_BASE)).unwrap();
    let b = w.collection.intern(Address(RAM_BASE + 64)).unwrap();
    (w, a, b)
}

fn domain(w: &World) -> MustDomain {
    MustDomain::new(&w.collection, 0, 2, 1 << 20)
}

fn load(b: BlockId) -> Access {
    Access::block(Address(0x100), AccessAction::Load, b)
}

fn purge(b: BlockId) -> Access {
    Access::block(Address(0x100), AccessAction::Purge, b)
}

// ──────────────────────────────────────────────────────────
// Entry and basic aging
// ──────────────────────────────────────────────────────────

/// At task entry nothing is provably cached: every age is A.
#[test]
fn entry_assumes_nothing_cached() {
    let (w, ..) = setup();
    let d = domain(&w);
    assert_eq!(d.entry(), d.top());
    assert_eq!(d.arena().ages(d.entry()), &[2, 2]);
}

/// Touching a block sets it most-recent and ages nothing older than it.
#[test]
fn access_installs_and_ages() {
    let (w, a, b) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    let s1 = d.update_access(&prog, &load(a), d.entry());
    assert_eq!(d.arena().ages(s1), &[0, 2]);

    let s2 = d.update_access(&prog, &load(b), s1);
    assert_eq!(d.arena().ages(s2), &[1, 0]);

    // Re-touching the most recent block changes nothing observable.
    let s3 = d.update_access(&prog, &load(b), s2);
    assert_eq!(d.arena().ages(s3), &[1, 0]);
}

/// An unknown-address access ages everything, saturating at A.
#[test]
fn unknown_access_ages_everything() {
    let (w, a, b) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    let s1 = d.update_access(&prog, &load(a), d.entry());
    let s2 = d.update_access(&prog, &load(b), s1);
    assert_eq!(d.arena().ages(s2), &[1, 0]);

    let any = Access::any(Address(0x100), AccessAction::Load);
    let s3 = d.update_access(&prog, &any, s2);
    assert_eq!(d.arena().ages(s3), &[2, 1]);

    // One more unknown access saturates the whole set.
    let s4 = d.update_access(&prog, &any, s3);
    assert_eq!(s4, d.top());
}

/// Purging evicts the target; a fully purged set is top.
#[test]
fn purge_evicts_block() {
    let (w, a, b) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    let s1 = d.update_access(&prog, &load(a), d.entry());
    let s2 = d.update_access(&prog, &load(b), s1);

    let s3 = d.update_access(&prog, &purge(a), s2);
    assert_eq!(d.arena().ages(s3), &[2, 0]);

    let s4 = d.update_access(&prog, &purge(b), s3);
    assert_eq!(s4, d.top());
}

/// A purge with unknown target destroys all knowledge.
#[test]
fn purge_any_is_top() {
    let (w, a, _) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    let s1 = d.update_access(&prog, &load(a), d.entry());
    let any_purge = Access::any(Address(0x100), AccessAction::Purge);
    assert_eq!(d.update_access(&prog, &any_purge, s1), d.top());
}

/// Direct accesses bypass the cache and leave the state untouched.
#[test]
fn direct_access_is_identity() {
    let (w, a, _) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    let s1 = d.update_access(&prog, &load(a), d.entry());
    let direct = Access::block(Address(0x100), AccessAction::DirectLoad, a);
    assert_eq!(d.update_access(&prog, &direct, s1), s1);
}

/// Accesses to other sets leave the state untouched.
#[test]
fn foreign_set_access_is_identity() {
    let s = self_loop();
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 4, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    let a0 = w.collection.intern(Address(RAM_BASE)).unwrap();
    let a1 = w.collection.intern(Address(RAM_BASE + 64)).unwrap();
    assert_eq!(w.collection.block(a1).set(), 1);

    let prog = w.program();
    let mut d = MustDomain::new(&w.collection, 0, 2, 1 << 20);
    let s1 = d.update_access(&prog, &load(a0), d.entry());
    assert_eq!(d.update_access(&prog, &load(a1), s1), s1);
}

// ──────────────────────────────────────────────────────────
// Join
// ──────────────────────────────────────────────────────────

/// Bottom is the unit of the join.
#[test]
fn join_with_bottom_is_identity() {
    let (w, a, _) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    let s1 = d.update_access(&prog, &load(a), d.entry());
    assert_eq!(d.join(d.bot(), s1), s1);
    assert_eq!(d.join(s1, d.bot()), s1);
}

/// Join takes the element-wise maximum.
#[test]
fn join_is_elementwise_max() {
    let (w, ..) = setup();
    let mut d = domain(&w);

    let s1 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s1).copy_from_slice(&[1, 0]);
    let s2 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s2).copy_from_slice(&[0, 2]);

    let j = d.join(s1, s2);
    assert_eq!(d.arena().ages(j), &[1, 2]);
}

/// Join is idempotent and commutative.
#[test]
fn join_laws() {
    let (w, ..) = setup();
    let mut d = domain(&w);

    let s1 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s1).copy_from_slice(&[1, 0]);
    let s2 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s2).copy_from_slice(&[0, 2]);

    let jj = d.join(s1, s1);
    assert!(d.equals(jj, s1));

    let j12 = d.join(s1, s2);
    let j21 = d.join(s2, s1);
    assert!(d.equals(j12, j21));
}

/// A join saturating every age collapses to top.
#[test]
fn saturated_join_is_top() {
    let (w, ..) = setup();
    let mut d = domain(&w);

    let s1 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s1).copy_from_slice(&[2, 1]);
    let s2 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s2).copy_from_slice(&[1, 2]);

    assert_eq!(d.join(s1, s2), d.top());
}

// ──────────────────────────────────────────────────────────
// Monotonicity
// ──────────────────────────────────────────────────────────

/// More precise inputs yield more precise outputs (spot check).
#[test]
fn transfer_is_monotone() {
    let (w, _, b) = setup();
    let prog = w.program();
    let mut d = domain(&w);

    // s1 is more precise than s2 (lower ages).
    let s1 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s1).copy_from_slice(&[0, 2]);
    let s2 = d.arena_mut().alloc_acs(2, 0);
    d.arena_mut().ages_mut(s2).copy_from_slice(&[2, 2]);

    let t1 = d.update_access(&prog, &load(b), s1);
    let t2 = d.update_access(&prog, &load(b), s2);
    let a1 = d.arena().ages(t1).to_vec();
    let a2 = d.arena().ages(t2).to_vec();
    for (x, y) in a1.iter().zip(&a2) {
        assert!(x <= y, "monotonicity violated: {:?} vs {:?}", a1, a2);
    }
}

/// Enumerated ranges age the member of the domain's set.
#[test]
fn enum_access_ages_local_member() {
    let s = self_loop();
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 4, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    let b0 = w.collection.intern(Address(RAM_BASE)).unwrap();
    let b1 = w.collection.intern(Address(RAM_BASE + 64)).unwrap();

    let prog = w.program();
    let mut d = MustDomain::new(&w.collection, 0, 2, 1 << 20);
    let e = Access::with_kind(
        Address(0x100),
        AccessAction::Load,
        AccessKind::Enum {
            first: 0,
            last: 1,
            blocks: vec![b0, b1],
        },
    );
    let s1 = d.update_access(&prog, &e, d.entry());
    // Only the set-0 member is installed in the set-0 domain.
    assert_eq!(d.arena().ages(s1), &[0]);
}
