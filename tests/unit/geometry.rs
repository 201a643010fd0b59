//! Cache geometry and block interning tests.
//!
//! Verifies the address arithmetic (set/tag extraction, block rounding and
//! counting), the analysable-associativity rules, and the on-demand block
//! interning with its uncached and unmapped cases.

use wcet_dcache::cache::{CacheGeometry, SetCollection};
use wcet_dcache::common::Address;
use wcet_dcache::config::ReplacementPolicy;
use wcet_dcache::AnalysisError;

use crate::common::harness::{cache, ram_and_mmio, MMIO_BASE, RAM_BASE};

// ──────────────────────────────────────────────────────────
// Address arithmetic
// ──────────────────────────────────────────────────────────

/// With 64-byte blocks and 4 sets:
///   set(a) = (a >> 6) & 3
///   tag(a) = a >> 8
#[test]
fn set_and_tag_extraction() {
    let g = CacheGeometry::new(&cache(6, 4, 2)).unwrap();

    assert_eq!(g.set(Address(RAM_BASE)), 0);
    assert_eq!(g.set(Address(RAM_BASE + 64)), 1);
    assert_eq!(g.set(Address(RAM_BASE + 3 * 64)), 3);
    // Set wraps after 4 blocks.
    assert_eq!(g.set(Address(RAM_BASE + 4 * 64)), 0);

    assert_eq!(g.tag(Address(RAM_BASE)), RAM_BASE >> 8);
    assert_eq!(g.tag(Address(RAM_BASE + 255)), RAM_BASE >> 8);
    assert_eq!(g.tag(Address(RAM_BASE + 256)), (RAM_BASE >> 8) + 1);
}

/// Rounding snaps to the block boundary.
#[test]
fn round_to_block_boundary() {
    let g = CacheGeometry::new(&cache(6, 4, 2)).unwrap();
    assert_eq!(g.round(Address(0x1003)).val(), 0x1000);
    assert_eq!(g.round(Address(0x103F)).val(), 0x1000);
    assert_eq!(g.round(Address(0x1040)).val(), 0x1040);
}

/// count_blocks counts distinct blocks crossed, bounds inclusive.
#[test]
fn count_blocks_over_ranges() {
    let g = CacheGeometry::new(&cache(6, 4, 2)).unwrap();
    // Within a single block.
    assert_eq!(g.count_blocks(Address(0x100), Address(0x13F)), 1);
    // Crossing one boundary.
    assert_eq!(g.count_blocks(Address(0x100), Address(0x140)), 2);
    // Misaligned bounds across two boundaries.
    assert_eq!(g.count_blocks(Address(0x13F), Address(0x181)), 3);
}

/// Block base addresses reconstruct from (set, tag).
#[test]
fn block_base_roundtrip() {
    let g = CacheGeometry::new(&cache(6, 4, 2)).unwrap();
    let a = Address(RAM_BASE + 7 * 64 + 13);
    let base = g.block_base(g.set(a), g.tag(a));
    assert_eq!(base, g.round(a));
}

// ──────────────────────────────────────────────────────────
// Analysable associativity
// ──────────────────────────────────────────────────────────

/// LRU keeps its way count.
#[test]
fn lru_keeps_ways() {
    let g = CacheGeometry::new(&cache(6, 4, 4)).unwrap();
    assert_eq!(g.assoc(), 4);
}

/// RANDOM flattens to one way.
#[test]
fn random_flattens_to_one_way() {
    let mut spec = cache(6, 4, 4);
    spec.replacement = ReplacementPolicy::Random;
    let g = CacheGeometry::new(&spec).unwrap();
    assert_eq!(g.assoc(), 1);
    assert_eq!(g.ways(), 4);
}

/// FIFO, PLRU and MRU are rejected at setup.
#[test]
fn unanalysable_policies_rejected() {
    for policy in [
        ReplacementPolicy::Fifo,
        ReplacementPolicy::Plru,
        ReplacementPolicy::Mru,
    ] {
        let mut spec = cache(6, 4, 4);
        spec.replacement = policy;
        match CacheGeometry::new(&spec) {
            Err(AnalysisError::UnsupportedPolicy(p)) => assert_eq!(p, policy),
            other => panic!("expected UnsupportedPolicy, got {:?}", other.map(|_| ())),
        }
    }
}

/// Degenerate geometries are rejected.
#[test]
fn invalid_geometry_rejected() {
    let mut spec = cache(6, 4, 0);
    assert!(matches!(
        CacheGeometry::new(&spec),
        Err(AnalysisError::InvalidGeometry(_))
    ));

    spec = cache(6, 3, 2);
    assert!(matches!(
        CacheGeometry::new(&spec),
        Err(AnalysisError::InvalidGeometry(_))
    ));
}

// ──────────────────────────────────────────────────────────
// Block interning
// ──────────────────────────────────────────────────────────

fn collection() -> SetCollection {
    let g = CacheGeometry::new(&cache(6, 4, 2)).unwrap();
    SetCollection::new(g, ram_and_mmio())
}

/// Interning the same block twice yields the same handle; distinct tags in
/// one set get dense ids in interning order.
#[test]
fn interning_is_idempotent_and_dense() {
    let mut coll = collection();

    let a = coll.intern(Address(RAM_BASE)).unwrap();
    let a2 = coll.intern(Address(RAM_BASE + 32)).unwrap();
    assert_eq!(a, a2, "same block, same handle");

    // Same set (0), next tag.
    let b = coll.intern(Address(RAM_BASE + 4 * 64)).unwrap();
    assert_ne!(a, b);
    assert_eq!(coll.block(a).id(), 0);
    assert_eq!(coll.block(b).id(), 1);
    assert_eq!(coll.block_count(0), 2);
    assert_eq!(coll.block_count(1), 0);

    assert_eq!(coll.cached_block(0, 0), a);
    assert_eq!(coll.cached_block(0, 1), b);
}

/// Blocks in uncached banks get a negative id and never count as cached.
#[test]
fn uncached_bank_blocks_negative_id() {
    let mut coll = collection();
    let m = coll.intern(Address(MMIO_BASE)).unwrap();
    assert_eq!(coll.block(m).id(), -1);
    assert!(!coll.block(m).is_cached());
    // Uncached blocks do not enter the age vectors.
    assert_eq!(coll.block_count(coll.block(m).set()), 0);
}

/// Unmapped addresses intern to nothing.
#[test]
fn unmapped_address_interns_to_none() {
    let mut coll = collection();
    assert!(coll.intern(Address(0x10)).is_none());
}

/// The collection reconstructs block base addresses.
#[test]
fn block_address_reconstruction() {
    let mut coll = collection();
    let a = coll.intern(Address(RAM_BASE + 64 + 13)).unwrap();
    assert_eq!(coll.address(a).val(), RAM_BASE + 64);
}
