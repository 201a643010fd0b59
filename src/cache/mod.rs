//! Cache geometry and block identity.
//!
//! This module maps addresses onto the cache structure. It provides:
//! 1. **Geometry:** Set and tag extraction, block rounding, block counting over ranges.
//! 2. **Analysable Associativity:** The way count the age lattice can actually model.
//! 3. **Block Identity:** Interned cache blocks with dense per-set identifiers.

/// Cache block identity and the per-set interning collection.
pub mod block;

pub use block::{BlockId, CacheBlock, SetCollection};

use crate::common::error::{AnalysisError, Result};
use crate::common::Address;
use crate::config::{CacheSpec, ReplacementPolicy};

/// Validated cache geometry derived from a [`CacheSpec`].
///
/// Construction checks the parameters the address arithmetic relies on and
/// resolves the replacement policy to the associativity the age lattice
/// models: LRU keeps its way count, RANDOM flattens to one way, everything
/// else is rejected.
#[derive(Debug, Clone)]
pub struct CacheGeometry {
    block_bits: u32,
    set_bits: u32,
    set_count: usize,
    ways: usize,
    assoc: usize,
    write_allocate: bool,
}

impl CacheGeometry {
    /// Validates a cache description and fixes the analysable associativity.
    ///
    /// # Errors
    ///
    /// * [`AnalysisError::InvalidGeometry`] for a zero way count, a set
    ///   count that is not a power of two, or an associativity above 255
    ///   (ages are stored in one byte).
    /// * [`AnalysisError::UnsupportedPolicy`] for FIFO, PLRU and MRU caches.
    pub fn new(spec: &CacheSpec) -> Result<Self> {
        if spec.ways == 0 {
            return Err(AnalysisError::InvalidGeometry("zero ways".into()));
        }
        if spec.set_count == 0 || !spec.set_count.is_power_of_two() {
            return Err(AnalysisError::InvalidGeometry(format!(
                "set count {} is not a power of two",
                spec.set_count
            )));
        }
        let assoc = match spec.replacement {
            ReplacementPolicy::Lru => spec.ways,
            ReplacementPolicy::Random => 1,
            p => return Err(AnalysisError::UnsupportedPolicy(p)),
        };
        if assoc > u8::MAX as usize - 1 {
            return Err(AnalysisError::InvalidGeometry(format!(
                "associativity {} exceeds the age range",
                assoc
            )));
        }
        Ok(Self {
            block_bits: spec.block_bits,
            set_bits: spec.set_count.trailing_zeros(),
            set_count: spec.set_count,
            ways: spec.ways,
            assoc,
            write_allocate: spec.write_allocate,
        })
    }

    /// Returns the block size in bytes.
    #[inline]
    pub fn block_size(&self) -> u64 {
        1u64 << self.block_bits
    }

    /// Returns the number of sets.
    #[inline]
    pub fn set_count(&self) -> usize {
        self.set_count
    }

    /// Returns the physical way count.
    #[inline]
    pub fn ways(&self) -> usize {
        self.ways
    }

    /// Returns the associativity the analysis models.
    ///
    /// This is the `A` of the age lattice: ways for LRU, one for RANDOM.
    #[inline]
    pub fn assoc(&self) -> usize {
        self.assoc
    }

    /// Whether a store miss allocates the block.
    #[inline]
    pub fn write_allocate(&self) -> bool {
        self.write_allocate
    }

    /// Extracts the set index of an address.
    #[inline]
    pub fn set(&self, addr: Address) -> usize {
        ((addr.val() >> self.block_bits) & (self.set_count as u64 - 1)) as usize
    }

    /// Extracts the tag of an address.
    #[inline]
    pub fn tag(&self, addr: Address) -> u64 {
        addr.val() >> (self.block_bits + self.set_bits)
    }

    /// Snaps an address down to its block boundary.
    #[inline]
    pub fn round(&self, addr: Address) -> Address {
        Address(addr.val() & !(self.block_size() - 1))
    }

    /// Counts the distinct cache blocks crossed by the range `[lo, hi]`.
    ///
    /// Both bounds are inclusive; the bounds may lie anywhere inside their
    /// blocks.
    #[inline]
    pub fn count_blocks(&self, lo: Address, hi: Address) -> u64 {
        (self.round(hi).val() - self.round(lo).val()) / self.block_size() + 1
    }

    /// Reconstructs the base address of a block from its set and tag.
    #[inline]
    pub fn block_base(&self, set: usize, tag: u64) -> Address {
        Address((tag << (self.block_bits + self.set_bits)) | ((set as u64) << self.block_bits))
    }
}
