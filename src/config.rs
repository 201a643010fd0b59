//! Configuration structures for the data-cache analysis.
//!
//! This module defines all configuration consumed by the analysis. It provides:
//! 1. **Defaults:** Baseline hardware constants (cache geometry, bank latencies).
//! 2. **Structures:** Data cache description, memory bank map, analysis options.
//! 3. **Enums:** Replacement policies with their analysability rules.
//!
//! Configuration is supplied as JSON and deserialized with serde, or built
//! programmatically with `Config::default()` and the individual structures.

use serde::Deserialize;

use crate::common::Address;

/// Default configuration constants.
///
/// These values define the baseline hardware description when not
/// explicitly overridden in the supplied configuration.
mod defaults {
    /// Default cache block size as a power of two (32-byte blocks).
    pub const BLOCK_BITS: u32 = 5;

    /// Default number of cache sets.
    pub const SET_COUNT: usize = 16;

    /// Default associativity (number of ways).
    pub const WAYS: usize = 2;

    /// Default bank read latency in cycles.
    pub const READ_LATENCY: u64 = 1;

    /// Default bank write latency in cycles.
    pub const WRITE_LATENCY: u64 = 1;

    /// Arena size in bytes above which a state collection is attempted.
    pub const GC_THRESHOLD: usize = 1 << 20;
}

/// Cache replacement policy algorithms.
///
/// Only LRU is analysed exactly. RANDOM degrades gracefully: the analysis
/// flattens it to an associativity of one. The remaining policies are
/// accepted by the parser so hardware descriptions round-trip, but analysis
/// setup rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    /// Least Recently Used; modelled exactly by the age lattice.
    #[default]
    #[serde(alias = "Lru")]
    Lru,
    /// Random replacement; flattened to a single analysable way.
    #[serde(alias = "Random")]
    Random,
    /// First In First Out; not analysable.
    #[serde(alias = "Fifo")]
    Fifo,
    /// Tree-based pseudo-LRU; not analysable.
    #[serde(alias = "Plru")]
    Plru,
    /// Most Recently Used; not analysable.
    #[serde(alias = "Mru")]
    Mru,
}

/// Data cache description.
///
/// # Examples
///
/// Deserializing from JSON:
///
/// ```
/// use wcet_dcache::config::{CacheSpec, ReplacementPolicy};
///
/// let json = r#"{
///     "block_bits": 6,
///     "set_count": 64,
///     "ways": 4,
///     "replacement": "LRU",
///     "write_allocate": true
/// }"#;
///
/// let cache: CacheSpec = serde_json::from_str(json).unwrap();
/// assert_eq!(cache.block_size(), 64);
/// assert_eq!(cache.replacement, ReplacementPolicy::Lru);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSpec {
    /// Block size as a power of two (block_size = 1 << block_bits).
    #[serde(default = "CacheSpec::default_block_bits")]
    pub block_bits: u32,

    /// Number of sets; must be a power of two.
    #[serde(default = "CacheSpec::default_set_count")]
    pub set_count: usize,

    /// Associativity (number of ways per set).
    #[serde(default = "CacheSpec::default_ways")]
    pub ways: usize,

    /// Replacement policy.
    #[serde(default)]
    pub replacement: ReplacementPolicy,

    /// Whether a store miss allocates the block in the cache.
    #[serde(default = "CacheSpec::default_write_allocate")]
    pub write_allocate: bool,
}

impl CacheSpec {
    /// Returns the default block size exponent.
    fn default_block_bits() -> u32 {
        defaults::BLOCK_BITS
    }

    /// Returns the default set count.
    fn default_set_count() -> usize {
        defaults::SET_COUNT
    }

    /// Returns the default way count.
    fn default_ways() -> usize {
        defaults::WAYS
    }

    /// Write-allocate is the common case for analysed targets.
    fn default_write_allocate() -> bool {
        true
    }

    /// Returns the block size in bytes.
    #[inline]
    pub fn block_size(&self) -> u64 {
        1u64 << self.block_bits
    }
}

impl Default for CacheSpec {
    fn default() -> Self {
        Self {
            block_bits: defaults::BLOCK_BITS,
            set_count: defaults::SET_COUNT,
            ways: defaults::WAYS,
            replacement: ReplacementPolicy::default(),
            write_allocate: true,
        }
    }
}

/// A memory bank: a contiguous address region with its access properties.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryBank {
    /// Bank name used in diagnostics (e.g. "SRAM", "FLASH").
    pub name: String,

    /// First address of the bank.
    pub base: u64,

    /// Size of the bank in bytes.
    pub size: u64,

    /// Whether accesses to this bank go through the data cache.
    #[serde(default = "MemoryBank::default_cached")]
    pub cached: bool,

    /// Nominal read latency in cycles.
    #[serde(default = "MemoryBank::default_read_latency")]
    pub read_latency: u64,

    /// Nominal write latency in cycles.
    #[serde(default = "MemoryBank::default_write_latency")]
    pub write_latency: u64,

    /// Worst-case read latency; zero means "same as nominal".
    #[serde(default)]
    pub worst_read_latency: u64,

    /// Worst-case write latency; zero means "same as nominal".
    #[serde(default)]
    pub worst_write_latency: u64,
}

impl MemoryBank {
    /// Banks are cached unless stated otherwise.
    fn default_cached() -> bool {
        true
    }

    /// Returns the default nominal read latency.
    fn default_read_latency() -> u64 {
        defaults::READ_LATENCY
    }

    /// Returns the default nominal write latency.
    fn default_write_latency() -> u64 {
        defaults::WRITE_LATENCY
    }

    /// Tests whether the bank covers the given address.
    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        addr.val() >= self.base && addr.val() - self.base < self.size
    }

    /// Worst-case read latency, falling back to the nominal one.
    #[inline]
    pub fn worst_read(&self) -> u64 {
        self.worst_read_latency.max(self.read_latency)
    }

    /// Worst-case write latency, falling back to the nominal one.
    #[inline]
    pub fn worst_write(&self) -> u64 {
        self.worst_write_latency.max(self.write_latency)
    }
}

/// The memory map: the set of banks backing the address space.
///
/// Lookup walks the bank list; with overlapping banks the first covering
/// bank wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MemoryMap {
    banks: Vec<MemoryBank>,
}

impl MemoryMap {
    /// Builds a memory map from a list of banks, sorting them by base address.
    pub fn new(mut banks: Vec<MemoryBank>) -> Self {
        banks.sort_by_key(|b| b.base);
        Self { banks }
    }

    /// Finds the bank covering the given address.
    ///
    /// # Returns
    ///
    /// The covering bank, or `None` when the address is unmapped.
    pub fn bank_of(&self, addr: Address) -> Option<&MemoryBank> {
        self.banks.iter().find(|b| b.contains(addr))
    }

    /// Returns all banks in base-address order.
    pub fn banks(&self) -> &[MemoryBank] {
        &self.banks
    }
}

/// Analysis options.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Restrict processing to these sets; empty means "all sets".
    ///
    /// Invalid indices are reported and skipped.
    #[serde(default)]
    pub only_sets: Vec<usize>,

    /// Run the per-set fixed points on worker threads.
    #[serde(default)]
    pub parallel: bool,

    /// Arena size in bytes above which unreachable states are collected.
    #[serde(default = "AnalysisConfig::default_gc_threshold")]
    pub gc_threshold: usize,
}

impl AnalysisConfig {
    /// Returns the default collection threshold.
    fn default_gc_threshold() -> usize {
        defaults::GC_THRESHOLD
    }

    /// Tests whether the given set is selected for processing.
    #[inline]
    pub fn processes(&self, set: usize) -> bool {
        self.only_sets.is_empty() || self.only_sets.contains(&set)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            only_sets: Vec::new(),
            parallel: false,
            gc_threshold: defaults::GC_THRESHOLD,
        }
    }
}

/// Root configuration: hardware description plus analysis options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Data cache description; absence aborts the analysis.
    #[serde(default)]
    pub data_cache: Option<CacheSpec>,

    /// Memory bank map.
    #[serde(default)]
    pub memory: MemoryMap,

    /// Analysis options.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}
