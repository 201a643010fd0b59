//! Cache block identity and interning.
//!
//! A cache block is the unit the abstract cache states reason about: an
//! aligned, block-sized region of memory identified by its `(set, tag)`
//! pair. Blocks are interned on demand in a [`SetCollection`] that owns
//! every block for the lifetime of the analysis and hands out compact
//! [`BlockId`] handles.

use std::collections::HashMap;

use crate::common::Address;
use crate::config::MemoryMap;

use super::CacheGeometry;

/// Compact handle to an interned [`CacheBlock`].
///
/// Handles index the owning [`SetCollection`] and stay valid for the whole
/// analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// An interned cache block.
///
/// The `id` is the dense index of the block within its set, used to address
/// the per-set age vectors. A negative `id` marks a block backed by an
/// uncached bank: such blocks never enter an age vector.
#[derive(Debug)]
pub struct CacheBlock {
    tag: u64,
    set: usize,
    id: i32,
    bank: usize,
}

impl CacheBlock {
    /// Returns the block tag.
    #[inline]
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Returns the set the block belongs to.
    #[inline]
    pub fn set(&self) -> usize {
        self.set
    }

    /// Returns the dense in-set identifier, negative for uncached blocks.
    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Whether the backing bank is cached.
    #[inline]
    pub fn is_cached(&self) -> bool {
        self.id >= 0
    }

    /// The in-set age-vector position of a cached block.
    ///
    /// Callers must only use this on cached blocks; uncached blocks are
    /// rewritten to direct accesses before any domain sees them.
    #[inline]
    pub fn index(&self) -> usize {
        debug_assert!(self.id >= 0, "age index of an uncached block");
        self.id as usize
    }

    /// Index of the backing bank in the memory map.
    #[inline]
    pub fn bank(&self) -> usize {
        self.bank
    }
}

/// Per-set interning table.
struct SetTable {
    by_tag: HashMap<u64, BlockId>,
    /// Cached blocks of this set, indexed by their dense id.
    cached: Vec<BlockId>,
}

/// Collection of all interned cache blocks, organised by set.
///
/// The collection owns the validated geometry and the memory map so every
/// downstream stage resolves addresses and banks through one place.
pub struct SetCollection {
    geometry: CacheGeometry,
    memory: MemoryMap,
    blocks: Vec<CacheBlock>,
    sets: Vec<SetTable>,
}

impl SetCollection {
    /// Creates an empty collection for the given geometry and memory map.
    pub fn new(geometry: CacheGeometry, memory: MemoryMap) -> Self {
        let sets = (0..geometry.set_count())
            .map(|_| SetTable {
                by_tag: HashMap::new(),
                cached: Vec::new(),
            })
            .collect();
        Self {
            geometry,
            memory,
            blocks: Vec::new(),
            sets,
        }
    }

    /// Returns the cache geometry.
    #[inline]
    pub fn geometry(&self) -> &CacheGeometry {
        &self.geometry
    }

    /// Returns the memory map.
    #[inline]
    pub fn memory(&self) -> &MemoryMap {
        &self.memory
    }

    /// Returns the number of sets.
    #[inline]
    pub fn set_count(&self) -> usize {
        self.geometry.set_count()
    }

    /// Looks up the block covering the given address, if already interned.
    pub fn at(&self, addr: Address) -> Option<BlockId> {
        let set = self.geometry.set(addr);
        self.sets[set].by_tag.get(&self.geometry.tag(addr)).copied()
    }

    /// Interns the block covering the given address.
    ///
    /// A new block gets the next dense id of its set when its bank is
    /// cached, or id −1 when the bank bypasses the cache.
    ///
    /// # Returns
    ///
    /// The block handle, or `None` when no memory bank covers the address.
    pub fn intern(&mut self, addr: Address) -> Option<BlockId> {
        if let Some(b) = self.at(addr) {
            return Some(b);
        }
        let bank_idx = self.memory.banks().iter().position(|b| b.contains(addr))?;
        let cached = self.memory.banks()[bank_idx].cached;
        let set = self.geometry.set(addr);
        let tag = self.geometry.tag(addr);
        let id = if cached {
            self.sets[set].cached.len() as i32
        } else {
            -1
        };
        let handle = BlockId(self.blocks.len() as u32);
        self.blocks.push(CacheBlock {
            tag,
            set,
            id,
            bank: bank_idx,
        });
        self.sets[set].by_tag.insert(tag, handle);
        if id >= 0 {
            self.sets[set].cached.push(handle);
        }
        Some(handle)
    }

    /// Dereferences a block handle.
    #[inline]
    pub fn block(&self, id: BlockId) -> &CacheBlock {
        &self.blocks[id.0 as usize]
    }

    /// Number of cached blocks interned in the given set.
    ///
    /// This is the length `N` of the set's age vectors.
    #[inline]
    pub fn block_count(&self, set: usize) -> usize {
        self.sets[set].cached.len()
    }

    /// The cached block of `set` with dense id `id`.
    pub fn cached_block(&self, set: usize, id: usize) -> BlockId {
        self.sets[set].cached[id]
    }

    /// Reconstructs the base address of an interned block.
    pub fn address(&self, id: BlockId) -> Address {
        let b = self.block(id);
        self.geometry.block_base(b.set(), b.tag())
    }
}
