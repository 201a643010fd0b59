//! Data-access model.
//!
//! Each basic block carries an ordered list of data accesses extracted from
//! its semantic load/store operations. An access records the performing
//! instruction, the action on the cache, and an address abstraction:
//! 1. **Any:** The address is unknown; the access conservatively touches every set.
//! 2. **Block:** A single, known cache block.
//! 3. **Range:** A contiguous set range, possibly wrapping modulo the set count.
//! 4. **Enum:** The explicit ordered block list of a small range, one block per set.

/// Construction of per-block access lists from a provider.
pub mod builder;

pub use builder::{build_accesses, AccessProvider, AddressExpr, RawAccess};

use std::fmt;

use crate::cache::{BlockId, SetCollection};
use crate::cfg::BlockRef;
use crate::common::Address;

/// The action an access performs on the data cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessAction {
    /// No cache effect (placeholder).
    None,
    /// Read through the cache.
    Load,
    /// Write through the cache.
    Store,
    /// Forced eviction of the target blocks.
    Purge,
    /// Read bypassing the cache (uncached bank).
    DirectLoad,
    /// Write bypassing the cache (uncached bank or no write-allocate).
    DirectStore,
}

impl AccessAction {
    /// The cache-bypassing counterpart of a load or store.
    pub fn as_direct(self) -> Self {
        match self {
            AccessAction::Load => AccessAction::DirectLoad,
            AccessAction::Store => AccessAction::DirectStore,
            other => other,
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessAction::None => "none",
            AccessAction::Load => "load",
            AccessAction::Store => "store",
            AccessAction::Purge => "purge",
            AccessAction::DirectLoad => "direct-load",
            AccessAction::DirectStore => "direct-store",
        };
        f.write_str(name)
    }
}

/// Width class of the accessed datum, when the provider knows it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataKind {
    /// 8-bit integer.
    Int8,
    /// 16-bit integer.
    Int16,
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
}

/// Address abstraction of an access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessKind {
    /// Unknown address: touches every set, ages nothing in particular.
    Any,
    /// A single cache block.
    Block(BlockId),
    /// A set range without block identities (wraps when `first > last`).
    Range {
        /// First touched set.
        first: usize,
        /// Last touched set.
        last: usize,
    },
    /// An ordered list of blocks covering contiguous addresses, one per
    /// set in `[first, last]` (wraps when `first > last`).
    Enum {
        /// Set of the first block.
        first: usize,
        /// Set of the last block.
        last: usize,
        /// Member blocks in address order.
        blocks: Vec<BlockId>,
    },
}

/// A single data access of a basic block.
#[derive(Clone, Debug)]
pub struct Access {
    inst: Address,
    action: AccessAction,
    kind: AccessKind,
    data: Option<DataKind>,
    index: i32,
}

impl Access {
    /// Builds an access with an unknown address.
    pub fn any(inst: Address, action: AccessAction) -> Self {
        Self {
            inst,
            action,
            kind: AccessKind::Any,
            data: None,
            index: -1,
        }
    }

    /// Builds an access to a single block.
    pub fn block(inst: Address, action: AccessAction, block: BlockId) -> Self {
        Self {
            inst,
            action,
            kind: AccessKind::Block(block),
            data: None,
            index: -1,
        }
    }

    /// Builds an access with an arbitrary kind.
    pub fn with_kind(inst: Address, action: AccessAction, kind: AccessKind) -> Self {
        Self {
            inst,
            action,
            kind,
            data: None,
            index: -1,
        }
    }

    /// Attaches the accessed data kind.
    pub fn with_data(mut self, data: Option<DataKind>) -> Self {
        self.data = data;
        self
    }

    /// Attaches the multi-access index of the owning instruction.
    pub fn with_index(mut self, index: i32) -> Self {
        self.index = index;
        self
    }

    /// Address of the instruction performing the access.
    #[inline]
    pub fn inst(&self) -> Address {
        self.inst
    }

    /// The cache action.
    #[inline]
    pub fn action(&self) -> AccessAction {
        self.action
    }

    /// The address abstraction.
    #[inline]
    pub fn kind(&self) -> &AccessKind {
        &self.kind
    }

    /// The accessed data kind, when known.
    #[inline]
    pub fn data(&self) -> Option<DataKind> {
        self.data
    }

    /// The multi-access index, −1 for single-access instructions.
    #[inline]
    pub fn index(&self) -> i32 {
        self.index
    }

    /// The single target block of a `Block` access.
    pub fn target(&self) -> Option<BlockId> {
        match self.kind {
            AccessKind::Block(b) => Some(b),
            _ => None,
        }
    }

    /// The member blocks of an `Enum` access.
    pub fn members(&self) -> &[BlockId] {
        match &self.kind {
            AccessKind::Enum { blocks, .. } => blocks,
            _ => &[],
        }
    }

    /// Tests whether the access may touch the given set.
    ///
    /// Ranges wrap modulo the set count when `first > last`.
    pub fn touches(&self, set: usize, collection: &SetCollection) -> bool {
        match &self.kind {
            AccessKind::Any => true,
            AccessKind::Block(b) => collection.block(*b).set() == set,
            AccessKind::Range { first, last } | AccessKind::Enum { first, last, .. } => {
                if first <= last {
                    *first <= set && set <= *last
                } else {
                    *first <= set || set <= *last
                }
            }
        }
    }

    /// The `Enum` member covering the given set.
    ///
    /// # Returns
    ///
    /// The member block, or `None` when the access is not an `Enum` or the
    /// set lies outside its range.
    pub fn block_in(&self, set: usize, collection: &SetCollection) -> Option<BlockId> {
        match &self.kind {
            AccessKind::Enum { first, blocks, .. } => {
                if !self.touches(set, collection) {
                    return None;
                }
                let set_count = collection.set_count();
                let pos = (set + set_count - *first) % set_count;
                blocks.get(pos).copied()
            }
            _ => None,
        }
    }

    /// Render the access using block addresses as labels.
    pub fn display<'a>(&'a self, collection: &'a SetCollection) -> AccessDisplay<'a> {
        AccessDisplay {
            access: self,
            collection,
        }
    }
}

/// Display adaptor resolving block handles through the collection.
pub struct AccessDisplay<'a> {
    access: &'a Access,
    collection: &'a SetCollection,
}

impl fmt::Display for AccessDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.access;
        write!(f, "{}: {} @ ", a.inst, a.action)?;
        match &a.kind {
            AccessKind::Any => write!(f, "ANY"),
            AccessKind::Block(b) => write!(f, "{}", self.collection.address(*b)),
            AccessKind::Range { first, last } => write!(f, "[set {}, set {}]", first, last),
            AccessKind::Enum { blocks, .. } => {
                write!(f, "{{")?;
                for b in blocks {
                    write!(f, " {}", self.collection.address(*b))?;
                }
                write!(f, " }}")
            }
        }
    }
}

/// Per-block access lists for a whole CFG collection.
///
/// Lists are indexed by CFG and block index; blocks without accesses map
/// to an empty slice.
pub struct AccessMap {
    lists: Vec<Vec<Vec<Access>>>,
}

impl AccessMap {
    /// Creates an empty map shaped like the given collection.
    pub fn new(cfgs: &crate::cfg::CfgCollection) -> Self {
        let lists = cfgs
            .ids()
            .map(|id| vec![Vec::new(); cfgs.cfg(id).block_count()])
            .collect();
        Self { lists }
    }

    /// Replaces the access list of a block.
    pub fn set(&mut self, v: BlockRef, accesses: Vec<Access>) {
        self.lists[v.cfg.0 as usize][v.index as usize] = accesses;
    }

    /// The access list of a block, in program order.
    #[inline]
    pub fn of(&self, v: BlockRef) -> &[Access] {
        &self.lists[v.cfg.0 as usize][v.index as usize]
    }
}
