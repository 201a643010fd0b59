//! Access-list construction.
//!
//! The address provider is an upstream collaborator: for every basic block
//! it yields the resolved address abstraction of each semantic load/store.
//! This module turns that raw material into the [`Access`] lists the
//! domains consume, interning cache blocks on the way and rewriting
//! accesses that bypass the cache:
//! 1. Unknown addresses become `Any`.
//! 2. A store to a cache without write allocation becomes a direct store.
//! 3. Accesses to uncached banks become direct loads/stores.
//! 4. Ranges wider than the cache and ranges spanning several banks
//!    degrade to `Any` (the latter with a warning).

use log::{debug, warn};

use crate::cache::SetCollection;
use crate::cfg::{BlockRef, CfgCollection};
use crate::common::error::{AnalysisError, Result};
use crate::common::Address;

use super::{Access, AccessAction, AccessKind, AccessMap, DataKind};

/// Resolved address abstraction of one semantic load/store.
#[derive(Clone, Debug)]
pub enum AddressExpr {
    /// Nothing is known about the address.
    Top,
    /// The address is an exact constant.
    Const(Address),
    /// The address lies in `[lo, hi]` (both bounds inclusive).
    Range {
        /// Lowest possible address.
        lo: Address,
        /// Highest possible address.
        hi: Address,
    },
}

/// One raw access as delivered by the provider.
#[derive(Clone, Debug)]
pub struct RawAccess {
    /// Address of the instruction performing the access.
    pub inst: Address,
    /// Load or store.
    pub action: AccessAction,
    /// Resolved address abstraction.
    pub target: AddressExpr,
    /// Width class of the accessed datum, when known.
    pub data: Option<DataKind>,
    /// Index for multi-access instructions, −1 otherwise.
    pub index: i32,
}

/// Upstream source of resolved accesses.
pub trait AccessProvider {
    /// The raw accesses of a basic block, in program order.
    fn accesses(&self, block: BlockRef) -> Vec<RawAccess>;
}

/// Builds the access lists of every basic block of the collection.
///
/// # Errors
///
/// [`AnalysisError::UnmappedAddress`] when a definite access address is
/// covered by no memory bank.
pub fn build_accesses(
    cfgs: &CfgCollection,
    provider: &dyn AccessProvider,
    collection: &mut SetCollection,
) -> Result<AccessMap> {
    let mut map = AccessMap::new(cfgs);
    for cfg in cfgs.ids() {
        for v in cfgs.blocks(cfg) {
            if !cfgs.block(v).is_basic() {
                continue;
            }
            let mut list = Vec::new();
            for raw in provider.accesses(v) {
                if let Some(access) = lower(&raw, collection)? {
                    debug!("access {}", access.display(collection));
                    list.push(access);
                }
            }
            map.set(v, list);
        }
    }
    Ok(map)
}

/// Lowers one raw access into the analysable form.
fn lower(raw: &RawAccess, collection: &mut SetCollection) -> Result<Option<Access>> {
    let mut action = raw.action;
    if action != AccessAction::Load && action != AccessAction::Store {
        return Ok(None);
    }
    let write_allocate = collection.geometry().write_allocate();
    let set_count = collection.set_count();

    let access = match raw.target {
        AddressExpr::Top => Access::any(raw.inst, action),

        AddressExpr::Const(addr) => {
            let b = collection
                .intern(addr)
                .ok_or(AnalysisError::UnmappedAddress {
                    addr,
                    inst: raw.inst,
                })?;
            if action == AccessAction::Store && !write_allocate {
                action = action.as_direct();
            } else if !collection.block(b).is_cached() {
                debug!("{} at {} is not cached", action, raw.inst);
                action = action.as_direct();
            }
            Access::block(raw.inst, action, b)
        }

        AddressExpr::Range { lo, hi } => {
            if collection.geometry().count_blocks(lo, hi) >= set_count as u64 {
                Access::any(raw.inst, action)
            } else {
                let lb = collection.intern(lo).ok_or(AnalysisError::UnmappedAddress {
                    addr: lo,
                    inst: raw.inst,
                })?;
                let hb = collection.intern(hi).ok_or(AnalysisError::UnmappedAddress {
                    addr: hi,
                    inst: raw.inst,
                })?;
                if collection.block(lb).bank() != collection.block(hb).bank() {
                    warn!(
                        "access at {} spanning several banks considered unknown",
                        raw.inst
                    );
                    Access::any(raw.inst, action)
                } else {
                    let cached = collection
                        .memory()
                        .banks()[collection.block(lb).bank()]
                        .cached;
                    if !cached {
                        debug!("{} at {} is not cached", action, raw.inst);
                        action = action.as_direct();
                    }
                    if action == AccessAction::Store && !write_allocate {
                        action = action.as_direct();
                    }
                    if lb == hb {
                        Access::block(raw.inst, action, lb)
                    } else {
                        enumerate(raw, action, lo, hi, collection)?
                    }
                }
            }
        }
    };
    Ok(Some(access.with_data(raw.data).with_index(raw.index)))
}

/// Builds the ordered block list of a small in-bank range.
fn enumerate(
    raw: &RawAccess,
    action: AccessAction,
    lo: Address,
    hi: Address,
    collection: &mut SetCollection,
) -> Result<Access> {
    let geometry = collection.geometry().clone();
    let top = geometry.round(hi);
    let mut blocks = Vec::new();
    let mut addr = geometry.round(lo);
    loop {
        let b = collection
            .intern(addr)
            .ok_or(AnalysisError::UnmappedAddress {
                addr,
                inst: raw.inst,
            })?;
        blocks.push(b);
        if addr == top {
            break;
        }
        addr = addr.offset(geometry.block_size());
    }
    let first = collection.block(blocks[0]).set();
    let last = collection.block(blocks[blocks.len() - 1]).set();
    Ok(Access::with_kind(
        raw.inst,
        action,
        AccessKind::Enum { first, last, blocks },
    ))
}
