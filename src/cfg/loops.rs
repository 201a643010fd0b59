//! Loop tree read model.
//!
//! Loop derivation happens upstream; the analysis only queries the result.
//! Every CFG owns a *top* pseudo-loop covering the code outside any real
//! loop; real loops hang below it with their header block and nesting
//! depth. Depth 0 is the top, depth 1 an outermost real loop.

use super::{BlockRef, CfgCollection, CfgId};

/// Identifier of a loop within a [`LoopTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoopId(pub u32);

struct LoopData {
    cfg: CfgId,
    header: Option<BlockRef>,
    parent: Option<LoopId>,
    depth: u32,
}

/// The loop forest of a CFG collection.
pub struct LoopTree {
    loops: Vec<LoopData>,
    /// Top pseudo-loop of each CFG, indexed by CFG id.
    tops: Vec<LoopId>,
    /// Innermost loop of each block, indexed like the collection.
    block_map: Vec<Vec<LoopId>>,
}

impl LoopTree {
    /// Creates a tree where every block sits in its CFG's top pseudo-loop.
    pub fn new(cfgs: &CfgCollection) -> Self {
        let mut loops = Vec::with_capacity(cfgs.len());
        let mut tops = Vec::with_capacity(cfgs.len());
        let mut block_map = Vec::with_capacity(cfgs.len());
        for id in cfgs.ids() {
            let top = LoopId(loops.len() as u32);
            loops.push(LoopData {
                cfg: id,
                header: None,
                parent: None,
                depth: 0,
            });
            tops.push(top);
            block_map.push(vec![top; cfgs.cfg(id).block_count()]);
        }
        Self {
            loops,
            tops,
            block_map,
        }
    }

    /// Declares a loop with the given header below `parent`.
    ///
    /// The header block is reassigned to the new loop.
    pub fn add_loop(&mut self, header: BlockRef, parent: LoopId) -> LoopId {
        let id = LoopId(self.loops.len() as u32);
        let depth = self.loops[parent.0 as usize].depth + 1;
        self.loops.push(LoopData {
            cfg: header.cfg,
            header: Some(header),
            parent: Some(parent),
            depth,
        });
        self.assign(header, id);
        id
    }

    /// Places a block into the given loop.
    pub fn assign(&mut self, v: BlockRef, l: LoopId) {
        self.block_map[v.cfg.0 as usize][v.index as usize] = l;
    }

    /// The innermost loop containing a block (the top pseudo-loop when the
    /// block is outside every real loop).
    #[inline]
    pub fn loop_of(&self, v: BlockRef) -> LoopId {
        self.block_map[v.cfg.0 as usize][v.index as usize]
    }

    /// The top pseudo-loop of a CFG.
    #[inline]
    pub fn top(&self, cfg: CfgId) -> LoopId {
        self.tops[cfg.0 as usize]
    }

    /// Whether the loop is a CFG's top pseudo-loop.
    #[inline]
    pub fn is_top(&self, l: LoopId) -> bool {
        self.loops[l.0 as usize].parent.is_none()
    }

    /// The enclosing loop, `None` for a top pseudo-loop.
    #[inline]
    pub fn parent(&self, l: LoopId) -> Option<LoopId> {
        self.loops[l.0 as usize].parent
    }

    /// The header block, `None` for a top pseudo-loop.
    #[inline]
    pub fn header(&self, l: LoopId) -> Option<BlockRef> {
        self.loops[l.0 as usize].header
    }

    /// Nesting depth: 0 for the top, 1 for an outermost real loop.
    #[inline]
    pub fn depth(&self, l: LoopId) -> u32 {
        self.loops[l.0 as usize].depth
    }

    /// The CFG owning the loop.
    #[inline]
    pub fn cfg_of(&self, l: LoopId) -> CfgId {
        self.loops[l.0 as usize].cfg
    }

    /// Whether `outer` encloses `inner` (reflexively).
    pub fn includes(&self, outer: LoopId, inner: LoopId) -> bool {
        let mut cur = Some(inner);
        while let Some(l) = cur {
            if l == outer {
                return true;
            }
            cur = self.parent(l);
        }
        false
    }
}
