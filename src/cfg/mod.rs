//! Control-flow graph collection consumed by the analysis.
//!
//! CFG construction happens upstream; this module only defines the read
//! model the solver traverses. It provides:
//! 1. **Blocks:** Virtual entry/exit, basic blocks, and synthetic call blocks.
//! 2. **Edges:** Intra-CFG edges tagged with loop entry/exit markers.
//! 3. **Call Linkage:** Synthetic call blocks name their callee; the
//!    collection derives the reverse caller lists used for interprocedural
//!    propagation and persistence-scope resolution.

/// Loop tree read model.
pub mod loops;

pub use loops::{LoopId, LoopTree};

/// Identifier of a CFG within a [`CfgCollection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CfgId(pub u32);

/// Reference to a block of a specific CFG.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef {
    /// Owning CFG.
    pub cfg: CfgId,
    /// Block index within the CFG.
    pub index: u32,
}

/// Reference to an edge of a specific CFG.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeRef {
    /// Owning CFG.
    pub cfg: CfgId,
    /// Edge index within the CFG.
    pub index: u32,
}

/// The kind of a CFG block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// Virtual entry block; carries no accesses.
    Entry,
    /// Virtual exit block; carries no accesses.
    Exit,
    /// Ordinary basic block.
    Basic,
    /// Synthetic call block standing for a function call.
    ///
    /// `None` means the callee is unknown; the call is then treated as
    /// having no cache effect of its own.
    Call(Option<CfgId>),
}

/// A CFG block.
#[derive(Debug)]
pub struct BlockData {
    kind: BlockKind,
    ins: Vec<u32>,
    outs: Vec<u32>,
}

impl BlockData {
    /// Returns the block kind.
    #[inline]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Whether this is an ordinary basic block.
    #[inline]
    pub fn is_basic(&self) -> bool {
        self.kind == BlockKind::Basic
    }

    /// Whether this is a synthetic call block.
    #[inline]
    pub fn is_call(&self) -> bool {
        matches!(self.kind, BlockKind::Call(_))
    }

    /// The callee of a synthetic call block, when known.
    #[inline]
    pub fn callee(&self) -> Option<CfgId> {
        match self.kind {
            BlockKind::Call(c) => c,
            _ => None,
        }
    }
}

/// A CFG edge with its loop markers.
#[derive(Debug)]
pub struct EdgeData {
    source: u32,
    sink: u32,
    loop_entry: bool,
    loop_exit: bool,
}

impl EdgeData {
    /// Whether the edge enters a loop (sink is the loop header).
    #[inline]
    pub fn is_loop_entry(&self) -> bool {
        self.loop_entry
    }

    /// Whether the edge leaves one or more loops.
    #[inline]
    pub fn is_loop_exit(&self) -> bool {
        self.loop_exit
    }
}

/// A single control-flow graph.
///
/// New graphs start with their virtual entry (index 0) and exit (index 1)
/// blocks already in place.
#[derive(Debug)]
pub struct Cfg {
    name: String,
    blocks: Vec<BlockData>,
    edges: Vec<EdgeData>,
}

impl Cfg {
    /// Index of the virtual entry block.
    pub const ENTRY: u32 = 0;
    /// Index of the virtual exit block.
    pub const EXIT: u32 = 1;

    /// Creates a graph containing only its virtual entry and exit blocks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: vec![
                BlockData {
                    kind: BlockKind::Entry,
                    ins: Vec::new(),
                    outs: Vec::new(),
                },
                BlockData {
                    kind: BlockKind::Exit,
                    ins: Vec::new(),
                    outs: Vec::new(),
                },
            ],
            edges: Vec::new(),
        }
    }

    /// Returns the graph name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a basic block and returns its index.
    pub fn add_basic(&mut self) -> u32 {
        self.add_block(BlockKind::Basic)
    }

    /// Adds a synthetic call block and returns its index.
    pub fn add_call(&mut self, callee: Option<CfgId>) -> u32 {
        self.add_block(BlockKind::Call(callee))
    }

    fn add_block(&mut self, kind: BlockKind) -> u32 {
        let idx = self.blocks.len() as u32;
        self.blocks.push(BlockData {
            kind,
            ins: Vec::new(),
            outs: Vec::new(),
        });
        idx
    }

    /// Adds an ordinary edge.
    pub fn add_edge(&mut self, source: u32, sink: u32) -> u32 {
        self.add_edge_tagged(source, sink, false, false)
    }

    /// Adds an edge with explicit loop markers.
    pub fn add_edge_tagged(
        &mut self,
        source: u32,
        sink: u32,
        loop_entry: bool,
        loop_exit: bool,
    ) -> u32 {
        let idx = self.edges.len() as u32;
        self.edges.push(EdgeData {
            source,
            sink,
            loop_entry,
            loop_exit,
        });
        self.blocks[source as usize].outs.push(idx);
        self.blocks[sink as usize].ins.push(idx);
        idx
    }

    /// Number of blocks, virtual ones included.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// An immutable collection of CFGs with derived call linkage.
pub struct CfgCollection {
    cfgs: Vec<Cfg>,
    /// Per CFG, the synthetic call blocks that call it.
    callers: Vec<Vec<BlockRef>>,
}

impl CfgCollection {
    /// Seals a list of CFGs and derives the caller lists.
    pub fn new(cfgs: Vec<Cfg>) -> Self {
        let mut callers = vec![Vec::new(); cfgs.len()];
        for (ci, cfg) in cfgs.iter().enumerate() {
            for (bi, block) in cfg.blocks.iter().enumerate() {
                if let BlockKind::Call(Some(callee)) = block.kind {
                    callers[callee.0 as usize].push(BlockRef {
                        cfg: CfgId(ci as u32),
                        index: bi as u32,
                    });
                }
            }
        }
        Self { cfgs, callers }
    }

    /// Number of CFGs in the collection.
    pub fn len(&self) -> usize {
        self.cfgs.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.cfgs.is_empty()
    }

    /// Iterates over the CFG identifiers in collection order.
    pub fn ids(&self) -> impl Iterator<Item = CfgId> {
        (0..self.cfgs.len() as u32).map(CfgId)
    }

    /// Returns a CFG by identifier.
    #[inline]
    pub fn cfg(&self, id: CfgId) -> &Cfg {
        &self.cfgs[id.0 as usize]
    }

    /// Returns a block by reference.
    #[inline]
    pub fn block(&self, r: BlockRef) -> &BlockData {
        &self.cfg(r.cfg).blocks[r.index as usize]
    }

    /// Returns an edge by reference.
    #[inline]
    pub fn edge(&self, r: EdgeRef) -> &EdgeData {
        &self.cfg(r.cfg).edges[r.index as usize]
    }

    /// The source block of an edge.
    #[inline]
    pub fn source(&self, e: EdgeRef) -> BlockRef {
        BlockRef {
            cfg: e.cfg,
            index: self.edge(e).source,
        }
    }

    /// The sink block of an edge.
    #[inline]
    pub fn sink(&self, e: EdgeRef) -> BlockRef {
        BlockRef {
            cfg: e.cfg,
            index: self.edge(e).sink,
        }
    }

    /// The virtual entry block of a CFG.
    #[inline]
    pub fn entry(&self, cfg: CfgId) -> BlockRef {
        BlockRef {
            cfg,
            index: Cfg::ENTRY,
        }
    }

    /// The virtual exit block of a CFG.
    #[inline]
    pub fn exit(&self, cfg: CfgId) -> BlockRef {
        BlockRef {
            cfg,
            index: Cfg::EXIT,
        }
    }

    /// Iterates over the blocks of a CFG in index order.
    pub fn blocks(&self, cfg: CfgId) -> impl Iterator<Item = BlockRef> + '_ {
        (0..self.cfg(cfg).blocks.len() as u32).map(move |index| BlockRef { cfg, index })
    }

    /// Incoming intra-CFG edges of a block.
    pub fn in_edges(&self, v: BlockRef) -> impl Iterator<Item = EdgeRef> + '_ {
        self.block(v)
            .ins
            .iter()
            .map(move |&index| EdgeRef { cfg: v.cfg, index })
    }

    /// Outgoing intra-CFG edges of a block.
    pub fn out_edges(&self, v: BlockRef) -> impl Iterator<Item = EdgeRef> + '_ {
        self.block(v)
            .outs
            .iter()
            .map(move |&index| EdgeRef { cfg: v.cfg, index })
    }

    /// Synthetic call blocks calling the given CFG.
    #[inline]
    pub fn callers(&self, cfg: CfgId) -> &[BlockRef] {
        &self.callers[cfg.0 as usize]
    }

    /// Number of call sites of the given CFG.
    #[inline]
    pub fn call_count(&self, cfg: CfgId) -> usize {
        self.callers[cfg.0 as usize].len()
    }

    /// Whether the CFG is a task root (no caller anywhere).
    #[inline]
    pub fn is_root(&self, cfg: CfgId) -> bool {
        self.callers[cfg.0 as usize].is_empty()
    }

    /// The unique successor of a CFG's entry block.
    ///
    /// Used as the widest persistence scope when a loop walk leaves every
    /// loop of a function.
    pub fn entry_successor(&self, cfg: CfgId) -> Option<BlockRef> {
        self.out_edges(self.entry(cfg)).next().map(|e| self.sink(e))
    }
}
