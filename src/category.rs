//! Category derivation.
//!
//! Combines the age oracles of the four analyses with the loop tree to
//! attach a cache behaviour category to every data access:
//! 1. **AH**: the access always hits, the MUST age stays below the
//!    associativity.
//! 2. **PE**: persistent, the first reference may miss and every later
//!    reference within the recorded loop scope hits. The scope header
//!    accompanies the category.
//! 3. **AM**: the access always misses, the MAY age reached the
//!    associativity, or the access bypasses the cache entirely.
//! 4. **NC**: nothing could be proven.
//!
//! Categories are derived per predecessor edge (the context-sensitive
//! form) and per block (the joined form used as the per-access result).

use std::fmt;

use crate::access::{Access, AccessAction, AccessKind};
use crate::analysis::{AgeInfo, MultiAgeInfo, Program};
use crate::cache::BlockId;
use crate::cfg::{BlockRef, EdgeRef, LoopId};
use crate::common::error::Result;
use crate::stats::CategoryStats;

/// Cache behaviour category of a data access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// The access always hits.
    AlwaysHit,
    /// The access always misses.
    AlwaysMiss,
    /// First reference may miss, later references within the scope hit.
    Persistent,
    /// No category could be proven.
    NotClassified,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::AlwaysHit => "AH",
            Category::AlwaysMiss => "AM",
            Category::Persistent => "PE",
            Category::NotClassified => "NC",
        };
        f.write_str(name)
    }
}

/// A derived category with its persistence scope, when any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessCategory {
    /// The category.
    pub category: Category,
    /// Loop-header (or function-entry successor) block the persistence is
    /// relative to; only set for [`Category::Persistent`].
    pub relative_to: Option<BlockRef>,
}

/// Derived categories for a whole CFG collection.
///
/// The per-edge form preserves the calling/looping context of each
/// predecessor; the per-block form classifies from the joined block input
/// and serves as the per-access result.
pub struct CategoryMap {
    by_edge: Vec<Vec<Vec<Option<AccessCategory>>>>,
    by_block: Vec<Vec<Vec<Option<AccessCategory>>>>,
}

impl CategoryMap {
    fn new(prog: &Program<'_>) -> Self {
        let by_edge = prog
            .cfgs
            .ids()
            .map(|id| vec![Vec::new(); prog.cfgs.cfg(id).edge_count()])
            .collect();
        let by_block = prog
            .cfgs
            .ids()
            .map(|id| vec![Vec::new(); prog.cfgs.cfg(id).block_count()])
            .collect();
        Self { by_edge, by_block }
    }

    /// The category of an access along a specific predecessor edge.
    pub fn edge_category(&self, e: EdgeRef, index: usize) -> Option<&AccessCategory> {
        self.by_edge[e.cfg.0 as usize][e.index as usize]
            .get(index)
            .and_then(|c| c.as_ref())
    }

    /// The per-access category (classified from the joined block input).
    pub fn category_of(&self, v: BlockRef, index: usize) -> Option<&AccessCategory> {
        self.by_block[v.cfg.0 as usize][v.index as usize]
            .get(index)
            .and_then(|c| c.as_ref())
    }

    fn put_edge(&mut self, e: EdgeRef, index: usize, c: Option<AccessCategory>) {
        let slot = &mut self.by_edge[e.cfg.0 as usize][e.index as usize];
        if slot.len() <= index {
            slot.resize(index + 1, None);
        }
        slot[index] = c;
    }

    fn put_block(&mut self, v: BlockRef, index: usize, c: Option<AccessCategory>) {
        let slot = &mut self.by_block[v.cfg.0 as usize][v.index as usize];
        if slot.len() <= index {
            slot.resize(index + 1, None);
        }
        slot[index] = c;
    }

    /// Writes every categorised access, block by block, each predecessor
    /// edge on its own line.
    pub fn dump(&self, prog: &Program<'_>, out: &mut dyn fmt::Write) -> fmt::Result {
        for cfg in prog.cfgs.ids() {
            writeln!(out, "CFG {}", prog.cfgs.cfg(cfg).name())?;
            for v in prog.cfgs.blocks(cfg) {
                let accesses = prog.accesses.of(v);
                if accesses.is_empty() {
                    continue;
                }
                writeln!(out, "\t{}:", v.index)?;
                for e in prog.cfgs.in_edges(v) {
                    writeln!(out, "\t\talong {} -> {}", prog.cfgs.source(e).index, v.index)?;
                    for (i, a) in accesses.iter().enumerate() {
                        if let Some(c) = self.edge_category(e, i) {
                            write!(out, "\t\t\t{}: {}", a.display(prog.collection), c.category)?;
                            if let Some(h) = c.relative_to {
                                write!(out, " (relative to {})", h.index)?;
                            }
                            writeln!(out)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Where a classification is anchored.
#[derive(Clone, Copy)]
enum Anchor {
    Edge(EdgeRef),
    Block(BlockRef),
}

impl Anchor {
    fn sink(&self, prog: &Program<'_>) -> BlockRef {
        match *self {
            Anchor::Edge(e) => prog.cfgs.sink(e),
            Anchor::Block(v) => v,
        }
    }
}

/// The oracle set the classifier consults.
struct Oracles<'a> {
    must: &'a mut dyn AgeInfo,
    may: Option<&'a mut dyn AgeInfo>,
    pers: Option<&'a mut dyn AgeInfo>,
    multi: Option<&'a mut dyn MultiAgeInfo>,
}

/// Derives the category of every access of the collection.
///
/// MUST is mandatory; the other oracles refine the result when present.
/// Accesses in sets left out of the analysis get no category.
pub fn categorize<'a>(
    prog: &Program<'_>,
    must: &'a mut dyn AgeInfo,
    may: Option<&'a mut dyn AgeInfo>,
    pers: Option<&'a mut dyn AgeInfo>,
    multi: Option<&'a mut dyn MultiAgeInfo>,
) -> Result<(CategoryMap, CategoryStats)> {
    let mut oracles = Oracles {
        must,
        may,
        pers,
        multi,
    };
    let mut map = CategoryMap::new(prog);
    let mut stats = CategoryStats::default();
    for cfg in prog.cfgs.ids() {
        for v in prog.cfgs.blocks(cfg) {
            if !prog.cfgs.block(v).is_basic() {
                continue;
            }
            for index in 0..prog.accesses.of(v).len() {
                for e in prog.cfgs.in_edges(v) {
                    let c = process_access(prog, Anchor::Edge(e), index, &mut oracles)?;
                    map.put_edge(e, index, c);
                }
                let c = process_access(prog, Anchor::Block(v), index, &mut oracles)?;
                if let Some(c) = &c {
                    stats.record(c.category);
                }
                map.put_block(v, index, c);
            }
        }
    }
    Ok((map, stats))
}

/// Category of one access at one anchor.
fn process_access(
    prog: &Program<'_>,
    anchor: Anchor,
    index: usize,
    oracles: &mut Oracles<'_>,
) -> Result<Option<AccessCategory>> {
    let v = anchor.sink(prog);
    let a: &Access = &prog.accesses.of(v)[index];

    match a.action() {
        AccessAction::None | AccessAction::Purge => Ok(None),

        // Memory is definitely reached and the block never caches.
        AccessAction::DirectLoad | AccessAction::DirectStore => Ok(Some(AccessCategory {
            category: Category::AlwaysMiss,
            relative_to: None,
        })),

        AccessAction::Load | AccessAction::Store => match a.kind() {
            // Address imprecision precludes proving anything.
            AccessKind::Any | AccessKind::Range { .. } => Ok(Some(AccessCategory {
                category: Category::NotClassified,
                relative_to: None,
            })),

            AccessKind::Block(cb) => {
                if !oracles.must.covers_set(prog.collection.block(*cb).set()) {
                    return Ok(None);
                }
                let (category, relative_to) = classify(prog, anchor, index, *cb, oracles)?;
                Ok(Some(AccessCategory {
                    category,
                    relative_to,
                }))
            }

            AccessKind::Enum { blocks, .. } => {
                if blocks
                    .iter()
                    .any(|b| !oracles.must.covers_set(prog.collection.block(*b).set()))
                {
                    return Ok(None);
                }
                classify_enum(prog, anchor, index, blocks, oracles)
            }
        },
    }
}

/// The core classification of a single block at a single anchor.
fn classify(
    prog: &Program<'_>,
    anchor: Anchor,
    index: usize,
    cb: BlockId,
    oracles: &mut Oracles<'_>,
) -> Result<(Category, Option<BlockRef>)> {
    let a = oracles.must.way_count();
    let set = prog.collection.block(cb).set();
    let sink = anchor.sink(prog);

    let must_age = match anchor {
        Anchor::Edge(e) => oracles.must.age_at_edge(prog, e, index, cb)?,
        Anchor::Block(v) => oracles.must.age_at_block(prog, v, index, cb)?,
    };
    if must_age < a {
        return Ok((Category::AlwaysHit, None));
    }

    if let Some(multi) = oracles.multi.as_deref_mut() {
        if multi.covers_set(set) {
            let n = match anchor {
                Anchor::Edge(e) => multi.level_at_edge(prog, e, index, cb)?,
                Anchor::Block(v) => multi.level_at_block(prog, v, index, cb)?,
            };
            if n > 0 {
                return Ok((Category::Persistent, level_scope(prog, sink, n)));
            }
        }
    }

    if let Some(pers) = oracles.pers.as_deref_mut() {
        if pers.covers_set(set) {
            let pers_age = match anchor {
                Anchor::Edge(e) => pers.age_at_edge(prog, e, index, cb)?,
                Anchor::Block(v) => pers.age_at_block(prog, v, index, cb)?,
            };
            if pers_age < a {
                return Ok((Category::Persistent, outermost_scope(prog, sink)));
            }
        }
    }

    if let Some(may) = oracles.may.as_deref_mut() {
        if may.covers_set(set) {
            let may_age = match anchor {
                Anchor::Edge(e) => may.age_at_edge(prog, e, index, cb)?,
                Anchor::Block(v) => may.age_at_block(prog, v, index, cb)?,
            };
            if may_age >= a {
                return Ok((Category::AlwaysMiss, None));
            }
        }
    }

    Ok((Category::NotClassified, None))
}

/// Classification of an enumerated range: every member must agree.
fn classify_enum(
    prog: &Program<'_>,
    anchor: Anchor,
    index: usize,
    blocks: &[BlockId],
    oracles: &mut Oracles<'_>,
) -> Result<Option<AccessCategory>> {
    let mut category: Option<Category> = None;
    let mut scope: Option<BlockRef> = None;
    for &cb in blocks {
        let (nc, h) = classify(prog, anchor, index, cb, oracles)?;
        match category {
            None => {
                category = Some(nc);
                scope = h;
            }
            Some(c) if c != nc => {
                category = Some(Category::NotClassified);
                scope = None;
                break;
            }
            Some(c) => {
                // Two PE members: keep the deeper (weaker) scope when one
                // encloses the other.
                if c == Category::Persistent {
                    if let (Some(fh), Some(h)) = (scope, h) {
                        let fl = prog.loops.loop_of(fh);
                        let l = prog.loops.loop_of(h);
                        if prog.loops.includes(fl, l) {
                            scope = Some(h);
                        }
                    }
                }
            }
        }
    }
    Ok(category.map(|category| AccessCategory {
        category,
        relative_to: if category == Category::Persistent {
            scope
        } else {
            None
        },
    }))
}

/// Scope of a multi-level persistence result: walk `n − 1` loop levels out
/// from the innermost loop of `sink`, following single-caller links across
/// function boundaries.
fn level_scope(prog: &Program<'_>, sink: BlockRef, n: usize) -> Option<BlockRef> {
    let mut l = prog.loops.loop_of(sink);
    for _ in 1..n {
        if let Some(parent) = prog.loops.parent(l) {
            l = parent;
        } else {
            let cfg = prog.loops.cfg_of(l);
            if prog.cfgs.call_count(cfg) == 1 {
                l = prog.loops.loop_of(prog.cfgs.callers(cfg)[0]);
            } else {
                break;
            }
        }
    }
    scope_block(prog, l)
}

/// Scope of a flat persistence result: the outermost real loop containing
/// `sink`, or the function-entry successor outside any loop.
fn outermost_scope(prog: &Program<'_>, sink: BlockRef) -> Option<BlockRef> {
    let mut l = prog.loops.loop_of(sink);
    while let Some(parent) = prog.loops.parent(l) {
        if prog.loops.is_top(parent) {
            break;
        }
        l = parent;
    }
    scope_block(prog, l)
}

/// The block a persistence scope resolves to.
fn scope_block(prog: &Program<'_>, l: LoopId) -> Option<BlockRef> {
    if prog.loops.is_top(l) {
        prog.cfgs.entry_successor(prog.loops.cfg_of(l))
    } else {
        prog.loops.header(l)
    }
}
