//! Per-set analysis driver.
//!
//! Cache sets are independent: blocks of different sets never compete for
//! the same ways. The driver therefore owns one (domain, solver) pair per
//! set (skipping empty sets and sets excluded by configuration) and runs
//! the fixed points either sequentially or on worker threads. On top of
//! the solved states it exposes:
//! 1. **Snapshot queries:** ACS before/after blocks and edges, and the
//!    replayed state right before an individual access.
//! 2. **Age oracles:** The per-analysis interfaces the category derivation
//!    consumes ([`AgeInfo`], [`MultiAgeInfo`]).
//! 3. **Dump:** A textual rendition of every per-block state, set by set.

/// Worklist fixed point.
pub mod solver;

pub use solver::Solver;

use std::fmt;
use std::io;

use log::{debug, warn};

use crate::access::AccessMap;
use crate::acs::StateId;
use crate::cache::{BlockId, SetCollection};
use crate::cfg::{BlockRef, CfgCollection, EdgeRef, LoopTree};
use crate::common::error::{AnalysisError, Result};
use crate::config::AnalysisConfig;
use crate::domain::{Domain, MayDomain, MultiPersDomain, MustDomain, PersDomain};

/// The immutable inputs every analysis stage works on.
#[derive(Clone, Copy)]
pub struct Program<'a> {
    /// Interned cache blocks, geometry and memory map.
    pub collection: &'a SetCollection,
    /// The CFGs under analysis.
    pub cfgs: &'a CfgCollection,
    /// Loop nesting of the CFGs.
    pub loops: &'a LoopTree,
    /// Per-block access lists.
    pub accesses: &'a AccessMap,
}

/// Age oracle of a plain-ACS analysis (MUST, MAY, PERS).
pub trait AgeInfo {
    /// The analysable way count `A`.
    fn way_count(&self) -> u8;

    /// Whether the oracle analysed the given set.
    fn covers_set(&self, set: usize) -> bool;

    /// Age of block `cb` right before access `index` of block `v`, from
    /// the joined block input.
    fn age_at_block(
        &mut self,
        prog: &Program<'_>,
        v: BlockRef,
        index: usize,
        cb: BlockId,
    ) -> Result<u8>;

    /// Age of block `cb` right before access `index` of the sink of `e`,
    /// in the context of that edge.
    fn age_at_edge(
        &mut self,
        prog: &Program<'_>,
        e: EdgeRef,
        index: usize,
        cb: BlockId,
    ) -> Result<u8>;
}

/// Level oracle of the multi-level persistence analysis.
pub trait MultiAgeInfo {
    /// The analysable way count `A`.
    fn way_count(&self) -> u8;

    /// Whether the oracle analysed the given set.
    fn covers_set(&self, set: usize) -> bool;

    /// Number of innermost loop levels in which `cb` stays persistent,
    /// right before access `index` of block `v`.
    ///
    /// Zero means not persistent at any level; one means persistent within
    /// the innermost enclosing loop.
    fn level_at_block(
        &mut self,
        prog: &Program<'_>,
        v: BlockRef,
        index: usize,
        cb: BlockId,
    ) -> Result<usize>;

    /// As [`MultiAgeInfo::level_at_block`], in the context of edge `e`.
    fn level_at_edge(
        &mut self,
        prog: &Program<'_>,
        e: EdgeRef,
        index: usize,
        cb: BlockId,
    ) -> Result<usize>;
}

/// One analysis run over all selected cache sets.
pub struct SetAnalysis<D: Domain> {
    solvers: Vec<Option<Solver<D>>>,
    assoc: u8,
}

impl<D: Domain> SetAnalysis<D> {
    /// Builds one solver per non-empty, selected set.
    fn build(
        prog: &Program<'_>,
        config: &AnalysisConfig,
        make: impl Fn(&SetCollection, usize, u8, usize) -> D,
    ) -> Result<Self> {
        let set_count = prog.collection.set_count();
        let assoc = prog.collection.geometry().assoc() as u8;
        for &s in &config.only_sets {
            if s >= set_count {
                warn!("ignoring invalid set number: {}", s);
            }
        }
        let solvers = (0..set_count)
            .map(|set| {
                if !config.processes(set) || prog.collection.block_count(set) == 0 {
                    None
                } else {
                    Some(Solver::new(
                        prog,
                        make(prog.collection, set, assoc, config.gc_threshold),
                    ))
                }
            })
            .collect();
        Ok(Self { solvers, assoc })
    }

    /// Runs every per-set fixed point, optionally on worker threads.
    fn solve(&mut self, prog: &Program<'_>, parallel: bool) {
        if parallel {
            let workers = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            let per_worker = (self.solvers.len() + workers - 1) / workers.max(1);
            std::thread::scope(|scope| {
                for chunk in self.solvers.chunks_mut(per_worker.max(1)) {
                    scope.spawn(move || {
                        for solver in chunk.iter_mut().flatten() {
                            solver.solve(prog);
                        }
                    });
                }
            });
        } else {
            for (set, solver) in self.solvers.iter_mut().enumerate() {
                if let Some(solver) = solver {
                    debug!("solving set {}", set);
                    solver.solve(prog);
                }
            }
        }
    }

    /// The analysable way count `A`.
    pub fn assoc(&self) -> u8 {
        self.assoc
    }

    /// Whether the given set was analysed.
    pub fn covers(&self, set: usize) -> bool {
        set < self.solvers.len() && self.solvers[set].is_some()
    }

    fn solver_mut(&mut self, set: usize) -> Result<&mut Solver<D>> {
        let set_count = self.solvers.len();
        self.solvers
            .get_mut(set)
            .and_then(|s| s.as_mut())
            .ok_or(AnalysisError::InvalidSet { set, set_count })
    }

    fn solver(&self, set: usize) -> Result<&Solver<D>> {
        let set_count = self.solvers.len();
        self.solvers
            .get(set)
            .and_then(|s| s.as_ref())
            .ok_or(AnalysisError::InvalidSet { set, set_count })
    }

    /// ACS at block entry for the given set.
    pub fn acs_before_block(&mut self, set: usize, v: BlockRef) -> Result<StateId> {
        Ok(self.solver_mut(set)?.before_block(v))
    }

    /// ACS after the block transfer for the given set.
    pub fn acs_after_block(&mut self, set: usize, v: BlockRef) -> Result<StateId> {
        Ok(self.solver_mut(set)?.after_block(v))
    }

    /// ACS at the edge start for the given set.
    pub fn acs_before_edge(
        &mut self,
        prog: &Program<'_>,
        set: usize,
        e: EdgeRef,
    ) -> Result<StateId> {
        Ok(self.solver_mut(set)?.before_edge(prog, e))
    }

    /// ACS carried into the edge's sink for the given set.
    pub fn acs_after_edge(&mut self, set: usize, e: EdgeRef) -> Result<StateId> {
        Ok(self.solver_mut(set)?.after_edge(e))
    }

    /// ACS right before an access, anchored at its block.
    pub fn acs_at_block(
        &mut self,
        prog: &Program<'_>,
        set: usize,
        v: BlockRef,
        index: usize,
    ) -> Result<StateId> {
        self.solver_mut(set)?.at_block(prog, v, index)
    }

    /// ACS right before an access, anchored at a predecessor edge.
    pub fn acs_at_edge(
        &mut self,
        prog: &Program<'_>,
        set: usize,
        e: EdgeRef,
        index: usize,
    ) -> Result<StateId> {
        self.solver_mut(set)?.at_edge(prog, e, index)
    }

    /// Returns a borrowed snapshot.
    pub fn release(&mut self, set: usize, s: StateId) -> Result<()> {
        self.solver_mut(set)?.release(s);
        Ok(())
    }

    /// Copies out the age bytes of a snapshot.
    pub fn ages(&self, set: usize, s: StateId) -> Result<Vec<u8>> {
        Ok(self.solver(set)?.domain().arena().ages(s).to_vec())
    }

    /// Serialises a snapshot of the given set.
    pub fn save_acs(&self, set: usize, s: StateId, out: &mut dyn io::Write) -> Result<()> {
        self.solver(set)?.domain().save_state(s, out)
    }

    /// Deserialises a state into the given set's arena.
    pub fn load_acs(&mut self, set: usize, input: &mut dyn io::Read) -> Result<StateId> {
        let solver = self.solver_mut(set)?;
        let s = solver.domain_mut().load_state(input)?;
        solver.domain_mut().arena_mut().borrow(s);
        Ok(s)
    }

    /// Writes every per-block output state, set by set.
    pub fn dump(&self, prog: &Program<'_>, out: &mut dyn fmt::Write) -> fmt::Result {
        for (set, solver) in self.solvers.iter().enumerate() {
            let solver = match solver {
                Some(s) => s,
                None => continue,
            };
            writeln!(out, "SET {}", set)?;
            for cfg in prog.cfgs.ids() {
                writeln!(out, "\tCFG {}", prog.cfgs.cfg(cfg).name())?;
                for v in prog.cfgs.blocks(cfg) {
                    write!(out, "\t\t{}: ", v.index)?;
                    let s = solver.peek_after_block(v);
                    solver.domain().write_state(prog.collection, s, &mut *out)?;
                    writeln!(out)?;
                }
            }
        }
        Ok(())
    }

    fn plain_age_at_block(
        &mut self,
        prog: &Program<'_>,
        v: BlockRef,
        index: usize,
        cb: BlockId,
    ) -> Result<u8> {
        let block = prog.collection.block(cb);
        let set = block.set();
        let idx = block.index();
        let solver = self.solver_mut(set)?;
        let s = solver.at_block(prog, v, index)?;
        let age = solver.domain().arena().ages(s)[idx];
        solver.release(s);
        Ok(age)
    }

    fn plain_age_at_edge(
        &mut self,
        prog: &Program<'_>,
        e: EdgeRef,
        index: usize,
        cb: BlockId,
    ) -> Result<u8> {
        let block = prog.collection.block(cb);
        let set = block.set();
        let idx = block.index();
        let solver = self.solver_mut(set)?;
        let s = solver.at_edge(prog, e, index)?;
        let age = solver.domain().arena().ages(s)[idx];
        solver.release(s);
        Ok(age)
    }
}

/// MUST analysis over all selected sets.
pub type MustAnalysis = SetAnalysis<MustDomain>;
/// MAY analysis over all selected sets.
pub type MayAnalysis = SetAnalysis<MayDomain>;
/// Flat persistence analysis over all selected sets.
pub type PersAnalysis = SetAnalysis<PersDomain>;
/// Multi-level persistence analysis over all selected sets.
pub type MultiPersAnalysis = SetAnalysis<MultiPersDomain>;

impl SetAnalysis<MustDomain> {
    /// Runs the MUST analysis.
    pub fn must(prog: &Program<'_>, config: &AnalysisConfig) -> Result<Self> {
        let mut this = Self::build(prog, config, MustDomain::new)?;
        this.solve(prog, config.parallel);
        Ok(this)
    }
}

impl SetAnalysis<MayDomain> {
    /// Runs the MAY analysis.
    pub fn may(prog: &Program<'_>, config: &AnalysisConfig) -> Result<Self> {
        let mut this = Self::build(prog, config, MayDomain::new)?;
        this.solve(prog, config.parallel);
        Ok(this)
    }
}

impl SetAnalysis<PersDomain> {
    /// Runs the flat persistence analysis.
    pub fn pers(prog: &Program<'_>, config: &AnalysisConfig) -> Result<Self> {
        let mut this = Self::build(prog, config, PersDomain::new)?;
        this.solve(prog, config.parallel);
        Ok(this)
    }
}

impl SetAnalysis<MultiPersDomain> {
    /// Runs the multi-level persistence analysis.
    pub fn multi_pers(prog: &Program<'_>, config: &AnalysisConfig) -> Result<Self> {
        let mut this = Self::build(prog, config, MultiPersDomain::new)?;
        this.solve(prog, config.parallel);
        Ok(this)
    }

    fn level_of(&mut self, prog: &Program<'_>, s: StateId, cb: BlockId) -> usize {
        let block = prog.collection.block(cb);
        let solver = match self.solvers[block.set()].as_ref() {
            Some(s) => s,
            None => return 0,
        };
        let arena = solver.domain().arena();
        let a = self.assoc;
        let levels = arena.levels(s);
        let mut count = 0;
        for &level in levels.iter().rev() {
            if arena.ages(level)[block.index()] < a {
                count += 1;
            } else {
                break;
            }
        }
        count
    }
}

impl AgeInfo for SetAnalysis<MustDomain> {
    fn way_count(&self) -> u8 {
        self.assoc
    }

    fn covers_set(&self, set: usize) -> bool {
        self.covers(set)
    }

    fn age_at_block(
        &mut self,
        prog: &Program<'_>,
        v: BlockRef,
        index: usize,
        cb: BlockId,
    ) -> Result<u8> {
        self.plain_age_at_block(prog, v, index, cb)
    }

    fn age_at_edge(
        &mut self,
        prog: &Program<'_>,
        e: EdgeRef,
        index: usize,
        cb: BlockId,
    ) -> Result<u8> {
        self.plain_age_at_edge(prog, e, index, cb)
    }
}

impl AgeInfo for SetAnalysis<MayDomain> {
    fn way_count(&self) -> u8 {
        self.assoc
    }

    fn covers_set(&self, set: usize) -> bool {
        self.covers(set)
    }

    fn age_at_block(
        &mut self,
        prog: &Program<'_>,
        v: BlockRef,
        index: usize,
        cb: BlockId,
    ) -> Result<u8> {
        self.plain_age_at_block(prog, v, index, cb)
    }

    fn age_at_edge(
        &mut self,
        prog: &Program<'_>,
        e: EdgeRef,
        index: usize,
        cb: BlockId,
    ) -> Result<u8> {
        self.plain_age_at_edge(prog, e, index, cb)
    }
}

impl AgeInfo for SetAnalysis<PersDomain> {
    fn way_count(&self) -> u8 {
        self.assoc
    }

    fn covers_set(&self, set: usize) -> bool {
        self.covers(set)
    }

    fn age_at_block(
        &mut self,
        prog: &Program<'_>,
        v: BlockRef,
        index: usize,
        cb: BlockId,
    ) -> Result<u8> {
        self.plain_age_at_block(prog, v, index, cb)
    }

    fn age_at_edge(
        &mut self,
        prog: &Program<'_>,
        e: EdgeRef,
        index: usize,
        cb: BlockId,
    ) -> Result<u8> {
        self.plain_age_at_edge(prog, e, index, cb)
    }
}

impl MultiAgeInfo for SetAnalysis<MultiPersDomain> {
    fn way_count(&self) -> u8 {
        self.assoc
    }

    fn covers_set(&self, set: usize) -> bool {
        self.covers(set)
    }

    fn level_at_block(
        &mut self,
        prog: &Program<'_>,
        v: BlockRef,
        index: usize,
        cb: BlockId,
    ) -> Result<usize> {
        let set = prog.collection.block(cb).set();
        let s = {
            let solver = self.solver_mut(set)?;
            solver.at_block(prog, v, index)?
        };
        let level = self.level_of(prog, s, cb);
        self.release(set, s)?;
        Ok(level)
    }

    fn level_at_edge(
        &mut self,
        prog: &Program<'_>,
        e: EdgeRef,
        index: usize,
        cb: BlockId,
    ) -> Result<usize> {
        let set = prog.collection.block(cb).set();
        let s = {
            let solver = self.solver_mut(set)?;
            solver.at_edge(prog, e, index)?
        };
        let level = self.level_of(prog, s, cb);
        self.release(set, s)?;
        Ok(level)
    }
}
