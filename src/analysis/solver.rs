//! Fixed-point solver.
//!
//! A forward worklist analyser running one domain over the whole CFG
//! collection. It stores, per block, the joined input state and the output
//! of the block transfer, and per edge the state carried into the sink
//! (block output passed through the edge transfer). Interprocedural flow
//! goes through synthetic call blocks: their caller-side output feeds the
//! callee entry, and the callee's exit state becomes the call block's
//! output.
//!
//! The worklist is a FIFO seeded with the entry blocks of the task roots in
//! collection order, so iteration (and with it every intermediate state)
//! is deterministic. Termination follows from the finite age lattice and
//! the monotone transformers.

use std::collections::VecDeque;

use crate::acs::StateId;
use crate::cfg::{BlockKind, BlockRef, EdgeRef};
use crate::common::error::{AnalysisError, Result};
use crate::domain::Domain;

use super::Program;

/// Worklist fixed point of one domain (one cache set) over a CFG collection.
pub struct Solver<D: Domain> {
    domain: D,
    block_in: Vec<Vec<StateId>>,
    block_out: Vec<Vec<StateId>>,
    /// Per edge: block output passed through the edge transfer.
    edge_out: Vec<Vec<StateId>>,
    /// Per call block: the caller-side state fed to the callee entry.
    call_out: Vec<Vec<StateId>>,
    queue: VecDeque<BlockRef>,
    queued: Vec<Vec<bool>>,
}

impl<D: Domain> Solver<D> {
    /// Creates a solver with every state initialised to bottom.
    pub fn new(prog: &Program<'_>, domain: D) -> Self {
        let bot = domain.bot();
        let block_in = prog
            .cfgs
            .ids()
            .map(|id| vec![bot; prog.cfgs.cfg(id).block_count()])
            .collect::<Vec<_>>();
        let block_out = block_in.clone();
        let call_out = block_in.clone();
        let edge_out = prog
            .cfgs
            .ids()
            .map(|id| vec![bot; prog.cfgs.cfg(id).edge_count()])
            .collect();
        let queued = prog
            .cfgs
            .ids()
            .map(|id| vec![false; prog.cfgs.cfg(id).block_count()])
            .collect();
        Self {
            domain,
            block_in,
            block_out,
            edge_out,
            call_out,
            queue: VecDeque::new(),
            queued,
        }
    }

    /// The domain driven by this solver.
    pub fn domain(&self) -> &D {
        &self.domain
    }

    /// Mutable access to the domain.
    pub fn domain_mut(&mut self) -> &mut D {
        &mut self.domain
    }

    #[inline]
    fn get(states: &[Vec<StateId>], r: BlockRef) -> StateId {
        states[r.cfg.0 as usize][r.index as usize]
    }

    #[inline]
    fn put(states: &mut [Vec<StateId>], r: BlockRef, s: StateId) {
        states[r.cfg.0 as usize][r.index as usize] = s;
    }

    fn enqueue(&mut self, v: BlockRef) {
        let flag = &mut self.queued[v.cfg.0 as usize][v.index as usize];
        if !*flag {
            *flag = true;
            self.queue.push_back(v);
        }
    }

    /// Runs the fixed point to completion.
    pub fn solve(&mut self, prog: &Program<'_>) {
        for cfg in prog.cfgs.ids() {
            if prog.cfgs.is_root(cfg) {
                self.enqueue(prog.cfgs.entry(cfg));
            }
        }
        while let Some(v) = self.queue.pop_front() {
            self.queued[v.cfg.0 as usize][v.index as usize] = false;
            self.process(prog, v);
            if self.domain.arena().should_collect() {
                self.collect_garbage();
            }
        }
    }

    /// One transfer round on a single block.
    fn process(&mut self, prog: &Program<'_>, v: BlockRef) {
        let kind = prog.cfgs.block(v).kind();

        // Join the input over every way control can reach the block.
        let mut input = if kind == BlockKind::Entry && prog.cfgs.is_root(v.cfg) {
            self.domain.entry()
        } else {
            self.domain.bot()
        };
        if kind == BlockKind::Entry {
            for &caller in prog.cfgs.callers(v.cfg) {
                let cs = Self::get(&self.call_out, caller);
                input = self.domain.join(input, cs);
            }
        }
        for e in prog.cfgs.in_edges(v) {
            let es = self.edge_out[e.cfg.0 as usize][e.index as usize];
            input = self.domain.join(input, es);
        }
        Self::put(&mut self.block_in, v, input);

        // Block transfer; call blocks take the callee's exit as output.
        let out = if let BlockKind::Call(callee) = kind {
            let cs = self.domain.update_block(prog, v, input);
            let old = Self::get(&self.call_out, v);
            if !self.domain.equals(cs, old) {
                Self::put(&mut self.call_out, v, cs);
                if let Some(callee) = callee {
                    self.enqueue(prog.cfgs.entry(callee));
                }
            }
            match callee {
                Some(callee) => Self::get(&self.block_out, prog.cfgs.exit(callee)),
                None => cs,
            }
        } else {
            self.domain.update_block(prog, v, input)
        };
        let old_out = Self::get(&self.block_out, v);
        Self::put(&mut self.block_out, v, out);

        // Propagate along the out-edges; a changed edge state re-enqueues
        // its sink.
        for e in prog.cfgs.out_edges(v) {
            let ns = self.domain.update_edge(prog, e, out);
            let old = self.edge_out[e.cfg.0 as usize][e.index as usize];
            if !self.domain.equals(ns, old) {
                self.edge_out[e.cfg.0 as usize][e.index as usize] = ns;
                self.enqueue(prog.cfgs.sink(e));
            }
        }

        // A changed exit state flows back to every call site.
        if kind == BlockKind::Exit && !self.domain.equals(out, old_out) {
            for &caller in prog.cfgs.callers(v.cfg) {
                self.enqueue(caller);
            }
        }
    }

    /// Sweeps arena garbage, keeping the domain constants, every stored
    /// snapshot and the outstanding borrows alive.
    fn collect_garbage(&mut self) {
        let mut roots: Vec<StateId> = Vec::new();
        self.domain.mark_roots(&mut |s| roots.push(s));
        for states in [&self.block_in, &self.block_out, &self.edge_out, &self.call_out] {
            for per_cfg in states.iter() {
                roots.extend(per_cfg.iter().copied());
            }
        }
        self.domain.arena_mut().collect(roots);
    }

    /// Reads the post-block state without taking a borrow.
    ///
    /// Only for rendering; the returned handle must not outlive the next
    /// collection.
    pub fn peek_after_block(&self, v: BlockRef) -> StateId {
        Self::get(&self.block_out, v)
    }

    /// The joined state at block entry.
    pub fn before_block(&mut self, v: BlockRef) -> StateId {
        let s = Self::get(&self.block_in, v);
        self.domain.arena_mut().borrow(s);
        s
    }

    /// The state after the block transfer.
    pub fn after_block(&mut self, v: BlockRef) -> StateId {
        let s = Self::get(&self.block_out, v);
        self.domain.arena_mut().borrow(s);
        s
    }

    /// The state at the edge start, after its source block.
    pub fn before_edge(&mut self, prog: &Program<'_>, e: EdgeRef) -> StateId {
        let s = Self::get(&self.block_out, prog.cfgs.source(e));
        self.domain.arena_mut().borrow(s);
        s
    }

    /// The state carried into the edge's sink (edge transfer applied).
    pub fn after_edge(&mut self, e: EdgeRef) -> StateId {
        let s = self.edge_out[e.cfg.0 as usize][e.index as usize];
        self.domain.arena_mut().borrow(s);
        s
    }

    /// The state immediately before access `index` of block `v`, starting
    /// from the joined block input.
    pub fn at_block(&mut self, prog: &Program<'_>, v: BlockRef, index: usize) -> Result<StateId> {
        let start = Self::get(&self.block_in, v);
        self.replay(prog, v, index, start)
    }

    /// The state immediately before access `index` of the sink of `e`, in
    /// the context of that edge.
    pub fn at_edge(&mut self, prog: &Program<'_>, e: EdgeRef, index: usize) -> Result<StateId> {
        let start = self.edge_out[e.cfg.0 as usize][e.index as usize];
        self.replay(prog, prog.cfgs.sink(e), index, start)
    }

    fn replay(
        &mut self,
        prog: &Program<'_>,
        v: BlockRef,
        index: usize,
        start: StateId,
    ) -> Result<StateId> {
        let accesses = prog.accesses.of(v);
        if index >= accesses.len() {
            return Err(AnalysisError::Internal(format!(
                "access {} not in block {} of CFG {}",
                index,
                v.index,
                prog.cfgs.cfg(v.cfg).name()
            )));
        }
        let mut s = start;
        for a in &accesses[..index] {
            s = self.domain.update_access(prog, a, s);
        }
        self.domain.arena_mut().borrow(s);
        Ok(s)
    }

    /// Returns a snapshot obtained from the query methods.
    pub fn release(&mut self, s: StateId) {
        self.domain.arena_mut().release(s);
    }
}
