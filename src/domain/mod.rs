//! Abstract domain framework.
//!
//! The four analyses (MUST, MAY, PERS, multi-level PERS) are monotone
//! abstract interpretations over a per-set age lattice. They share the ACS
//! layout and the aging scaffolding but differ in their join, the meaning
//! of bottom and top, and the access transformer. The [`Domain`] trait
//! captures exactly that capability set; the fixed-point solver and the
//! replay queries are written against it once.
//!
//! Every domain instance is bound to a single cache set and owns the arena
//! its states live in.

/// MAY domain: lower bound on ages, proves always-miss.
pub mod may;
/// Multi-level persistence domain.
pub mod multi;
/// MUST domain: upper bound on ages, proves always-hit.
pub mod must;
/// PERS domain: scoped persistence.
pub mod pers;

pub use may::MayDomain;
pub use multi::MultiPersDomain;
pub use must::MustDomain;
pub use pers::PersDomain;

use std::fmt;
use std::io;

use crate::access::Access;
use crate::acs::{age_sum, load_ages, save_ages, write_ages, StateArena, StateId, BOT_AGE};
use crate::analysis::Program;
use crate::cache::SetCollection;
use crate::cfg::{BlockRef, EdgeRef};
use crate::common::error::Result;

/// One abstract domain bound to a cache set.
///
/// `bot` is the "no path reaches here" state and the unit of `join`; `top`
/// the "nothing known" state. `entry` is the state assumed at task entry.
/// Transformers must be monotone in the domain's order; the age lattice is
/// finite, which together guarantees the fixed point terminates.
pub trait Domain: Send {
    /// The cache set this domain instance analyses.
    fn set(&self) -> usize;

    /// The arena owning this domain's states.
    fn arena(&self) -> &StateArena;

    /// Mutable access to the arena (borrow bookkeeping, collection).
    fn arena_mut(&mut self) -> &mut StateArena;

    /// The bottom state.
    fn bot(&self) -> StateId;

    /// The top state.
    fn top(&self) -> StateId;

    /// The state assumed at the entry of a task root.
    fn entry(&self) -> StateId;

    /// State equality, with identity as a fast path.
    fn equals(&self, s1: StateId, s2: StateId) -> bool;

    /// Least upper bound of two states.
    fn join(&mut self, s1: StateId, s2: StateId) -> StateId;

    /// Transfer of a single access.
    ///
    /// Accesses that do not touch this domain's set leave the state
    /// untouched.
    fn update_access(&mut self, prog: &Program<'_>, a: &Access, s: StateId) -> StateId;

    /// Transfer of an edge; identity unless the domain tracks control
    /// structure (loop levels, call depths).
    fn update_edge(&mut self, prog: &Program<'_>, e: EdgeRef, s: StateId) -> StateId {
        let _ = (prog, e);
        s
    }

    /// Transfer of a whole block: folds [`Domain::update_access`] over the
    /// block's accesses in program order.
    fn update_block(&mut self, prog: &Program<'_>, v: BlockRef, s: StateId) -> StateId {
        let mut os = s;
        for a in prog.accesses.of(v) {
            os = self.update_access(prog, a, os);
        }
        os
    }

    /// Marks the domain-owned live states (constants) for collection.
    fn mark_roots(&self, mark: &mut dyn FnMut(StateId));

    /// Renders a state for the textual dump.
    fn write_state(
        &self,
        collection: &SetCollection,
        s: StateId,
        out: &mut dyn fmt::Write,
    ) -> fmt::Result;

    /// Serialises a state as raw bytes.
    fn save_state(&self, s: StateId, out: &mut dyn io::Write) -> Result<()>;

    /// Deserialises a state previously written by [`Domain::save_state`].
    fn load_state(&mut self, input: &mut dyn io::Read) -> Result<StateId>;
}

/// Shared scaffolding of the plain age-vector domains.
///
/// Holds the set geometry (N blocks, associativity A), the arena, and the
/// bottom/top constants. The concrete domains wrap it and add their join
/// and transformers.
pub struct AcsDomain {
    set: usize,
    n: usize,
    assoc: u8,
    sum_top: u32,
    arena: StateArena,
    bot: StateId,
    top: StateId,
}

impl AcsDomain {
    /// Builds the scaffolding for one set.
    ///
    /// `top_age` is the age filling the domain's top constant: the
    /// associativity for MUST/PERS, zero for MAY.
    pub fn new(
        collection: &SetCollection,
        set: usize,
        assoc: u8,
        top_age: u8,
        gc_threshold: usize,
    ) -> Self {
        let n = collection.block_count(set);
        let mut arena = StateArena::new(gc_threshold);
        let bot = arena.alloc_acs(n, BOT_AGE);
        let top = arena.alloc_acs(n, top_age);
        arena.pin(bot);
        arena.pin(top);
        Self {
            set,
            n,
            assoc,
            sum_top: assoc as u32 * n as u32,
            arena,
            bot,
            top,
        }
    }

    /// The analysed set.
    #[inline]
    pub fn set(&self) -> usize {
        self.set
    }

    /// Number of blocks in the set (length of the age vectors).
    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    /// The analysable associativity `A`.
    #[inline]
    pub fn assoc(&self) -> u8 {
        self.assoc
    }

    /// The age sum of a fully evicted set, the saturation threshold.
    #[inline]
    pub fn sum_top(&self) -> u32 {
        self.sum_top
    }

    /// The bottom constant.
    #[inline]
    pub fn bot(&self) -> StateId {
        self.bot
    }

    /// The top constant.
    #[inline]
    pub fn top(&self) -> StateId {
        self.top
    }

    /// The arena.
    #[inline]
    pub fn arena(&self) -> &StateArena {
        &self.arena
    }

    /// Mutable arena access.
    #[inline]
    pub fn arena_mut(&mut self) -> &mut StateArena {
        &mut self.arena
    }

    /// Allocates a fresh state filled with `fill`.
    #[inline]
    pub fn make(&mut self, fill: u8) -> StateId {
        self.arena.alloc_acs(self.n, fill)
    }

    /// Allocates a copy of `s`.
    #[inline]
    pub fn copy(&mut self, s: StateId) -> StateId {
        self.arena.copy_acs(s)
    }

    /// Age sum of `s`.
    #[inline]
    pub fn sum(&self, s: StateId) -> u32 {
        age_sum(self.arena.ages(s))
    }

    /// Equality with the bottom identity fast path.
    ///
    /// Bottom compares equal only to itself, even against a state with
    /// identical bytes: bottom means "unreachable", not an age assignment.
    pub fn equals(&self, s1: StateId, s2: StateId) -> bool {
        if s1 == self.bot || s2 == self.bot {
            s1 == s2
        } else {
            self.arena.equal_acs(s1, s2)
        }
    }

    /// Renders a state: `_` for bottom, `T` for the top constant, the
    /// labelled age vector otherwise.
    pub fn write_state(
        &self,
        collection: &SetCollection,
        s: StateId,
        out: &mut dyn fmt::Write,
    ) -> fmt::Result {
        if s == self.bot {
            write!(out, "_")
        } else if s == self.top {
            write!(out, "T")
        } else {
            write_ages(self.arena.ages(s), collection, self.set, out)
        }
    }

    /// Saves the raw age bytes of `s`.
    pub fn save_state(&self, s: StateId, out: &mut dyn io::Write) -> Result<()> {
        save_ages(self.arena.ages(s), out)
    }

    /// Loads an age vector written by [`AcsDomain::save_state`].
    pub fn load_state(&mut self, input: &mut dyn io::Read) -> Result<StateId> {
        let ages = load_ages(self.n, input)?;
        Ok(self.arena.alloc_acs_from(ages))
    }
}
