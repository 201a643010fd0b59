//! MUST domain.
//!
//! Computes an upper bound on block ages: if the MUST age of a block is
//! below the associativity at a program point, the block is provably in
//! the cache there, whatever path was taken. Join is the element-wise
//! maximum (more evictions possible).

use std::fmt;
use std::io;

use crate::access::{Access, AccessAction, AccessKind};
use crate::acs::{StateArena, StateId};
use crate::analysis::Program;
use crate::cache::SetCollection;
use crate::common::error::Result;

use super::{AcsDomain, Domain};

/// Upper-bound age domain for one cache set.
pub struct MustDomain {
    core: AcsDomain,
}

impl MustDomain {
    /// Builds the MUST domain for `set`.
    pub fn new(collection: &SetCollection, set: usize, assoc: u8, gc_threshold: usize) -> Self {
        // Top fills every age with A: nothing is guaranteed in the cache.
        Self {
            core: AcsDomain::new(collection, set, assoc, assoc, gc_threshold),
        }
    }

    /// Ages the lines younger than the accessed block, then touches it.
    fn access(&mut self, s: StateId, b: usize) -> StateId {
        if s == self.core.bot() {
            return s;
        }
        let a = self.core.assoc();
        let os = self.core.copy(s);
        let ages = self.core.arena_mut().ages_mut(os);
        let ba = ages[b];
        for age in ages.iter_mut() {
            if *age <= ba && *age != a {
                *age += 1;
            }
        }
        ages[b] = 0;
        os
    }

    /// Ages every line without installing anything.
    ///
    /// Kept separate from [`MustDomain::access`]: it is the building block
    /// for transfers that know the target block will not stay resident.
    pub fn preaccess(&mut self, s: StateId, b: usize) -> StateId {
        let os = self.core.copy(s);
        let ages = self.core.arena_mut().ages_mut(os);
        let ba = ages[b];
        for age in ages.iter_mut() {
            if *age <= ba {
                *age += 1;
            }
        }
        os
    }

    /// Unknown-address access: every line may age by one.
    fn access_any(&mut self, s: StateId) -> StateId {
        let a = self.core.assoc();
        let os = self.core.copy(s);
        let ages = self.core.arena_mut().ages_mut(os);
        let mut sum = 0u32;
        for age in ages.iter_mut() {
            *age = (*age + 1).min(a);
            sum += *age as u32;
        }
        if sum == self.core.sum_top() {
            return self.core.top();
        }
        os
    }

    /// Forced eviction of one block.
    fn purge(&mut self, s: StateId, b: usize) -> StateId {
        let a = self.core.assoc();
        let os = self.core.copy(s);
        self.core.arena_mut().ages_mut(os)[b] = a;
        if self.core.sum(os) == self.core.sum_top() {
            return self.core.top();
        }
        os
    }
}

impl Domain for MustDomain {
    fn set(&self) -> usize {
        self.core.set()
    }

    fn arena(&self) -> &StateArena {
        self.core.arena()
    }

    fn arena_mut(&mut self) -> &mut StateArena {
        self.core.arena_mut()
    }

    fn bot(&self) -> StateId {
        self.core.bot()
    }

    fn top(&self) -> StateId {
        self.core.top()
    }

    fn entry(&self) -> StateId {
        // Unknown initial cache content: assume everything evicted.
        self.core.top()
    }

    fn equals(&self, s1: StateId, s2: StateId) -> bool {
        self.core.equals(s1, s2)
    }

    fn join(&mut self, s1: StateId, s2: StateId) -> StateId {
        let bot = self.core.bot();
        let top = self.core.top();
        if s1 == bot {
            return s2;
        }
        if s2 == bot {
            return s1;
        }
        if s1 == top || s2 == top {
            return top;
        }
        let arena = self.core.arena();
        let merged: Box<[u8]> = arena
            .ages(s1)
            .iter()
            .zip(arena.ages(s2))
            .map(|(&a1, &a2)| a1.max(a2))
            .collect();
        if crate::acs::age_sum(&merged) == self.core.sum_top() {
            return self.core.top();
        }
        self.core.arena_mut().alloc_acs_from(merged)
    }

    fn update_access(&mut self, prog: &Program<'_>, a: &Access, s: StateId) -> StateId {
        let set = self.core.set();
        if !a.touches(set, prog.collection) || s == self.core.bot() {
            return s;
        }
        match a.action() {
            AccessAction::Load | AccessAction::Store => match a.kind() {
                AccessKind::Any | AccessKind::Range { .. } => self.access_any(s),
                AccessKind::Block(b) => {
                    let idx = prog.collection.block(*b).index();
                    self.access(s, idx)
                }
                AccessKind::Enum { .. } => match a.block_in(set, prog.collection) {
                    Some(b) => {
                        let idx = prog.collection.block(b).index();
                        self.access(s, idx)
                    }
                    None => s,
                },
            },
            AccessAction::Purge => match a.kind() {
                AccessKind::Any | AccessKind::Range { .. } => self.core.top(),
                AccessKind::Block(b) => {
                    let idx = prog.collection.block(*b).index();
                    self.purge(s, idx)
                }
                AccessKind::Enum { .. } => match a.block_in(set, prog.collection) {
                    Some(b) => {
                        let idx = prog.collection.block(b).index();
                        self.purge(s, idx)
                    }
                    None => s,
                },
            },
            _ => s,
        }
    }

    fn mark_roots(&self, mark: &mut dyn FnMut(StateId)) {
        mark(self.core.bot());
        mark(self.core.top());
    }

    fn write_state(
        &self,
        collection: &SetCollection,
        s: StateId,
        out: &mut dyn fmt::Write,
    ) -> fmt::Result {
        self.core.write_state(collection, s, out)
    }

    fn save_state(&self, s: StateId, out: &mut dyn io::Write) -> Result<()> {
        self.core.save_state(s, out)
    }

    fn load_state(&mut self, input: &mut dyn io::Read) -> Result<StateId> {
        self.core.load_state(input)
    }
}
