//! MAY domain.
//!
//! Computes a lower bound on block ages: if the MAY age of a block reaches
//! the associativity at a program point, the block cannot be in the cache
//! there on any path, and the access provably misses. Join is the
//! element-wise minimum. An unknown-address access is the identity: it
//! cannot be proven to age anything.

use std::fmt;
use std::io;

use crate::access::{Access, AccessAction, AccessKind};
use crate::acs::{StateArena, StateId};
use crate::analysis::Program;
use crate::cache::SetCollection;
use crate::common::error::Result;

use super::{AcsDomain, Domain};

/// Lower-bound age domain for one cache set.
pub struct MayDomain {
    core: AcsDomain,
    /// Entry state: every block freshly present at age zero.
    empty: StateId,
}

impl MayDomain {
    /// Builds the MAY domain for `set`.
    pub fn new(collection: &SetCollection, set: usize, assoc: u8, gc_threshold: usize) -> Self {
        // Top fills every age with zero: any block may be most recent.
        let mut core = AcsDomain::new(collection, set, assoc, 0, gc_threshold);
        let empty = core.make(0);
        core.arena_mut().pin(empty);
        Self { core, empty }
    }

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

impl Domain for MayDomain {
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
        self.empty
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
            .map(|(&a1, &a2)| a1.min(a2))
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
                // Nothing can be proven to age on an unknown address.
                AccessKind::Any | AccessKind::Range { .. } => s,
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
        mark(self.empty);
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
