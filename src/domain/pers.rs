//! PERS domain.
//!
//! Persistence analysis: like MUST, but the age lattice carries a
//! distinguished bottom age meaning "not yet referenced on this path". A
//! block whose age stays below the associativity once loaded is persistent:
//! after its first (possibly missing) reference, every later reference in
//! the analysed scope hits.

use std::fmt;
use std::io;

use crate::access::{Access, AccessAction, AccessKind};
use crate::acs::{StateArena, StateId, BOT_AGE};
use crate::analysis::Program;
use crate::cache::SetCollection;
use crate::common::error::Result;

use super::{AcsDomain, Domain};

/// Scoped persistence domain for one cache set.
pub struct PersDomain {
    core: AcsDomain,
    /// Entry state: no block referenced yet.
    empty: StateId,
}

impl PersDomain {
    /// Builds the PERS domain for `set`.
    pub fn new(collection: &SetCollection, set: usize, assoc: u8, gc_threshold: usize) -> Self {
        let mut core = AcsDomain::new(collection, set, assoc, assoc, gc_threshold);
        let empty = core.make(BOT_AGE);
        core.arena_mut().pin(empty);
        Self { core, empty }
    }

    /// A never-referenced accessed block ages nothing: its age counts as A
    /// for the comparison, and bottom ages never move.
    fn access(&mut self, s: StateId, b: usize) -> StateId {
        if s == self.core.bot() {
            return s;
        }
        let a = self.core.assoc();
        let os = self.core.copy(s);
        let ages = self.core.arena_mut().ages_mut(os);
        let mut ba = ages[b];
        if ba == BOT_AGE {
            ba = a;
        }
        for age in ages.iter_mut() {
            if *age <= ba && *age != a && *age != BOT_AGE {
                *age += 1;
            }
        }
        ages[b] = 0;
        os
    }

    fn access_any(&mut self, s: StateId) -> StateId {
        if s == self.core.bot() {
            return s;
        }
        let a = self.core.assoc();
        let os = self.core.copy(s);
        for age in self.core.arena_mut().ages_mut(os).iter_mut() {
            if *age != BOT_AGE {
                *age = (*age + 1).min(a);
            }
        }
        os
    }

    fn purge(&mut self, s: StateId, b: usize) -> StateId {
        if s == self.core.bot() {
            return s;
        }
        let a = self.core.assoc();
        let os = self.core.copy(s);
        self.core.arena_mut().ages_mut(os)[b] = a;
        os
    }
}

impl Domain for PersDomain {
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
        if s1 == bot {
            return s2;
        }
        if s2 == bot {
            return s1;
        }
        let a = self.core.assoc();
        let arena = self.core.arena();
        let merged: Box<[u8]> = arena
            .ages(s1)
            .iter()
            .zip(arena.ages(s2))
            .map(|(&a1, &a2)| {
                if a1 == BOT_AGE {
                    a2
                } else if a2 == BOT_AGE {
                    a1
                } else {
                    a1.max(a2)
                }
            })
            .collect();
        // More loaded blocks than ways cannot all persist.
        let loaded = merged.iter().filter(|&&age| age < a).count();
        let sum = crate::acs::age_sum(&merged);
        if loaded > a as usize || sum == self.core.sum_top() {
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
