//! Multi-level persistence domain.
//!
//! The flat PERS analysis judges persistence over the whole task: one
//! eviction anywhere destroys the property. This domain keeps a *stack* of
//! PERS states, one per enclosing loop level (outermost at index 0), so a
//! block evicted once per outer iteration can still be proven persistent
//! within the inner loop. The stack grows on loop entry, shrinks on loop
//! exit, and is reconciled across calls with the depth recorded at each
//! synthetic call block.

use std::collections::HashMap;
use std::fmt;
use std::io;

use crate::access::Access;
use crate::acs::{StateArena, StateId};
use crate::analysis::Program;
use crate::cache::SetCollection;
use crate::cfg::{BlockRef, EdgeRef};
use crate::common::error::{AnalysisError, Result};

use super::{Domain, PersDomain};

/// Stack-of-PERS domain for one cache set.
pub struct MultiPersDomain {
    pers: PersDomain,
    /// Stack length observed at each synthetic call block.
    depths: HashMap<BlockRef, usize>,
    bot: StateId,
    top: StateId,
}

impl MultiPersDomain {
    /// Builds the multi-level persistence domain for `set`.
    pub fn new(collection: &SetCollection, set: usize, assoc: u8, gc_threshold: usize) -> Self {
        let mut pers = PersDomain::new(collection, set, assoc, gc_threshold);
        let pers_bot = pers.bot();
        let pers_top = pers.top();
        let bot = pers.arena_mut().alloc_multi(&[pers_bot]);
        let top = pers.arena_mut().alloc_multi(&[pers_top]);
        pers.arena_mut().pin(bot);
        pers.arena_mut().pin(top);
        Self {
            pers,
            depths: HashMap::new(),
            bot,
            top,
        }
    }

    /// Copies a stack to `new_len` levels: truncating, or padding the
    /// deep end with fresh per-level entry states.
    fn resize(&mut self, s: StateId, new_len: usize) -> StateId {
        let fresh = self.pers.entry();
        let mut levels = self.pers.arena().levels(s).to_vec();
        levels.resize(new_len, fresh);
        self.pers.arena_mut().alloc_multi(&levels)
    }
}

impl Domain for MultiPersDomain {
    fn set(&self) -> usize {
        self.pers.set()
    }

    fn arena(&self) -> &StateArena {
        self.pers.arena()
    }

    fn arena_mut(&mut self) -> &mut StateArena {
        self.pers.arena_mut()
    }

    fn bot(&self) -> StateId {
        self.bot
    }

    fn top(&self) -> StateId {
        self.top
    }

    fn entry(&self) -> StateId {
        self.top
    }

    fn equals(&self, s1: StateId, s2: StateId) -> bool {
        if s1 == self.bot || s2 == self.bot {
            return s1 == s2;
        }
        let arena = self.pers.arena();
        let l1 = arena.levels(s1);
        let l2 = arena.levels(s2);
        l1.len() == l2.len()
            && l1
                .iter()
                .zip(l2)
                .all(|(&a, &b)| self.pers.equals(a, b))
    }

    fn join(&mut self, s1: StateId, s2: StateId) -> StateId {
        if s1 == self.bot {
            return s2;
        }
        if s2 == self.bot {
            return s1;
        }
        let arena = self.pers.arena();
        let (long, short) = if arena.levels(s1).len() >= arena.levels(s2).len() {
            (s1, s2)
        } else {
            (s2, s1)
        };
        let mut levels = arena.levels(long).to_vec();
        let short_levels = arena.levels(short).to_vec();
        for (i, &sl) in short_levels.iter().enumerate() {
            levels[i] = self.pers.join(levels[i], sl);
        }
        self.pers.arena_mut().alloc_multi(&levels)
    }

    fn update_access(&mut self, prog: &Program<'_>, a: &Access, s: StateId) -> StateId {
        if s == self.bot {
            return s;
        }
        if !a.touches(self.pers.set(), prog.collection) {
            return s;
        }
        // Each level tracks its own persistence scope independently.
        let mut levels = self.pers.arena().levels(s).to_vec();
        for level in levels.iter_mut() {
            *level = self.pers.update_access(prog, a, *level);
        }
        self.pers.arena_mut().alloc_multi(&levels)
    }

    fn update_edge(&mut self, prog: &Program<'_>, e: EdgeRef, s: StateId) -> StateId {
        if s == self.bot {
            return s;
        }
        let edge = prog.cfgs.edge(e);
        let len = self.pers.arena().levels(s).len();
        if edge.is_loop_exit() {
            let source_depth = prog.loops.depth(prog.loops.loop_of(prog.cfgs.source(e))) as i64;
            let sink_depth = prog.loops.depth(prog.loops.loop_of(prog.cfgs.sink(e))) as i64;
            let new_len = (len as i64 + sink_depth - source_depth).max(1) as usize;
            self.resize(s, new_len)
        } else if edge.is_loop_entry() {
            self.resize(s, len + 1)
        } else if prog.cfgs.block(prog.cfgs.source(e)).is_call() {
            // Reconcile the callee result with the depth at call time.
            match self.depths.get(&prog.cfgs.source(e)).copied() {
                None => self.bot,
                Some(d) => self.resize(s, d),
            }
        } else {
            s
        }
    }

    fn update_block(&mut self, prog: &Program<'_>, v: BlockRef, s: StateId) -> StateId {
        if s == self.bot {
            return s;
        }
        if prog.cfgs.block(v).is_call() {
            let len = self.pers.arena().levels(s).len();
            self.depths.insert(v, len);
        }
        let mut os = s;
        for a in prog.accesses.of(v) {
            os = self.update_access(prog, a, os);
        }
        os
    }

    fn mark_roots(&self, mark: &mut dyn FnMut(StateId)) {
        mark(self.bot);
        mark(self.top);
        self.pers.mark_roots(mark);
    }

    fn write_state(
        &self,
        collection: &SetCollection,
        s: StateId,
        out: &mut dyn fmt::Write,
    ) -> fmt::Result {
        if s == self.bot {
            return write!(out, "_");
        }
        write!(out, "{{ ")?;
        let levels = self.pers.arena().levels(s).to_vec();
        for (i, level) in levels.iter().enumerate() {
            if i != 0 {
                write!(out, ", ")?;
            }
            write!(out, "L{}: ", i)?;
            self.pers.write_state(collection, *level, &mut *out)?;
        }
        write!(out, " }}")
    }

    fn save_state(&self, s: StateId, out: &mut dyn io::Write) -> Result<()> {
        let levels = self.pers.arena().levels(s);
        let count = levels.len() as i32;
        out.write_all(&count.to_ne_bytes())?;
        for &level in levels {
            self.pers.save_state(level, &mut *out)?;
        }
        Ok(())
    }

    fn load_state(&mut self, input: &mut dyn io::Read) -> Result<StateId> {
        let mut buf = [0u8; 4];
        input.read_exact(&mut buf)?;
        let count = i32::from_ne_bytes(buf);
        if count < 0 {
            return Err(AnalysisError::Internal(format!(
                "negative multi-level state depth {}",
                count
            )));
        }
        let mut levels = Vec::with_capacity(count as usize);
        for _ in 0..count {
            levels.push(self.pers.load_state(&mut *input)?);
        }
        Ok(self.pers.arena_mut().alloc_multi(&levels))
    }
}
