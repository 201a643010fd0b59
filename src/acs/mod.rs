//! Abstract cache state representation.
//!
//! An ACS summarises, per cache set, the ages every interned block may have
//! at a program point. It is a fixed-size byte vector: one age per cached
//! block of the set, positions given by the blocks' dense ids. Ages run
//! from 0 (most recently used) to the associativity `A` (evicted); the
//! reserved value [`BOT_AGE`] marks a block not yet referenced on any path
//! (persistence analysis only).
//!
//! States live in a [`StateArena`] and are passed around as [`StateId`]
//! handles; multi-level states reference per-loop-level ACS by handle.

/// Region allocation and mark/sweep collection of states.
pub mod arena;

pub use arena::{State, StateArena, StateId};

use std::fmt;
use std::io::{Read, Write};

use crate::cache::SetCollection;
use crate::common::error::Result;

/// Age marking a block as not yet referenced on the current path.
pub const BOT_AGE: u8 = 255;

/// Sum of all ages of an age vector.
///
/// Used for the saturation checks that collapse states to top.
#[inline]
pub fn age_sum(ages: &[u8]) -> u32 {
    ages.iter().map(|&a| a as u32).sum()
}

/// Writes an age vector using block addresses as labels.
///
/// The format is `{ addr: age, addr: _, ... }` where `_` stands for a
/// never-referenced block.
pub fn write_ages(
    ages: &[u8],
    collection: &SetCollection,
    set: usize,
    out: &mut dyn fmt::Write,
) -> fmt::Result {
    write!(out, "{{ ")?;
    for (i, &age) in ages.iter().enumerate() {
        if i != 0 {
            write!(out, ", ")?;
        }
        let block = collection.cached_block(set, i);
        write!(out, "{}: ", collection.address(block))?;
        if age == BOT_AGE {
            write!(out, "_")?;
        } else {
            write!(out, "{}", age)?;
        }
    }
    write!(out, " }}")
}

/// Saves an age vector as raw bytes.
pub fn save_ages(ages: &[u8], out: &mut dyn Write) -> Result<()> {
    out.write_all(ages)?;
    Ok(())
}

/// Loads an age vector of known length from raw bytes.
pub fn load_ages(n: usize, input: &mut dyn Read) -> Result<Box<[u8]>> {
    let mut ages = vec![0u8; n].into_boxed_slice();
    input.read_exact(&mut ages)?;
    Ok(ages)
}
