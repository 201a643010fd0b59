//! Physical address type.
//!
//! This module defines a strong type for physical memory addresses so that
//! raw offsets, cache tags and set indices cannot be mixed up by accident.
//! It provides:
//! 1. **Type Safety:** Addresses are distinct from plain integers at compile time.
//! 2. **Arithmetic:** Block-granular stepping used when enumerating the blocks of a range.
//! 3. **Display:** Hexadecimal rendering used in diagnostics and ACS dumps.

use std::fmt;

/// A physical address in the analysed program's address space.
///
/// All addresses handled by the analysis are physical: address resolution
/// happens upstream and the access provider hands over resolved values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u64);

impl Address {
    /// Creates a new address from a raw 64-bit value.
    #[inline(always)]
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub fn val(&self) -> u64 {
        self.0
    }

    /// Returns this address advanced by `bytes`.
    ///
    /// Used when walking a range block by block; wrapping arithmetic keeps
    /// the walk well-defined at the top of the address space.
    #[inline(always)]
    pub fn offset(&self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}
