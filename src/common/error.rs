//! Analysis error definitions.
//!
//! This module defines the error taxonomy of the analysis. It provides:
//! 1. **Configuration Errors:** Missing data cache, unsupported replacement policy, bad geometry.
//! 2. **Address Errors:** Definite accesses that no memory bank covers.
//! 3. **I/O Errors:** Failures while saving or loading abstract cache states.
//! 4. **Internal Errors:** Violated invariants, fatal with a diagnostic.
//!
//! Every variant carries enough context (instruction address, access index)
//! to locate the offending access in the analysed program.

use std::fmt;
use std::io;

use super::addr::Address;
use crate::config::ReplacementPolicy;

/// Errors raised by the data-cache analysis.
#[derive(Debug)]
pub enum AnalysisError {
    /// The configuration carries no data cache description.
    MissingDataCache,

    /// The data cache uses a replacement policy the analysis cannot model.
    ///
    /// Only LRU is analysed exactly; RANDOM is flattened to an
    /// associativity of one. Everything else is rejected during setup.
    UnsupportedPolicy(ReplacementPolicy),

    /// The cache geometry is unusable (zero ways, non power-of-two set count).
    InvalidGeometry(String),

    /// A set index outside `0..set_count` was requested.
    InvalidSet {
        /// The offending set index.
        set: usize,
        /// Number of sets in the cache.
        set_count: usize,
    },

    /// A definite load/store address is not covered by any memory bank.
    UnmappedAddress {
        /// The unmapped data address.
        addr: Address,
        /// Address of the instruction performing the access.
        inst: Address,
    },

    /// An ACS could not be written to or read from a stream.
    Io(io::Error),

    /// An internal invariant was violated; the analysis cannot continue.
    Internal(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::MissingDataCache => {
                write!(f, "no data cache in the hardware configuration")
            }
            AnalysisError::UnsupportedPolicy(p) => {
                write!(f, "unsupported data cache replacement policy: {:?}", p)
            }
            AnalysisError::InvalidGeometry(what) => {
                write!(f, "invalid data cache geometry: {}", what)
            }
            AnalysisError::InvalidSet { set, set_count } => {
                write!(f, "invalid cache set {} (cache has {} sets)", set, set_count)
            }
            AnalysisError::UnmappedAddress { addr, inst } => {
                write!(f, "no memory bank for address {} accessed from {}", addr, inst)
            }
            AnalysisError::Io(e) => write!(f, "ACS I/O failure: {}", e),
            AnalysisError::Internal(what) => write!(f, "internal analysis error: {}", what),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for AnalysisError {
    fn from(e: io::Error) -> Self {
        AnalysisError::Io(e)
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, AnalysisError>;
