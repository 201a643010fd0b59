//! Data-cache categorisation for worst-case execution time analysis.
//!
//! This crate classifies the data-cache behaviour of every memory access of
//! a program so a WCET calculator can bound hits and misses tightly. It
//! implements the following:
//! 1. **Geometry:** Address-to-(set, tag) mapping and cache block interning.
//! 2. **Accesses:** Per-block access lists built from resolved addresses,
//!    with cache-bypass rewriting for uncached banks and write-through stores.
//! 3. **Abstract Cache States:** Per-set age vectors in an arena with
//!    mark/sweep reclamation.
//! 4. **Analyses:** MUST, MAY, flat and multi-level persistence fixed
//!    points, run independently per cache set.
//! 5. **Categories:** Always-Hit, Always-Miss, Persistent (with its loop
//!    scope) or Not-Classified, derived per access and per predecessor edge.
//!
//! CFG construction, loop-tree derivation and address resolution are
//! upstream collaborators: the crate consumes their results through the
//! read models in [`cfg`] and the [`access::AccessProvider`] trait.

/// Access model and access-list construction.
pub mod access;
/// Abstract cache state representation and arena.
pub mod acs;
/// Per-set analysis driver, solver and oracles.
pub mod analysis;
/// Cache geometry and block identity.
pub mod cache;
/// Category derivation.
pub mod category;
/// CFG and loop-tree read models.
pub mod cfg;
/// Shared leaf types (addresses, errors).
pub mod common;
/// Configuration structures.
pub mod config;
/// Abstract domains (MUST, MAY, PERS, multi-level PERS).
pub mod domain;
/// Category statistics.
pub mod stats;

pub use access::{build_accesses, Access, AccessAction, AccessKind, AccessMap, AccessProvider};
pub use analysis::{
    AgeInfo, MayAnalysis, MultiAgeInfo, MultiPersAnalysis, MustAnalysis, PersAnalysis, Program,
};
pub use cache::{CacheGeometry, SetCollection};
pub use category::{categorize, AccessCategory, Category, CategoryMap};
pub use common::{Address, AnalysisError, Result};
pub use config::{AnalysisConfig, CacheSpec, Config, MemoryBank, MemoryMap};
pub use stats::CategoryStats;

use cfg::{CfgCollection, LoopTree};

/// End-to-end driver: builds the collection, runs all four analyses and
/// derives the categories.
///
/// MUST always runs; MAY and the persistence analyses are part of the full
/// derivation this entry point performs. Callers wanting a subset drive
/// [`analysis::SetAnalysis`] and [`categorize`] directly.
///
/// # Errors
///
/// [`AnalysisError::MissingDataCache`] when the configuration carries no
/// data cache, plus every error the stages below can raise.
pub fn analyze(
    config: &Config,
    cfgs: &CfgCollection,
    loops: &LoopTree,
    provider: &dyn AccessProvider,
) -> Result<(CategoryMap, CategoryStats)> {
    let spec = config
        .data_cache
        .as_ref()
        .ok_or(AnalysisError::MissingDataCache)?;
    let geometry = CacheGeometry::new(spec)?;
    let mut collection = SetCollection::new(geometry, config.memory.clone());
    let accesses = build_accesses(cfgs, provider, &mut collection)?;
    let prog = Program {
        collection: &collection,
        cfgs,
        loops,
        accesses: &accesses,
    };
    let mut must = MustAnalysis::must(&prog, &config.analysis)?;
    let mut may = MayAnalysis::may(&prog, &config.analysis)?;
    let mut pers = PersAnalysis::pers(&prog, &config.analysis)?;
    let mut multi = MultiPersAnalysis::multi_pers(&prog, &config.analysis)?;
    categorize(
        &prog,
        &mut must,
        Some(&mut may),
        Some(&mut pers),
        Some(&mut multi),
    )
}
