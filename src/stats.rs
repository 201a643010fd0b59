//! Category statistics.
//!
//! Aggregates how many accesses fell into each category during derivation.
//! The counts give a quick precision read on an analysed task: a high NC
//! share usually points at poor address resolution upstream.

use std::fmt;

use crate::category::Category;

/// Per-category access counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryStats {
    /// Accesses proven to always hit.
    pub always_hit: u64,
    /// Accesses proven to always miss.
    pub always_miss: u64,
    /// Accesses proven persistent in some loop scope.
    pub persistent: u64,
    /// Accesses with no provable category.
    pub not_classified: u64,
}

impl CategoryStats {
    /// Records one categorised access.
    pub fn record(&mut self, c: Category) {
        match c {
            Category::AlwaysHit => self.always_hit += 1,
            Category::AlwaysMiss => self.always_miss += 1,
            Category::Persistent => self.persistent += 1,
            Category::NotClassified => self.not_classified += 1,
        }
    }

    /// Total number of categorised accesses.
    pub fn total(&self) -> u64 {
        self.always_hit + self.always_miss + self.persistent + self.not_classified
    }
}

impl fmt::Display for CategoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "data cache categories:")?;
        writeln!(f, "  AH: {}", self.always_hit)?;
        writeln!(f, "  AM: {}", self.always_miss)?;
        writeln!(f, "  PE: {}", self.persistent)?;
        writeln!(f, "  NC: {}", self.not_classified)?;
        write!(f, "  total: {}", self.total())
    }
}
