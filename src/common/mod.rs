//! Common leaf types shared by every analysis stage.

/// Physical address newtype.
pub mod addr;
/// Error taxonomy and result alias.
pub mod error;

pub use addr::Address;
pub use error::{AnalysisError, Result};
