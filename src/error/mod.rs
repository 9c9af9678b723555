//! Error aggregation & recovery (§4.6, §7): furthest-error tracking, error
//! grouping, recovery strategies, and the public diagnostic types.

pub mod build;
pub mod diagnostic;
pub mod group;
pub mod parsing_error;
pub mod recovery;
pub mod usage;

pub use build::ParserBuildError;
pub use diagnostic::{DisplayedGroup, ExpectedDisplay, ParserDiagnostic};
pub use group::{build_groups, is_relevant, ErrorGroup, ExpectedElement, Unexpected};
pub use parsing_error::{FurthestErrorTracker, ParsingError};
pub use recovery::RecoveryStrategy;
pub use usage::ParserUsageError;
