//! Usage errors (§7 "Usage error"): raised immediately at an entry point
//! when the caller itself passed something invalid, never aggregated with
//! match failures.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserUsageError {
    #[error("no token or rule is registered under alias '{0}'")]
    UnknownAlias(String),

    #[error("alias '{0}' names a rule, not a token pattern")]
    NotAToken(String),

    #[error("alias '{0}' names a token pattern, not a rule")]
    NotARule(String),

    #[error("start position {start} is out of bounds for input of length {len}")]
    StartOutOfBounds { start: usize, len: usize },
}
