//! Build-time errors (§7 "Build error"): raised by
//! [`crate::builder::ParserBuilder::build`], never at parse time.

use thiserror::Error;

/// Errors detected while resolving a grammar into its final immutable
/// element arrays (§6 `build()`, Design Note 3).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserBuildError {
    #[error("alias '{0}' is referenced but never defined")]
    UnknownAlias(String),

    #[error("alias '{0}' is defined more than once")]
    AliasClash(String),

    #[error("rule '{0}' has no elements and can never match")]
    EmptyRule(String),

    #[error("circular reference-only chain detected: {}", .0.join(" -> "))]
    CircularReferenceChain(Vec<String>),

    #[error("no main rule was designated; call create_main_rule before build()")]
    NoMainRule,

    #[error("skip strategy resolved to an invalid configuration for rule '{0}': {1}")]
    UnknownSkipStrategy(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_chain_message_lists_the_cycle() {
        let err = ParserBuildError::CircularReferenceChain(vec!["A".into(), "B".into(), "A".into()]);
        assert_eq!(err.to_string(), "circular reference-only chain detected: A -> B -> A");
    }
}
