//! A PEG-style parser combinator engine: declarative grammars of token
//! patterns and parser rules compiled into a backtracking interpreter over
//! a UTF-16 text buffer, producing an AST with user-attached values.

pub mod ast;
pub mod barrier;
pub mod builder;
pub mod combinator;
pub mod context;
pub mod driver;
pub mod element;
pub mod engine;
pub mod error;
pub mod firstset;
pub mod rule;
pub mod settings;
pub mod skip;
pub mod token;
pub mod utf16;

pub use ast::{Ast, AstValue, Span};
pub use builder::ParserBuilder;
pub use driver::{FindAllMatches, Parser, TokenMatch};
pub use error::{ParserBuildError, ParserDiagnostic, ParserUsageError};
pub use rule::{ParsedRule, RecoveryStrategy, RuleKind};
pub use token::{TokenPattern, TokenPatternKind};
