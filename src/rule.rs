//! Parser rules (§3 `ParserRule`, §4.3 rule variants) and their parse
//! results.

use std::rc::Rc;

use crate::ast::AstValue;
use crate::combinator::{ChoiceMode, RepeatBounds};
use crate::element::{ElementId, ElementInfo};
use crate::settings::RuleSettings;

/// How a rule recovers from an otherwise-propagating failure (§4.6).
#[derive(Clone, Debug)]
pub enum RecoveryStrategy {
    None,
    /// Advance by one character and retry; bounded by `max_position -
    /// start` (§8 "Recovery bounding").
    FindNext,
    /// Scan forward for the first match of `anchor`; reposition the cursor
    /// there and retry.
    SkipUntilAnchor { anchor: ElementId },
    /// Like `SkipUntilAnchor`, but reposition after the anchor's match.
    SkipAfterAnchor { anchor: ElementId },
}

/// A value factory: builds the user-facing [`AstValue`] for a successfully
/// parsed rule from its children's already-computed values.
pub type ValueFactory = Rc<dyn Fn(&ParsedRule, &[Option<AstValue>]) -> AstValue>;

/// The closed enumeration of rule shapes (§4.3). Dispatch is by `match` on
/// this tag, never a virtual call (Design Note 1).
#[derive(Clone)]
pub enum RuleKind {
    Token(ElementId),
    Sequence(Vec<ElementId>),
    Choice { mode: ChoiceMode, children: Vec<ElementId> },
    Repeat {
        child: ElementId,
        bounds: RepeatBounds,
        separator: Option<ElementId>,
        trailing_sep: bool,
        include_sep_in_children: bool,
    },
    Optional(ElementId),
    Lookahead { child: ElementId, positive: bool },
    Eof,
}

impl std::fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Token(id) => write!(f, "Token({id})"),
            RuleKind::Sequence(children) => write!(f, "Sequence({children:?})"),
            RuleKind::Choice { mode, children } => write!(f, "Choice({mode:?}, {children:?})"),
            RuleKind::Repeat { child, bounds, .. } => write!(f, "Repeat({child}, {bounds:?})"),
            RuleKind::Optional(id) => write!(f, "Optional({id})"),
            RuleKind::Lookahead { child, positive } => write!(f, "Lookahead({child}, positive={positive})"),
            RuleKind::Eof => write!(f, "Eof"),
        }
    }
}

/// A non-terminal grammar element (§3 `ParserRule`).
#[derive(Clone)]
pub struct ParserRule {
    pub info: ElementInfo,
    pub kind: RuleKind,
    pub settings: RuleSettings,
    pub recovery: RecoveryStrategy,
    pub value_factory: Option<ValueFactory>,
    /// `true` once `initialize()` has determined this rule may bypass the
    /// settings-resolution/memoization wrapper (Design Note 4, §4.3
    /// "Inlining"). Computed once and frozen — never toggled post-build, so
    /// the memoization cache key remains safe (§9 OQ3).
    pub inline: bool,
}

impl ParserRule {
    pub fn new(id: ElementId, kind: RuleKind) -> Self {
        ParserRule {
            info: ElementInfo::new(id),
            kind,
            settings: RuleSettings::default(),
            recovery: RecoveryStrategy::None,
            value_factory: None,
            inline: false,
        }
    }

    /// A rule may be inlined iff it has default settings and no recovery
    /// descriptor (§4.3 "Inlining").
    pub fn compute_inline(&self) -> bool {
        self.settings.is_default() && matches!(self.recovery, RecoveryStrategy::None)
    }
}

/// The result of parsing a rule (§3 `ParsedRule`). A failed parse is the
/// sentinel produced by [`ParsedRule::fail`]; callers check `.success`
/// rather than relying on an `Option`/`Result` wrapper, matching the way
/// `length`/`children` stay meaningful (empty) even on failure for
/// inspection by recovery and tracing code.
#[derive(Clone, Debug)]
pub struct ParsedRule {
    pub rule_id: ElementId,
    pub start: usize,
    pub length: usize,
    pub children: Vec<ParsedRule>,
    pub intermediate_value: Option<AstValue>,
    pub occurrence_index: usize,
    pub version: u32,
    pub success: bool,
}

impl ParsedRule {
    pub fn fail(rule_id: ElementId, start: usize) -> Self {
        ParsedRule {
            rule_id,
            start,
            length: 0,
            children: Vec::new(),
            intermediate_value: None,
            occurrence_index: 0,
            version: 0,
            success: false,
        }
    }

    pub fn leaf(rule_id: ElementId, start: usize, length: usize, intermediate_value: Option<AstValue>) -> Self {
        ParsedRule {
            rule_id,
            start,
            length,
            children: Vec::new(),
            intermediate_value,
            occurrence_index: 0,
            version: 0,
            success: true,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn with_occurrence_index(mut self, index: usize) -> Self {
        self.occurrence_index = index;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_sentinel_has_zero_length_and_no_children() {
        let failure = ParsedRule::fail(3, 10);
        assert!(!failure.success);
        assert_eq!(failure.length, 0);
        assert!(failure.children.is_empty());
    }

    #[test]
    fn inline_requires_default_settings_and_no_recovery() {
        let rule = ParserRule::new(0, RuleKind::Eof);
        assert!(rule.compute_inline());

        let mut recovering = ParserRule::new(1, RuleKind::Eof);
        recovering.recovery = RecoveryStrategy::FindNext;
        assert!(!recovering.compute_inline());
    }

    #[test]
    fn end_is_start_plus_length() {
        let parsed = ParsedRule::leaf(0, 5, 3, None);
        assert_eq!(parsed.end(), 8);
    }
}
