//! The settings surface (§6): skip strategy, error handling, barrier
//! visibility, and override modes, propagated through rules without ever
//! being serialized to bytes or a config file.

use std::rc::Rc;

use crate::ast::AstValue;
use crate::element::ElementId;
use crate::rule::ParsedRule;

/// Parser-wide fallback for building a node's [`AstValue`] when the
/// matched rule declares no `value_factory` of its own.
pub type AstFactory = Rc<dyn Fn(&ParsedRule, &[Option<AstValue>]) -> AstValue>;

/// How a rule resolves a setting relative to its parent's effective value.
///
/// Six modes cover "where the value applies" (self vs. children) crossed
/// with "where the value comes from" (inherit vs. a locally supplied
/// value vs. a value forced onto the whole parser).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OverrideMode {
    /// Use the effective value computed for the parent rule.
    #[default]
    Inherit,
    /// Use this rule's own value, for this rule only.
    LocalSelf,
    /// Use this rule's own value for every descendant, but not itself.
    LocalChildren,
    /// Use this rule's own value for itself and every descendant.
    LocalBoth,
    /// Force this value onto the entire parser, overriding any other rule's
    /// local setting (self only).
    GlobalSelf,
    /// Force this value onto the entire parser for every descendant.
    GlobalChildren,
}

/// A setting value paired with how it should propagate (§6).
#[derive(Clone, Debug)]
pub struct Overridable<T> {
    pub mode: OverrideMode,
    pub value: Option<T>,
}

impl<T: Clone> Overridable<T> {
    pub fn inherit() -> Self {
        Overridable { mode: OverrideMode::Inherit, value: None }
    }

    pub fn local_self(value: T) -> Self {
        Overridable { mode: OverrideMode::LocalSelf, value: Some(value) }
    }

    pub fn local_both(value: T) -> Self {
        Overridable { mode: OverrideMode::LocalBoth, value: Some(value) }
    }
}

/// Skip strategy identifiers (§4.4). The algorithm each variant runs lives
/// in [`crate::skip`]; this enum is the settings-level selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SkippingStrategy {
    #[default]
    None,
    SkipBeforeParsing,
    SkipBeforeParsingLazy,
    SkipBeforeParsingGreedy,
    TryParseThenSkip,
    TryParseThenSkipLazy,
    TryParseThenSkipGreedy,
    TryParseNonEmptyThenSkip,
    TryParseNonEmptyThenSkipLazy,
    TryParseNonEmptyThenSkipGreedy,
}

/// `NoRecord` suppresses error recording for a subtree except when it would
/// surface through a thrown diagnostic; `Throw` means failures are simply
/// never recorded as candidate diagnostics (used for speculative/lookahead
/// subtrees that should not pollute the furthest-error log).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ErrorHandling {
    #[default]
    Record,
    NoRecord,
    Throw,
}

/// Per-rule settings (§6, §3 `ParserRule.local_settings`).
#[derive(Clone, Debug, Default)]
pub struct RuleSettings {
    pub skipping_strategy: Overridable<SkippingStrategy>,
    pub skip_rule: Overridable<ElementId>,
    pub error_handling: Overridable<ErrorHandling>,
    pub ignore_barriers: Overridable<bool>,
}

impl RuleSettings {
    pub fn is_default(&self) -> bool {
        matches!(self.skipping_strategy.mode, OverrideMode::Inherit)
            && matches!(self.skip_rule.mode, OverrideMode::Inherit)
            && matches!(self.error_handling.mode, OverrideMode::Inherit)
            && matches!(self.ignore_barriers.mode, OverrideMode::Inherit)
    }
}

/// Effective (fully resolved) settings for a single rule invocation,
/// computed by folding a rule's [`RuleSettings`] against its caller's
/// effective settings per the override-mode rules above.
#[derive(Clone, Copy, Debug)]
pub struct EffectiveSettings {
    pub skipping_strategy: SkippingStrategy,
    pub skip_rule: Option<ElementId>,
    pub error_handling: ErrorHandling,
    pub ignore_barriers: bool,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        EffectiveSettings {
            skipping_strategy: SkippingStrategy::None,
            skip_rule: None,
            error_handling: ErrorHandling::Record,
            ignore_barriers: false,
        }
    }
}

impl EffectiveSettings {
    /// Resolve this rule's own settings given the caller's effective
    /// settings (which is what "children" overrides propagate from).
    ///
    /// Returns `(settings_for_this_rule, settings_to_hand_to_children)`.
    pub fn resolve(parent: &EffectiveSettings, own: &RuleSettings) -> (EffectiveSettings, EffectiveSettings) {
        let mut for_self = *parent;
        let mut for_children = *parent;

        apply(&mut for_self, &mut for_children, &own.skipping_strategy, |s, v| s.skipping_strategy = v);
        apply(&mut for_self, &mut for_children, &own.skip_rule, |s, v| s.skip_rule = Some(v));
        apply(&mut for_self, &mut for_children, &own.error_handling, |s, v| s.error_handling = v);
        apply(&mut for_self, &mut for_children, &own.ignore_barriers, |s, v| s.ignore_barriers = v);

        (for_self, for_children)
    }
}

fn apply<T: Clone>(
    for_self: &mut EffectiveSettings,
    for_children: &mut EffectiveSettings,
    overridable: &Overridable<T>,
    set: impl Fn(&mut EffectiveSettings, T),
) {
    let Some(value) = overridable.value.clone() else { return };
    match overridable.mode {
        OverrideMode::Inherit => {}
        OverrideMode::LocalSelf | OverrideMode::GlobalSelf => {
            set(for_self, value);
        }
        OverrideMode::LocalChildren | OverrideMode::GlobalChildren => {
            set(for_children, value);
        }
        OverrideMode::LocalBoth => {
            set(for_self, value.clone());
            set(for_children, value);
        }
    }
}

/// Bit flags controlling how error text is rendered (§6). Implemented as a
/// hand-rolled `u8` newtype rather than pulling in the `bitflags` crate, for
/// consistency with [`crate::element::InitFlags`] and
/// [`crate::error::ExpectedSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ErrorFormattingFlags(u8);

impl ErrorFormattingFlags {
    pub const DEFAULT: Self = Self(0);
    pub const DISPLAY_MESSAGES: Self = Self(1 << 0);
    pub const DISPLAY_RULES: Self = Self(1 << 1);
    pub const ONLY_NAMED_ELEMENTS: Self = Self(1 << 2);

    pub const fn has(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    #[must_use]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }
}

/// Parser-wide (main) settings (§6).
#[derive(Clone)]
pub struct ParserSettings {
    pub error_formatting_flags: ErrorFormattingFlags,
    pub record_skipped_rules: bool,
    pub tab_size: usize,
    pub max_walk_steps_display: usize,
    pub use_optimized_whitespace_skip: bool,
    /// Fallback value factory used for any matched rule that does not
    /// declare its own (§6 "optional `ast_factory`").
    pub ast_factory: Option<AstFactory>,
}

impl std::fmt::Debug for ParserSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserSettings")
            .field("error_formatting_flags", &self.error_formatting_flags)
            .field("record_skipped_rules", &self.record_skipped_rules)
            .field("tab_size", &self.tab_size)
            .field("max_walk_steps_display", &self.max_walk_steps_display)
            .field("use_optimized_whitespace_skip", &self.use_optimized_whitespace_skip)
            .field("ast_factory", &self.ast_factory.is_some())
            .finish()
    }
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            error_formatting_flags: ErrorFormattingFlags::DEFAULT
                .with(ErrorFormattingFlags::DISPLAY_MESSAGES)
                .with(ErrorFormattingFlags::DISPLAY_RULES),
            record_skipped_rules: false,
            tab_size: 4,
            max_walk_steps_display: 64,
            use_optimized_whitespace_skip: false,
            ast_factory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_self_applies_only_to_self() {
        let parent = EffectiveSettings::default();
        let mut own = RuleSettings::default();
        own.skipping_strategy = Overridable::local_self(SkippingStrategy::SkipBeforeParsing);

        let (for_self, for_children) = EffectiveSettings::resolve(&parent, &own);
        assert_eq!(for_self.skipping_strategy, SkippingStrategy::SkipBeforeParsing);
        assert_eq!(for_children.skipping_strategy, SkippingStrategy::None);
    }

    #[test]
    fn local_both_propagates_to_children_too() {
        let parent = EffectiveSettings::default();
        let mut own = RuleSettings::default();
        own.ignore_barriers = Overridable::local_both(true);

        let (for_self, for_children) = EffectiveSettings::resolve(&parent, &own);
        assert!(for_self.ignore_barriers);
        assert!(for_children.ignore_barriers);
    }

    #[test]
    fn inherit_is_a_no_op() {
        let mut parent = EffectiveSettings::default();
        parent.skipping_strategy = SkippingStrategy::SkipBeforeParsingGreedy;
        let own = RuleSettings::default();

        let (for_self, for_children) = EffectiveSettings::resolve(&parent, &own);
        assert_eq!(for_self.skipping_strategy, SkippingStrategy::SkipBeforeParsingGreedy);
        assert_eq!(for_children.skipping_strategy, SkippingStrategy::SkipBeforeParsingGreedy);
    }

    #[test]
    fn rule_settings_is_default_detects_all_inherit() {
        assert!(RuleSettings::default().is_default());
        let mut s = RuleSettings::default();
        s.ignore_barriers = Overridable::local_self(true);
        assert!(!s.is_default());
    }
}
