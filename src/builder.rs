//! A minimal fluent grammar builder (§6 "Grammar construction API"): thin
//! enough to exercise the core engine from `main.rs` and tests without
//! hand-assembling element arrays. Not a full DSL.

use std::collections::HashMap;
use std::rc::Rc;

use crate::barrier::Tokenizer;
use crate::element::{ElementId, ElementKind, InitFlags};
use crate::error::ParserBuildError;
use crate::rule::{ParserRule, RecoveryStrategy, RuleKind, ValueFactory};
use crate::settings::{ParserSettings, RuleSettings};
use crate::token::{TokenPattern, TokenPatternKind};

enum PendingRule {
    Defined(ParserRule),
    Reserved,
}

/// Accumulates token/rule specs under alias, then resolves and materializes
/// them into a [`crate::driver::Parser`] in `build()` (§9 Design Note 3:
/// collect specs first, materialize immutable elements second).
pub struct ParserBuilder {
    tokens: Vec<TokenPattern>,
    rules: Vec<PendingRule>,
    aliases: HashMap<String, (ElementKind, ElementId)>,
    main_rule: Option<ElementId>,
    settings: ParserSettings,
    tokenizers: Vec<Tokenizer>,
    init_flags: InitFlags,
}

impl Default for ParserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserBuilder {
    pub fn new() -> Self {
        ParserBuilder {
            tokens: Vec::new(),
            rules: Vec::new(),
            aliases: HashMap::new(),
            main_rule: None,
            settings: ParserSettings::default(),
            tokenizers: Vec::new(),
            init_flags: InitFlags::FIRST_CHARACTER_MATCH.with(InitFlags::INLINE_RULES),
        }
    }

    fn register_alias(&mut self, alias: &str, kind: ElementKind, id: ElementId) -> Result<(), ParserBuildError> {
        if self.aliases.contains_key(alias) {
            return Err(ParserBuildError::AliasClash(alias.to_string()));
        }
        self.aliases.insert(alias.to_string(), (kind, id));
        Ok(())
    }

    /// Registers a new token pattern under `alias`, returning its id.
    ///
    /// Panics only on an alias clash (a builder usage error caught during
    /// grammar authoring, not a runtime/parse-time condition); callers that
    /// want a recoverable outcome should ensure aliases are unique up front.
    pub fn create_token(&mut self, alias: &str, kind: TokenPatternKind) -> ElementId {
        let id = self.tokens.len() as ElementId;
        self.tokens.push(TokenPattern::new(id, kind));
        self.register_alias(alias, ElementKind::Token, id).expect("alias clash in create_token");
        id
    }

    /// Reserves a rule id without defining its kind yet, for forward
    /// references inside recursive grammars. Pair with [`Self::define_rule`].
    pub fn reserve_rule(&mut self, alias: &str) -> ElementId {
        let id = self.rules.len() as ElementId;
        self.rules.push(PendingRule::Reserved);
        self.register_alias(alias, ElementKind::Rule, id).expect("alias clash in reserve_rule");
        id
    }

    pub fn define_rule(&mut self, id: ElementId, kind: RuleKind) {
        self.rules[id as usize] = PendingRule::Defined(ParserRule::new(id, kind));
    }

    pub fn create_rule(&mut self, alias: &str, kind: RuleKind) -> ElementId {
        let id = self.reserve_rule(alias);
        self.define_rule(id, kind);
        id
    }

    pub fn create_main_rule(&mut self, alias: &str, kind: RuleKind) -> ElementId {
        let id = self.create_rule(alias, kind);
        self.main_rule = Some(id);
        id
    }

    /// Designates an already-defined (or still-reserved) rule as the
    /// grammar's entry point, without creating a new rule for it.
    pub fn set_main_rule(&mut self, rule_id: ElementId) {
        self.main_rule = Some(rule_id);
    }

    pub fn set_recovery(&mut self, rule_id: ElementId, recovery: RecoveryStrategy) {
        if let PendingRule::Defined(rule) = &mut self.rules[rule_id as usize] {
            rule.recovery = recovery;
        }
    }

    pub fn set_value_factory(&mut self, rule_id: ElementId, factory: ValueFactory) {
        if let PendingRule::Defined(rule) = &mut self.rules[rule_id as usize] {
            rule.value_factory = Some(factory);
        }
    }

    pub fn set_rule_settings(&mut self, rule_id: ElementId, settings: RuleSettings) {
        if let PendingRule::Defined(rule) = &mut self.rules[rule_id as usize] {
            rule.settings = settings;
        }
    }

    pub fn add_tokenizer(&mut self, tokenizer: Tokenizer) {
        self.tokenizers.push(tokenizer);
    }

    pub fn settings_mut(&mut self) -> &mut ParserSettings {
        &mut self.settings
    }

    /// Resolves all alias references, rejects empty/circular-reference-only
    /// rules, and materializes the final immutable [`crate::driver::Parser`]
    /// (§6 `build()`).
    pub fn build(self) -> Result<crate::driver::Parser, ParserBuildError> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for (id, pending) in self.rules.into_iter().enumerate() {
            match pending {
                PendingRule::Defined(rule) => rules.push(rule),
                PendingRule::Reserved => {
                    let alias = self
                        .aliases
                        .iter()
                        .find(|(_, (kind, el_id))| *kind == ElementKind::Rule && *el_id == id as ElementId)
                        .map(|(alias, _)| alias.clone())
                        .unwrap_or_else(|| format!("rule#{id}"));
                    return Err(ParserBuildError::UnknownAlias(alias));
                }
            }
        }

        for rule in &rules {
            if let RuleKind::Sequence(children) = &rule.kind {
                if children.is_empty() {
                    let alias = rule.info.primary_alias().unwrap_or("<unnamed>").to_string();
                    return Err(ParserBuildError::EmptyRule(alias));
                }
            }
        }

        check_circular_reference_only_chains(&rules)?;

        let main_rule = self.main_rule.ok_or(ParserBuildError::NoMainRule)?;

        let mut rules: Vec<ParserRule> = rules;
        for rule in &mut rules {
            rule.inline = self.init_flags.has(InitFlags::INLINE_RULES) && rule.compute_inline();
        }

        let mut tokens = self.tokens;
        if self.init_flags.has(InitFlags::FIRST_CHARACTER_MATCH) {
            crate::firstset::initialize(&mut tokens, &mut rules);
        }

        Ok(crate::driver::Parser {
            tokens,
            rules,
            main_rule,
            settings: self.settings,
            tokenizers: self.tokenizers,
            init_flags: self.init_flags,
            aliases: self.aliases,
        })
    }
}

/// Detects cycles through the reference-only edges named in §3 ("Circular
/// reference-only chains... are a build-time error"): `Optional(x)`,
/// `Lookahead { child: x, .. }`, and a single-element `Sequence(vec![x])`.
/// This is a deliberately narrow DFS over those three shapes, not exhaustive
/// detection of every conceivable reference-only cycle (e.g. a `Choice`
/// whose only child is itself) — recorded as a scope decision in DESIGN.md.
fn check_circular_reference_only_chains(rules: &[ParserRule]) -> Result<(), ParserBuildError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Visit {
        Visiting,
        Done,
    }

    fn reference_only_child(kind: &RuleKind) -> Option<ElementId> {
        match kind {
            RuleKind::Optional(child) => Some(*child),
            RuleKind::Lookahead { child, .. } => Some(*child),
            RuleKind::Sequence(children) if children.len() == 1 => Some(children[0]),
            _ => None,
        }
    }

    fn visit(
        rules: &[ParserRule],
        id: ElementId,
        state: &mut HashMap<ElementId, Visit>,
        path: &mut Vec<ElementId>,
    ) -> Result<(), ParserBuildError> {
        match state.get(&id) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::Visiting) => {
                let mut chain: Vec<String> = path
                    .iter()
                    .skip_while(|&&p| p != id)
                    .map(|&p| rules[p as usize].info.primary_alias().unwrap_or("<unnamed>").to_string())
                    .collect();
                chain.push(rules[id as usize].info.primary_alias().unwrap_or("<unnamed>").to_string());
                return Err(ParserBuildError::CircularReferenceChain(chain));
            }
            None => {}
        }

        state.insert(id, Visit::Visiting);
        path.push(id);
        if let Some(child) = reference_only_child(&rules[id as usize].kind) {
            visit(rules, child, state, path)?;
        }
        path.pop();
        state.insert(id, Visit::Done);
        Ok(())
    }

    let mut state = HashMap::new();
    for id in 0..rules.len() as ElementId {
        let mut path = Vec::new();
        visit(rules, id, &mut state, &mut path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::RepeatBounds;

    #[test]
    fn build_fails_without_main_rule() {
        let mut b = ParserBuilder::new();
        b.create_token("lit", TokenPatternKind::Literal("x".into()));
        assert_eq!(b.build().unwrap_err(), ParserBuildError::NoMainRule);
    }

    #[test]
    fn build_fails_on_alias_clash() {
        let mut b = ParserBuilder::new();
        b.create_token("dup", TokenPatternKind::Literal("a".into()));
        let id = b.tokens.len() as ElementId;
        b.tokens.push(TokenPattern::new(id, TokenPatternKind::Literal("b".into())));
        let err = b.register_alias("dup", ElementKind::Token, id).unwrap_err();
        assert_eq!(err, ParserBuildError::AliasClash("dup".to_string()));
    }

    #[test]
    fn build_fails_on_empty_sequence_rule() {
        let mut b = ParserBuilder::new();
        b.create_main_rule("empty", RuleKind::Sequence(vec![]));
        assert_eq!(b.build().unwrap_err(), ParserBuildError::EmptyRule("empty".to_string()));
    }

    #[test]
    fn build_fails_on_circular_optional_chain() {
        let mut b = ParserBuilder::new();
        let a = b.reserve_rule("a");
        let b_id = b.create_rule("b", RuleKind::Optional(a));
        b.define_rule(a, RuleKind::Optional(b_id));
        b.main_rule = Some(a);
        assert!(matches!(b.build().unwrap_err(), ParserBuildError::CircularReferenceChain(_)));
    }

    #[test]
    fn build_succeeds_on_simple_grammar() {
        let mut b = ParserBuilder::new();
        let digit = b.create_token("digit", TokenPatternKind::Chars(Rc::new(|c: char| c.is_ascii_digit())));
        b.create_main_rule("digit_rule", RuleKind::Token(digit));
        let parser = b.build().unwrap();
        assert_eq!(parser.resolve_rule("digit_rule").unwrap(), 0);
    }

    #[test]
    fn unresolved_reserved_rule_is_an_unknown_alias_error() {
        let mut b = ParserBuilder::new();
        let id = b.reserve_rule("never_defined");
        b.main_rule = Some(id);
        assert_eq!(b.build().unwrap_err(), ParserBuildError::UnknownAlias("never_defined".to_string()));
    }

    #[test]
    fn build_populates_first_chars_when_the_flag_is_on() {
        let mut b = ParserBuilder::new();
        let lit = b.create_token("lit", TokenPatternKind::Literal("if".into()));
        b.create_main_rule("main", RuleKind::Token(lit));
        let parser = b.build().unwrap();
        let rule_id = parser.resolve_rule("main").unwrap();
        assert!(parser.rules[rule_id as usize].info.first_chars.contains('i'));
        assert!(!parser.rules[rule_id as usize].info.is_optional);
    }

    #[test]
    fn repeat_rule_is_not_mistaken_for_empty() {
        let mut b = ParserBuilder::new();
        let digit = b.create_token("digit", TokenPatternKind::Chars(Rc::new(|c: char| c.is_ascii_digit())));
        let digit_rule = b.create_rule("digit_rule", RuleKind::Token(digit));
        b.create_main_rule(
            "digits",
            RuleKind::Repeat { child: digit_rule, bounds: RepeatBounds::unbounded(0), separator: None, trailing_sep: false, include_sep_in_children: false },
        );
        assert!(b.build().is_ok());
    }
}
