//! First-character set / nullability computation (§4.1 "first-character
//! dispatch"): a two-phase fixed-point pass run once at build time, gated on
//! [`crate::element::InitFlags::FIRST_CHARACTER_MATCH`]. Tokens are resolved
//! first (they only reference other tokens), then rules (which reference
//! both tokens and other rules).
//!
//! Both `first_chars` and `is_optional` only ever grow across a pass — a
//! char set only gains members, `is_optional` only flips `false` to `true` —
//! so repeatedly unioning each element's freshly computed contribution into
//! its running value converges, same as any monotone dataflow analysis over
//! a (possibly cyclic, thanks to recursive rules) dependency graph.

use crate::element::{ElementId, ElementInfo, FirstCharSet};
use crate::rule::{ParserRule, RuleKind};
use crate::token::{TokenPattern, TokenPatternKind};

/// Runs the fixed-point pass over `tokens`, then over `rules`. Call once,
/// after every pending rule has been resolved, before the element arrays are
/// frozen into a [`crate::driver::Parser`].
pub fn initialize(tokens: &mut [TokenPattern], rules: &mut [ParserRule]) {
    // `ElementInfo::new` defaults `first_chars` to `Any` (the right default
    // for "never computed" everywhere else in the crate), but `Any` is also
    // this lattice's absorbing top element: `union_assign` treats touching
    // `Any` as "give up forever." Starting the fixed point from that default
    // would permanently poison any element whose dependency hadn't been
    // visited yet, so every element starts from the true bottom (`empty()`)
    // for the duration of this pass instead.
    for t in tokens.iter_mut() {
        t.info.first_chars = FirstCharSet::empty();
    }
    for r in rules.iter_mut() {
        r.info.first_chars = FirstCharSet::empty();
    }
    converge_tokens(tokens);
    converge_rules(tokens, rules);
}

fn converge_tokens(tokens: &mut [TokenPattern]) {
    loop {
        let snapshot: Vec<ElementInfo> = tokens.iter().map(|t| t.info.clone()).collect();
        let mut changed = false;
        for i in 0..tokens.len() {
            let (set, optional) = token_contribution(&tokens[i].kind, &snapshot);
            changed |= apply_contribution(&mut tokens[i].info, &set, optional);
        }
        if !changed {
            break;
        }
    }
}

fn converge_rules(tokens: &[TokenPattern], rules: &mut [ParserRule]) {
    loop {
        let snapshot: Vec<ElementInfo> = rules.iter().map(|r| r.info.clone()).collect();
        let mut changed = false;
        for i in 0..rules.len() {
            let (set, optional) = rule_contribution(&rules[i].kind, tokens, &snapshot);
            changed |= apply_contribution(&mut rules[i].info, &set, optional);
        }
        if !changed {
            break;
        }
    }
}

fn apply_contribution(info: &mut ElementInfo, set: &FirstCharSet, optional: bool) -> bool {
    let mut changed = info.first_chars.union_assign(set);
    if optional && !info.is_optional {
        info.is_optional = true;
        changed = true;
    }
    changed
}

/// A string's own first-char contribution: its first `char`, or (for the
/// empty string) "accepts empty, no restriction on what follows".
fn literal_contribution(s: &str) -> (FirstCharSet, bool) {
    match s.chars().next() {
        Some(c) => (FirstCharSet::single(c), false),
        None => (FirstCharSet::any(), true),
    }
}

/// §4.3 ordered-concatenation rule: a sequence's first characters are its
/// first child's, plus (while each consumed child is itself nullable) the
/// next child's, and so on; the whole sequence is nullable only if every
/// child is.
fn sequence_contribution(children: &[ElementId], infos: &[ElementInfo]) -> (FirstCharSet, bool) {
    let mut set = FirstCharSet::empty();
    for &child in children {
        let info = &infos[child as usize];
        set = set.union(&info.first_chars);
        if !info.is_optional {
            return (set, false);
        }
    }
    (set, true)
}

/// An ordered choice's first characters are the union across every
/// alternative regardless of `mode` — which one wins is a length-at-runtime
/// question, not a dispatch-pruning one; nullable iff any alternative is.
fn choice_contribution(children: &[ElementId], infos: &[ElementInfo]) -> (FirstCharSet, bool) {
    let mut set = FirstCharSet::empty();
    let mut optional = false;
    for &child in children {
        let info = &infos[child as usize];
        set = set.union(&info.first_chars);
        optional |= info.is_optional;
    }
    (set, optional)
}

fn token_contribution(kind: &TokenPatternKind, infos: &[ElementInfo]) -> (FirstCharSet, bool) {
    match kind {
        TokenPatternKind::Literal(s) => literal_contribution(s),
        TokenPatternKind::Keyword { text, .. } => literal_contribution(text),
        TokenPatternKind::LiteralChoice(trie) | TokenPatternKind::KeywordChoice { trie, .. } => {
            (FirstCharSet::from_chars(trie.first_chars()), trie.accepts_empty())
        }
        // Predicate-based kinds can't be enumerated without evaluating the
        // predicate over every possible char, which is no cheaper than just
        // trying the match — left non-deterministic (§9 OQ, recorded in
        // DESIGN.md).
        TokenPatternKind::Char(_) | TokenPatternKind::Chars(_) | TokenPatternKind::Identifier | TokenPatternKind::Number(_) | TokenPatternKind::Regex(_) | TokenPatternKind::Custom { .. } | TokenPatternKind::Barrier(_) => {
            (FirstCharSet::any(), false)
        }
        TokenPatternKind::RepeatChars { bounds, .. } => (FirstCharSet::any(), bounds.is_optional()),
        // `match_escaped_text` can return a zero-length match if the stop
        // predicate fires immediately, so this is nullable.
        TokenPatternKind::EscapedText { .. } => (FirstCharSet::any(), true),
        TokenPatternKind::TextUntil { allow_empty, .. } => (FirstCharSet::any(), *allow_empty),
        TokenPatternKind::Sequence { children, .. } => sequence_contribution(children, infos),
        TokenPatternKind::Choice { children, .. } => choice_contribution(children, infos),
        TokenPatternKind::Optional(child) => (infos[*child as usize].first_chars.clone(), true),
        TokenPatternKind::Repeat { child, bounds } => (infos[*child as usize].first_chars.clone(), bounds.is_optional()),
        TokenPatternKind::First(a, b) => sequence_contribution(&[*a, *b], infos),
        TokenPatternKind::MapSpan { child, .. } => {
            let info = &infos[*child as usize];
            (info.first_chars.clone(), info.is_optional)
        }
    }
}

fn rule_contribution(kind: &RuleKind, tokens: &[TokenPattern], infos: &[ElementInfo]) -> (FirstCharSet, bool) {
    match kind {
        RuleKind::Token(token_id) => {
            let info = &tokens[*token_id as usize].info;
            (info.first_chars.clone(), info.is_optional)
        }
        RuleKind::Sequence(children) => sequence_contribution(children, infos),
        RuleKind::Choice { children, .. } => choice_contribution(children, infos),
        RuleKind::Repeat { child, bounds, .. } => (infos[*child as usize].first_chars.clone(), bounds.is_optional()),
        RuleKind::Optional(child) => (infos[*child as usize].first_chars.clone(), true),
        // A lookahead never consumes input on success (§4.3), so it is
        // always nullable. A positive lookahead only succeeds where its
        // child could start; a negative one succeeds precisely where its
        // child would *not* match, which first-char sets can't describe.
        RuleKind::Lookahead { child, positive: true } => (infos[*child as usize].first_chars.clone(), true),
        RuleKind::Lookahead { positive: false, .. } => (FirstCharSet::any(), true),
        RuleKind::Eof => (FirstCharSet::any(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::{ChoiceMode, RepeatBounds};
    use crate::rule::ParserRule;
    use crate::token::TokenPattern;

    fn token(kind: TokenPatternKind) -> TokenPattern {
        TokenPattern::new(0, kind)
    }

    #[test]
    fn literal_token_is_deterministic_and_not_optional() {
        let mut tokens = vec![token(TokenPatternKind::Literal("if".into()))];
        let mut rules: Vec<ParserRule> = vec![];
        initialize(&mut tokens, &mut rules);
        assert!(tokens[0].info.first_chars.contains('i'));
        assert!(!tokens[0].info.first_chars.contains('e'));
        assert!(!tokens[0].info.is_optional);
    }

    #[test]
    fn literal_choice_unions_every_branch() {
        let trie = std::rc::Rc::new(crate::token::trie::Trie::build(["if", "else"]));
        let mut tokens = vec![token(TokenPatternKind::LiteralChoice(trie))];
        let mut rules: Vec<ParserRule> = vec![];
        initialize(&mut tokens, &mut rules);
        assert!(tokens[0].info.first_chars.contains('i'));
        assert!(tokens[0].info.first_chars.contains('e'));
        assert!(!tokens[0].info.is_optional);
    }

    #[test]
    fn optional_token_is_always_nullable() {
        let mut tokens = vec![token(TokenPatternKind::Literal("x".into())), TokenPattern::new(1, TokenPatternKind::Optional(0))];
        let mut rules: Vec<ParserRule> = vec![];
        initialize(&mut tokens, &mut rules);
        assert!(tokens[1].info.is_optional);
        assert!(tokens[1].info.first_chars.contains('x'));
    }

    #[test]
    fn sequence_stops_propagating_first_chars_at_first_non_nullable_child() {
        let mut tokens = vec![
            TokenPattern::new(0, TokenPatternKind::Optional(2)),
            TokenPattern::new(1, TokenPatternKind::Literal("y".into())),
            TokenPattern::new(2, TokenPatternKind::Literal("x".into())),
            TokenPattern::new(3, TokenPatternKind::Sequence { children: vec![0, 1], passage: None }),
        ];
        let mut rules: Vec<ParserRule> = vec![];
        initialize(&mut tokens, &mut rules);
        let seq = &tokens[3].info;
        assert!(seq.first_chars.contains('x'));
        assert!(seq.first_chars.contains('y'));
        assert!(!seq.is_optional);
    }

    #[test]
    fn predicate_based_kinds_stay_non_deterministic() {
        let mut tokens = vec![token(TokenPatternKind::Char(std::rc::Rc::new(|c: char| c.is_alphabetic())))];
        let mut rules: Vec<ParserRule> = vec![];
        initialize(&mut tokens, &mut rules);
        assert!(!tokens[0].info.first_chars.is_deterministic());
        assert!(!tokens[0].info.is_optional);
    }

    #[test]
    fn recursive_rule_choice_converges() {
        // expr := "x" | paren_expr ; paren_expr := "(" expr -- rule 0 refers
        // to rule 1, which refers back to rule 0; the fixed point must
        // still settle.
        let mut tokens = vec![token(TokenPatternKind::Literal("x".into())), token(TokenPatternKind::Literal("(".into()))];
        let mut rules = vec![
            ParserRule::new(0, RuleKind::Choice { mode: ChoiceMode::First, children: vec![2, 1] }),
            ParserRule::new(1, RuleKind::Sequence(vec![3, 0])),
            ParserRule::new(2, RuleKind::Token(0)),
            ParserRule::new(3, RuleKind::Token(1)),
        ];
        initialize(&mut tokens, &mut rules);
        assert!(rules[0].info.first_chars.contains('x'));
        assert!(rules[0].info.first_chars.contains('('));
        assert!(!rules[0].info.is_optional);
    }

    #[test]
    fn repeat_bounds_zero_min_is_optional() {
        let mut tokens = vec![
            token(TokenPatternKind::Literal("a".into())),
            TokenPattern::new(1, TokenPatternKind::Repeat { child: 0, bounds: RepeatBounds::unbounded(0) }),
        ];
        let mut rules: Vec<ParserRule> = vec![];
        initialize(&mut tokens, &mut rules);
        assert!(tokens[1].info.is_optional);
        assert!(tokens[1].info.first_chars.contains('a'));
    }
}
