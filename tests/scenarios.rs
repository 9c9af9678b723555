use std::rc::Rc;

use parsekit::combinator::{ChoiceMode, RepeatBounds};
use parsekit::settings::{Overridable, RuleSettings, SkippingStrategy};
use parsekit::token::number::{NumberForm, NumberOptions};
use parsekit::token::{EscapeMode, TokenPatternKind};
use parsekit::{Ast, AstValue, ParserBuilder, RecoveryStrategy, RuleKind};
use pretty_assertions::assert_eq;

fn ints_under(ast: &Ast, alias: &str, out: &mut Vec<i64>) {
    if ast.alias.as_deref() == Some(alias) {
        if let Some(AstValue::Int(v)) = &ast.value {
            out.push(*v);
        }
    }
    for child in &ast.children {
        ints_under(child, alias, out);
    }
}

/// Scenario 1: JSON integer list with whitespace skip.
#[test]
fn json_integer_list_with_whitespace_skip() {
    let mut b = ParserBuilder::new();

    let ws_tok = b.create_token("ws_char", TokenPatternKind::RepeatChars { pred: Rc::new(|c: char| c.is_whitespace()), bounds: RepeatBounds::unbounded(1) });
    let ws_rule = b.create_rule("ws", RuleKind::Token(ws_tok));

    let lbracket_tok = b.create_token("lbracket_tok", TokenPatternKind::Literal("[".to_string()));
    let lbracket = b.create_rule("lbracket", RuleKind::Token(lbracket_tok));
    let rbracket_tok = b.create_token("rbracket_tok", TokenPatternKind::Literal("]".to_string()));
    let rbracket = b.create_rule("rbracket", RuleKind::Token(rbracket_tok));
    let comma_tok = b.create_token("comma_tok", TokenPatternKind::Literal(",".to_string()));
    let comma = b.create_rule("comma", RuleKind::Token(comma_tok));

    let number_tok = b.create_token("number_tok", TokenPatternKind::Number(NumberOptions::new(NumberForm::Integer)));
    let value = b.create_rule("value", RuleKind::Token(number_tok));

    let comma_value = b.create_rule("comma_value", RuleKind::Sequence(vec![comma, value]));
    let comma_value_rep = b.create_rule(
        "comma_value_rep",
        RuleKind::Repeat { child: comma_value, bounds: RepeatBounds::unbounded(0), separator: None, trailing_sep: false, include_sep_in_children: false },
    );

    let list = b.create_main_rule("list", RuleKind::Sequence(vec![lbracket, value, comma_value_rep, rbracket]));

    let mut settings = RuleSettings::default();
    settings.skipping_strategy = Overridable::local_both(SkippingStrategy::SkipBeforeParsingLazy);
    settings.skip_rule = Overridable::local_both(ws_rule);
    b.set_rule_settings(list, settings);

    let parser = b.build().unwrap();
    let ast = parser.parse("[ 1 ,2 , 3 ]").unwrap();

    let mut values = Vec::new();
    ints_under(&ast, "value", &mut values);
    assert_eq!(values, vec![1, 2, 3]);
}

/// Scenario 2: token-level `Choice` under `Longest` vs `First`.
#[test]
fn choice_longest_vs_first() {
    let build = |mode: ChoiceMode| {
        let mut b = ParserBuilder::new();
        let if_lit = b.create_token("if_lit", TokenPatternKind::Literal("if".to_string()));
        let ident = b.create_token("ident", TokenPatternKind::Identifier);
        let choice_tok = b.create_token("t", TokenPatternKind::Choice { mode, children: vec![if_lit, ident] });
        b.create_main_rule("T", RuleKind::Token(choice_tok));
        b.build().unwrap()
    };

    let longest = build(ChoiceMode::Longest);
    let ast = longest.parse("iffy").unwrap();
    assert_eq!(ast.span.length, 4);
    assert_eq!(ast.value, Some(AstValue::Str("iffy".to_string())));

    let first = build(ChoiceMode::First);
    let ast = first.parse("iffy").unwrap();
    assert_eq!(ast.span.length, 2);
}

/// Scenario 3: `Keyword` respects a trailing identifier-character boundary.
#[test]
fn keyword_boundary() {
    let mut b = ParserBuilder::new();
    let kw = b.create_token(
        "kw_tok",
        TokenPatternKind::Keyword { text: "if".to_string(), ident_pred: Rc::new(|c: char| c.is_alphanumeric() || c == '_') },
    );
    b.create_main_rule("K", RuleKind::Token(kw));
    let parser = b.build().unwrap();

    let ast = parser.parse("if x").unwrap();
    assert_eq!(ast.span.length, 2);

    assert!(parser.try_parse("iffy").is_none());
}

/// Scenario 4: a barrier token caps a token match that would otherwise run
/// past it.
#[test]
fn barrier_token_caps_a_match() {
    let mut b = ParserBuilder::new();
    let escaped = b.create_token(
        "escaped_tok",
        TokenPatternKind::EscapedText { stop: Rc::new(|c: char| c == '\n'), escape: EscapeMode::Doubling },
    );
    b.create_main_rule("line", RuleKind::Token(escaped));
    b.add_tokenizer(Rc::new(|_units: &[u16]| vec![parsekit::barrier::BarrierToken { alias: "DEDENT".to_string(), start: 5, length: 0 }]));
    let parser = b.build().unwrap();

    let ast = parser.parse("abc  \ndef").unwrap();
    assert_eq!(ast.span.length, 5);
}

/// Scenario 5: `FindNext` recovery resynchronizes past garbage input.
#[test]
fn find_next_recovery_resynchronizes() {
    let mut b = ParserBuilder::new();
    let stop_tok = b.create_token("stop_tok", TokenPatternKind::Literal("stop".to_string()));
    b.create_main_rule("stmt", RuleKind::Token(stop_tok));
    let without_recovery = b.build().unwrap();
    let err = without_recovery.parse("abcabcabcstop").unwrap_err();
    assert_eq!(err.furthest_position(), Some(0));

    let mut b = ParserBuilder::new();
    let stop_tok = b.create_token("stop_tok", TokenPatternKind::Literal("stop".to_string()));
    let stmt = b.create_main_rule("stmt", RuleKind::Token(stop_tok));
    b.set_recovery(stmt, RecoveryStrategy::FindNext);
    let with_recovery = b.build().unwrap();

    let ast = with_recovery.parse("abcabcabcstop").unwrap();
    assert_eq!(ast.children.len(), 1);
    assert_eq!(ast.children[0].span.start, 9);
    assert_eq!(ast.children[0].span.length, 4);
}

/// Scenario 6: `Number(Scientific)` backtracks off an unconsumable exponent.
#[test]
fn number_exponent_backtracking() {
    let mut b = ParserBuilder::new();
    let num_tok = b.create_token("num_tok", TokenPatternKind::Number(NumberOptions::new(NumberForm::Scientific)));
    b.create_main_rule("num", RuleKind::Token(num_tok));
    let parser = b.build().unwrap();

    let ast = parser.parse("2.5e+abc").unwrap();
    assert_eq!(ast.span.length, 3);
    assert_eq!(ast.value, Some(AstValue::Float(2.5)));

    let ast = parser.parse("1.5e-10x").unwrap();
    assert_eq!(ast.span.length, 7);
    assert_eq!(ast.value, Some(AstValue::Float(1.5e-10)));
}

/// Scenario 7: rule-level `Choice` still picks the right alternative once
/// first-character dispatch is in play and can prune the non-matching
/// branch outright.
#[test]
fn rule_choice_first_character_dispatch_picks_the_right_branch() {
    let mut b = ParserBuilder::new();
    let if_tok = b.create_token("if_tok", TokenPatternKind::Literal("if".to_string()));
    let for_tok = b.create_token("for_tok", TokenPatternKind::Literal("for".to_string()));
    let if_rule = b.create_rule("if_rule", RuleKind::Token(if_tok));
    let for_rule = b.create_rule("for_rule", RuleKind::Token(for_tok));
    b.create_main_rule("stmt", RuleKind::Choice { mode: ChoiceMode::First, children: vec![if_rule, for_rule] });
    let parser = b.build().unwrap();

    let ast = parser.parse("for x").unwrap();
    assert_eq!(ast.span.length, 3);

    let ast = parser.parse("if x").unwrap();
    assert_eq!(ast.span.length, 2);
}

/// Property: `find_all_matches` yields disjoint, strictly increasing ranges.
#[test]
fn find_all_matches_yields_disjoint_increasing_ranges() {
    let mut b = ParserBuilder::new();
    let digit_rep = b.create_token("digit_rep", TokenPatternKind::RepeatChars { pred: Rc::new(|c: char| c.is_ascii_digit()), bounds: RepeatBounds::new(1, None) });
    b.create_main_rule("digits", RuleKind::Token(digit_rep));
    let parser = b.build().unwrap();

    let matches: Vec<Ast> = parser.find_all_matches("12 ab 34 cd 5", "digits", false).unwrap().collect();
    let starts: Vec<usize> = matches.iter().map(|m| m.span.start).collect();
    assert_eq!(starts, vec![0, 6, 12]);
    for pair in matches.windows(2) {
        assert!(pair[0].span.end() <= pair[1].span.start);
    }
}
