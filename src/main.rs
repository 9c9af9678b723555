use std::rc::Rc;

use parsekit::{Ast, ParserBuilder, RuleKind};
use parsekit::combinator::{ChoiceMode, RepeatBounds};
use parsekit::token::TokenPatternKind;

/// Builds the same toy arithmetic grammar as the teacher's demo:
///
/// ```text
/// PlusMinusExpr : MultDivExpr (("+" | "-") MultDivExpr)* ;
/// MultDivExpr   : AtomicExpr (("*" | "/") AtomicExpr)* ;
/// AtomicExpr    : OptWhitespace (Literal | "(" PlusMinusExpr ")") OptWhitespace;
/// Literal       : "a" | "b" | "c" | "d" ;
/// OptWhitespace : " "* ;
/// ```
fn build_demo_parser() -> parsekit::Parser {
    let mut b = ParserBuilder::new();

    let lit = |b: &mut ParserBuilder, alias: &str, s: &str| -> u32 {
        let token = b.create_token(&format!("{alias}_tok"), TokenPatternKind::Literal(s.to_string()));
        b.create_rule(alias, RuleKind::Token(token))
    };

    let plus = lit(&mut b, "plus", "+");
    let minus = lit(&mut b, "minus", "-");
    let star = lit(&mut b, "star", "*");
    let slash = lit(&mut b, "slash", "/");
    let lparen = lit(&mut b, "lparen", "(");
    let rparen = lit(&mut b, "rparen", ")");

    let literal_tok = b.create_token("literal_char", TokenPatternKind::Chars(Rc::new(|c| matches!(c, 'a'..='d'))));
    let literal = b.create_rule("Literal", RuleKind::Token(literal_tok));

    let ws_tok = b.create_token("ws_char", TokenPatternKind::RepeatChars { pred: Rc::new(|c| c == ' '), bounds: RepeatBounds::unbounded(0) });
    let opt_whitespace = b.create_rule("OptWhitespace", RuleKind::Token(ws_tok));

    let plus_minus = b.reserve_rule("PlusMinusExpr");
    let atomic = b.reserve_rule("AtomicExpr");
    let add_op = b.create_rule("add_op", RuleKind::Choice { mode: ChoiceMode::First, children: vec![plus, minus] });
    let mul_op = b.create_rule("mul_op", RuleKind::Choice { mode: ChoiceMode::First, children: vec![star, slash] });

    let mult_div_tail_inner = b.create_rule("mult_div_tail_inner", RuleKind::Sequence(vec![mul_op, atomic]));
    let mult_div_tail_rep = b.create_rule(
        "mult_div_tail_rep",
        RuleKind::Repeat { child: mult_div_tail_inner, bounds: RepeatBounds::unbounded(0), separator: None, trailing_sep: false, include_sep_in_children: false },
    );
    let mult_div = b.create_rule("MultDivExpr", RuleKind::Sequence(vec![atomic, mult_div_tail_rep]));

    let plus_minus_tail_inner = b.create_rule("plus_minus_tail_inner", RuleKind::Sequence(vec![add_op, mult_div]));
    let plus_minus_tail_rep = b.create_rule(
        "plus_minus_tail_rep",
        RuleKind::Repeat { child: plus_minus_tail_inner, bounds: RepeatBounds::unbounded(0), separator: None, trailing_sep: false, include_sep_in_children: false },
    );
    b.define_rule(plus_minus, RuleKind::Sequence(vec![mult_div, plus_minus_tail_rep]));

    let paren_expr = b.create_rule("paren_expr", RuleKind::Sequence(vec![lparen, plus_minus, rparen]));
    let atomic_inner = b.create_rule("atomic_inner", RuleKind::Choice { mode: ChoiceMode::First, children: vec![literal, paren_expr] });
    b.define_rule(atomic, RuleKind::Sequence(vec![opt_whitespace, atomic_inner, opt_whitespace]));

    b.set_main_rule(plus_minus);

    b.build().expect("demo grammar is well-formed")
}

fn print_tree(node: &Ast, depth: usize) {
    println!("{}{:?} {:?}", "  ".repeat(depth), node.alias.as_deref().unwrap_or("?"), node.span);
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

fn main() {
    let parser = build_demo_parser();
    let tree = parser.parse("   ( a + b)*( c +   a  *  (  d )+ c  )").expect("good parse");
    print_tree(&tree, 0);
}
