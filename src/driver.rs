//! The top-level driver (§4.8): `Parser` owns the immutable element arrays
//! and exposes `parse`/`try_parse`/`match_token`/`find_all_matches`/
//! `split`/`replace_all_matches`.

use std::any::Any;
use std::rc::Rc;

use crate::ast::{Ast, AstValue, Span};
use crate::barrier::{BarrierTokenCollection, Tokenizer};
use crate::context::ParserContext;
use crate::element::{ElementId, ElementKind, InitFlags};
use crate::engine;
use crate::error::{build_groups, is_relevant, ParserDiagnostic, ParserUsageError};
use crate::error::diagnostic::DisplayedGroup;
use crate::rule::ParserRule;
use crate::settings::{EffectiveSettings, ParserSettings};
use crate::token::TokenPattern;
use crate::utf16;

/// A built grammar: immutable arrays of tokens and rules plus parser-wide
/// settings. Freely shareable across threads once built (§5).
pub struct Parser {
    pub(crate) tokens: Vec<TokenPattern>,
    pub(crate) rules: Vec<ParserRule>,
    pub(crate) main_rule: ElementId,
    pub(crate) settings: ParserSettings,
    pub(crate) tokenizers: Vec<Tokenizer>,
    pub(crate) init_flags: InitFlags,
    pub(crate) aliases: std::collections::HashMap<String, (ElementKind, ElementId)>,
}

const _: () = {
    fn assert_send_sync<T: Send + Sync>(_: &T) {}
    fn check(p: &Parser) {
        assert_send_sync(p);
    }
};

impl Parser {
    pub fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    pub fn resolve_token(&self, alias: &str) -> Result<ElementId, ParserUsageError> {
        match self.aliases.get(alias) {
            Some((ElementKind::Token, id)) => Ok(*id),
            Some((ElementKind::Rule, _)) => Err(ParserUsageError::NotAToken(alias.to_string())),
            None => Err(ParserUsageError::UnknownAlias(alias.to_string())),
        }
    }

    pub fn resolve_rule(&self, alias: &str) -> Result<ElementId, ParserUsageError> {
        match self.aliases.get(alias) {
            Some((ElementKind::Rule, id)) => Ok(*id),
            Some((ElementKind::Token, _)) => Err(ParserUsageError::NotARule(alias.to_string())),
            None => Err(ParserUsageError::UnknownAlias(alias.to_string())),
        }
    }

    fn fresh_context(&self, input: &str) -> ParserContext {
        let units = utf16::encode(input);
        let mut ctx = ParserContext::from_units(units, BarrierTokenCollection::default());
        emit_barriers(self, &mut ctx);
        if self.init_flags.has(InitFlags::ENABLE_MEMOIZATION) {
            ctx = ctx.enable_memoization();
        }
        if self.init_flags.has(InitFlags::STACK_TRACE_WRITING) {
            ctx = ctx.enable_stack_trace();
        }
        if self.init_flags.has(InitFlags::WALK_TRACE_RECORDING) {
            ctx = ctx.enable_walk_trace();
        }
        ctx.record_skipped_rules = self.settings.record_skipped_rules;
        ctx
    }

    /// Parses the whole `input` with the main rule, throwing a
    /// [`ParserDiagnostic`] (§7 "Propagation") on failure rather than
    /// returning `Fail` — the one entry point meant to surface match
    /// failures as an `Err`.
    pub fn parse(&self, input: &str) -> Result<Ast, ParserDiagnostic> {
        self.parse_with_parameter(input, None)
    }

    pub fn parse_with_parameter(&self, input: &str, parameter: Option<Rc<dyn Any>>) -> Result<Ast, ParserDiagnostic> {
        let mut ctx = self.fresh_context(input);
        if let Some(p) = parameter {
            ctx.parser_parameter = Some(p);
        }
        let (parsed, _) = engine::parse_rule(self, &mut ctx, self.main_rule, 0, 0, EffectiveSettings::default());
        if parsed.success {
            Ok(to_ast(self, &parsed))
        } else {
            Err(self.build_diagnostic(&ctx))
        }
    }

    /// Like [`Parser::parse`], but never throws: match failures simply
    /// produce `None` (§7).
    pub fn try_parse(&self, input: &str) -> Option<Ast> {
        let mut ctx = self.fresh_context(input);
        let (parsed, _) = engine::parse_rule(self, &mut ctx, self.main_rule, 0, 0, EffectiveSettings::default());
        parsed.success.then(|| to_ast(self, &parsed))
    }

    /// Runs the full parse from within a single large guarded stack frame,
    /// for embedders whose call stack cannot tolerate the engine's normal
    /// per-call `stacker::maybe_grow` growth pattern (§5's "explicit
    /// work-stack mode" note).
    pub fn parse_with_explicit_stack(&self, input: &str) -> Result<Ast, ParserDiagnostic> {
        stacker::grow(16 * 1024 * 1024, || self.parse(input))
    }

    fn build_diagnostic(&self, ctx: &ParserContext) -> ParserDiagnostic {
        let groups = build_groups(ctx.furthest.errors(), &ctx.units, &ctx.barrier_tokens, self.settings.tab_size);
        let relevant: Vec<_> = groups.into_iter().filter(|g| is_relevant(g, &ctx.success_positions)).collect();
        let displayed: Vec<DisplayedGroup> = relevant
            .iter()
            .map(|g| DisplayedGroup::from_group(g, &ctx.units, |id, is_token| self.alias_for(id, is_token)))
            .collect();
        ParserDiagnostic { groups: displayed, flags: self.settings.error_formatting_flags }
    }

    fn alias_for(&self, id: ElementId, is_token: bool) -> Option<String> {
        if is_token {
            self.tokens.get(id as usize).and_then(|t| t.info.primary_alias().map(String::from))
        } else {
            self.rules.get(id as usize).and_then(|r| r.info.primary_alias().map(String::from))
        }
    }

    /// Matches a single token pattern by alias, starting at `start` (§4.8).
    pub fn match_token(&self, alias: &str, input: &str, start: usize) -> Result<Option<TokenMatch>, ParserUsageError> {
        let token_id = self.resolve_token(alias)?;
        let units = utf16::encode(input);
        if start > units.len() {
            return Err(ParserUsageError::StartOutOfBounds { start, len: units.len() });
        }
        let mut ctx = ParserContext::from_units(units, BarrierTokenCollection::default());
        emit_barriers(self, &mut ctx);
        let cap = ctx.max_position;
        Ok(crate::token::match_token(&self.tokens, token_id, &mut ctx, start, cap, true, 0)
            .map(|m| TokenMatch { span: Span::new(m.start, m.length), value: m.intermediate_value }))
    }

    /// Scans forward for non-overlapping (or overlapping) matches of
    /// `rule_alias` (§4.8).
    pub fn find_all_matches(&self, input: &str, rule_alias: &str, overlap: bool) -> Result<FindAllMatches<'_>, ParserUsageError> {
        let rule_id = self.resolve_rule(rule_alias)?;
        let units = utf16::encode(input);
        let mut barrier_ctx = ParserContext::from_units(units.clone(), BarrierTokenCollection::default());
        emit_barriers(self, &mut barrier_ctx);
        Ok(FindAllMatches { parser: self, units, barrier_tokens: barrier_ctx.barrier_tokens, rule_id, overlap, pos: 0 })
    }

    /// Splits `input` on non-overlapping matches of `rule_alias`, returning
    /// the text between them (§4.8).
    pub fn split(&self, input: &str, rule_alias: &str) -> Result<Vec<String>, ParserUsageError> {
        let units = utf16::encode(input);
        let mut out = Vec::new();
        let mut last_end = 0usize;
        for ast in self.find_all_matches(input, rule_alias, false)? {
            out.push(String::from_utf16_lossy(&units[last_end..ast.span.start]));
            last_end = ast.span.end();
        }
        out.push(String::from_utf16_lossy(&units[last_end..]));
        Ok(out)
    }

    /// Replaces every non-overlapping match of `rule_alias` with
    /// `selector(ast)` (§4.8).
    pub fn replace_all_matches(&self, input: &str, rule_alias: &str, selector: impl Fn(&Ast) -> String) -> Result<String, ParserUsageError> {
        let units = utf16::encode(input);
        let mut out = String::new();
        let mut last_end = 0usize;
        for ast in self.find_all_matches(input, rule_alias, false)? {
            out.push_str(&String::from_utf16_lossy(&units[last_end..ast.span.start]));
            out.push_str(&selector(&ast));
            last_end = ast.span.end();
        }
        out.push_str(&String::from_utf16_lossy(&units[last_end..]));
        Ok(out)
    }
}

/// The result of [`Parser::match_token`]: a span plus whatever intermediate
/// value the token pattern produced.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenMatch {
    pub span: Span,
    pub value: Option<AstValue>,
}

fn emit_barriers(parser: &Parser, ctx: &mut ParserContext) {
    let mut raw = Vec::new();
    for tokenizer in &parser.tokenizers {
        raw.extend(tokenizer(&ctx.units));
    }
    ctx.barrier_tokens = BarrierTokenCollection::build(raw, ctx.max_position);
}

fn to_ast(parser: &Parser, parsed: &crate::rule::ParsedRule) -> Ast {
    let alias = parser.rules.get(parsed.rule_id as usize).and_then(|r| r.info.primary_alias().map(String::from));
    let children = parsed.children.iter().map(|c| to_ast(parser, c)).collect();
    Ast { rule_id: parsed.rule_id, alias, span: Span::new(parsed.start, parsed.length), children, value: parsed.intermediate_value.clone() }
}

/// Iterator over non-overlapping (or overlapping) matches of one rule
/// across an input (§4.8): on match, yields and advances by the match
/// length (or +1 under `overlap`); on mismatch, advances by +1.
pub struct FindAllMatches<'p> {
    parser: &'p Parser,
    units: Vec<u16>,
    barrier_tokens: BarrierTokenCollection,
    rule_id: ElementId,
    overlap: bool,
    pos: usize,
}

impl<'p> Iterator for FindAllMatches<'p> {
    type Item = Ast;

    fn next(&mut self) -> Option<Ast> {
        while self.pos <= self.units.len() {
            let mut ctx = ParserContext::from_units(self.units.clone(), self.barrier_tokens.clone());
            let (parsed, _) = engine::parse_rule(self.parser, &mut ctx, self.rule_id, self.pos, 0, EffectiveSettings::default());
            if parsed.success {
                let ast = to_ast(self.parser, &parsed);
                self.pos = if self.overlap { self.pos + 1 } else { (self.pos + parsed.length).max(self.pos + 1) };
                return Some(ast);
            }
            self.pos += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ParserBuilder;
    use crate::rule::RuleKind;
    use crate::token::TokenPatternKind;
    use std::rc::Rc as StdRc;

    fn digits_parser() -> Parser {
        let mut b = ParserBuilder::new();
        let digit = b.create_token("digit", TokenPatternKind::RepeatChars {
            pred: StdRc::new(|c: char| c.is_ascii_digit()),
            bounds: crate::combinator::RepeatBounds::unbounded(1),
        });
        b.create_main_rule("digits", RuleKind::Token(digit));
        b.build().unwrap()
    }

    #[test]
    fn parse_succeeds_on_matching_input() {
        let parser = digits_parser();
        let ast = parser.parse("42").unwrap();
        assert_eq!(ast.span, Span::new(0, 2));
    }

    #[test]
    fn parse_fails_with_diagnostic_on_mismatch() {
        let parser = digits_parser();
        let err = parser.parse("abc").unwrap_err();
        assert!(err.to_string().contains("unexpected"));
    }

    #[test]
    fn try_parse_returns_none_without_throwing() {
        let parser = digits_parser();
        assert!(parser.try_parse("abc").is_none());
    }

    #[test]
    fn find_all_matches_scans_forward_disjointly() {
        let parser = digits_parser();
        let matches: Vec<Ast> = parser.find_all_matches("12 ab 34", "digits", false).unwrap().collect();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].span, Span::new(0, 2));
        assert_eq!(matches[1].span, Span::new(6, 2));
    }

    #[test]
    fn split_reconstructs_input_around_matches() {
        let parser = digits_parser();
        let parts = parser.split("a12b34c", "digits").unwrap();
        assert_eq!(parts, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn replace_all_matches_substitutes_each_match() {
        let parser = digits_parser();
        let replaced = parser.replace_all_matches("a12b34c", "digits", |ast| format!("<{}>", ast.span.length)).unwrap();
        assert_eq!(replaced, "a<2>b<2>c");
    }

    #[test]
    fn match_token_resolves_by_alias() {
        let parser = digits_parser();
        let m = parser.match_token("digit", "789", 0).unwrap().unwrap();
        assert_eq!(m.span, Span::new(0, 3));
    }

    #[test]
    fn unknown_alias_is_a_usage_error() {
        let parser = digits_parser();
        assert_eq!(parser.match_token("nope", "1", 0).unwrap_err(), ParserUsageError::UnknownAlias("nope".to_string()));
    }
}
