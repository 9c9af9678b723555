//! Token patterns (§4.2): the terminal matchers of the grammar.

pub mod number;
pub mod trie;

use std::rc::Rc;

use crate::ast::AstValue;
use crate::combinator::{ChoiceMode, RepeatBounds};
use crate::context::ParserContext;
use crate::element::{ElementId, ElementInfo};
use crate::error::ParsingError;
use crate::utf16::decode_char_at;

use number::{match_number, NumberOptions};
pub use trie::Trie;

/// A single-character predicate (`Char`, `Chars`, `RepeatChars`, identifier
/// boundary checks, `EscapedText` stop sets).
pub type CharPredicate = Rc<dyn Fn(char) -> bool>;

/// Computes a `Sequence` token's intermediate value from its children's.
pub type PassageFn = Rc<dyn Fn(&[Option<AstValue>]) -> Option<AstValue>>;

/// Replaces a `MapSpan` token's intermediate value with a function of the
/// matched text.
pub type MapSpanFn = Rc<dyn Fn(&str) -> AstValue>;

/// User escape hatch: full access to the match arguments and the element's
/// declared children.
pub type CustomTokenFn = Rc<dyn Fn(&mut CustomMatchContext, usize) -> Option<ParsedElement>>;

#[derive(Clone)]
pub enum EscapeMode {
    /// The stop character doubled represents one literal occurrence of
    /// itself (`''` -> `'`), the common SQL/Pascal-string convention.
    Doubling,
    /// A designated escape character followed by any character consumes
    /// both verbatim (`\"` -> `"`).
    Backslash(char),
}

/// The closed enumeration of token-pattern shapes (§4.2). Dispatch is by
/// `match` on this tag (Design Note 1).
#[derive(Clone)]
pub enum TokenPatternKind {
    Literal(String),
    LiteralChoice(Rc<Trie>),
    Keyword { text: String, ident_pred: CharPredicate },
    KeywordChoice { trie: Rc<Trie>, ident_pred: CharPredicate },
    Char(CharPredicate),
    Chars(CharPredicate),
    RepeatChars { pred: CharPredicate, bounds: RepeatBounds },
    Identifier,
    Number(NumberOptions),
    Regex(Rc<regex::Regex>),
    EscapedText { stop: CharPredicate, escape: EscapeMode },
    TextUntil { stop: ElementId, consume_stop: bool, fail_on_eof: bool, allow_empty: bool },
    Sequence { children: Vec<ElementId>, passage: Option<PassageFn> },
    Choice { mode: ChoiceMode, children: Vec<ElementId> },
    Optional(ElementId),
    Repeat { child: ElementId, bounds: RepeatBounds },
    First(ElementId, ElementId),
    MapSpan { child: ElementId, map: MapSpanFn },
    Barrier(String),
    Custom { matcher: CustomTokenFn, children: Vec<ElementId> },
}

impl std::fmt::Debug for TokenPatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TokenPatternKind::Literal(_) => "Literal",
            TokenPatternKind::LiteralChoice(_) => "LiteralChoice",
            TokenPatternKind::Keyword { .. } => "Keyword",
            TokenPatternKind::KeywordChoice { .. } => "KeywordChoice",
            TokenPatternKind::Char(_) => "Char",
            TokenPatternKind::Chars(_) => "Chars",
            TokenPatternKind::RepeatChars { .. } => "RepeatChars",
            TokenPatternKind::Identifier => "Identifier",
            TokenPatternKind::Number(_) => "Number",
            TokenPatternKind::Regex(_) => "Regex",
            TokenPatternKind::EscapedText { .. } => "EscapedText",
            TokenPatternKind::TextUntil { .. } => "TextUntil",
            TokenPatternKind::Sequence { .. } => "Sequence",
            TokenPatternKind::Choice { .. } => "Choice",
            TokenPatternKind::Optional(_) => "Optional",
            TokenPatternKind::Repeat { .. } => "Repeat",
            TokenPatternKind::First(..) => "First",
            TokenPatternKind::MapSpan { .. } => "MapSpan",
            TokenPatternKind::Barrier(_) => "Barrier",
            TokenPatternKind::Custom { .. } => "Custom",
        })
    }
}

/// A terminal grammar element (§3 `TokenPattern`).
#[derive(Clone)]
pub struct TokenPattern {
    pub info: ElementInfo,
    pub kind: TokenPatternKind,
    /// Human-readable expectation text, used in error groups when this
    /// pattern is the `expected` side of a failure.
    pub message: Option<String>,
}

impl TokenPattern {
    pub fn new(id: ElementId, kind: TokenPatternKind) -> Self {
        TokenPattern { info: ElementInfo::new(id), kind, message: None }
    }
}

/// The result of a successful token match (§3 `ParsedElement`).
#[derive(Clone, Debug)]
pub struct ParsedElement {
    pub start: usize,
    pub length: usize,
    pub intermediate_value: Option<AstValue>,
    /// Set when this match consumed a barrier token; the engine's `Token`
    /// rule uses this to bump `passed_barriers` on commit (§4.5).
    pub consumed_barrier_index: Option<u32>,
}

impl ParsedElement {
    pub fn new(start: usize, length: usize, intermediate_value: Option<AstValue>) -> Self {
        ParsedElement { start, length, intermediate_value, consumed_barrier_index: None }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// Read-only access given to a `Custom` token pattern's matcher function.
pub struct CustomMatchContext<'a> {
    pub table: &'a [TokenPattern],
    pub ctx: &'a mut ParserContext,
    pub barrier_cap: usize,
    pub want_intermediate: bool,
    pub passed_barriers: u32,
    pub children: &'a [ElementId],
}

impl<'a> CustomMatchContext<'a> {
    pub fn match_child(&mut self, index: usize, at: usize) -> Option<ParsedElement> {
        let id = *self.children.get(index)?;
        match_token(self.table, id, self.ctx, at, self.barrier_cap, self.want_intermediate, self.passed_barriers)
    }
}

fn record_failure(ctx: &mut ParserContext, position: usize, element_id: ElementId, passed_barriers: u32, message: Option<String>) {
    let stack_trace = ctx.stack_frames.as_ref().map(|pool| pool.unwind().into_iter().map(|f| f.rule_id).collect());
    ctx.record_error(ParsingError {
        position,
        passed_barriers,
        message,
        element_id,
        is_token: true,
        stack_trace,
    });
}

/// Matches `table[id]` at `start`, capped at `barrier_cap` (§3 `TokenPattern`
/// contract). Pure with respect to `ctx.position`: callers decide whether
/// and how to commit the cursor. `ctx` is still taken mutably to record
/// furthest-error failures and to query the barrier collection.
#[allow(clippy::too_many_arguments)]
pub fn match_token(
    table: &[TokenPattern],
    id: ElementId,
    ctx: &mut ParserContext,
    start: usize,
    barrier_cap: usize,
    want_intermediate: bool,
    passed_barriers: u32,
) -> Option<ParsedElement> {
    let pattern = &table[id as usize];
    if start > barrier_cap {
        return None;
    }
    let remaining: Vec<char> = {
        let mut out = Vec::new();
        let mut pos = start;
        while pos < barrier_cap {
            let (c, width) = decode_char_at(&ctx.units, pos)?;
            out.push(c);
            pos += width;
        }
        out
    };

    let result = match &pattern.kind {
        TokenPatternKind::Literal(s) => match_literal(s, &ctx.units, start, barrier_cap),
        TokenPatternKind::LiteralChoice(trie) => trie
            .longest_match(&remaining)
            .map(|n| ParsedElement::new(start, char_len_to_units(&remaining[..n]), Some(AstValue::Str(remaining[..n].iter().collect())))),
        TokenPatternKind::Keyword { text, ident_pred } => match_literal(text, &ctx.units, start, barrier_cap).filter(|m| {
            !next_char_satisfies(&ctx.units, m.end(), ident_pred)
        }),
        TokenPatternKind::KeywordChoice { trie, ident_pred } => trie.longest_match(&remaining).and_then(|n| {
            let length = char_len_to_units(&remaining[..n]);
            if next_char_satisfies(&ctx.units, start + length, ident_pred) {
                None
            } else {
                Some(ParsedElement::new(start, length, Some(AstValue::Str(remaining[..n].iter().collect()))))
            }
        }),
        TokenPatternKind::Char(pred) => {
            remaining.first().filter(|&&c| pred(c)).map(|&c| ParsedElement::new(start, c.len_utf16(), Some(AstValue::Str(c.to_string()))))
        }
        TokenPatternKind::Chars(pred) => {
            remaining.first().filter(|&&c| pred(c)).map(|&c| ParsedElement::new(start, c.len_utf16(), Some(AstValue::Str(c.to_string()))))
        }
        TokenPatternKind::RepeatChars { pred, bounds } => {
            let mut count = 0usize;
            let mut units = 0usize;
            for &c in &remaining {
                if !pred(c) || !bounds.allows_more(count) {
                    break;
                }
                count += 1;
                units += c.len_utf16();
            }
            if bounds.is_satisfied_by(count) {
                let text: String = remaining[..count].iter().collect();
                Some(ParsedElement::new(start, units, Some(AstValue::Str(text))))
            } else {
                None
            }
        }
        TokenPatternKind::Identifier => match_identifier(&remaining).map(|(count, units)| {
            let text: String = remaining[..count].iter().collect();
            ParsedElement::new(start, units, Some(AstValue::Str(text)))
        }),
        TokenPatternKind::Number(options) => match_number(&remaining, *options).map(|m| {
            let units = char_len_to_units(&remaining[..char_count_for_unit_len(&remaining, m.length)]);
            ParsedElement::new(start, units, want_intermediate.then(|| m.value.into()))
        }),
        TokenPatternKind::Regex(re) => match_regex(re, &ctx.units, start, barrier_cap),
        TokenPatternKind::EscapedText { stop, escape } => match_escaped_text(&remaining, stop, escape).map(|(count, text)| {
            ParsedElement::new(start, char_len_to_units(&remaining[..count]), want_intermediate.then_some(AstValue::Str(text)))
        }),
        TokenPatternKind::TextUntil { stop, consume_stop, fail_on_eof, allow_empty } => match_text_until(
            table, *stop, ctx, start, barrier_cap, *consume_stop, *fail_on_eof, *allow_empty, passed_barriers,
        ),
        TokenPatternKind::Sequence { children, passage } => {
            match_sequence(table, children, passage.as_ref(), ctx, start, barrier_cap, want_intermediate, passed_barriers)
        }
        TokenPatternKind::Choice { mode, children } => match_choice(table, *mode, children, ctx, start, barrier_cap, want_intermediate, passed_barriers),
        TokenPatternKind::Optional(child) => Some(
            match_token(table, *child, ctx, start, barrier_cap, want_intermediate, passed_barriers)
                .unwrap_or_else(|| ParsedElement::new(start, 0, None)),
        ),
        TokenPatternKind::Repeat { child, bounds } => match_repeat(table, *child, *bounds, ctx, start, barrier_cap, want_intermediate, passed_barriers),
        TokenPatternKind::First(a, b) => {
            let first = match_token(table, *a, ctx, start, barrier_cap, want_intermediate, passed_barriers)?;
            let second = match_token(table, *b, ctx, first.end(), barrier_cap, false, passed_barriers)?;
            Some(ParsedElement::new(start, first.length + second.length, first.intermediate_value))
        }
        TokenPatternKind::MapSpan { child, map } => {
            let matched = match_token(table, *child, ctx, start, barrier_cap, false, passed_barriers)?;
            let text = String::from_utf16_lossy(&ctx.units[matched.start..matched.end()]);
            Some(ParsedElement::new(start, matched.length, want_intermediate.then(|| map(&text))))
        }
        TokenPatternKind::Barrier(alias) => ctx.barrier_tokens.try_get_barrier_token(start, passed_barriers).and_then(|b| {
            if b.token.alias == *alias {
                let mut el = ParsedElement::new(start, b.token.length, Some(AstValue::Str(alias.clone())));
                el.consumed_barrier_index = Some(b.index);
                Some(el)
            } else {
                None
            }
        }),
        TokenPatternKind::Custom { matcher, children } => {
            let mut cx = CustomMatchContext { table, ctx: &mut *ctx, barrier_cap, want_intermediate, passed_barriers, children };
            matcher(&mut cx, start)
        }
    };

    if result.is_none() {
        record_failure(ctx, start, id, passed_barriers, pattern.message.clone());
    }
    result
}

fn char_len_to_units(chars: &[char]) -> usize {
    chars.iter().map(|c| c.len_utf16()).sum()
}

fn char_count_for_unit_len(chars: &[char], char_count: usize) -> usize {
    char_count.min(chars.len())
}

fn match_literal(needle: &str, units: &[u16], start: usize, barrier_cap: usize) -> Option<ParsedElement> {
    let needle_units: Vec<u16> = needle.encode_utf16().collect();
    let end = start + needle_units.len();
    if end > barrier_cap || end > units.len() {
        return None;
    }
    if units[start..end] == needle_units[..] {
        Some(ParsedElement::new(start, needle_units.len(), None))
    } else {
        None
    }
}

fn next_char_satisfies(units: &[u16], pos: usize, pred: &CharPredicate) -> bool {
    match decode_char_at(units, pos) {
        Some((c, _)) => pred(c),
        None => false,
    }
}

fn match_identifier(chars: &[char]) -> Option<(usize, usize)> {
    let first = *chars.first()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    let mut count = 1;
    while count < chars.len() && (chars[count].is_alphanumeric() || chars[count] == '_') {
        count += 1;
    }
    let units = char_len_to_units(&chars[..count]);
    Some((count, units))
}

fn match_regex(re: &regex::Regex, units: &[u16], start: usize, barrier_cap: usize) -> Option<ParsedElement> {
    let text = String::from_utf16_lossy(&units[start..barrier_cap.min(units.len())]);
    let m = re.find(&text)?;
    if m.start() != 0 {
        return None;
    }
    let matched_units = text[..m.end()].encode_utf16().count();
    Some(ParsedElement::new(start, matched_units, Some(AstValue::Str(m.as_str().to_string()))))
}

fn match_escaped_text(chars: &[char], stop: &CharPredicate, escape: &EscapeMode) -> Option<(usize, String)> {
    let mut i = 0;
    let mut text = String::new();
    while i < chars.len() {
        let c = chars[i];
        if stop(c) {
            match escape {
                EscapeMode::Doubling if i + 1 < chars.len() && chars[i + 1] == c => {
                    text.push(c);
                    i += 2;
                    continue;
                }
                _ => break,
            }
        }
        if let EscapeMode::Backslash(esc) = escape {
            if c == *esc && i + 1 < chars.len() {
                text.push(chars[i + 1]);
                i += 2;
                continue;
            }
        }
        text.push(c);
        i += 1;
    }
    Some((i, text))
}

#[allow(clippy::too_many_arguments)]
fn match_text_until(
    table: &[TokenPattern],
    stop_id: ElementId,
    ctx: &mut ParserContext,
    start: usize,
    barrier_cap: usize,
    consume_stop: bool,
    fail_on_eof: bool,
    allow_empty: bool,
    passed_barriers: u32,
) -> Option<ParsedElement> {
    let mut pos = start;
    loop {
        if let Some(stop_match) = match_token(table, stop_id, ctx, pos, barrier_cap, false, passed_barriers) {
            if pos == start && !allow_empty {
                return None;
            }
            let end = if consume_stop { stop_match.end() } else { pos };
            return Some(ParsedElement::new(start, end - start, Some(AstValue::Str(String::from_utf16_lossy(&ctx.units[start..pos])))));
        }
        if pos >= barrier_cap {
            if fail_on_eof {
                return None;
            }
            if pos == start && !allow_empty {
                return None;
            }
            return Some(ParsedElement::new(start, pos - start, Some(AstValue::Str(String::from_utf16_lossy(&ctx.units[start..pos])))));
        }
        let (_, width) = decode_char_at(&ctx.units, pos)?;
        pos += width;
    }
}

#[allow(clippy::too_many_arguments)]
fn match_sequence(
    table: &[TokenPattern],
    children: &[ElementId],
    passage: Option<&PassageFn>,
    ctx: &mut ParserContext,
    start: usize,
    barrier_cap: usize,
    want_intermediate: bool,
    passed_barriers: u32,
) -> Option<ParsedElement> {
    let mut pos = start;
    let mut values = Vec::with_capacity(children.len());
    for &child in children {
        let matched = match_token(table, child, ctx, pos, barrier_cap, want_intermediate && passage.is_some(), passed_barriers)?;
        pos = matched.end();
        values.push(matched.intermediate_value);
    }
    let intermediate = if want_intermediate {
        passage.map(|f| f(&values)).unwrap_or(None)
    } else {
        None
    };
    Some(ParsedElement::new(start, pos - start, intermediate))
}

#[allow(clippy::too_many_arguments)]
fn match_choice(
    table: &[TokenPattern],
    mode: ChoiceMode,
    children: &[ElementId],
    ctx: &mut ParserContext,
    start: usize,
    barrier_cap: usize,
    want_intermediate: bool,
    passed_barriers: u32,
) -> Option<ParsedElement> {
    let current_char = if start < barrier_cap { decode_char_at(&ctx.units, start).map(|(c, _)| c) } else { None };

    match mode {
        ChoiceMode::First => {
            for &child in children {
                if !token_may_start_with(table, child, current_char) {
                    continue;
                }
                if let Some(m) = match_token(table, child, ctx, start, barrier_cap, want_intermediate, passed_barriers) {
                    return Some(m);
                }
            }
            None
        }
        ChoiceMode::Shortest | ChoiceMode::Longest => {
            let mut best: Option<ParsedElement> = None;
            for &child in children {
                if !token_may_start_with(table, child, current_char) {
                    continue;
                }
                if let Some(m) = match_token(table, child, ctx, start, barrier_cap, want_intermediate, passed_barriers) {
                    let better = match &best {
                        None => true,
                        Some(current) => match mode {
                            ChoiceMode::Shortest => m.length < current.length,
                            ChoiceMode::Longest => m.length > current.length,
                            ChoiceMode::First => unreachable!(),
                        },
                    };
                    if better {
                        best = Some(m);
                    }
                }
            }
            best
        }
    }
}

/// Token-table counterpart of `engine::rule_may_start_with` (§4.1): `true`
/// whenever pruning can't prove `child` would fail at `ch`.
fn token_may_start_with(table: &[TokenPattern], child: ElementId, ch: Option<char>) -> bool {
    let info = &table[child as usize].info;
    if !info.first_chars.is_deterministic() || info.is_optional {
        return true;
    }
    match ch {
        Some(c) => info.first_chars.contains(c),
        None => false,
    }
}

#[allow(clippy::too_many_arguments)]
fn match_repeat(
    table: &[TokenPattern],
    child: ElementId,
    bounds: RepeatBounds,
    ctx: &mut ParserContext,
    start: usize,
    barrier_cap: usize,
    want_intermediate: bool,
    passed_barriers: u32,
) -> Option<ParsedElement> {
    let mut pos = start;
    let mut count = 0usize;
    let mut texts = Vec::new();
    while bounds.allows_more(count) {
        match match_token(table, child, ctx, pos, barrier_cap, want_intermediate, passed_barriers) {
            Some(m) if m.length > 0 || count == 0 => {
                if m.length == 0 && count > 0 {
                    // A zero-length child match that isn't the first
                    // iteration would loop forever; stop here instead.
                    break;
                }
                pos = m.end();
                count += 1;
                if want_intermediate {
                    texts.push(m.intermediate_value);
                }
            }
            _ => break,
        }
    }
    if bounds.is_satisfied_by(count) {
        Some(ParsedElement::new(start, pos - start, want_intermediate.then_some(AstValue::List(texts.into_iter().flatten().collect()))))
    } else {
        None
    }
}
