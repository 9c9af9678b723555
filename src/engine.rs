//! The rule execution engine (§4.3): an ordered-choice backtracking
//! interpreter dispatching on [`RuleKind`] by `match`, grounded in
//! `backtracking_parse`/`parse_expr` from the teacher.

use std::collections::HashMap;

use crate::context::ParserContext;
use crate::driver::Parser;
use crate::element::ElementId;
use crate::error::ParsingError;
use crate::rule::{ParsedRule, RecoveryStrategy, RuleKind};
use crate::settings::{EffectiveSettings, ErrorHandling};
use crate::skip;
use crate::token;

/// Parse `rule_id` at `pos`. Returns the parsed rule plus the
/// `passed_barriers` count to use for whatever comes after it — the
/// literal "passed by value through recursive calls" flow from §4.5,
/// modeled here as an explicit return value rather than mutable context
/// state.
pub fn parse_rule(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    pos: usize,
    passed_barriers: u32,
    parent_settings: EffectiveSettings,
) -> (ParsedRule, u32) {
    parse_rule_inner(parser, ctx, rule_id, pos, passed_barriers, parent_settings, false)
}

/// Like [`parse_rule`], but with skipping forced off for the duration of
/// this call and its descendants — the contract a skip rule itself runs
/// under (§4.4: "recursive skipping is disabled inside a skip attempt").
pub(crate) fn parse_rule_suppressed(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    pos: usize,
    passed_barriers: u32,
    parent_settings: EffectiveSettings,
) -> (ParsedRule, u32) {
    parse_rule_inner(parser, ctx, rule_id, pos, passed_barriers, parent_settings, true)
}

fn parse_rule_inner(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    pos: usize,
    passed_barriers: u32,
    parent_settings: EffectiveSettings,
    suppress_skip: bool,
) -> (ParsedRule, u32) {
    stacker::maybe_grow(32 * 1024, 1024 * 1024, || {
        parse_rule_guarded(parser, ctx, rule_id, pos, passed_barriers, parent_settings, suppress_skip)
    })
}

fn parse_rule_guarded(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    pos: usize,
    passed_barriers: u32,
    parent_settings: EffectiveSettings,
    suppress_skip: bool,
) -> (ParsedRule, u32) {
    let rule = &parser.rules[rule_id as usize];
    let (for_self, for_children) = EffectiveSettings::resolve(&parent_settings, &rule.settings);

    let memo_key = (rule_id, pos, passed_barriers);
    if let Some(memo) = &ctx.memo {
        if let Some((cached, barriers_after)) = memo.get(&memo_key) {
            return (cached.clone(), *barriers_after);
        }
    }

    let frame_mark = ctx.stack_frames.as_ref().map(|p| p.current());
    if let Some(pool) = &mut ctx.stack_frames {
        pool.push(rule_id, pos);
    }
    ctx.record_walk(crate::context::WalkEventKind::Enter, rule_id, pos, 0, None);

    let mut try_parse = |ctx: &mut ParserContext, at: usize| -> (ParsedRule, u32) {
        dispatch_and_record(parser, ctx, rule_id, &rule.kind, at, passed_barriers, for_self, for_children, suppress_skip)
    };

    let mut result = if suppress_skip {
        try_parse(ctx, pos)
    } else {
        let barrier_cap = effective_barrier_cap(ctx, &for_self, pos, passed_barriers);
        match skip::apply_skip(parser, ctx, &for_self, pos, passed_barriers, barrier_cap, &mut try_parse) {
            Ok(start_pos) => try_parse(ctx, start_pos),
            Err(result) => result,
        }
    };

    if !result.0.success && !suppress_skip {
        if let Some(retried) = skip::apply_post_failure_skip(parser, ctx, &for_self, pos, passed_barriers, &mut try_parse) {
            result = retried;
        }
    }

    if !result.0.success {
        result = apply_recovery(parser, ctx, rule, pos, passed_barriers, for_children, result);
    }

    let (mut parsed, barriers_after) = result;

    if parsed.success {
        let factory = rule.value_factory.as_ref().or(parser.settings.ast_factory.as_ref());
        if let Some(factory) = factory {
            let child_values: Vec<Option<crate::ast::AstValue>> = parsed.children.iter().map(|c| c.intermediate_value.clone()).collect();
            parsed.intermediate_value = Some(factory(&parsed, &child_values));
        }
        ctx.mark_success(parsed.start);
        ctx.record_walk(crate::context::WalkEventKind::Success, rule_id, parsed.start, parsed.length, None);
    } else {
        ctx.record_walk(crate::context::WalkEventKind::Fail, rule_id, pos, 0, None);
        if matches!(for_self.error_handling, ErrorHandling::Record) {
            let stack_trace = ctx.stack_frames.as_ref().map(|pool| pool.unwind().into_iter().map(|f| f.rule_id).collect());
            ctx.record_error(ParsingError { position: pos, passed_barriers, message: None, element_id: rule_id, is_token: false, stack_trace });
        }
    }

    if let Some(pool) = &mut ctx.stack_frames {
        pool.pop_to(frame_mark.flatten());
    }

    if let Some(memo) = &mut ctx.memo {
        memo.insert(memo_key, (parsed.clone(), barriers_after));
    }

    (parsed, barriers_after)
}

fn effective_barrier_cap(ctx: &ParserContext, settings: &EffectiveSettings, pos: usize, passed_barriers: u32) -> usize {
    if settings.ignore_barriers {
        ctx.max_position
    } else {
        ctx.barrier_tokens.next_barrier_position(pos, passed_barriers).unwrap_or(ctx.max_position)
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_and_record(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    kind: &RuleKind,
    pos: usize,
    passed_barriers: u32,
    for_self: EffectiveSettings,
    for_children: EffectiveSettings,
    suppress_skip: bool,
) -> (ParsedRule, u32) {
    let children_settings = if suppress_skip {
        let mut s = for_children;
        s.skipping_strategy = crate::settings::SkippingStrategy::None;
        s
    } else {
        for_children
    };

    match kind {
        RuleKind::Token(token_id) => dispatch_token(parser, ctx, rule_id, *token_id, pos, passed_barriers, &for_self),
        RuleKind::Sequence(children) => dispatch_sequence(parser, ctx, rule_id, children, pos, passed_barriers, children_settings, suppress_skip),
        RuleKind::Choice { mode, children } => dispatch_choice(parser, ctx, rule_id, *mode, children, pos, passed_barriers, children_settings, suppress_skip),
        RuleKind::Repeat { child, bounds, separator, trailing_sep, include_sep_in_children } => dispatch_repeat(
            parser, ctx, rule_id, *child, *bounds, *separator, *trailing_sep, *include_sep_in_children, pos, passed_barriers, children_settings, suppress_skip,
        ),
        RuleKind::Optional(child) => dispatch_optional(parser, ctx, rule_id, *child, pos, passed_barriers, children_settings, suppress_skip),
        RuleKind::Lookahead { child, positive } => dispatch_lookahead(parser, ctx, rule_id, *child, *positive, pos, passed_barriers, children_settings, suppress_skip),
        RuleKind::Eof => {
            let parsed = if pos == ctx.max_position {
                ParsedRule::leaf(rule_id, pos, 0, None)
            } else {
                ParsedRule::fail(rule_id, pos)
            };
            (parsed, passed_barriers)
        }
    }
}

fn dispatch_token(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    token_id: ElementId,
    pos: usize,
    passed_barriers: u32,
    settings: &EffectiveSettings,
) -> (ParsedRule, u32) {
    let barrier_cap = effective_barrier_cap(ctx, settings, pos, passed_barriers);
    match token::match_token(&parser.tokens, token_id, ctx, pos, barrier_cap, true, passed_barriers) {
        Some(matched) => {
            let new_passed = match matched.consumed_barrier_index {
                Some(idx) => idx + 1,
                None => passed_barriers,
            };
            (ParsedRule::leaf(rule_id, matched.start, matched.length, matched.intermediate_value), new_passed)
        }
        None => (ParsedRule::fail(rule_id, pos), passed_barriers),
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_sequence(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    children: &[ElementId],
    pos: usize,
    passed_barriers: u32,
    settings: EffectiveSettings,
    suppress_skip: bool,
) -> (ParsedRule, u32) {
    let mut cursor = pos;
    let mut barriers = passed_barriers;
    let mut parsed_children = Vec::with_capacity(children.len());
    for (i, &child) in children.iter().enumerate() {
        let (child_result, new_barriers) = parse_rule_inner(parser, ctx, child, cursor, barriers, settings, suppress_skip);
        if !child_result.success {
            return (ParsedRule::fail(rule_id, pos), passed_barriers);
        }
        cursor = child_result.end();
        barriers = new_barriers;
        parsed_children.push(child_result.with_occurrence_index(i));
    }
    let mut parsed = ParsedRule::leaf(rule_id, pos, cursor - pos, None);
    parsed.children = parsed_children;
    (parsed, barriers)
}

#[allow(clippy::too_many_arguments)]
fn dispatch_choice(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    mode: crate::combinator::ChoiceMode,
    children: &[ElementId],
    pos: usize,
    passed_barriers: u32,
    settings: EffectiveSettings,
    suppress_skip: bool,
) -> (ParsedRule, u32) {
    use crate::combinator::ChoiceMode;

    let current_char = crate::utf16::decode_char_at(&ctx.units, pos).map(|(c, _)| c);

    match mode {
        ChoiceMode::First => {
            for &child in children {
                if !rule_may_start_with(parser, child, current_char) {
                    continue;
                }
                let (child_result, new_barriers) = parse_rule_inner(parser, ctx, child, pos, passed_barriers, settings, suppress_skip);
                if child_result.success {
                    let mut parsed = ParsedRule::leaf(rule_id, child_result.start, child_result.length, child_result.intermediate_value.clone());
                    parsed.children = vec![child_result];
                    return (parsed, new_barriers);
                }
            }
            (ParsedRule::fail(rule_id, pos), passed_barriers)
        }
        ChoiceMode::Shortest | ChoiceMode::Longest => {
            let mut best: Option<(ParsedRule, u32)> = None;
            for &child in children {
                if !rule_may_start_with(parser, child, current_char) {
                    continue;
                }
                let (child_result, new_barriers) = parse_rule_inner(parser, ctx, child, pos, passed_barriers, settings, suppress_skip);
                if !child_result.success {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((current, _)) => match mode {
                        ChoiceMode::Shortest => child_result.length < current.length,
                        ChoiceMode::Longest => child_result.length > current.length,
                        ChoiceMode::First => unreachable!(),
                    },
                };
                if better {
                    best = Some((child_result, new_barriers));
                }
            }
            match best {
                Some((winner, new_barriers)) => {
                    let mut parsed = ParsedRule::leaf(rule_id, winner.start, winner.length, winner.intermediate_value.clone());
                    parsed.children = vec![winner];
                    (parsed, new_barriers)
                }
                None => (ParsedRule::fail(rule_id, pos), passed_barriers),
            }
        }
    }
}

/// Whether `rule_id` could possibly succeed starting at a position whose
/// next character is `ch` (`None` at end of input), per its precomputed
/// `first_chars`/`is_optional` (§4.1). Always `true` when first-character
/// dispatch wasn't computed for this parser (`Any` is the default), so
/// disabling the init flag degrades to "try every child" rather than
/// pruning incorrectly.
fn rule_may_start_with(parser: &Parser, rule_id: ElementId, ch: Option<char>) -> bool {
    let info = &parser.rules[rule_id as usize].info;
    if !info.first_chars.is_deterministic() || info.is_optional {
        return true;
    }
    match ch {
        Some(c) => info.first_chars.contains(c),
        None => false,
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_repeat(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    child: ElementId,
    bounds: crate::combinator::RepeatBounds,
    separator: Option<ElementId>,
    trailing_sep: bool,
    include_sep_in_children: bool,
    pos: usize,
    passed_barriers: u32,
    settings: EffectiveSettings,
    suppress_skip: bool,
) -> (ParsedRule, u32) {
    let mut cursor = pos;
    let mut barriers = passed_barriers;
    let mut children = Vec::new();
    let mut count = 0usize;

    loop {
        if !bounds.allows_more(count) {
            break;
        }
        if count > 0 {
            if let Some(sep_id) = separator {
                let (sep_result, sep_barriers) = parse_rule_inner(parser, ctx, sep_id, cursor, barriers, settings, suppress_skip);
                if !sep_result.success {
                    break;
                }
                let (item_result, item_barriers) = parse_rule_inner(parser, ctx, child, sep_result.end(), sep_barriers, settings, suppress_skip);
                if !item_result.success {
                    // A dangling separator with no following item is only
                    // acceptable if trailing separators are allowed.
                    if trailing_sep {
                        cursor = sep_result.end();
                        barriers = sep_barriers;
                        if include_sep_in_children {
                            children.push(sep_result.with_occurrence_index(children.len()));
                        }
                    }
                    break;
                }
                if include_sep_in_children {
                    children.push(sep_result.with_occurrence_index(children.len()));
                }
                cursor = item_result.end();
                barriers = item_barriers;
                children.push(item_result.with_occurrence_index(children.len()));
                count += 1;
                continue;
            }
        }

        let (item_result, item_barriers) = parse_rule_inner(parser, ctx, child, cursor, barriers, settings, suppress_skip);
        if !item_result.success {
            break;
        }
        cursor = item_result.end();
        barriers = item_barriers;
        children.push(item_result.with_occurrence_index(children.len()));
        count += 1;
    }

    if bounds.is_satisfied_by(count) {
        let mut parsed = ParsedRule::leaf(rule_id, pos, cursor - pos, None);
        parsed.children = children;
        (parsed, barriers)
    } else {
        (ParsedRule::fail(rule_id, pos), passed_barriers)
    }
}

fn dispatch_optional(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    child: ElementId,
    pos: usize,
    passed_barriers: u32,
    settings: EffectiveSettings,
    suppress_skip: bool,
) -> (ParsedRule, u32) {
    let (child_result, new_barriers) = parse_rule_inner(parser, ctx, child, pos, passed_barriers, settings, suppress_skip);
    if child_result.success {
        let mut parsed = ParsedRule::leaf(rule_id, child_result.start, child_result.length, child_result.intermediate_value.clone());
        parsed.children = vec![child_result];
        (parsed, new_barriers)
    } else {
        (ParsedRule::leaf(rule_id, pos, 0, None), passed_barriers)
    }
}

fn dispatch_lookahead(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule_id: ElementId,
    child: ElementId,
    positive: bool,
    pos: usize,
    passed_barriers: u32,
    settings: EffectiveSettings,
    suppress_skip: bool,
) -> (ParsedRule, u32) {
    let (child_result, _) = parse_rule_inner(parser, ctx, child, pos, passed_barriers, settings, suppress_skip);
    let matched = child_result.success == positive;
    if matched {
        (ParsedRule::leaf(rule_id, pos, 0, None), passed_barriers)
    } else {
        (ParsedRule::fail(rule_id, pos), passed_barriers)
    }
}

fn apply_recovery(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule: &crate::rule::ParserRule,
    start: usize,
    passed_barriers: u32,
    for_children: EffectiveSettings,
    failed: (ParsedRule, u32),
) -> (ParsedRule, u32) {
    match &rule.recovery {
        RecoveryStrategy::None => failed,
        RecoveryStrategy::FindNext => {
            let bound = crate::error::recovery::find_next_step_bound(start, ctx.max_position);
            for step in 1..=bound {
                let candidate = start + step;
                let (result, barriers) = dispatch_and_record(parser, ctx, rule.info.id, &rule.kind, candidate, passed_barriers, for_children, for_children, false);
                if result.success {
                    let mut recovered = ParsedRule::leaf(rule.info.id, start, result.end() - start, result.intermediate_value.clone());
                    recovered.children = vec![result];
                    return (recovered, barriers);
                }
            }
            failed
        }
        RecoveryStrategy::SkipUntilAnchor { anchor } => recover_via_anchor(parser, ctx, rule, start, passed_barriers, for_children, *anchor, false),
        RecoveryStrategy::SkipAfterAnchor { anchor } => recover_via_anchor(parser, ctx, rule, start, passed_barriers, for_children, *anchor, true),
    }
}

fn recover_via_anchor(
    parser: &Parser,
    ctx: &mut ParserContext,
    rule: &crate::rule::ParserRule,
    start: usize,
    passed_barriers: u32,
    for_children: EffectiveSettings,
    anchor: ElementId,
    after: bool,
) -> (ParsedRule, u32) {
    let mut cursor = start;
    while cursor <= ctx.max_position {
        let (anchor_result, anchor_barriers) = parse_rule_inner(parser, ctx, anchor, cursor, passed_barriers, for_children, false);
        if anchor_result.success {
            let retry_pos = if after { anchor_result.end() } else { cursor };
            let (result, barriers) = dispatch_and_record(parser, ctx, rule.info.id, &rule.kind, retry_pos, anchor_barriers, for_children, for_children, false);
            if result.success {
                let mut recovered = ParsedRule::leaf(rule.info.id, start, result.end() - start, result.intermediate_value.clone());
                recovered.children = vec![result];
                return (recovered, barriers);
            }
            return (ParsedRule::fail(rule.info.id, start), passed_barriers);
        }
        cursor += 1;
    }
    (ParsedRule::fail(rule.info.id, start), passed_barriers)
}

/// The shape of [`ParserContext::memo`](crate::context::ParserContext::memo),
/// exposed for callers that want to pre-size or inspect it.
pub type MemoMap = HashMap<crate::context::MemoKey, (ParsedRule, u32)>;
