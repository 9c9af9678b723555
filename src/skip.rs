//! Skip strategy algorithms (§4.4): interleaving a skip rule (typically
//! whitespace/comments) with target-rule parsing. Recursive skipping is
//! disabled inside a skip attempt itself.

use crate::context::ParserContext;
use crate::element::ElementId;
use crate::engine;
use crate::rule::ParsedRule;
use crate::settings::{EffectiveSettings, SkippingStrategy};

/// Callback the engine passes down so the `*Lazy`/`TryParse*` loops here can
/// attempt the target parse themselves, without `skip.rs` needing direct
/// access to `engine::dispatch_and_record`'s private dispatch state.
pub type TryParse<'a> = dyn FnMut(&mut ParserContext, usize) -> (ParsedRule, u32) + 'a;

/// Run one skip attempt at `pos`; `None` if the skip rule failed, the
/// settings name no skip rule at all, or `pos` is marked as already having
/// been skipped past (§4.7 `positions_to_avoid_skipping`).
fn try_skip_once(
    parser: &crate::driver::Parser,
    ctx: &mut ParserContext,
    skip_rule: Option<ElementId>,
    pos: usize,
    passed_barriers: u32,
) -> Option<ParsedRule> {
    let skip_rule = skip_rule?;
    if ctx.positions_to_avoid_skipping.get(pos) {
        return None;
    }
    let (parsed, _) = engine::parse_rule_suppressed(
        parser,
        ctx,
        skip_rule,
        pos,
        passed_barriers,
        EffectiveSettings::default(),
    );
    parsed.success.then_some(parsed)
}

fn whitespace_run(ctx: &ParserContext, pos: usize, barrier_cap: usize) -> usize {
    let mut cursor = pos;
    while cursor < barrier_cap {
        match crate::utf16::decode_char_at(&ctx.units, cursor) {
            Some((c, width)) if c.is_whitespace() => cursor += width,
            _ => break,
        }
    }
    cursor
}

fn record_skip(ctx: &mut ParserContext, parsed: ParsedRule) {
    if ctx.record_skipped_rules {
        ctx.skipped_rules.push(parsed);
    }
}

/// Applies the effective skip strategy before a target parse attempt, per
/// §4.4's per-variant algorithm table.
///
/// Most strategies only need to compute a position: `Ok(pos)` tells the
/// caller where to run its own, single target-parse attempt. The `*Lazy`
/// variants instead alternate {skip; try-parse} themselves (via
/// `try_parse`) since stopping the loop correctly requires checking the
/// parse result between skip steps; those return `Err` with the finished
/// dispatch result, which the caller should use as-is.
pub fn apply_skip(
    parser: &crate::driver::Parser,
    ctx: &mut ParserContext,
    settings: &EffectiveSettings,
    pos: usize,
    passed_barriers: u32,
    barrier_cap: usize,
    try_parse: &mut TryParse,
) -> Result<usize, (ParsedRule, u32)> {
    if parser.settings.use_optimized_whitespace_skip {
        let new_pos = whitespace_run(ctx, pos, barrier_cap);
        ctx.positions_to_avoid_skipping.set(new_pos);
        return Ok(new_pos);
    }

    match settings.skipping_strategy {
        SkippingStrategy::None => Ok(pos),
        SkippingStrategy::SkipBeforeParsing => {
            let new_pos = match try_skip_once(parser, ctx, settings.skip_rule, pos, passed_barriers) {
                Some(parsed) => {
                    let end = parsed.end();
                    record_skip(ctx, parsed);
                    end
                }
                None => pos,
            };
            ctx.positions_to_avoid_skipping.set(new_pos);
            Ok(new_pos)
        }
        SkippingStrategy::SkipBeforeParsingLazy => {
            Err(skip_then_parse_loop(parser, ctx, settings, pos, passed_barriers, try_parse))
        }
        SkippingStrategy::SkipBeforeParsingGreedy => Ok(greedy_skip(parser, ctx, settings, pos, passed_barriers)),
        SkippingStrategy::TryParseThenSkip
        | SkippingStrategy::TryParseThenSkipLazy
        | SkippingStrategy::TryParseThenSkipGreedy
        | SkippingStrategy::TryParseNonEmptyThenSkip
        | SkippingStrategy::TryParseNonEmptyThenSkipLazy
        | SkippingStrategy::TryParseNonEmptyThenSkipGreedy => Ok(pos),
    }
}

/// For the `TryParse*` family: called only after the initial unskipped
/// parse attempt already failed. Returns the finished dispatch result of
/// retrying the target parse after skipping, or `None` if this strategy
/// doesn't retry (or the skip attempt itself found nothing to skip).
pub fn apply_post_failure_skip(
    parser: &crate::driver::Parser,
    ctx: &mut ParserContext,
    settings: &EffectiveSettings,
    pos: usize,
    passed_barriers: u32,
    try_parse: &mut TryParse,
) -> Option<(ParsedRule, u32)> {
    let non_empty_required = matches!(
        settings.skipping_strategy,
        SkippingStrategy::TryParseNonEmptyThenSkip
            | SkippingStrategy::TryParseNonEmptyThenSkipLazy
            | SkippingStrategy::TryParseNonEmptyThenSkipGreedy
    );

    match settings.skipping_strategy {
        SkippingStrategy::TryParseThenSkip | SkippingStrategy::TryParseNonEmptyThenSkip => {
            let parsed = try_skip_once(parser, ctx, settings.skip_rule, pos, passed_barriers)?;
            if non_empty_required && parsed.length == 0 {
                return None;
            }
            let end = parsed.end();
            record_skip(ctx, parsed);
            ctx.positions_to_avoid_skipping.set(end);
            Some(try_parse(ctx, end))
        }
        SkippingStrategy::TryParseThenSkipLazy | SkippingStrategy::TryParseNonEmptyThenSkipLazy => {
            Some(skip_then_parse_loop(parser, ctx, settings, pos, passed_barriers, try_parse))
        }
        SkippingStrategy::TryParseThenSkipGreedy | SkippingStrategy::TryParseNonEmptyThenSkipGreedy => {
            let end = greedy_skip(parser, ctx, settings, pos, passed_barriers);
            Some(try_parse(ctx, end))
        }
        _ => None,
    }
}

/// `*Lazy` variants (§4.4): alternate {try-parse; skip-step} until the
/// parse attempt succeeds or a skip step makes no progress — a zero-length
/// skip never counts as progress (§4.4, §9 OQ2), so it ends the loop rather
/// than spinning forever. Bounded by `max_position - pos` since every
/// progressing step strictly advances the cursor.
fn skip_then_parse_loop(
    parser: &crate::driver::Parser,
    ctx: &mut ParserContext,
    settings: &EffectiveSettings,
    pos: usize,
    passed_barriers: u32,
    try_parse: &mut TryParse,
) -> (ParsedRule, u32) {
    let mut cursor = pos;
    let max_steps = ctx.max_position.saturating_sub(pos) + 1;
    for _ in 0..=max_steps {
        let result = try_parse(ctx, cursor);
        if result.0.success {
            return result;
        }
        match try_skip_once(parser, ctx, settings.skip_rule, cursor, passed_barriers) {
            Some(parsed) if parsed.length > 0 => {
                let end = parsed.end();
                record_skip(ctx, parsed);
                ctx.positions_to_avoid_skipping.set(end);
                cursor = end;
            }
            _ => return result,
        }
    }
    try_parse(ctx, cursor)
}

/// `*Greedy` variants: skip as many times as possible (each step must
/// advance the cursor), then stop.
fn greedy_skip(
    parser: &crate::driver::Parser,
    ctx: &mut ParserContext,
    settings: &EffectiveSettings,
    pos: usize,
    passed_barriers: u32,
) -> usize {
    let mut cursor = pos;
    loop {
        match try_skip_once(parser, ctx, settings.skip_rule, cursor, passed_barriers) {
            Some(parsed) if parsed.length > 0 => {
                cursor = parsed.end();
                ctx.positions_to_avoid_skipping.set(cursor);
                record_skip(ctx, parsed);
            }
            _ => break,
        }
    }
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::BarrierTokenCollection;
    use crate::builder::ParserBuilder;
    use crate::rule::RuleKind;
    use crate::token::TokenPatternKind;
    use std::rc::Rc;

    fn whitespace_grammar() -> crate::driver::Parser {
        let mut b = ParserBuilder::new();
        let ws: crate::element::ElementId =
            b.create_token("ws", TokenPatternKind::RepeatChars { pred: Rc::new(|c: char| c.is_whitespace()), bounds: crate::combinator::RepeatBounds::unbounded(1) });
        let ws_rule = b.create_rule("ws_rule", RuleKind::Token(ws));
        let digit = b.create_token("digit", TokenPatternKind::Chars(Rc::new(|c: char| c.is_ascii_digit())));
        let digit_rule = b.create_main_rule("digits", RuleKind::Token(digit));
        let mut settings = crate::settings::RuleSettings::default();
        settings.skipping_strategy = crate::settings::Overridable::local_self(SkippingStrategy::SkipBeforeParsingGreedy);
        settings.skip_rule = crate::settings::Overridable::local_self(ws_rule);
        b.set_rule_settings(digit_rule, settings);
        b.build().unwrap()
    }

    #[test]
    fn greedy_skip_consumes_all_leading_whitespace() {
        let parser = whitespace_grammar();
        let ast = parser.parse("   7").unwrap();
        assert_eq!(ast.span.start, 3);
        assert_eq!(ast.span.length, 1);
    }

    #[test]
    fn try_skip_once_returns_none_without_a_skip_rule() {
        let mut ctx = ParserContext::new("  x", BarrierTokenCollection::build(vec![], 3));
        let mut b = ParserBuilder::new();
        b.create_main_rule("eof", RuleKind::Eof);
        let parser = b.build().unwrap();
        assert!(try_skip_once(&parser, &mut ctx, None, 0, 0).is_none());
    }

    #[test]
    fn try_skip_once_refuses_a_position_marked_to_avoid() {
        let parser = whitespace_grammar();
        let mut ctx = ParserContext::new("  x", BarrierTokenCollection::build(vec![], 3));
        let ws_rule = parser.resolve_rule("ws_rule").unwrap();
        ctx.positions_to_avoid_skipping.set(0);
        assert!(try_skip_once(&parser, &mut ctx, Some(ws_rule), 0, 0).is_none());
    }

    fn lazy_skip_grammar() -> crate::driver::Parser {
        let mut b = ParserBuilder::new();
        let ws: crate::element::ElementId =
            b.create_token("ws", TokenPatternKind::RepeatChars { pred: Rc::new(|c: char| c.is_whitespace()), bounds: crate::combinator::RepeatBounds::unbounded(1) });
        let ws_rule = b.create_rule("ws_rule", RuleKind::Token(ws));
        let digit = b.create_token("digit", TokenPatternKind::Chars(Rc::new(|c: char| c.is_ascii_digit())));
        let digit_rule = b.create_main_rule("digits", RuleKind::Token(digit));
        let mut settings = crate::settings::RuleSettings::default();
        settings.skipping_strategy = crate::settings::Overridable::local_self(SkippingStrategy::SkipBeforeParsingLazy);
        settings.skip_rule = crate::settings::Overridable::local_self(ws_rule);
        b.set_rule_settings(digit_rule, settings);
        b.build().unwrap()
    }

    #[test]
    fn lazy_skip_alternates_until_the_target_parses() {
        let parser = lazy_skip_grammar();
        let ast = parser.parse("   7").unwrap();
        assert_eq!(ast.span.start, 3);
        assert_eq!(ast.span.length, 1);
    }
}
