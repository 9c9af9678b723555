//! Mutable per-parse state (§4.7). A `ParserContext` is created fresh for
//! every call to `parse`/`try_parse`/`match_token`/etc. and is never shared
//! between threads or reused across calls.

use std::any::Any;
use std::rc::Rc;

use crate::barrier::BarrierTokenCollection;
use crate::element::ElementId;
use crate::error::parsing_error::{FurthestErrorTracker, ParsingError};
use crate::rule::ParsedRule;
use crate::utf16;

/// A dense bit array over `0..=input.length`, used for `success_positions`
/// and `positions_to_avoid_skipping` (§4.7, Design Note 5): fixed-size,
/// cache-friendly, never boxed per-bit.
#[derive(Clone, Debug)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    pub fn new(len: usize) -> Self {
        BitSet { words: vec![0; len.div_ceil(64)], len }
    }

    pub fn get(&self, pos: usize) -> bool {
        if pos >= self.len {
            return false;
        }
        (self.words[pos / 64] & (1u64 << (pos % 64))) != 0
    }

    pub fn set(&mut self, pos: usize) {
        if pos >= self.len {
            return;
        }
        self.words[pos / 64] |= 1u64 << (pos % 64);
    }
}

/// One frame in the optional call-stack trace (§4.7), pooled by index
/// rather than heap-allocated per node (Design Note 6).
#[derive(Clone, Debug)]
pub struct StackFrameRecord {
    pub rule_id: ElementId,
    pub position: usize,
    pub previous: Option<usize>,
}

/// Index-linked pool of stack frames, active only when
/// [`crate::element::InitFlags::STACK_TRACE_WRITING`] is set.
#[derive(Clone, Debug, Default)]
pub struct StackFramePool {
    frames: Vec<StackFrameRecord>,
    top: Option<usize>,
}

impl StackFramePool {
    pub fn push(&mut self, rule_id: ElementId, position: usize) -> usize {
        let record = StackFrameRecord { rule_id, position, previous: self.top };
        self.frames.push(record);
        let index = self.frames.len() - 1;
        self.top = Some(index);
        index
    }

    /// Pop back to a previously observed top (restores on backtrack/unwind).
    pub fn pop_to(&mut self, mark: Option<usize>) {
        self.top = mark;
    }

    pub fn current(&self) -> Option<usize> {
        self.top
    }

    /// Walk frames from the current top to the root, most-recent first.
    pub fn unwind(&self) -> Vec<&StackFrameRecord> {
        let mut out = Vec::new();
        let mut cursor = self.top;
        while let Some(index) = cursor {
            let frame = &self.frames[index];
            out.push(frame);
            cursor = frame.previous;
        }
        out
    }
}

/// One event in the optional walk-trace event stream (§4.7).
#[derive(Clone, Debug)]
pub struct WalkEvent {
    pub kind: WalkEventKind,
    pub element_id: ElementId,
    pub start: usize,
    pub length: usize,
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkEventKind {
    Enter,
    Info,
    Success,
    Fail,
}

/// Key for the memoization cache (§4.3): `(rule_id, start_position,
/// passed_barriers)`. Correct only because `inline_rules` is fixed at
/// `initialize()` time and never toggled afterward (Design Note in
/// DESIGN.md, resolving §9 Open Question 3).
pub type MemoKey = (ElementId, usize, u32);

/// Mutable execution state for one parse call (§3, §4.7). Borrowed
/// exclusively by the call that owns it; never `Send`/`Sync` (it may hold
/// `Rc`-based stack-frame/trace bookkeeping).
pub struct ParserContext {
    pub units: Vec<u16>,
    pub position: usize,
    pub max_position: usize,
    pub parser_parameter: Option<Rc<dyn Any>>,

    pub furthest: FurthestErrorTracker,
    pub success_positions: BitSet,
    pub positions_to_avoid_skipping: BitSet,
    pub barrier_tokens: BarrierTokenCollection,
    pub skipped_rules: Vec<ParsedRule>,
    pub record_skipped_rules: bool,

    pub stack_frames: Option<StackFramePool>,
    pub walk_trace: Option<Vec<WalkEvent>>,
    /// Cached per `(rule_id, start, passed_barriers)`: the parsed result
    /// together with the `passed_barriers` count to resume with afterward
    /// (a cache hit must reproduce this exactly, not just the `ParsedRule`).
    pub memo: Option<std::collections::HashMap<MemoKey, (ParsedRule, u32)>>,
}

impl ParserContext {
    pub fn new(input: &str, barrier_tokens: BarrierTokenCollection) -> Self {
        Self::from_units(utf16::encode(input), barrier_tokens)
    }

    /// Build directly from an already-encoded UTF-16 buffer, for callers
    /// (e.g. [`crate::driver::FindAllMatches`]) that re-run several parse
    /// attempts over the same input without re-encoding each time.
    pub fn from_units(units: Vec<u16>, barrier_tokens: BarrierTokenCollection) -> Self {
        let len = units.len();
        ParserContext {
            units,
            position: 0,
            max_position: len,
            parser_parameter: None,
            furthest: FurthestErrorTracker::new(),
            success_positions: BitSet::new(len + 1),
            positions_to_avoid_skipping: BitSet::new(len + 1),
            barrier_tokens,
            skipped_rules: Vec::new(),
            record_skipped_rules: false,
            stack_frames: None,
            walk_trace: None,
            memo: None,
        }
    }

    pub fn with_parameter(mut self, parameter: Rc<dyn Any>) -> Self {
        self.parser_parameter = Some(parameter);
        self
    }

    pub fn enable_stack_trace(mut self) -> Self {
        self.stack_frames = Some(StackFramePool::default());
        self
    }

    pub fn enable_walk_trace(mut self) -> Self {
        self.walk_trace = Some(Vec::new());
        self
    }

    pub fn enable_memoization(mut self) -> Self {
        self.memo = Some(std::collections::HashMap::new());
        self
    }

    pub fn record_error(&mut self, error: ParsingError) {
        self.furthest.record(error);
    }

    pub fn mark_success(&mut self, position: usize) {
        self.success_positions.set(position);
    }

    pub fn record_walk(&mut self, kind: WalkEventKind, element_id: ElementId, start: usize, length: usize, message: Option<String>) {
        if let Some(trace) = &mut self.walk_trace {
            trace.push(WalkEvent { kind, element_id, start, length, message });
        }
    }
}
