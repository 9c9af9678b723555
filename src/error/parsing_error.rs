//! A single recorded match failure (§3 `ParsingError`, §4.6 furthest-position
//! tracking).

use crate::element::ElementId;

/// One recorded failure: a token or rule could not match at `position`.
/// Stored append-only on [`crate::context::ParserContext`]; later folded
/// into [`super::group::ErrorGroup`]s for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsingError {
    pub position: usize,
    pub passed_barriers: u32,
    pub message: Option<String>,
    pub element_id: ElementId,
    pub is_token: bool,
    /// Rule ids enclosing this failure, innermost first, captured from the
    /// live call stack at the moment of failure (§4.7 `StackFramePool`).
    /// `None` unless [`crate::element::InitFlags::STACK_TRACE_WRITING`] is
    /// active — the stack is gone by the time a diagnostic is built, since
    /// every rule pops its frame back off on the way out regardless of
    /// success or failure.
    pub stack_trace: Option<Vec<ElementId>>,
}

/// Furthest-position error tracking (§4.6): whenever a match fails, if its
/// position is at or beyond the current furthest position, the error is
/// recorded (or replaces everything recorded at a lesser position).
#[derive(Clone, Debug, Default)]
pub struct FurthestErrorTracker {
    furthest_position: usize,
    errors: Vec<ParsingError>,
}

impl FurthestErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn furthest_position(&self) -> usize {
        self.furthest_position
    }

    pub fn errors(&self) -> &[ParsingError] {
        &self.errors
    }

    /// Record a failure. No-ops (does not affect the furthest position or
    /// the log) if `position` is strictly less than the current furthest —
    /// errors behind the furthest point are no longer diagnostically
    /// interesting.
    pub fn record(&mut self, error: ParsingError) {
        if self.errors.is_empty() {
            self.furthest_position = error.position;
            self.errors.push(error);
            return;
        }
        match error.position.cmp(&self.furthest_position) {
            std::cmp::Ordering::Greater => {
                self.furthest_position = error.position;
                self.errors.clear();
                self.errors.push(error);
            }
            std::cmp::Ordering::Equal => {
                self.errors.push(error);
            }
            std::cmp::Ordering::Less => {}
        }
    }
}
