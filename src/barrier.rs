//! Barrier tokens and their collection (§4.5): pre-computed synchronization
//! points (e.g. indentation markers) that an otherwise scannerless parser
//! must respect.

/// A single pre-tokenized synchronization marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BarrierToken {
    pub alias: String,
    pub start: usize,
    pub length: usize,
}

/// A user-supplied function that scans the input once, before parsing
/// begins, and emits [`BarrierToken`]s (e.g. an indent/dedent tokenizer for
/// a layout-sensitive grammar).
pub type Tokenizer = std::rc::Rc<dyn Fn(&[u16]) -> Vec<BarrierToken>>;

/// A barrier, resolved to its position within the global, index-ordered
/// barrier sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntermediateBarrierToken {
    pub token: BarrierToken,
    /// Monotonically increasing index within the whole parse's barrier
    /// sequence (not just within its start-position group).
    pub index: u32,
}

/// One record in `barrier_position_map`/`next_position_map`: the data
/// needed to answer `try_get_barrier_token`/`next_barrier_position` in
/// O(1), per §4.5.
///
/// `tokens[i].index == i` always holds (guaranteed by the `.enumerate()`
/// in `build`), and tokens sharing a start position occupy a contiguous
/// index range (the sort is stable and only reorders by `start`). So the
/// smallest index `>= passed_barriers` at a position is found by direct
/// indexing into `tokens`, never a scan.
#[derive(Clone, Copy, Debug)]
struct PositionEntry {
    /// Index of the first barrier at this exact position, if any.
    min_index_here: Option<u32>,
    /// Index of the last barrier at this exact position, if any.
    max_index_here: Option<u32>,
    /// Smallest position ≥ here containing any barrier at all (used by
    /// `next_barrier_position`; refined per-query by `passed_barriers`).
    next_position: Option<usize>,
}

/// Barriers sorted by start position, with the dense dual-array
/// preprocessing described in §4.5: `O(n)` to build, `O(1)` per query
/// after that.
#[derive(Clone, Debug, Default)]
pub struct BarrierTokenCollection {
    /// All barriers in increasing `(start, index)` order.
    tokens: Vec<IntermediateBarrierToken>,
    /// Dense array of length `input.length + 1`.
    by_position: Vec<PositionEntry>,
}

impl BarrierTokenCollection {
    /// Build from the unsorted output of all registered tokenizers, over an
    /// input of `input_length` UTF-16 units.
    pub fn build(mut raw: Vec<BarrierToken>, input_length: usize) -> Self {
        raw.sort_by_key(|t| t.start);
        let tokens: Vec<IntermediateBarrierToken> = raw
            .into_iter()
            .enumerate()
            .map(|(i, token)| IntermediateBarrierToken { token, index: i as u32 })
            .collect();

        let mut groups: std::collections::HashMap<usize, (u32, u32)> = std::collections::HashMap::new();
        for t in &tokens {
            groups
                .entry(t.token.start)
                .and_modify(|(min, max)| {
                    *min = (*min).min(t.index);
                    *max = (*max).max(t.index);
                })
                .or_insert((t.index, t.index));
        }

        let mut by_position = vec![PositionEntry { min_index_here: None, max_index_here: None, next_position: None }; input_length + 1];

        // Single right-to-left sweep (§4.5): each position's entry points to
        // the next position (forward) that hosts any barrier at all.
        let mut next_position: Option<usize> = None;
        for pos in (0..=input_length).rev() {
            by_position[pos].next_position = next_position;
            if let Some(&(min_index, max_index)) = groups.get(&pos) {
                by_position[pos].min_index_here = Some(min_index);
                by_position[pos].max_index_here = Some(max_index);
                next_position = Some(pos);
            }
        }

        BarrierTokenCollection { tokens, by_position }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The first not-yet-passed barrier exactly at `pos`, if any. `O(1)`:
    /// tokens sharing a start position occupy the contiguous index range
    /// `[min_index_here, max_index_here]`, and `tokens[i].index == i`, so
    /// the answer is a single direct index into `tokens` — never a scan.
    pub fn try_get_barrier_token(&self, pos: usize, passed_barriers: u32) -> Option<&IntermediateBarrierToken> {
        let entry = self.by_position.get(pos)?;
        let min_index = entry.min_index_here?;
        let max_index = entry.max_index_here?;
        let first_unpassed = min_index.max(passed_barriers);
        if first_unpassed > max_index {
            return None;
        }
        self.tokens.get(first_unpassed as usize)
    }

    /// Smallest position `>= pos` that still contains an unpassed barrier.
    /// `O(next_position hops)`: the per-position membership check is a
    /// direct index comparison, not a scan over `tokens`.
    pub fn next_barrier_position(&self, pos: usize, passed_barriers: u32) -> Option<usize> {
        let mut cursor = pos;
        loop {
            let entry = self.by_position.get(cursor)?;
            if let Some(max_index) = entry.max_index_here {
                if max_index >= passed_barriers {
                    return Some(cursor);
                }
            }
            cursor = entry.next_position?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> BarrierTokenCollection {
        BarrierTokenCollection::build(
            vec![
                BarrierToken { alias: "INDENT".into(), start: 2, length: 0 },
                BarrierToken { alias: "DEDENT".into(), start: 5, length: 0 },
                BarrierToken { alias: "DEDENT".into(), start: 5, length: 0 },
            ],
            10,
        )
    }

    #[test]
    fn try_get_finds_exact_position() {
        let c = collection();
        let barrier = c.try_get_barrier_token(2, 0).unwrap();
        assert_eq!(barrier.token.alias, "INDENT");
    }

    #[test]
    fn try_get_returns_none_off_position() {
        let c = collection();
        assert!(c.try_get_barrier_token(3, 0).is_none());
    }

    #[test]
    fn next_barrier_position_scans_forward() {
        let c = collection();
        assert_eq!(c.next_barrier_position(0, 0), Some(2));
        assert_eq!(c.next_barrier_position(3, 0), Some(5));
        assert_eq!(c.next_barrier_position(6, 0), None);
    }

    #[test]
    fn passed_barriers_skips_consumed_ones() {
        let c = collection();
        // index 0 = INDENT@2, index 1/2 = DEDENT@5 (two barriers, same position).
        assert_eq!(c.next_barrier_position(0, 1), Some(5));
        assert!(c.try_get_barrier_token(2, 1).is_none());
        assert!(c.try_get_barrier_token(5, 1).is_some());
    }
}
