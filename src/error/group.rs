//! Error grouping (§4.6): folding the raw `ParsingError` log into one
//! diagnostic block per `(position, passed_barriers)`.

use itertools::Itertools;

use crate::barrier::BarrierTokenCollection;
use crate::element::ElementId;

use super::parsing_error::ParsingError;

/// One expected element at an error position, deduplicated by id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExpectedElement {
    pub element_id: ElementId,
    pub is_token: bool,
}

/// What made the character at the error position "unexpected".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unexpected {
    Character(char),
    EndOfInput,
    /// A barrier token sits exactly at the error position; its alias is
    /// reported alongside the character per §6's combined message form.
    Barrier { alias: String, character: Option<char> },
}

/// One error group: all failures recorded at the same `(position,
/// passed_barriers)` pair, deduplicated and summarized for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorGroup {
    pub position: usize,
    pub passed_barriers: u32,
    pub expected: Vec<ExpectedElement>,
    pub messages: Vec<String>,
    pub line: usize,
    pub column: usize,
    pub unexpected: Unexpected,
    /// The first stack trace recorded among this group's failures, if
    /// stack-trace writing was enabled (§4.7). Failures within one group
    /// can come from different alternatives tried at the same position;
    /// rather than merge their traces, we surface one representative path.
    pub stack_trace: Option<Vec<ElementId>>,
}

/// An error group is *relevant* (§4.6) iff no successful parse started at
/// its position.
pub fn is_relevant(group: &ErrorGroup, success_positions: &crate::context::BitSet) -> bool {
    !success_positions.get(group.position)
}

/// 1-based (line, column) of `position` within `units`. `tab_size` only
/// affects the *visual* column variant (§6); the plain column counts every
/// unit, tabs included, as one.
pub fn line_column(units: &[u16], position: usize, tab_size: usize, visual: bool) -> (usize, usize) {
    let mut line = 1usize;
    let mut column = 1usize;
    let limit = position.min(units.len());
    for &unit in &units[..limit] {
        if unit == b'\n' as u16 {
            line += 1;
            column = 1;
        } else if visual && unit == b'\t' as u16 {
            column += tab_size;
        } else {
            column += 1;
        }
    }
    (line, column)
}

fn current_line_text(units: &[u16], position: usize) -> String {
    let limit = position.min(units.len());
    let line_start = units[..limit].iter().rposition(|&u| u == b'\n' as u16).map_or(0, |i| i + 1);
    let line_end = units[limit..]
        .iter()
        .position(|&u| u == b'\n' as u16)
        .map_or(units.len(), |i| limit + i);
    String::from_utf16_lossy(&units[line_start..line_end])
}

/// Fold every recorded error at the furthest position into one
/// `ErrorGroup`, further split by `passed_barriers` since two errors at the
/// same textual position but different barrier counts describe distinct
/// parse states.
pub fn build_groups(
    errors: &[ParsingError],
    units: &[u16],
    barriers: &BarrierTokenCollection,
    tab_size: usize,
) -> Vec<ErrorGroup> {
    errors
        .iter()
        .into_group_map_by(|error| (error.position, error.passed_barriers))
        .into_iter()
        .sorted_by_key(|(key, _)| *key)
        .map(|((position, passed_barriers), group)| {
            let expected = group
                .iter()
                .map(|error| ExpectedElement { element_id: error.element_id, is_token: error.is_token })
                .sorted()
                .dedup()
                .collect();
            let messages = group.iter().filter_map(|error| error.message.clone()).sorted().dedup().collect();
            let (line, column) = line_column(units, position, tab_size, false);
            let unexpected = describe_unexpected(units, barriers, position, passed_barriers);
            let stack_trace = group.iter().find_map(|error| error.stack_trace.clone());
            ErrorGroup { position, passed_barriers, expected, messages, line, column, unexpected, stack_trace }
        })
        .collect()
}

fn describe_unexpected(
    units: &[u16],
    barriers: &BarrierTokenCollection,
    position: usize,
    passed_barriers: u32,
) -> Unexpected {
    let character = crate::utf16::decode_char_at(units, position).map(|(c, _)| c);
    if let Some(barrier) = barriers.try_get_barrier_token(position, passed_barriers) {
        return Unexpected::Barrier { alias: barrier.token.alias.clone(), character };
    }
    match character {
        Some(c) => Unexpected::Character(c),
        None => Unexpected::EndOfInput,
    }
}

pub fn line_text_at(units: &[u16], position: usize) -> String {
    current_line_text(units, position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(position: usize, element_id: ElementId, message: Option<&str>) -> ParsingError {
        ParsingError { position, passed_barriers: 0, message: message.map(String::from), element_id, is_token: true, stack_trace: None }
    }

    #[test]
    fn groups_deduplicate_expected_elements() {
        let units: Vec<u16> = "abc".encode_utf16().collect();
        let errors = vec![err(1, 1, Some("expected b")), err(1, 1, Some("expected b"))];
        let barriers = BarrierTokenCollection::build(vec![], units.len());
        let groups = build_groups(&errors, &units, &barriers, 4);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].expected.len(), 1);
        assert_eq!(groups[0].messages.len(), 1);
    }

    #[test]
    fn line_column_tracks_newlines() {
        let units: Vec<u16> = "ab\ncd".encode_utf16().collect();
        assert_eq!(line_column(&units, 0, 4, false), (1, 1));
        assert_eq!(line_column(&units, 4, 4, false), (2, 2));
    }

    #[test]
    fn tab_size_only_affects_visual_column() {
        let units: Vec<u16> = "\tx".encode_utf16().collect();
        assert_eq!(line_column(&units, 1, 4, false), (1, 2));
        assert_eq!(line_column(&units, 1, 4, true), (1, 5));
    }

    #[test]
    fn end_of_input_has_no_character() {
        let units: Vec<u16> = "ab".encode_utf16().collect();
        let barriers = BarrierTokenCollection::build(vec![], units.len());
        assert_eq!(describe_unexpected(&units, &barriers, 2, 0), Unexpected::EndOfInput);
    }
}
