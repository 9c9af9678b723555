//! `ParserDiagnostic`: the error type `parse()` returns on failure (§6
//! "Error text format", §7 "Propagation").

use std::fmt;

use super::group::{line_text_at, ErrorGroup, Unexpected};
use crate::settings::ErrorFormattingFlags;

/// One already-resolved expected element, ready for display (alias
/// resolved from the element id at construction time, not deferred).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpectedDisplay {
    pub label: String,
    pub is_token: bool,
}

/// A fully resolved, display-ready error group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayedGroup {
    pub position: usize,
    pub line: usize,
    pub column: usize,
    pub line_text: String,
    pub messages: Vec<String>,
    pub expected: Vec<ExpectedDisplay>,
    pub unexpected: Unexpected,
    pub stack_trace: Option<Vec<String>>,
}

impl DisplayedGroup {
    pub fn from_group(
        group: &ErrorGroup,
        units: &[u16],
        resolve_alias: impl Fn(u32, bool) -> Option<String>,
    ) -> Self {
        let expected = group
            .expected
            .iter()
            .map(|e| ExpectedDisplay {
                label: resolve_alias(e.element_id, e.is_token).unwrap_or_else(|| format!("element#{}", e.element_id)),
                is_token: e.is_token,
            })
            .collect();

        // Stack frames are always rule frames (only `engine.rs` pushes
        // them), so every id here resolves against the rule alias table.
        let stack_trace = group.stack_trace.as_ref().map(|frames| {
            frames
                .iter()
                .map(|&id| resolve_alias(id, false).unwrap_or_else(|| format!("rule#{id}")))
                .collect()
        });

        DisplayedGroup {
            position: group.position,
            line: group.line,
            column: group.column,
            line_text: line_text_at(units, group.position),
            messages: group.messages.clone(),
            expected,
            unexpected: group.unexpected.clone(),
            stack_trace,
        }
    }
}

/// The diagnostic exception a failing `parse()` constructs from the
/// grouped errors (§7 "Propagation"). `try_parse` never produces one for
/// ordinary match failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParserDiagnostic {
    pub groups: Vec<DisplayedGroup>,
    pub flags: ErrorFormattingFlags,
}

impl ParserDiagnostic {
    pub fn furthest_position(&self) -> Option<usize> {
        self.groups.first().map(|g| g.position)
    }
}

impl std::error::Error for ParserDiagnostic {}

impl fmt::Display for ParserDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write_group(f, group, self.flags)?;
        }
        Ok(())
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, group: &DisplayedGroup, flags: ErrorFormattingFlags) -> fmt::Result {
    if flags.has(ErrorFormattingFlags::DISPLAY_MESSAGES) && !group.messages.is_empty() {
        writeln!(f, "{}", group.messages.join(" / "))?;
        writeln!(f)?;
    }

    writeln!(f, "The line where the error occurred:")?;
    writeln!(f, "{}", group.line_text)?;

    let caret_column = group.column.saturating_sub(1);
    let short_line = group.line_text.chars().count() < caret_column;
    if short_line {
        let pointer = format!("line {}, column {}", group.line, group.column);
        let pad = caret_column.saturating_sub(pointer.len() + 2);
        writeln!(f, "{}{} ^", " ".repeat(pad), pointer)?;
    } else {
        writeln!(f, "{}^ line {}, column {}", " ".repeat(caret_column), group.line, group.column)?;
    }
    writeln!(f)?;

    let unexpected_line = match &group.unexpected {
        Unexpected::Character(c) => format!("'{c}' is unexpected character"),
        Unexpected::EndOfInput => "end of file is unexpected".to_string(),
        Unexpected::Barrier { alias, character: Some(c) } => {
            format!("'{alias}' is unexpected barrier token or '{c}' is unexpected character")
        }
        Unexpected::Barrier { alias, character: None } => {
            format!("'{alias}' is unexpected barrier token")
        }
    };

    let named_only = flags.has(ErrorFormattingFlags::ONLY_NAMED_ELEMENTS);
    let display_rules = flags.has(ErrorFormattingFlags::DISPLAY_RULES);
    let expected: Vec<&ExpectedDisplay> = group
        .expected
        .iter()
        .filter(|e| !named_only || !e.label.starts_with("element#"))
        .filter(|e| display_rules || e.is_token)
        .collect();

    if expected.is_empty() {
        writeln!(f, "{unexpected_line}, expected: <nothing>")?;
    } else if expected.len() == 1 {
        writeln!(f, "{unexpected_line}, expected:")?;
        writeln!(f, "  {}", expected[0].label)?;
    } else {
        writeln!(f, "{unexpected_line}, expected one of:")?;
        for e in &expected {
            writeln!(f, "  {}", e.label)?;
        }
    }

    if let Some(stack) = &group.stack_trace {
        writeln!(f)?;
        writeln!(f, "Stack trace (most recent call first):")?;
        for frame in stack {
            writeln!(f, "  {frame}")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_group() -> DisplayedGroup {
        DisplayedGroup {
            position: 4,
            line: 1,
            column: 5,
            line_text: "1 + x".to_string(),
            messages: vec!["expected a digit".to_string()],
            expected: vec![ExpectedDisplay { label: "Digit".to_string(), is_token: true }],
            unexpected: Unexpected::Character('x'),
            stack_trace: None,
        }
    }

    #[test]
    fn display_includes_message_and_caret() {
        let diag = ParserDiagnostic { groups: vec![sample_group()], flags: ErrorFormattingFlags::default().with(ErrorFormattingFlags::DISPLAY_MESSAGES) };
        let text = diag.to_string();
        assert!(text.contains("expected a digit"));
        assert!(text.contains("line 1, column 5"));
        assert!(text.contains("'x' is unexpected character"));
        assert!(text.contains("Digit"));
    }

    #[test]
    fn barrier_unexpected_combines_alias_and_character() {
        let mut group = sample_group();
        group.unexpected = Unexpected::Barrier { alias: "DEDENT".to_string(), character: Some('x') };
        let diag = ParserDiagnostic { groups: vec![group], flags: ErrorFormattingFlags::default() };
        let text = diag.to_string();
        assert!(text.contains("'DEDENT' is unexpected barrier token or 'x' is unexpected character"));
    }
}
