//! Line grammar: splits one physical line into optional
//! labels, an optional mnemonic (instruction or directive), and its operand
//! strings. Comments and quoted strings are handled with a small amount of
//! manual scanning rather than one monolithic regex, since commas and `;`
//! inside a quoted operand must not split the line.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::{CodePosition, CodePositionInterval, PositionedString};
use crate::error::{CompileError, CompileErrorKind, Severity};

static LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*:").unwrap());
static MNEMONIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\.?[A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// One physical line's parse: the labels attached to it (if any) and the
/// instruction/directive it carries (if any). A line may be label-only,
/// in which case `mnemonic` is `None` and the labels attach to whatever
/// operation follows on a later line.
#[derive(Clone, Debug)]
pub struct Line {
    pub labels: Vec<String>,
    pub mnemonic: Option<PositionedString>,
    pub operands: Vec<PositionedString>,
    pub interval: CodePositionInterval,
}

fn strip_comment(text: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in text.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == ';' && !in_quotes {
            return &text[..i];
        }
    }
    text
}

fn split_operands(text: &str, line: usize) -> Vec<PositionedString> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in text.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            current.push(c);
        } else if c == ',' && !in_quotes {
            if !current.trim().is_empty() {
                result.push(PositionedString::new(current.trim().to_string(), CodePositionInterval::at_line(line)));
            }
            current = String::new();
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() {
        result.push(PositionedString::new(current.trim().to_string(), CodePositionInterval::at_line(line)));
    }
    result
}

pub struct LineLexer;

impl LineLexer {
    /// Lex one physical line. Returns `Ok(None)` for a blank or
    /// comment-only line with no labels.
    pub fn lex_line(line_number: usize, raw: &str) -> Result<Option<Line>, CompileError> {
        let without_comment = strip_comment(raw);
        let mut remainder = without_comment;
        let mut labels = Vec::new();

        while let Some(caps) = LABEL_RE.captures(remainder) {
            let whole = caps.get(0).unwrap();
            labels.push(caps[1].to_string());
            remainder = &remainder[whole.end()..];
        }

        let trimmed = remainder.trim();
        if trimmed.is_empty() {
            if labels.is_empty() {
                return Ok(None);
            }
            return Ok(Some(Line {
                labels,
                mnemonic: None,
                operands: Vec::new(),
                interval: CodePositionInterval::at_line(line_number),
            }));
        }

        let caps = MNEMONIC_RE.captures(remainder).ok_or_else(|| {
            CompileError::at(
                CompileErrorKind::Syntax(format!("line does not match the grammar: {:?}", trimmed)),
                Severity::Error,
                CodePositionInterval::at_line(line_number),
            )
        })?;
        let whole = caps.get(0).unwrap();
        let mnemonic_text = caps[1].to_string();
        let rest = &remainder[whole.end()..];

        let column = whole.start();
        let mnemonic = PositionedString::new(
            mnemonic_text,
            CodePositionInterval::new(
                CodePosition::new(line_number, column),
                CodePosition::new(line_number, whole.end()),
            ),
        );

        let operands = split_operands(rest, line_number);

        Ok(Some(Line {
            labels,
            mnemonic: Some(mnemonic),
            operands,
            interval: CodePositionInterval::at_line(line_number),
        }))
    }

    /// Lex a whole source file, one call per non-empty physical line.
    pub fn lex_source(source: &str) -> (Vec<Line>, Vec<CompileError>) {
        let mut lines = Vec::new();
        let mut errors = Vec::new();
        for (i, raw) in source.lines().enumerate() {
            match Self::lex_line(i + 1, raw) {
                Ok(Some(line)) => lines.push(line),
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }
        (lines, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_comment_only_lines_are_skipped() {
        assert!(LineLexer::lex_line(1, "").unwrap().is_none());
        assert!(LineLexer::lex_line(1, "   ; just a comment").unwrap().is_none());
    }

    #[test]
    fn parses_plain_instruction() {
        let line = LineLexer::lex_line(1, "  add x1, x2, x3").unwrap().unwrap();
        assert_eq!(line.mnemonic.unwrap().text(), "add");
        assert_eq!(line.operands.len(), 3);
        assert_eq!(line.operands[0].text(), "x1");
    }

    #[test]
    fn parses_label_and_instruction_together() {
        let line = LineLexer::lex_line(1, "loop: addi x1, x1, -1").unwrap().unwrap();
        assert_eq!(line.labels, vec!["loop".to_string()]);
        assert_eq!(line.mnemonic.unwrap().text(), "addi");
    }

    #[test]
    fn parses_multiple_labels_on_one_line() {
        let line = LineLexer::lex_line(1, "a: b: nop").unwrap().unwrap();
        assert_eq!(line.labels, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn label_only_line_has_no_mnemonic() {
        let line = LineLexer::lex_line(1, "done:").unwrap().unwrap();
        assert_eq!(line.labels, vec!["done".to_string()]);
        assert!(line.mnemonic.is_none());
    }

    #[test]
    fn strips_trailing_comment() {
        let line = LineLexer::lex_line(1, "add x1, x2, x3 ; sum it up").unwrap().unwrap();
        assert_eq!(line.operands.len(), 3);
    }

    #[test]
    fn keeps_semicolon_inside_quoted_operand() {
        let line = LineLexer::lex_line(1, ".ascii \"a;b\"").unwrap().unwrap();
        assert_eq!(line.operands[0].text(), "\"a;b\"");
    }

    #[test]
    fn directive_mnemonic_keeps_leading_dot() {
        let line = LineLexer::lex_line(1, ".word 42").unwrap().unwrap();
        assert_eq!(line.mnemonic.unwrap().text(), ".word");
    }

    #[test]
    fn splits_operands_respecting_quoted_commas() {
        let line = LineLexer::lex_line(1, ".ascii \"a,b\", 1").unwrap().unwrap();
        assert_eq!(line.operands.len(), 2);
        assert_eq!(line.operands[0].text(), "\"a,b\"");
        assert_eq!(line.operands[1].text(), "1");
    }
}
