//! Line-oriented tokenizer.
//!
//! The assembly language is strictly line-structured: a label may appear in
//! column 0, followed by a mnemonic and a comma-separated operand field.
//! `;` starts a comment. The assembler core only ever sees the tokenized
//! `Line` records produced here.

use miette::Result;

use crate::error;
use crate::symbol::{self, Span};

/// One token of a source line, borrowed from the source text.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token<'a> {
    pub text: &'a str,
    pub span: Span,
}

/// A tokenized source line. Label-only lines carry no mnemonic.
#[derive(Debug)]
pub struct Line<'a> {
    /// Zero-based source line number.
    pub index: usize,
    pub label: Option<Token<'a>>,
    pub mnemonic: Option<Token<'a>>,
    pub operands: Vec<Token<'a>>,
}

/// Tokenize a whole source file. Blank and comment-only lines are dropped.
pub fn tokenize(src: &str) -> Result<Vec<Line<'_>>> {
    let mut lines = Vec::new();
    let mut offs = 0;
    for (index, raw_full) in src.split('\n').enumerate() {
        let raw = raw_full.strip_suffix('\r').unwrap_or(raw_full);
        let content = match raw.find(';') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        if !content.trim().is_empty() {
            lines.push(analyze_line(src, content, offs, index)?);
        }
        offs += raw_full.len() + 1;
    }
    Ok(lines)
}

fn analyze_line<'a>(
    src: &'a str,
    content: &'a str,
    base: usize,
    index: usize,
) -> Result<Line<'a>> {
    // A field in column 0 is a label; an indented line has none.
    let has_label = !content.starts_with([' ', '\t']);
    let mut fields = fields_of(content, base).into_iter();

    let label = if has_label {
        let tok = fields.next().expect("non-blank line starts with a field");
        if !symbol::is_ident(tok.text) {
            return Err(error::lex_bad_label(tok.span, src));
        }
        Some(tok)
    } else {
        None
    };

    let mnemonic = fields.next();

    // Everything after the mnemonic is the operand field. It is re-split on
    // commas so that spacing after a comma does not break an operand apart.
    let rest: Vec<Token<'a>> = fields.collect();
    let operands = match (rest.first(), rest.last()) {
        (Some(first), Some(last)) => {
            let start = first.span.offs();
            split_operands(src, &src[start..last.span.end()], start)?
        }
        _ => Vec::new(),
    };

    Ok(Line { index, label, mnemonic, operands })
}

/// Split a line into whitespace-delimited fields with source spans.
fn fields_of<'a>(content: &'a str, base: usize) -> Vec<Token<'a>> {
    content
        .split_whitespace()
        .map(|text| {
            let offs = text.as_ptr() as usize - content.as_ptr() as usize;
            Token { text, span: Span::new(base + offs, text.len()) }
        })
        .collect()
}

fn split_operands<'a>(src: &'a str, region: &'a str, base: usize) -> Result<Vec<Token<'a>>> {
    let mut operands = Vec::new();
    let mut pos: usize = 0;
    for piece in region.split(',') {
        let text = piece.trim();
        if text.is_empty() {
            // Point at the comma that delimits the missing operand.
            let span = Span::new(base + pos.saturating_sub(1), 1);
            return Err(error::lex_empty_operand(span, src));
        }
        let lead = piece.len() - piece.trim_start().len();
        let span = Span::new(base + pos + lead, text.len());
        if text.chars().any(|c| c.is_whitespace()) {
            return Err(error::lex_malformed_operand(span, src));
        }
        operands.push(Token { text, span });
        pos += piece.len() + 1;
    }
    Ok(operands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(line: &'a Line) -> (Option<&'a str>, Option<&'a str>, Vec<&'a str>) {
        (
            line.label.map(|t| t.text),
            line.mnemonic.map(|t| t.text),
            line.operands.iter().map(|t| t.text).collect(),
        )
    }

    #[test]
    fn label_in_column_zero() {
        let lines = tokenize("LOOP LD GR1,A\n     RET").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(texts(&lines[0]), (Some("LOOP"), Some("LD"), vec!["GR1", "A"]));
        assert_eq!(texts(&lines[1]), (None, Some("RET"), vec![]));
    }

    #[test]
    fn label_only_line() {
        let lines = tokenize("DONE\n").unwrap();
        assert_eq!(texts(&lines[0]), (Some("DONE"), None, vec![]));
    }

    #[test]
    fn comments_and_blanks_dropped() {
        let lines = tokenize("; header\n\n  LD GR1,GR2 ; trailing\n").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].index, 2);
        assert_eq!(texts(&lines[0]), (None, Some("LD"), vec!["GR1", "GR2"]));
    }

    #[test]
    fn operands_allow_space_after_comma() {
        let lines = tokenize("  LAD GR1, BUF, GR2").unwrap();
        assert_eq!(texts(&lines[0]), (None, Some("LAD"), vec!["GR1", "BUF", "GR2"]));
    }

    #[test]
    fn operand_spans_point_into_source() {
        let src = "  JUMP  THERE";
        let lines = tokenize(src).unwrap();
        let tok = lines[0].operands[0];
        assert_eq!(&src[tok.span.offs()..tok.span.end()], "THERE");
    }

    #[test]
    fn empty_operand_rejected() {
        assert!(tokenize("  LD GR1,,GR2").is_err());
        assert!(tokenize("  LD GR1,").is_err());
    }

    #[test]
    fn operand_with_inner_space_rejected() {
        assert!(tokenize("  JUMP A B").is_err());
    }

    #[test]
    fn bad_label_rejected() {
        assert!(tokenize("2ND RET").is_err());
    }
}
