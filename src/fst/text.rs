// File: src/fst/text.rs
//! Line parser for the human-readable WFST table.
//!
//! Every line starts with a source state. Depending on how many columns
//! follow, the line is a final state (`state` or `state weight`) or an arc
//! (`state target transition_id word_id` with an optional trailing weight).

use crate::core::types::{StateId, Transition};
use crate::error::{DecoderError, Result};
use std::fmt::Display;
use std::str::FromStr;

/// One non-empty line of a text WFST.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FstLine {
    Final { state: StateId, weight: f32 },
    Arc(Transition),
}

impl FstLine {
    pub fn state(&self) -> StateId {
        match self {
            FstLine::Final { state, .. } => *state,
            FstLine::Arc(transition) => transition.source,
        }
    }
}

fn field<T>(token: &str, name: &str) -> std::result::Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    token.parse::<T>().map_err(|e| format!("bad {name} '{token}': {e}"))
}

/// Parses one line. Returns `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> std::result::Result<Option<FstLine>, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let parsed = match tokens.as_slice() {
        [] => return Ok(None),
        [state] => FstLine::Final { state: field(state, "state")?, weight: 0.0 },
        [state, weight] => FstLine::Final {
            state: field(state, "state")?,
            weight: field(weight, "final weight")?,
        },
        [source, target, transition_id, word_id, rest @ ..] if rest.len() <= 1 => {
            let weight = match rest.first() {
                Some(weight) => field(weight, "weight")?,
                None => 0.0,
            };
            FstLine::Arc(Transition {
                source: field(source, "state")?,
                target: field(target, "target state")?,
                transition_id: field(transition_id, "transition id")?,
                word_id: field(word_id, "word id")?,
                weight,
            })
        }
        other => return Err(format!("cannot identify line with {} columns", other.len())),
    };
    Ok(Some(parsed))
}

/// Parses `line` and attaches `origin:line_number` to any failure.
pub fn parse_numbered_line(
    origin: &str,
    line_number: usize,
    line: &str,
) -> Result<Option<FstLine>> {
    parse_line(line).map_err(|reason| DecoderError::malformed_line(origin, line_number, reason))
}

/// Renders a line in the same column layout the parser accepts.
pub fn format_line(line: &FstLine) -> String {
    match line {
        FstLine::Final { state, weight } => format!("{state}\t{weight}"),
        FstLine::Arc(t) => format!(
            "{}\t{}\t{}\t{}\t{}",
            t.source, t.target, t.transition_id, t.word_id, t.weight
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_line_shape() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("  \t ").unwrap(), None);
        assert_eq!(parse_line("7").unwrap(), Some(FstLine::Final { state: 7, weight: 0.0 }));
        assert_eq!(parse_line("7\t1.5").unwrap(), Some(FstLine::Final { state: 7, weight: 1.5 }));

        let arc = parse_line("0\t1\t12\t3").unwrap().unwrap();
        assert_eq!(
            arc,
            FstLine::Arc(Transition {
                source: 0,
                target: 1,
                transition_id: 12,
                word_id: 3,
                weight: 0.0,
            })
        );

        let weighted = parse_line("0\t1\t12\t3\t-0.25").unwrap().unwrap();
        assert!(matches!(weighted, FstLine::Arc(t) if t.weight == -0.25));
    }

    #[test]
    fn rejects_unexpected_column_counts() {
        assert!(parse_line("0 1 2").is_err());
        assert!(parse_line("0 1 2 3 4 5").is_err());
    }

    #[test]
    fn rejects_negative_and_non_numeric_ids() {
        assert!(parse_line("-1 2 3 4").is_err());
        assert!(parse_line("0 x 3 4").is_err());
        assert!(parse_line("0 1.5").is_ok());
        assert!(parse_line("0 abc").is_err());
    }

    #[test]
    fn numbered_errors_name_the_line() {
        let err = parse_numbered_line("HCLG.txt", 42, "1 2 3").unwrap_err();
        assert!(err.to_string().contains("HCLG.txt:42"));
    }

    #[test]
    fn format_round_trips() {
        for text in ["3\t0.5", "0\t1\t12\t3\t-0.25"] {
            let line = parse_line(text).unwrap().unwrap();
            assert_eq!(parse_line(&format_line(&line)).unwrap().unwrap(), line);
        }
    }
}
