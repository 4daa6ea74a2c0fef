// File: src/error.rs
use crate::core::types::{StateId, TransitionId};

/// Errors raised while loading models or decoding an utterance.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    /// A text table or binary file did not have the expected shape.
    /// Loading stops at the first bad line; nothing partial is returned.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// A configuration value was rejected at construction time.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The active list slot search found no slot although the table is resized
    /// before it can fill up. This is a bug, not a data problem.
    #[error("active list capacity invariant violated (capacity {capacity}, size {size})")]
    CapacityInvariant { capacity: usize, size: usize },

    /// Every hypothesis was pruned away.
    #[error("beam became empty at frame {frame}")]
    EmptyBeam { frame: usize },

    /// No surviving hypothesis sits in a final state.
    #[error("no final state reached after {frames} frames")]
    NoFinalState { frames: usize },

    #[error("state {0} is outside the transition store")]
    UnknownState(StateId),

    #[error("transition id {0} is not in the transition model")]
    UnknownTransition(TransitionId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("binary codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DecoderError>;

impl DecoderError {
    /// Builds a [`DecoderError::Malformed`] pointing at a line of a named input.
    pub fn malformed_line(
        origin: &str,
        line_number: usize,
        reason: impl std::fmt::Display,
    ) -> Self {
        DecoderError::Malformed(format!("{origin}:{line_number}: {reason}"))
    }
}

/// Extension trait to reduce `.map_err()` boilerplate when a parse failure
/// should surface as [`DecoderError::Malformed`].
pub trait ResultExt<T> {
    /// Wrap the error as [`DecoderError::Malformed`] with `context` prefix.
    fn malformed(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn malformed(self, context: &str) -> Result<T> {
        self.map_err(|e| DecoderError::Malformed(format!("{context}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_line_mentions_origin_and_line() {
        let e = DecoderError::malformed_line("words.txt", 7, "duplicated word");
        assert_eq!(e.to_string(), "malformed input: words.txt:7: duplicated word");
    }

    #[test]
    fn result_ext_wraps_parse_error() {
        let parsed: std::result::Result<u32, _> = "x1".parse::<u32>();
        let mapped = parsed.malformed("phones.txt:3");
        assert!(matches!(
            mapped,
            Err(DecoderError::Malformed(s)) if s.starts_with("phones.txt:3: ")
        ));
    }

    #[test]
    fn result_ext_ok_passthrough() {
        let ok: std::result::Result<i32, &str> = Ok(42);
        assert_eq!(ok.malformed("ctx").unwrap(), 42);
    }

    #[test]
    fn io_error_converts() {
        fn open() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(DecoderError::Io(_))));
    }
}
