// src/lexicon.rs
use crate::core::types::WordId;
use crate::error::{DecoderError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Output vocabulary of the graph: word strings and their label ids.
#[derive(Debug, Default)]
pub struct WordLexicon {
    by_word: HashMap<String, WordId>,
    by_index: HashMap<WordId, String>,
}

impl WordLexicon {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Self::from_reader(reader, &path.display().to_string())
    }

    /// Reads `word index` lines. The first space separates the word from the
    /// index, so the index column is everything after it.
    pub fn from_reader<R: BufRead>(reader: R, origin: &str) -> Result<Self> {
        let mut lexicon = WordLexicon::default();
        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = line_number + 1;
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            let malformed =
                |reason: String| DecoderError::malformed_line(origin, line_number, reason);
            let Some((word, index)) = line.split_once(' ') else {
                return Err(malformed("expected '<word> <index>'".into()));
            };
            let index = index.trim();
            let parsed: i64 = index
                .parse()
                .map_err(|e| malformed(format!("bad word index '{index}': {e}")))?;
            let id = WordId::try_from(parsed)
                .map_err(|_| malformed(format!("word index {parsed} is out of range")))?;

            if lexicon.by_word.contains_key(word) {
                return Err(malformed(format!("duplicated word '{word}'")));
            }
            if lexicon.by_index.contains_key(&id) {
                return Err(malformed(format!("duplicated word index {id}")));
            }
            lexicon.by_word.insert(word.to_string(), id);
            lexicon.by_index.insert(id, word.to_string());
        }
        Ok(lexicon)
    }

    pub fn index(&self, word: &str) -> Option<WordId> {
        self.by_word.get(word).copied()
    }

    pub fn word(&self, index: WordId) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    /// Words for a label sequence. Labels missing from the lexicon come back
    /// as `<unk:N>`.
    pub fn resolve(&self, labels: &[WordId]) -> Vec<String> {
        labels
            .iter()
            .map(|&label| match self.word(label) {
                Some(word) => word.to_string(),
                None => format!("<unk:{label}>"),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_word.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_both_ways() {
        let table = "<eps> 0\nmerhaba 4\ndünya 9\n\n";
        let lexicon = WordLexicon::from_reader(table.as_bytes(), "words").unwrap();
        assert_eq!(lexicon.len(), 3);
        assert_eq!(lexicon.index("dünya"), Some(9));
        assert_eq!(lexicon.word(4), Some("merhaba"));
        assert_eq!(lexicon.word(5), None);
        assert_eq!(lexicon.resolve(&[4, 9, 12]), vec!["merhaba", "dünya", "<unk:12>"]);
    }

    #[test]
    fn malformed_lines_rejected() {
        for table in ["a 1\na 2\n", "a 1\nb 1\n", "a -3\n", "lonely\n", "a x\n"] {
            assert!(
                matches!(
                    WordLexicon::from_reader(table.as_bytes(), "words"),
                    Err(DecoderError::Malformed(_))
                ),
                "accepted {table:?}"
            );
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"hello 1\nworld 2\n").unwrap();
        let lexicon = WordLexicon::load(file.path()).unwrap();
        assert_eq!(lexicon.index("world"), Some(2));
    }
}
