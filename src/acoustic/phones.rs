// File: src/acoustic/phones.rs
use crate::error::{DecoderError, Result, ResultExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One entry of the phone inventory with its class flags derived from the symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phone {
    pub symbol: String,
    pub index: u32,
    pub silence: bool,
    pub filler: bool,
    pub non_speech: bool,
}

impl Phone {
    pub fn classify(symbol: &str, index: u32) -> Self {
        let filler = symbol.contains('+') || symbol.contains('%');
        let silence = symbol.eq_ignore_ascii_case("SIL");
        let non_speech = filler || silence || symbol.contains('<') || symbol.contains('#');
        Self { symbol: symbol.to_string(), index, silence, filler, non_speech }
    }
}

/// Phone inventory addressable by index and by symbol.
#[derive(Debug, Default)]
pub struct PhoneLookup {
    by_index: HashMap<u32, Phone>,
    by_symbol: HashMap<String, u32>,
}

impl PhoneLookup {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Self::from_reader(reader, &path.display().to_string())
    }

    /// One symbol per line. The index is the position among non-blank lines
    /// unless a second column gives it explicitly.
    pub fn from_reader<R: BufRead>(reader: R, origin: &str) -> Result<Self> {
        let mut lookup = PhoneLookup::default();
        let mut implicit_index: u32 = 0;
        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let line_number = line_number + 1;
            let (symbol, index) = match tokens.as_slice() {
                [] => continue,
                [symbol] => (*symbol, implicit_index),
                [symbol, index] => {
                    let index = index
                        .parse::<u32>()
                        .malformed(&format!("{origin}:{line_number}: bad phone index '{index}'"))?;
                    (*symbol, index)
                }
                _ => {
                    return Err(DecoderError::malformed_line(
                        origin,
                        line_number,
                        "expected a phone symbol and an optional index",
                    ))
                }
            };
            implicit_index += 1;

            if lookup.by_symbol.contains_key(symbol) {
                let reason = format!("duplicated phone '{symbol}'");
                return Err(DecoderError::malformed_line(origin, line_number, reason));
            }
            if lookup.by_index.contains_key(&index) {
                let reason = format!("duplicated phone index {index}");
                return Err(DecoderError::malformed_line(origin, line_number, reason));
            }
            lookup.by_symbol.insert(symbol.to_string(), index);
            lookup.by_index.insert(index, Phone::classify(symbol, index));
        }
        Ok(lookup)
    }

    pub fn phone(&self, index: u32) -> Option<&Phone> {
        self.by_index.get(&index)
    }

    pub fn index(&self, symbol: &str) -> Option<u32> {
        self.by_symbol.get(symbol).copied()
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&Phone> {
        self.index(symbol).and_then(|index| self.phone(index))
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_by_symbol() {
        let sil = Phone::classify("sil", 0);
        assert!(sil.silence && sil.non_speech && !sil.filler);

        let noise = Phone::classify("+BREATH+", 1);
        assert!(noise.filler && noise.non_speech && !noise.silence);

        let percent = Phone::classify("%hes", 2);
        assert!(percent.filler);

        let eps = Phone::classify("<eps>", 3);
        assert!(eps.non_speech && !eps.filler && !eps.silence);

        let disambig = Phone::classify("#1", 4);
        assert!(disambig.non_speech);

        let speech = Phone::classify("AA_B", 5);
        assert!(!speech.non_speech && !speech.silence && !speech.filler);
    }

    #[test]
    fn implicit_and_explicit_indices() {
        let lookup = PhoneLookup::from_reader("<eps>\nSIL\n\nAA\n".as_bytes(), "phones").unwrap();
        assert_eq!(lookup.len(), 3);
        assert_eq!(lookup.index("AA"), Some(2));
        assert!(lookup.phone(1).unwrap().silence);

        let explicit = PhoneLookup::from_reader("<eps> 0\nSIL 5\n".as_bytes(), "phones").unwrap();
        assert_eq!(explicit.by_symbol("SIL").unwrap().index, 5);
    }

    #[test]
    fn duplicates_rejected() {
        assert!(matches!(
            PhoneLookup::from_reader("AA\nAA\n".as_bytes(), "phones"),
            Err(DecoderError::Malformed(_))
        ));
        assert!(matches!(
            PhoneLookup::from_reader("AA 1\nBB 1\n".as_bytes(), "phones"),
            Err(DecoderError::Malformed(_))
        ));
        assert!(matches!(
            PhoneLookup::from_reader("AA -1\n".as_bytes(), "phones"),
            Err(DecoderError::Malformed(_))
        ));
    }
}
