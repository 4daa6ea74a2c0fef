// File: src/acoustic/transitions.rs
use crate::acoustic::phones::PhoneLookup;
use crate::core::types::TransitionId;
use crate::error::{DecoderError, Result};
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Key reserved for the input-epsilon transition.
pub const EPSILON_KEY: &str = "<eps>";

/// Acoustic unit behind a transition id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionUnit {
    /// Consumes no frame and has no pdf.
    Epsilon,
    Unit { phone: String, hmm_state: u32, pdf: u32 },
}

impl TransitionUnit {
    pub fn pdf(&self) -> Option<u32> {
        match self {
            TransitionUnit::Epsilon => None,
            TransitionUnit::Unit { pdf, .. } => Some(*pdf),
        }
    }

    /// Parses `<phone>_<hmmState>_<pdf>`. The phone itself may contain
    /// underscores, so the key is split from the right.
    fn parse_key(key: &str) -> std::result::Result<Self, String> {
        if key == EPSILON_KEY {
            return Ok(TransitionUnit::Epsilon);
        }
        let mut parts = key.rsplitn(3, '_');
        let (Some(pdf), Some(hmm_state), Some(phone)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("key '{key}' is not <phone>_<hmmState>_<pdf>"));
        };
        if phone.is_empty() {
            return Err(format!("key '{key}' has an empty phone"));
        }
        Ok(TransitionUnit::Unit {
            phone: phone.to_string(),
            hmm_state: hmm_state.parse().map_err(|e| format!("bad hmm state in '{key}': {e}"))?,
            pdf: pdf.parse().map_err(|e| format!("bad pdf index in '{key}': {e}"))?,
        })
    }
}

/// Maps transition ids (the input labels of the graph) to phone, HMM state
/// and pdf. Ids may be sparse.
#[derive(Debug, Default)]
pub struct TransitionModel {
    units: FxHashMap<TransitionId, TransitionUnit>,
    by_key: HashMap<String, TransitionId>,
    max_pdf: Option<u32>,
}

impl TransitionModel {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Self::from_reader(reader, &path.display().to_string())
    }

    /// Reads `key<TAB>transition_id` lines.
    pub fn from_reader<R: BufRead>(reader: R, origin: &str) -> Result<Self> {
        let mut model = TransitionModel::default();
        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = line_number + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let (key, index) = match tokens.as_slice() {
                [] => continue,
                [key, index] => (*key, *index),
                _ => {
                    return Err(DecoderError::malformed_line(
                        origin,
                        line_number,
                        "expected '<key> <index>'",
                    ))
                }
            };
            let malformed =
                |reason: String| DecoderError::malformed_line(origin, line_number, reason);
            let index: i64 = index
                .parse()
                .map_err(|e| malformed(format!("bad index '{index}': {e}")))?;
            let id = TransitionId::try_from(index)
                .map_err(|_| malformed(format!("index {index} is not a valid transition id")))?;
            let unit = TransitionUnit::parse_key(key).map_err(&malformed)?;

            if model.by_key.contains_key(key) {
                return Err(malformed(format!("duplicated key '{key}'")));
            }
            if model.units.contains_key(&id) {
                return Err(malformed(format!("duplicated index {id}")));
            }
            model.max_pdf = model.max_pdf.max(unit.pdf());
            model.units.insert(id, unit);
            model.by_key.insert(key.to_string(), id);
        }
        Ok(model)
    }

    pub fn unit(&self, transition_id: TransitionId) -> Option<&TransitionUnit> {
        self.units.get(&transition_id)
    }

    pub fn pdf(&self, transition_id: TransitionId) -> Option<u32> {
        self.unit(transition_id)?.pdf()
    }

    pub fn transition_id(&self, key: &str) -> Option<TransitionId> {
        self.by_key.get(key).copied()
    }

    /// Phone inventory index of the unit behind `transition_id`.
    pub fn phone_index(&self, transition_id: TransitionId, phones: &PhoneLookup) -> Option<u32> {
        match self.unit(transition_id)? {
            TransitionUnit::Epsilon => None,
            TransitionUnit::Unit { phone, .. } => phones.index(phone),
        }
    }

    /// Largest pdf index referenced, `None` if only epsilon is defined.
    pub fn max_pdf(&self) -> Option<u32> {
        self.max_pdf
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "<eps>\t0\nAA_B_1_7\t1\nSIL_0_2\t2\nSIL_1_3\t3\n";

    #[test]
    fn parses_keys_from_the_right() {
        let model = TransitionModel::from_reader(TABLE.as_bytes(), "tids").unwrap();
        assert_eq!(model.len(), 4);
        assert_eq!(model.unit(0), Some(&TransitionUnit::Epsilon));
        assert_eq!(model.pdf(0), None);
        assert_eq!(
            model.unit(1),
            Some(&TransitionUnit::Unit { phone: "AA_B".into(), hmm_state: 1, pdf: 7 })
        );
        assert_eq!(model.pdf(3), Some(3));
        assert_eq!(model.max_pdf(), Some(7));
        assert_eq!(model.transition_id("SIL_0_2"), Some(2));
        assert_eq!(model.unit(9), None);
    }

    #[test]
    fn resolves_phone_indices() {
        let model = TransitionModel::from_reader(TABLE.as_bytes(), "tids").unwrap();
        let phones = PhoneLookup::from_reader("<eps>\nSIL\nAA_B\n".as_bytes(), "phones").unwrap();
        assert_eq!(model.phone_index(1, &phones), Some(2));
        assert_eq!(model.phone_index(2, &phones), Some(1));
        assert_eq!(model.phone_index(0, &phones), None);
    }

    #[test]
    fn sparse_ids_do_not_allocate_a_dense_table() {
        let table = "<eps>\t0\nA_0_0\t4000000000\n";
        let model = TransitionModel::from_reader(table.as_bytes(), "tids").unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.pdf(4_000_000_000), Some(0));
        assert_eq!(model.unit(1), None);
    }

    #[test]
    fn malformed_tables_rejected() {
        for table in [
            "AA_1_2\t1\nBB_1_2\t1\n",
            "AA_1_2\t1\nAA_1_2\t2\n",
            "AA_1_2\t-4\n",
            "AA_2\t1\n",
            "AA_x_2\t1\n",
            "AA_1_2\t1\textra\n",
        ] {
            assert!(
                matches!(
                    TransitionModel::from_reader(table.as_bytes(), "tids"),
                    Err(DecoderError::Malformed(_))
                ),
                "accepted {table:?}"
            );
        }
    }
}
