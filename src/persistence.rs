// File: src/persistence.rs
//! Binary layout of the transition store.
//!
//! A store directory holds two big-endian files:
//!
//! * `offsets.bin`: `i32` entry count N, then N `i32` values. Entry `s` is the
//!   index of the first record of state `s`.
//! * `data.bin`: `i32` record count T, then T records of 16 bytes each
//!   (`target i32`, `transition_id i32`, `word_id i32`, `weight f32`).
//!
//! Final-state lines travel in-band as records whose three integer fields are
//! all `-1`.

use crate::core::types::{StateId, Transition};
use crate::error::{DecoderError, Result, ResultExt};
use crate::fst::text::{parse_numbered_line, FstLine};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const OFFSETS_FILE: &str = "offsets.bin";
pub const DATA_FILE: &str = "data.bin";
/// Bytes per transition record.
pub const RECORD_SIZE: usize = 16;
const HEADER_SIZE: u64 = 4;
const FINAL_MARKER: i32 = -1;
const PROGRESS_INTERVAL: usize = 1_000_000;
const IO_BUFFER_SIZE: usize = 1 << 20;
const MAX_STATE_ID: StateId = i32::MAX as StateId;

/// Fixed-width, big-endian encoding shared by the writer and the reader.
pub(crate) fn codec() -> impl Options + Copy {
    bincode::DefaultOptions::new().with_fixint_encoding().with_big_endian()
}

/// On-disk form of one text line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct RawRecord {
    target: i32,
    transition_id: i32,
    word_id: i32,
    weight: f32,
}

fn to_i32(value: u64, what: &str) -> Result<i32> {
    i32::try_from(value).malformed(&format!("{what} {value} does not fit the 32-bit format"))
}

impl RawRecord {
    fn from_line(line: &FstLine) -> Result<Self> {
        Ok(match line {
            FstLine::Final { weight, .. } => RawRecord {
                target: FINAL_MARKER,
                transition_id: FINAL_MARKER,
                word_id: FINAL_MARKER,
                weight: *weight,
            },
            FstLine::Arc(t) => RawRecord {
                target: to_i32(t.target.into(), "target state")?,
                transition_id: to_i32(t.transition_id.into(), "transition id")?,
                word_id: to_i32(t.word_id.into(), "word id")?,
                weight: t.weight,
            },
        })
    }

    /// Rebuilds the text line this record came from.
    pub(crate) fn into_line(self, source: StateId) -> Result<FstLine> {
        if self.target == FINAL_MARKER
            && self.transition_id == FINAL_MARKER
            && self.word_id == FINAL_MARKER
        {
            return Ok(FstLine::Final { state: source, weight: self.weight });
        }
        let field = |value: i32, what: &str| {
            u32::try_from(value).malformed(&format!("record of state {source} has {what} {value}"))
        };
        Ok(FstLine::Arc(Transition {
            source,
            target: field(self.target, "target state")?,
            transition_id: field(self.transition_id, "transition id")?,
            word_id: field(self.word_id, "word id")?,
            weight: self.weight,
        }))
    }
}

pub(crate) fn decode_record(bytes: &[u8]) -> Result<RawRecord> {
    Ok(codec().deserialize(bytes)?)
}

/// Counts reported by a text-to-binary conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionSummary {
    pub states: usize,
    pub records: usize,
}

/// Streams a text WFST into the two binary outputs.
///
/// Lines must be grouped by ascending source state. States that never appear
/// as a source (gaps, or states only reached as targets) get an empty run.
/// Both headers are written as placeholders and patched at the end.
pub(crate) fn encode_text<R, W>(
    reader: R,
    origin: &str,
    offsets: &mut W,
    data: &mut W,
) -> Result<ConversionSummary>
where
    R: BufRead,
    W: Write + Seek,
{
    let options = codec();
    options.serialize_into(&mut *offsets, &0i32)?;
    options.serialize_into(&mut *data, &0i32)?;

    let mut states: u64 = 0;
    let mut records: u64 = 0;
    let mut current: Option<StateId> = None;
    let mut max_target: Option<StateId> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(parsed) = parse_numbered_line(origin, index + 1, &line)? else {
            continue;
        };
        let state = parsed.state();
        if let Some(previous) = current {
            if state < previous {
                return Err(DecoderError::malformed_line(
                    origin,
                    index + 1,
                    format!(
                        "state {state} follows state {previous}; \
                         lines must be grouped by ascending state"
                    ),
                ));
            }
        }
        // Reject ids the 32-bit format cannot hold before any offsets are written for them.
        let target = match &parsed {
            FstLine::Arc(t) => Some(t.target),
            FstLine::Final { .. } => None,
        };
        for (what, id) in [("source state", Some(state)), ("target state", target)] {
            if let Some(id) = id.filter(|&id| id > MAX_STATE_ID) {
                return Err(DecoderError::malformed_line(
                    origin,
                    index + 1,
                    format!("{what} {id} does not fit the 32-bit format"),
                ));
            }
        }
        while states <= u64::from(state) {
            options.serialize_into(&mut *offsets, &to_i32(records, "record index")?)?;
            states += 1;
        }
        current = Some(state);

        max_target = max_target.max(target);
        options.serialize_into(&mut *data, &RawRecord::from_line(&parsed)?)?;
        records += 1;
        if records as usize % PROGRESS_INTERVAL == 0 {
            info!(records, "lines converted so far");
        }
    }

    if let Some(target) = max_target {
        while states <= u64::from(target) {
            options.serialize_into(&mut *offsets, &to_i32(records, "record index")?)?;
            states += 1;
        }
    }

    offsets.seek(SeekFrom::Start(0))?;
    options.serialize_into(&mut *offsets, &to_i32(states, "state count")?)?;
    data.seek(SeekFrom::Start(0))?;
    options.serialize_into(&mut *data, &to_i32(records, "record count")?)?;
    offsets.flush()?;
    data.flush()?;

    Ok(ConversionSummary { states: states as usize, records: records as usize })
}

/// Converts a text WFST file into `offsets.bin` and `data.bin` under `out_dir`.
/// Both files are written to temporaries first and only appear once complete.
pub fn convert_text_to_binary(text_path: &Path, out_dir: &Path) -> Result<ConversionSummary> {
    fs::create_dir_all(out_dir)?;
    let reader = BufReader::with_capacity(IO_BUFFER_SIZE, File::open(text_path)?);

    let mut offsets_file = NamedTempFile::new_in(out_dir)?;
    let mut data_file = NamedTempFile::new_in(out_dir)?;
    let summary = {
        let mut offsets = BufWriter::with_capacity(IO_BUFFER_SIZE, offsets_file.as_file_mut());
        let mut data = BufWriter::with_capacity(IO_BUFFER_SIZE, data_file.as_file_mut());
        encode_text(reader, &text_path.display().to_string(), &mut offsets, &mut data)?
    };

    offsets_file.persist(out_dir.join(OFFSETS_FILE)).map_err(|e| e.error)?;
    data_file.persist(out_dir.join(DATA_FILE)).map_err(|e| e.error)?;
    info!(
        states = summary.states,
        records = summary.records,
        dir = %out_dir.display(),
        "binary transition store written"
    );
    Ok(summary)
}

fn read_count<R: Read>(reader: &mut R, origin: &str, what: &str) -> Result<usize> {
    let count: i32 = codec().deserialize_from(reader)?;
    usize::try_from(count).malformed(&format!("{origin}: negative {what} {count}"))
}

fn check_length(origin: &str, byte_len: u64, count: usize, item_size: usize) -> Result<()> {
    let expected = HEADER_SIZE + (count as u64) * (item_size as u64);
    if byte_len != expected {
        return Err(DecoderError::Malformed(format!(
            "{origin}: header announces {count} entries ({expected} bytes) \
             but the input has {byte_len} bytes"
        )));
    }
    Ok(())
}

/// Reads the per-state offset index.
pub(crate) fn read_offsets<R: Read>(
    mut reader: R,
    byte_len: u64,
    origin: &str,
) -> Result<Vec<u32>> {
    let count = read_count(&mut reader, origin, "offset count")?;
    check_length(origin, byte_len, count, 4)?;
    let options = codec();
    let mut offsets = Vec::with_capacity(count);
    for state in 0..count {
        let offset: i32 = options.deserialize_from(&mut reader)?;
        let offset = u32::try_from(offset)
            .malformed(&format!("{origin}: state {state} has negative offset"))?;
        offsets.push(offset);
    }
    Ok(offsets)
}

/// Raw record bytes split into separately allocated blocks.
pub(crate) struct RecordBlocks {
    pub blocks: Vec<Vec<u8>>,
    /// Index of the first record held by each block.
    pub block_offsets: Vec<usize>,
    pub record_count: usize,
}

pub(crate) fn read_blocks<R: Read>(
    mut reader: R,
    byte_len: u64,
    origin: &str,
    block_size: usize,
) -> Result<RecordBlocks> {
    let record_count = read_count(&mut reader, origin, "record count")?;
    check_length(origin, byte_len, record_count, RECORD_SIZE)?;

    let mut blocks = Vec::with_capacity(record_count.div_ceil(block_size));
    let mut block_offsets = Vec::with_capacity(blocks.capacity());
    let mut start = 0;
    while start < record_count {
        let records = block_size.min(record_count - start);
        let mut block = vec![0u8; records * RECORD_SIZE];
        reader.read_exact(&mut block)?;
        blocks.push(block);
        block_offsets.push(start);
        start += records;
        debug!(block = blocks.len(), records_loaded = start, "record block loaded");
    }
    Ok(RecordBlocks { blocks, block_offsets, record_count })
}

pub(crate) fn open_sized(path: &Path) -> Result<(BufReader<File>, u64)> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    Ok((BufReader::with_capacity(IO_BUFFER_SIZE, file), len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(text: &str) -> Result<(Vec<u8>, Vec<u8>, ConversionSummary)> {
        let mut offsets = Cursor::new(Vec::new());
        let mut data = Cursor::new(Vec::new());
        let summary = encode_text(text.as_bytes(), "test", &mut offsets, &mut data)?;
        Ok((offsets.into_inner(), data.into_inner(), summary))
    }

    #[test]
    fn layout_is_big_endian_fixed_width() {
        let (offsets, data, summary) = encode("0\t1\t2\t3\t0.5\n1\n").unwrap();
        assert_eq!(summary, ConversionSummary { states: 2, records: 2 });

        // count 2, state 0 -> record 0, state 1 -> record 1
        assert_eq!(offsets, vec![0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(data.len(), 4 + 2 * RECORD_SIZE);
        assert_eq!(&data[..4], &[0, 0, 0, 2]);
        assert_eq!(&data[4..8], &[0, 0, 0, 1]);
        assert_eq!(&data[8..12], &[0, 0, 0, 2]);
        assert_eq!(&data[12..16], &[0, 0, 0, 3]);
        assert_eq!(&data[16..20], &0.5f32.to_be_bytes());
        assert_eq!(&data[20..32], &[0xff; 12]);
    }

    #[test]
    fn gap_and_target_only_states_get_offsets() {
        let (offsets, data, summary) = encode("0 3 1 0\n2 5 1 0\n").unwrap();
        assert_eq!(summary.states, 6);
        let decoded = read_offsets(Cursor::new(&offsets), offsets.len() as u64, "test").unwrap();
        assert_eq!(decoded, vec![0, 1, 1, 2, 2, 2]);
        let blocks = read_blocks(Cursor::new(&data), data.len() as u64, "test", 1).unwrap();
        assert_eq!(blocks.record_count, 2);
        assert_eq!(blocks.blocks.len(), 2);
        assert_eq!(blocks.block_offsets, vec![0, 1]);
    }

    #[test]
    fn unsorted_states_rejected() {
        let err = encode("1 2 3 4\n0 1 2 3\n").unwrap_err();
        assert!(matches!(err, DecoderError::Malformed(ref s) if s.contains("test:2")));
    }

    #[test]
    fn bad_line_aborts_conversion() {
        assert!(matches!(encode("0 1 2 3\n0 1 2\n"), Err(DecoderError::Malformed(_))));
    }

    #[test]
    fn truncated_data_rejected() {
        let (_, data, _) = encode("0 1 2 3\n0 2 2 3\n").unwrap();
        let short = &data[..data.len() - 3];
        assert!(matches!(
            read_blocks(Cursor::new(short), short.len() as u64, "data.bin", 10),
            Err(DecoderError::Malformed(_))
        ));
    }

    #[test]
    fn negative_header_rejected() {
        let bytes = (-5i32).to_be_bytes();
        assert!(matches!(
            read_offsets(Cursor::new(&bytes), 4, "offsets.bin"),
            Err(DecoderError::Malformed(_))
        ));
    }

    #[test]
    fn record_round_trip_through_line() {
        let line = FstLine::Arc(Transition {
            source: 4,
            target: 9,
            transition_id: 17,
            word_id: 0,
            weight: -1.25,
        });
        let record = RawRecord::from_line(&line).unwrap();
        let bytes = codec().serialize(&record).unwrap();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(decode_record(&bytes).unwrap().into_line(4).unwrap(), line);
    }

    #[test]
    fn ids_beyond_i32_rejected() {
        let line = FstLine::Arc(Transition {
            source: 0,
            target: u32::MAX,
            transition_id: 1,
            word_id: 0,
            weight: 0.0,
        });
        assert!(matches!(RawRecord::from_line(&line), Err(DecoderError::Malformed(_))));
    }

    #[test]
    fn oversized_state_ids_rejected_on_their_line() {
        let texts = ["0 1 1 0\n2147483648 1 1 0\n", "0 1 1 0\n1 2147483648 1 0\n", "2147483648\n"];
        for text in texts {
            let err = encode(text).unwrap_err();
            assert!(
                matches!(err, DecoderError::Malformed(ref s) if s.contains("does not fit")),
                "{text:?}: {err}"
            );
        }
    }

    #[test]
    fn conversion_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("graph.txt");
        fs::write(&text, "0\t1\t5\t2\t0.5\n1\t0.25\n").unwrap();
        let out = dir.path().join("bin");

        let summary = convert_text_to_binary(&text, &out).unwrap();
        assert_eq!(summary, ConversionSummary { states: 2, records: 2 });
        assert_eq!(fs::metadata(out.join(OFFSETS_FILE)).unwrap().len(), 12);
        assert_eq!(fs::metadata(out.join(DATA_FILE)).unwrap().len(), 36);
    }
}
