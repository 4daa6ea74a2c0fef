// File: src/fst/store.rs
use crate::config::StoreConfig;
use crate::core::types::{StateId, Transition};
use crate::error::{DecoderError, Result};
use crate::fst::text::{format_line, FstLine};
use crate::persistence::{self, RawRecord, RecordBlocks, DATA_FILE, OFFSETS_FILE, RECORD_SIZE};
use rustc_hash::FxHashMap;
use std::io::{BufRead, Cursor, Write};
use std::ops::Range;
use std::path::Path;
use tracing::info;

/// Random-access WFST transitions held as fixed-size blocks of raw records.
///
/// A state's records form one contiguous run starting at `offsets[state]` and
/// ending at the next state's offset, or at the record count for the last
/// state. Runs may straddle block boundaries. The store is immutable after
/// loading and can be shared between decoders without locking.
pub struct TransitionStore {
    offsets: Vec<u32>,
    blocks: Vec<Vec<u8>>,
    block_offsets: Vec<usize>,
    block_size: usize,
    record_count: usize,
    finals: FxHashMap<StateId, f32>,
}

impl TransitionStore {
    /// Loads `offsets.bin` and `data.bin` from `dir`.
    pub fn load(dir: &Path, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let offsets_path = dir.join(OFFSETS_FILE);
        let (reader, len) = persistence::open_sized(&offsets_path)?;
        let offsets = persistence::read_offsets(reader, len, &offsets_path.display().to_string())?;
        info!(states = offsets.len(), "offsets loaded");

        let data_path = dir.join(DATA_FILE);
        let (reader, len) = persistence::open_sized(&data_path)?;
        let origin = data_path.display().to_string();
        let blocks = persistence::read_blocks(reader, len, &origin, config.block_size)?;
        info!(
            records = blocks.record_count,
            blocks = blocks.blocks.len(),
            "transition records loaded"
        );

        Self::assemble(offsets, blocks, config.block_size)
    }

    /// Builds a store straight from a text WFST, through the same binary encoding.
    pub fn from_text<R: BufRead>(reader: R, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let mut offsets = Cursor::new(Vec::new());
        let mut data = Cursor::new(Vec::new());
        persistence::encode_text(reader, "<text>", &mut offsets, &mut data)?;
        let (offsets, data) = (offsets.into_inner(), data.into_inner());

        let offsets =
            persistence::read_offsets(offsets.as_slice(), offsets.len() as u64, OFFSETS_FILE)?;
        let blocks = persistence::read_blocks(
            data.as_slice(),
            data.len() as u64,
            DATA_FILE,
            config.block_size,
        )?;
        Self::assemble(offsets, blocks, config.block_size)
    }

    fn assemble(offsets: Vec<u32>, blocks: RecordBlocks, block_size: usize) -> Result<Self> {
        let RecordBlocks { blocks, block_offsets, record_count } = blocks;
        match offsets.first() {
            None if record_count > 0 => {
                return Err(DecoderError::Malformed(format!(
                    "{record_count} records but no state offsets"
                )));
            }
            Some(&first) if first != 0 => {
                return Err(DecoderError::Malformed(format!(
                    "first state starts at record {first}, expected 0"
                )));
            }
            _ => {}
        }
        for (state, pair) in offsets.windows(2).enumerate() {
            if pair[1] < pair[0] {
                return Err(DecoderError::Malformed(format!(
                    "offset of state {} decreases",
                    state + 1
                )));
            }
        }
        if let Some(&last) = offsets.last() {
            if last as usize > record_count {
                return Err(DecoderError::Malformed(format!(
                    "last state starts at record {last} beyond record count {record_count}"
                )));
            }
        }

        let mut store = Self {
            offsets,
            blocks,
            block_offsets,
            block_size,
            record_count,
            finals: FxHashMap::default(),
        };

        // One pass over every record: checks ids and collects final weights.
        let mut finals = FxHashMap::default();
        for state in 0..store.offsets.len() as StateId {
            for index in store.run(state)? {
                if let FstLine::Final { weight, .. } = store.record(index)?.into_line(state)? {
                    finals.insert(state, weight);
                }
            }
        }
        store.finals = finals;
        info!(finals = store.finals.len(), "final states indexed");
        Ok(store)
    }

    fn run(&self, state: StateId) -> Result<Range<usize>> {
        let index = state as usize;
        let start = *self.offsets.get(index).ok_or(DecoderError::UnknownState(state))? as usize;
        let end = self.offsets.get(index + 1).map_or(self.record_count, |&next| next as usize);
        Ok(start..end)
    }

    fn record(&self, index: usize) -> Result<RawRecord> {
        let block = index / self.block_size;
        let position = (index - self.block_offsets[block]) * RECORD_SIZE;
        persistence::decode_record(&self.blocks[block][position..position + RECORD_SIZE])
    }

    fn lines(&self, state: StateId) -> Result<Vec<FstLine>> {
        self.run(state)?
            .map(|index| self.record(index)?.into_line(state))
            .collect()
    }

    /// Outgoing transitions of `state` in their original order. A state
    /// without arcs yields an empty list.
    pub fn transitions(&self, state: StateId) -> Result<Vec<Transition>> {
        let run = self.run(state)?;
        let mut transitions = Vec::with_capacity(run.len());
        for index in run {
            if let FstLine::Arc(transition) = self.record(index)?.into_line(state)? {
                transitions.push(transition);
            }
        }
        Ok(transitions)
    }

    pub fn final_weight(&self, state: StateId) -> Option<f32> {
        self.finals.get(&state).copied()
    }

    pub fn is_final(&self, state: StateId) -> bool {
        self.finals.contains_key(&state)
    }

    /// Final states with their weights, ordered by state.
    pub fn final_states(&self) -> Vec<(StateId, f32)> {
        let mut finals: Vec<(StateId, f32)> = self.finals.iter().map(|(&s, &w)| (s, w)).collect();
        finals.sort_unstable_by_key(|&(state, _)| state);
        finals
    }

    pub fn state_count(&self) -> usize {
        self.offsets.len()
    }

    /// Arc and final-state records together.
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Writes the store back as a text WFST, one line per record.
    pub fn write_text<W: Write>(&self, mut writer: W) -> Result<()> {
        for state in 0..self.offsets.len() as StateId {
            for line in self.lines(state)? {
                writeln!(writer, "{}", format_line(&line))?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}
