// File: src/config.rs
use crate::core::types::StateId;
use crate::error::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_BEAM_WIDTH: f32 = 10.0;
pub const DEFAULT_INITIAL_CAPACITY: usize = 8192;
pub const DEFAULT_LOAD_FACTOR: f32 = 0.7;
pub const DEFAULT_MIN_HYPOTHESIS_COUNT: usize = 100;
pub const DEFAULT_CLUSTER_COUNT: usize = 20;
pub const DEFAULT_BLOCK_SIZE: usize = 1_000_000;
pub const DEFAULT_MAX_ACTIVE: usize = 7000;
/// Largest accepted initial active list capacity (before power-of-two rounding).
pub const MAX_INITIAL_CAPACITY: usize = 1 << 24;
pub const MAX_CLUSTER_COUNT: usize = 1 << 16;

const LOAD_FACTOR_RANGE: std::ops::RangeInclusive<f32> = 0.1..=0.9;

/// Tuning of one frame's active list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveListConfig {
    /// Score margin below the current best beyond which hypotheses are dropped.
    pub beam_width: f32,
    /// Rounded up to the next power of two.
    pub initial_capacity: usize,
    pub load_factor: f32,
    /// Below this many hypotheses the list neither prunes nor clusters.
    pub min_hypothesis_count: usize,
    /// Number of score buckets used for approximate ordering.
    pub cluster_count: usize,
}

impl Default for ActiveListConfig {
    fn default() -> Self {
        Self {
            beam_width: DEFAULT_BEAM_WIDTH,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
            min_hypothesis_count: DEFAULT_MIN_HYPOTHESIS_COUNT,
            cluster_count: DEFAULT_CLUSTER_COUNT,
        }
    }
}

impl ActiveListConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.beam_width.is_finite() || self.beam_width < 0.0 {
            return Err(DecoderError::Configuration(format!(
                "beam width must be a non-negative number, got {}",
                self.beam_width
            )));
        }
        if !LOAD_FACTOR_RANGE.contains(&self.load_factor) {
            return Err(DecoderError::Configuration(format!(
                "load factor must be within [0.1, 0.9], got {}",
                self.load_factor
            )));
        }
        if !(1..=MAX_INITIAL_CAPACITY).contains(&self.initial_capacity) {
            return Err(DecoderError::Configuration(format!(
                "initial capacity must be within [1, {MAX_INITIAL_CAPACITY}], got {}",
                self.initial_capacity
            )));
        }
        if !(1..=MAX_CLUSTER_COUNT).contains(&self.cluster_count) {
            return Err(DecoderError::Configuration(format!(
                "cluster count must be within [1, {MAX_CLUSTER_COUNT}], got {}",
                self.cluster_count
            )));
        }
        Ok(())
    }
}

/// Layout of the in-memory transition store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Transition records per separately allocated block.
    pub block_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { block_size: DEFAULT_BLOCK_SIZE }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(DecoderError::Configuration("block size must be positive".into()));
        }
        Ok(())
    }
}

/// Everything the decoder loop needs besides the models themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub active_list: ActiveListConfig,
    pub store: StoreConfig,
    /// Histogram cap on hypotheses expanded per frame.
    pub max_active: usize,
    /// Multiplier applied to acoustic log-likelihoods.
    pub acoustic_scale: f32,
    pub start_state: StateId,
    /// Return the best non-final path instead of failing when no final state is reached.
    pub allow_partial_result: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            active_list: ActiveListConfig::default(),
            store: StoreConfig::default(),
            max_active: DEFAULT_MAX_ACTIVE,
            acoustic_scale: 1.0,
            start_state: 0,
            allow_partial_result: false,
        }
    }
}

impl DecoderConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: DecoderConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.active_list.validate()?;
        self.store.validate()?;
        if self.max_active == 0 {
            return Err(DecoderError::Configuration("max active must be positive".into()));
        }
        if !self.acoustic_scale.is_finite() || self.acoustic_scale <= 0.0 {
            return Err(DecoderError::Configuration(format!(
                "acoustic scale must be a positive number, got {}",
                self.acoustic_scale
            )));
        }
        Ok(())
    }
}
