// --- File: src/core/active_list.rs
use crate::config::ActiveListConfig;
use crate::core::hypothesis::Hypothesis;
use crate::core::types::StateId;
use crate::error::{DecoderError, Result};

/// Slot of the open-addressing table. Nothing is ever removed, so there are
/// no tombstones.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Empty,
    Occupied { state_id: StateId, entry: u32 },
}

/// What [`ActiveList::add`] did with a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First hypothesis for its state this frame.
    Inserted,
    /// Beat the stored hypothesis of the same state and replaced it.
    Replaced,
    /// Lost (or tied) against the stored hypothesis of the same state.
    Kept,
    /// Fell outside the beam and was dropped without probing.
    Pruned,
}

/// The deduplicated, pruned set of hypotheses alive at one frame.
///
/// Hypotheses live in `entries` in insertion order; `slots` is a linear
/// probing index over them keyed by state id. A merge overwrites the entry in
/// place, so the insertion position of a state never changes.
///
/// The maximum is kept exact on every `add`. Replacing the entry that holds
/// the minimum only marks the minimum stale; [`ActiveList::min`] then scans
/// the entries once. `add` stays O(1) amortized and readers of `min` pay O(n).
#[derive(Debug, Clone)]
pub struct ActiveList {
    slots: Vec<Slot>,
    entries: Vec<Hypothesis>,
    mask: usize,
    threshold: usize,
    /// Exact unless `min_stale`, a lower bound otherwise.
    min: f32,
    min_stale: bool,
    max: f32,
    config: ActiveListConfig,
}

/// Fluent construction of an [`ActiveList`], validated on `build`.
#[derive(Debug, Clone)]
pub struct ActiveListBuilder {
    config: ActiveListConfig,
}

impl ActiveListBuilder {
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_capacity = capacity;
        self
    }

    pub fn load_factor(mut self, load_factor: f32) -> Self {
        self.config.load_factor = load_factor;
        self
    }

    pub fn min_hypothesis_count(mut self, count: usize) -> Self {
        self.config.min_hypothesis_count = count;
        self
    }

    pub fn cluster_count(mut self, count: usize) -> Self {
        self.config.cluster_count = count;
        self
    }

    pub fn build(self) -> Result<ActiveList> {
        ActiveList::with_config(&self.config)
    }
}

// Extra bit spreading so consecutive state ids do not cluster.
fn home_slot(state_id: StateId, mask: usize) -> usize {
    let spread = state_id ^ (state_id << 5).wrapping_add(state_id >> 2);
    spread as usize & mask
}

/// Returns the slot holding `state_id` or the empty slot where it belongs.
/// Step offsets grow by one each step; on a power-of-two table this visits
/// every slot within `slots.len()` steps.
fn locate(slots: &[Slot], mask: usize, state_id: StateId) -> Option<usize> {
    let mut slot = home_slot(state_id, mask);
    for count in 1..=slots.len() {
        match slots[slot] {
            Slot::Empty => return Some(slot),
            Slot::Occupied { state_id: stored, .. } if stored == state_id => return Some(slot),
            Slot::Occupied { .. } => slot = (slot + count) & mask,
        }
    }
    None
}

fn resize_threshold(capacity: usize, load_factor: f32) -> usize {
    ((capacity as f32 * load_factor) as usize).clamp(1, capacity - 1)
}

impl ActiveList {
    pub fn builder(beam_width: f32) -> ActiveListBuilder {
        ActiveListBuilder {
            config: ActiveListConfig { beam_width, ..ActiveListConfig::default() },
        }
    }

    pub fn with_config(config: &ActiveListConfig) -> Result<Self> {
        config.validate()?;
        let capacity = config.initial_capacity.max(2).checked_next_power_of_two().ok_or_else(|| {
            DecoderError::Configuration(format!(
                "initial capacity {} has no power of two",
                config.initial_capacity
            ))
        })?;
        let config = ActiveListConfig { initial_capacity: capacity, ..config.clone() };
        Ok(Self::allocate(config))
    }

    /// An empty list with the same settings, for the next frame.
    pub fn empty_like(&self) -> Self {
        Self::allocate(self.config.clone())
    }

    fn allocate(config: ActiveListConfig) -> Self {
        let capacity = config.initial_capacity;
        Self {
            slots: vec![Slot::Empty; capacity],
            entries: Vec::new(),
            mask: capacity - 1,
            threshold: resize_threshold(capacity, config.load_factor),
            min: f32::INFINITY,
            min_stale: false,
            max: f32::NEG_INFINITY,
            config,
        }
    }

    /// Adds a hypothesis, merging with the stored one of the same state.
    ///
    /// Once at least `min_hypothesis_count` hypotheses are stored, anything
    /// more than `beam_width` below the current best is rejected before
    /// probing.
    pub fn add(&mut self, hypothesis: Hypothesis) -> Result<Admission> {
        let score = hypothesis.score;
        if score.is_nan()
            || (self.entries.len() >= self.config.min_hypothesis_count
                && self.max - score > self.config.beam_width)
        {
            return Ok(Admission::Pruned);
        }

        let slot = locate(&self.slots, self.mask, hypothesis.state_id).ok_or(
            DecoderError::CapacityInvariant {
                capacity: self.slots.len(),
                size: self.entries.len(),
            },
        )?;

        match self.slots[slot] {
            Slot::Empty => {
                self.slots[slot] = Slot::Occupied {
                    state_id: hypothesis.state_id,
                    entry: self.entries.len() as u32,
                };
                self.entries.push(hypothesis);
                self.min = self.min.min(score);
                self.max = self.max.max(score);
                if self.entries.len() >= self.threshold {
                    self.grow()?;
                }
                Ok(Admission::Inserted)
            }
            Slot::Occupied { entry, .. } => {
                let stored = &mut self.entries[entry as usize];
                if stored.score >= score {
                    return Ok(Admission::Kept);
                }
                let displaced = stored.score;
                *stored = hypothesis;
                self.max = self.max.max(score);
                if displaced <= self.min {
                    self.min_stale = true;
                }
                Ok(Admission::Replaced)
            }
        }
    }

    /// Doubles the table and re-inserts every entry with the same slot
    /// scheme. Storage, mask and threshold are swapped in together.
    fn grow(&mut self) -> Result<()> {
        let capacity = self.slots.len().checked_mul(2).ok_or(DecoderError::CapacityInvariant {
            capacity: self.slots.len(),
            size: self.entries.len(),
        })?;
        let mask = capacity - 1;
        let mut slots = vec![Slot::Empty; capacity];
        for (entry, hypothesis) in self.entries.iter().enumerate() {
            let slot = locate(&slots, mask, hypothesis.state_id)
                .ok_or(DecoderError::CapacityInvariant { capacity, size: entry })?;
            slots[slot] = Slot::Occupied { state_id: hypothesis.state_id, entry: entry as u32 };
        }
        self.slots = slots;
        self.mask = mask;
        self.threshold = resize_threshold(capacity, self.config.load_factor);
        tracing::trace!(capacity, size = self.entries.len(), "active list resized");
        Ok(())
    }

    pub fn get(&self, state_id: StateId) -> Option<&Hypothesis> {
        match self.slots[locate(&self.slots, self.mask, state_id)?] {
            Slot::Occupied { entry, .. } => self.entries.get(entry as usize),
            Slot::Empty => None,
        }
    }

    /// Every stored hypothesis, in insertion order.
    pub fn all_hypotheses(&self) -> &[Hypothesis] {
        &self.entries
    }

    /// Hypotheses ordered for expansion, best first.
    ///
    /// Small lists are sorted exactly. Larger ones are distributed over
    /// `cluster_count` equal-width score buckets, which is O(n); inside a bucket
    /// the insertion order is kept. When every score is equal there is a single
    /// bucket.
    pub fn active_hypotheses(&self) -> Vec<Hypothesis> {
        if self.entries.len() < self.config.min_hypothesis_count {
            let mut sorted = self.entries.clone();
            sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
            return sorted;
        }

        let width = (self.max - self.min()) / self.config.cluster_count as f32;
        if !(width.is_finite() && width > 0.0) {
            return self.entries.clone();
        }

        let last = self.config.cluster_count - 1;
        let bucket_of = |h: &Hypothesis| (((self.max - h.score) / width) as usize).min(last);

        // Counting sort over bucket indices.
        let mut starts = vec![0usize; self.config.cluster_count + 1];
        for h in &self.entries {
            starts[bucket_of(h) + 1] += 1;
        }
        for i in 1..starts.len() {
            starts[i] += starts[i - 1];
        }
        let mut ordered = self.entries.clone();
        for h in &self.entries {
            let bucket = bucket_of(h);
            ordered[starts[bucket]] = *h;
            starts[bucket] += 1;
        }
        ordered
    }

    /// Hypotheses worth expanding: inside the beam of the final best score
    /// and at most `max_active` of them. Lists below `min_hypothesis_count`
    /// are returned whole.
    pub fn prune(&self, max_active: usize) -> Vec<Hypothesis> {
        let mut survivors = self.active_hypotheses();
        if self.entries.len() < self.config.min_hypothesis_count {
            return survivors;
        }
        let floor = self.max - self.config.beam_width;
        survivors.retain(|h| h.score >= floor);
        survivors.truncate(max_active);
        survivors
    }

    pub fn best(&self) -> Option<&Hypothesis> {
        self.entries.iter().max_by(|a, b| a.score.total_cmp(&b.score))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Lowest stored score, `+inf` when empty.
    pub fn min(&self) -> f32 {
        if self.min_stale {
            self.entries.iter().map(|h| h.score).fold(f32::INFINITY, f32::min)
        } else {
            self.min
        }
    }

    /// Highest stored score, `-inf` when empty.
    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn beam_width(&self) -> f32 {
        self.config.beam_width
    }

    pub fn load_factor(&self) -> f32 {
        self.config.load_factor
    }

    pub fn min_hypothesis_count(&self) -> usize {
        self.config.min_hypothesis_count
    }

    pub fn cluster_count(&self) -> usize {
        self.config.cluster_count
    }
}
