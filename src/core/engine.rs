// src/core/engine.rs
use crate::acoustic::scorer::AcousticScorer;
use crate::config::DecoderConfig;
use crate::core::active_list::{ActiveList, Admission};
use crate::core::hypothesis::{Hypothesis, HypothesisArena};
use crate::core::types::{StateId, WordId};
use crate::error::{DecoderError, Result};
use crate::fst::TransitionStore;
use crate::lexicon::WordLexicon;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Expansions allowed per state within one epsilon closure.
pub const EPSILON_EXPANSION_LIMIT: u32 = 16;

/// Outcome of decoding one utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeResult {
    /// Non-epsilon output labels of the best path, in time order.
    pub word_ids: Vec<WordId>,
    /// Path score, including the final weight when a final state was reached.
    pub score: f32,
    pub final_state: StateId,
    pub frames: usize,
    /// False only for a partial result taken from a non-final state.
    pub reached_final: bool,
    /// Number of hypotheses committed to history while decoding.
    pub arena_size: usize,
}

impl DecodeResult {
    pub fn words(&self, lexicon: &WordLexicon) -> Vec<String> {
        lexicon.resolve(&self.word_ids)
    }
}

/// Time-synchronous Viterbi beam search over a [`TransitionStore`].
///
/// The decoder holds no per-utterance state; every call to [`Decoder::decode`]
/// owns its active lists and history arena. One decoder can therefore serve
/// several threads at once.
pub struct Decoder {
    store: Arc<TransitionStore>,
    config: DecoderConfig,
}

impl Decoder {
    pub fn new(store: Arc<TransitionStore>, config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        if config.start_state as usize >= store.state_count() {
            return Err(DecoderError::Configuration(format!(
                "start state {} is outside a graph of {} states",
                config.start_state,
                store.state_count()
            )));
        }
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn store(&self) -> &TransitionStore {
        &self.store
    }

    pub fn decode(&self, scorer: &dyn AcousticScorer) -> Result<DecodeResult> {
        let frames = scorer.frame_count();
        let mut arena = HypothesisArena::with_capacity(self.config.max_active.min(1 << 16));

        let mut current = ActiveList::with_config(&self.config.active_list)?;
        current.add(Hypothesis::new(None, self.config.start_state, 0.0))?;
        self.epsilon_close(&mut current, &mut arena)?;

        for frame in 0..frames {
            let survivors = current.prune(self.config.max_active);
            let pruned = current.len() - survivors.len();
            let mut next = current.empty_like();

            for hypothesis in &survivors {
                let id = arena.commit(hypothesis);
                for transition in self.store.transitions(hypothesis.state_id)? {
                    if transition.is_input_epsilon() {
                        continue;
                    }
                    let acoustic = scorer.log_likelihood(frame, transition.transition_id)?;
                    let score = hypothesis.score
                        + transition.weight
                        + self.config.acoustic_scale * acoustic;
                    next.add(Hypothesis::with_label(
                        Some(id),
                        transition.target,
                        score,
                        transition.word_id,
                    ))?;
                }
            }
            self.epsilon_close(&mut next, &mut arena)?;

            if next.is_empty() {
                return Err(DecoderError::EmptyBeam { frame });
            }
            debug!(
                frame,
                expanded = survivors.len(),
                pruned,
                active = next.len(),
                min = next.min(),
                max = next.max(),
                "frame decoded"
            );
            current = next;
        }

        let (best, reached_final) = match self.best_final(&current) {
            Some(best) => (best, true),
            None if self.config.allow_partial_result => {
                let best = *current.best().ok_or(DecoderError::EmptyBeam { frame: frames })?;
                warn!(
                    frames,
                    state = best.state_id,
                    "no final state reached, returning partial result"
                );
                (best, false)
            }
            None => return Err(DecoderError::NoFinalState { frames }),
        };

        let end = arena.commit(&best);
        let result = DecodeResult {
            word_ids: arena.traceback(end),
            score: best.score,
            final_state: best.state_id,
            frames,
            reached_final,
            arena_size: arena.len(),
        };
        info!(
            frames,
            words = result.word_ids.len(),
            score = result.score,
            arena = result.arena_size,
            "utterance decoded"
        );
        Ok(result)
    }

    /// Best hypothesis in a final state, its score raised by the final weight.
    /// Ties keep the earliest inserted.
    fn best_final(&self, list: &ActiveList) -> Option<Hypothesis> {
        let mut best: Option<Hypothesis> = None;
        for hypothesis in list.all_hypotheses() {
            let Some(weight) = self.store.final_weight(hypothesis.state_id) else {
                continue;
            };
            let total = hypothesis.score + weight;
            if best.map_or(true, |b| total > b.score) {
                best = Some(Hypothesis { score: total, ..*hypothesis });
            }
        }
        best
    }

    /// Follows input-epsilon arcs from every state in `list` without
    /// consuming a frame.
    ///
    /// States are expanded best score first. A state is expanded again when
    /// its stored score strictly improves after an earlier expansion, at most
    /// [`EPSILON_EXPANSION_LIMIT`] times per call, which bounds
    /// positive-weight epsilon cycles.
    fn epsilon_close(&self, list: &mut ActiveList, arena: &mut HypothesisArena) -> Result<()> {
        let mut expanded: FxHashMap<StateId, (f32, u32)> = FxHashMap::default();
        let mut queue: BinaryHeap<Pending> = list
            .all_hypotheses()
            .iter()
            .map(|h| Pending { score: h.score, state: h.state_id })
            .collect();

        while let Some(Pending { score, state }) = queue.pop() {
            // Pruned on arrival, or never stored.
            let Some(&source) = list.get(state) else {
                continue;
            };
            // Stale entry: a better score for this state is queued too.
            if source.score > score {
                continue;
            }
            let expansions = match expanded.get(&state) {
                Some(&(last, count))
                    if source.score <= last || count >= EPSILON_EXPANSION_LIMIT =>
                {
                    continue;
                }
                Some(&(_, count)) => count + 1,
                None => 1,
            };
            expanded.insert(state, (source.score, expansions));

            let epsilons: Vec<_> = self
                .store
                .transitions(state)?
                .into_iter()
                .filter(|t| t.is_input_epsilon())
                .collect();
            if epsilons.is_empty() {
                continue;
            }

            let id = arena.commit(&source);
            for transition in epsilons {
                let score = source.score + transition.weight;
                let child =
                    Hypothesis::with_label(Some(id), transition.target, score, transition.word_id);
                match list.add(child)? {
                    Admission::Inserted | Admission::Replaced => {
                        queue.push(Pending { score, state: transition.target });
                    }
                    Admission::Kept | Admission::Pruned => {}
                }
            }
        }
        Ok(())
    }
}

/// Epsilon closure work item, ordered by score then by lower state id.
#[derive(Debug, Clone, Copy)]
struct Pending {
    score: f32,
    state: StateId,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.state.cmp(&self.state))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}
