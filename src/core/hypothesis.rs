// --- File: src/core/hypothesis.rs
use crate::core::types::{StateId, WordId, EPSILON_OUTPUT};
use std::hash::{Hash, Hasher};

/// Handle of a hypothesis committed to a [`HypothesisArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HypothesisId(u32);

impl HypothesisId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A partial decode path: where it is, how good it is, and where it came from.
///
/// Two hypotheses are equal when they sit in the same state. They are then
/// competitors and only the better one survives a frame (Viterbi merge).
#[derive(Debug, Clone, Copy)]
pub struct Hypothesis {
    pub state_id: StateId,
    pub score: f32,
    pub previous: Option<HypothesisId>,
    /// Output label of the transition that created this hypothesis.
    pub output_label: WordId,
}

impl Hypothesis {
    pub fn new(previous: Option<HypothesisId>, state_id: StateId, score: f32) -> Self {
        Self { state_id, score, previous, output_label: EPSILON_OUTPUT }
    }

    pub fn with_label(
        previous: Option<HypothesisId>,
        state_id: StateId,
        score: f32,
        output_label: WordId,
    ) -> Self {
        Self { state_id, score, previous, output_label }
    }
}

impl PartialEq for Hypothesis {
    fn eq(&self, other: &Self) -> bool {
        self.state_id == other.state_id
    }
}

impl Eq for Hypothesis {}

impl Hash for Hypothesis {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state_id.hash(state);
    }
}

// --- HypothesisArena: path history for one utterance ---

#[derive(Debug, Clone, Copy)]
struct HistoryNode {
    state_id: StateId,
    output_label: WordId,
    previous: Option<HypothesisId>,
}

/// Append-only storage of committed hypotheses.
///
/// Many live hypotheses share the same history suffix, so the chains form a
/// DAG. Each node only points backwards to an older handle, which keeps the
/// graph acyclic. The whole arena is dropped once the utterance is decoded.
#[derive(Debug, Default)]
pub struct HypothesisArena {
    nodes: Vec<HistoryNode>,
}

impl HypothesisArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { nodes: Vec::with_capacity(capacity) }
    }

    /// Stores `hypothesis` so successors can refer to it. O(1).
    pub fn commit(&mut self, hypothesis: &Hypothesis) -> HypothesisId {
        let id = HypothesisId(self.nodes.len() as u32);
        self.nodes.push(HistoryNode {
            state_id: hypothesis.state_id,
            output_label: hypothesis.output_label,
            previous: hypothesis.previous,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn state_of(&self, id: HypothesisId) -> Option<StateId> {
        self.nodes.get(id.index()).map(|node| node.state_id)
    }

    /// Output labels along the path ending at `id`, oldest first.
    /// Epsilon outputs are skipped.
    pub fn traceback(&self, id: HypothesisId) -> Vec<WordId> {
        let mut labels: Vec<WordId> = self
            .walk(id)
            .map(|node| node.output_label)
            .filter(|&label| label != EPSILON_OUTPUT)
            .collect();
        labels.reverse();
        labels
    }

    /// States visited along the path ending at `id`, oldest first.
    pub fn state_path(&self, id: HypothesisId) -> Vec<StateId> {
        let mut states: Vec<StateId> = self.walk(id).map(|node| node.state_id).collect();
        states.reverse();
        states
    }

    fn walk(&self, id: HypothesisId) -> impl Iterator<Item = &HistoryNode> + '_ {
        let mut cursor = Some(id);
        std::iter::from_fn(move || {
            let node = self.nodes.get(cursor?.index())?;
            cursor = node.previous;
            Some(node)
        })
    }
}
