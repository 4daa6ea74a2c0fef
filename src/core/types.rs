// src/core/types.rs

/// Identifier of a state in the recognition network.
pub type StateId = u32;

/// Input label of a transition. Maps to an acoustic unit through the
/// transition model.
pub type TransitionId = u32;

/// Output label of a transition, resolvable to a word through the lexicon.
pub type WordId = u32;

/// Input label of transitions that consume no acoustic frame.
pub const EPSILON_INPUT: TransitionId = 0;

/// Output label of transitions that emit no word.
pub const EPSILON_OUTPUT: WordId = 0;

/// One weighted arc of the recognition network.
/// Immutable once loaded; the store hands out copies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub source: StateId,
    pub target: StateId,
    pub transition_id: TransitionId,
    pub word_id: WordId,
    pub weight: f32,
}

impl Transition {
    /// True when following this arc does not advance the frame index.
    pub fn is_input_epsilon(&self) -> bool {
        self.transition_id == EPSILON_INPUT
    }

    pub fn has_output(&self) -> bool {
        self.word_id != EPSILON_OUTPUT
    }
}
