// src/acoustic/mod.rs
//! Lookup tables and score sources supplied by the acoustic model.

pub mod phones;
pub mod scorer;
pub mod transitions;

pub use phones::{Phone, PhoneLookup};
pub use scorer::{AcousticScorer, FrameScores, PdfPriors};
pub use transitions::{TransitionModel, TransitionUnit};
