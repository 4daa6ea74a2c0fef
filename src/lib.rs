// src/lib.rs

pub mod acoustic;
pub mod config;
pub mod core;
pub mod error;
pub mod fst;
pub mod lexicon;
pub mod logging;
pub mod persistence;

pub use crate::config::DecoderConfig;
pub use crate::core::engine::{DecodeResult, Decoder};
pub use crate::error::{DecoderError, Result};
pub use crate::fst::TransitionStore;
pub use crate::lexicon::WordLexicon;
