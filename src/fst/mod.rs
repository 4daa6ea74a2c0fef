// src/fst/mod.rs

pub mod store;
pub mod text;

pub use store::TransitionStore;
