// src/core/mod.rs

pub mod active_list;
pub mod engine;
pub mod hypothesis;
pub mod types;
