//! CLI command implementations.

mod display;

pub mod callers;
pub mod cycles;
pub mod impact;
pub mod index;
pub mod search;
pub mod stats;
