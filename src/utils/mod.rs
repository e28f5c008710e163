//! Generic utility primitives with zero domain knowledge.
//!
//! - `args` - CLI argument parsing helpers

pub mod args;
