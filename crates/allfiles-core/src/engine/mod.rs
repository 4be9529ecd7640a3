//! Download Engine
//!
//! This module implements the mirror download engine with:
//! - A fixed pool of workers fed through one bounded queue
//! - Per-file retries with linearly growing delays
//! - Atomic commit through a temporary file
//! - A per-worker consecutive failure limit

mod manager;
mod transfer;

pub use manager::*;
pub use transfer::*;
