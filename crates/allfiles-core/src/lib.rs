//! allfiles core - manifest filtering and mirror downloads
//!
//! This crate turns a recursive directory listing into a filtered stream of
//! files and fetches them into a local mirror with a pool of workers.

pub mod engine;
pub mod extensions;
mod error;
mod filter;
mod manifest;
mod mirror;
pub mod size;

pub use engine::*;
pub use error::*;
pub use filter::*;
pub use manifest::*;
pub use mirror::*;
pub use size::{format_size, parse_size};

pub use allfiles_types as types;
