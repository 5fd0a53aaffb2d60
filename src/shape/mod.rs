//! Schema ("shape") inference for JSON-like data.
//!
//! - `infer`: shape tree, in-memory inference and the merge operator
//! - `budget`: byte-budgeted inference over files and streams

pub mod budget;
pub mod infer;

pub use budget::{find_safe_cut, shape_from_file, shape_from_reader, shape_from_sample, SafeCut};
pub use infer::{infer, merge, ScalarName, Shape};
