//! JVM class file model, code builders, and stack map frames
//!
//! Most of the action happens in [`code`]: code elements are fed into a builder (directly
//! encoding, buffering, or transforming), which resolves labels, widens jumps, and computes the
//! `StackMapTable` through [`verifier`]. The constant pool and byte writer in [`class_file`] are
//! shared by all of these.

mod access_flags;
pub mod class_file;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod options;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
