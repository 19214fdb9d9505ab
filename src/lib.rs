//! Assemble, rewrite, and verify JVM method bodies
//!
//! The interesting parts live in [`jvm`]: an interning constant pool, labels and branch
//! resolution, a pipeline of composable code builders, and a stack map frame engine backed by a
//! (possibly partial) view of the class hierarchy.

pub mod jvm;
pub mod util;
