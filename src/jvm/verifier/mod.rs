//! Verification types, frames, and the `StackMapTable` generator
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.10.1

mod frame;
mod generator;
mod stack;
mod types;

pub use frame::*;
pub use generator::*;
pub use stack::*;
pub use types::*;
