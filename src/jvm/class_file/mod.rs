//! Binary class file layer: byte writer, constant pool, and attributes
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html

mod attribute;
mod class;
mod constants;
mod version;
mod writer;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use version::*;
pub use writer::*;
