//! Method bodies: elements, labels, builders, and parsing
//!
//! Bodies are streams of [`CodeElement`]s fed into a [`CodeBuilder`]. Terminal builders either
//! encode straight to bytes ([`DirectCodeBuilder`]) or record the elements for later replay
//! ([`BufferedCodeBuilder`]). A [`ChainedCodeBuilder`] runs elements through a
//! [`CodeTransform`] on their way down. Existing bodies come in through [`CodeModel`].

mod block;
mod buffered;
mod builder;
mod chained;
mod direct;
mod element;
mod instruction;
mod jump_encoding;
mod label;
mod method;
mod model;
mod opcode;
mod scanner;

pub use block::{BlockCodeBuilder, CatchBuilder, SwitchCases, SwitchEncoding};
pub use buffered::{BufferedCode, BufferedCodeBuilder};
pub use builder::{CodeBuilder, CodeBuilderExt, ConstantValue};
pub use chained::{AndThen, ChainedCodeBuilder, CodeTransform};
pub use direct::DirectCodeBuilder;
pub use element::{CodeElement, LocalVariable};
pub use instruction::Instruction;
pub use label::{Label, LabelContext};
pub use method::MethodInfo;
pub use model::CodeModel;
pub use opcode::{Opcode, OpcodeKind};
pub use scanner::{RawBytecode, RawInstruction, RawOperands};
