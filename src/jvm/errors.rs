use super::code::{Label, Opcode};
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// An element was accepted after the body was already finished
    BuilderFinished,

    /// A label was bound a second time
    LabelAlreadyBound(Label),

    /// A branch or pseudo-element refers to a label that was never bound
    UnboundLabel(Label),

    /// A label from another context was used where relabelling is impossible
    ForeignLabel(Label),

    /// The offset of a label was asked for before the body was emitted
    LabelNotResolved(Label),

    /// An immutable property of a transformed method was changed
    ImmutableProperty(&'static str),

    /// A `try` body did not emit any instructions
    EmptyTryBlock,

    /// The same case value was registered twice in one switch
    DuplicateSwitchCase(i32),

    /// The receiver slot was requested in a static method
    NoReceiver,

    /// A constant had to be written through a writer with no pool
    NoConstantPool,

    /// A constant handle from a pool that cannot be cloned into the current one
    ForeignConstant,

    ConstantPoolOverflow,

    /// Modified UTF-8 encoding of a string is longer than 65535 bytes
    Utf8TooLong(usize),

    InvalidConstantIndex(u16),

    FrameOffsetsNotIncreasing {
        previous: u16,
        offset: u16,
    },

    /// Short branch at `offset` cannot reach `target` and widening is disabled
    BranchOffsetOverflow {
        offset: u32,
        target: u32,
    },

    MethodCodeOverflow(usize),
    MaxStackOverflow,
    MaxLocalsOverflow,

    InvalidOperand {
        opcode: Opcode,
        reason: &'static str,
    },

    /// Stack map synthesis failed on an instruction
    Verifier {
        offset: u32,
        opcode: Opcode,
        kind: VerifierErrorKind,
    },

    /// A branch target is reached with frames that cannot be merged
    IncompatibleFrames {
        offset: u32,
    },

    /// Unreachable code at this offset, and patching dead code is disabled
    DeadCode {
        offset: u32,
    },

    /// Raw bytecode could not be decoded
    IllegalBytecode {
        offset: u32,
        reason: &'static str,
    },

    MalformedClass(&'static str),
    BadDescriptor(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    InvalidIndex(u16),
    InvalidType,
    NotLoadableConstant,
    MissingConstant(u16),
    Unsupported,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::BuilderFinished => f.write_str("code builder is already finished"),
            Error::LabelAlreadyBound(label) => write!(f, "label {:?} is already bound", label),
            Error::UnboundLabel(label) => write!(f, "label {:?} was never bound", label),
            Error::ForeignLabel(label) => {
                write!(f, "label {:?} belongs to a different context", label)
            }
            Error::LabelNotResolved(label) => {
                write!(f, "offset of label {:?} is not known yet", label)
            }
            Error::ImmutableProperty(property) => {
                write!(f, "cannot change {} of a transformed method", property)
            }
            Error::EmptyTryBlock => f.write_str("try block is empty"),
            Error::DuplicateSwitchCase(value) => write!(f, "duplicate switch case {}", value),
            Error::NoReceiver => f.write_str("static methods have no receiver"),
            Error::NoConstantPool => f.write_str("writer has no constant pool"),
            Error::ForeignConstant => f.write_str("constant belongs to an unrelated pool"),
            Error::ConstantPoolOverflow => f.write_str("constant pool has more than 65535 slots"),
            Error::Utf8TooLong(len) => {
                write!(f, "encoded string has {} bytes (at most 65535 allowed)", len)
            }
            Error::InvalidConstantIndex(idx) => write!(f, "invalid constant pool index {}", idx),
            Error::FrameOffsetsNotIncreasing { previous, offset } => write!(
                f,
                "stack map frame at {} does not come after frame at {}",
                offset, previous
            ),
            Error::BranchOffsetOverflow { offset, target } => write!(
                f,
                "branch at {} cannot reach {} with a 16-bit offset",
                offset, target
            ),
            Error::MethodCodeOverflow(len) => {
                write!(f, "method code is {} bytes (at most 65535 allowed)", len)
            }
            Error::MaxStackOverflow => f.write_str("operand stack exceeds 65535 slots"),
            Error::MaxLocalsOverflow => f.write_str("locals exceed 65535 slots"),
            Error::InvalidOperand { opcode, reason } => {
                write!(f, "invalid operand for {:?}: {}", opcode, reason)
            }
            Error::Verifier {
                offset,
                opcode,
                kind,
            } => write!(f, "stack map error at {} ({:?}): {:?}", offset, opcode, kind),
            Error::IncompatibleFrames { offset } => {
                write!(f, "incompatible frames merge at {}", offset)
            }
            Error::DeadCode { offset } => write!(f, "unreachable code at {}", offset),
            Error::IllegalBytecode { offset, reason } => {
                write!(f, "illegal bytecode at {}: {}", offset, reason)
            }
            Error::MalformedClass(reason) => write!(f, "malformed class: {}", reason),
            Error::BadDescriptor(reason) => write!(f, "bad descriptor: {}", reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}
