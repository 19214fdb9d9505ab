use super::{Instruction, Label};
use crate::jvm::class_file::{ClassIndex, Utf8Index};
use crate::jvm::verifier::{Frame, VerificationType};
use crate::jvm::Error;

/// Anything that can be fed into a code builder
#[derive(Clone, PartialEq, Debug)]
pub enum CodeElement {
    Instruction(Instruction),

    /// Bind a label to the current position
    Label(Label),

    /// Following instructions come from this source line
    LineNumber(u16),

    /// Entry for the `LocalVariableTable`
    LocalVariable(LocalVariable),

    /// Entry for the `LocalVariableTypeTable` (`descriptor` is a generic signature)
    LocalVariableType(LocalVariable),

    /// Exception table entry: exceptions of `catch_type` (or any exception, when `None`) thrown
    /// between `try_start` (inclusive) and `try_end` (exclusive) jump to `handler`
    ExceptionCatch {
        handler: Label,
        try_start: Label,
        try_end: Label,
        catch_type: Option<ClassIndex>,
    },

    /// Explicit stack map frame at `target`, used when stack maps are provided rather than
    /// generated
    Frame {
        target: Label,
        frame: Frame<ClassIndex, Label>,
    },
}

/// Local variable in scope between two labels
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LocalVariable {
    pub slot: u16,
    pub name: Utf8Index,
    pub descriptor: Utf8Index,
    pub start: Label,
    pub end: Label,
}

impl CodeElement {
    /// Is this element only relevant to debuggers?
    pub fn is_debug(&self) -> bool {
        matches!(
            self,
            CodeElement::LineNumber(_)
                | CodeElement::LocalVariable(_)
                | CodeElement::LocalVariableType(_)
        )
    }

    /// Rewrite every label mentioned in the element
    pub fn map_labels(
        self,
        mut map: impl FnMut(Label) -> Result<Label, Error>,
    ) -> Result<CodeElement, Error> {
        Ok(match self {
            CodeElement::Instruction(instruction) => {
                CodeElement::Instruction(instruction.map_labels(map)?)
            }
            CodeElement::Label(label) => CodeElement::Label(map(label)?),
            CodeElement::LineNumber(line) => CodeElement::LineNumber(line),
            CodeElement::LocalVariable(variable) => {
                CodeElement::LocalVariable(variable.map_labels(map)?)
            }
            CodeElement::LocalVariableType(variable) => {
                CodeElement::LocalVariableType(variable.map_labels(map)?)
            }
            CodeElement::ExceptionCatch {
                handler,
                try_start,
                try_end,
                catch_type,
            } => CodeElement::ExceptionCatch {
                handler: map(handler)?,
                try_start: map(try_start)?,
                try_end: map(try_end)?,
                catch_type,
            },
            CodeElement::Frame { target, frame } => CodeElement::Frame {
                target: map(target)?,
                frame: frame.try_map(|typ: &VerificationType<ClassIndex, Label>| {
                    typ.try_map(|cls| Ok(*cls), |label| map(*label))
                })?,
            },
        })
    }
}

impl LocalVariable {
    fn map_labels(
        self,
        mut map: impl FnMut(Label) -> Result<Label, Error>,
    ) -> Result<LocalVariable, Error> {
        Ok(LocalVariable {
            start: map(self.start)?,
            end: map(self.end)?,
            ..self
        })
    }
}

impl From<Instruction> for CodeElement {
    fn from(instruction: Instruction) -> CodeElement {
        CodeElement::Instruction(instruction)
    }
}
