use super::block::{build_block, build_if_then_else, build_switch, build_try};
use super::{
    BlockCodeBuilder, CatchBuilder, ChainedCodeBuilder, CodeElement, CodeModel, CodeTransform,
    Instruction, Label, LocalVariable, MethodInfo, Opcode, SwitchCases, SwitchEncoding,
};
use crate::jvm::class_file::ConstantPool;
use crate::jvm::{
    BinaryName, Error, FieldType, MethodDescriptor, RefType, RenderDescriptor, TypeKind,
    UnqualifiedName,
};

/// Slot handed out by local allocators once the counter has run past the last valid slot
///
/// Builders keep their counter in a `u32` and report the overflow when finishing.
pub(super) fn clamp_slot(next_local: u32) -> u16 {
    u16::try_from(next_local).unwrap_or(u16::MAX)
}

/// Common interface of every code builder
///
/// Terminal builders ([`super::DirectCodeBuilder`], [`super::BufferedCodeBuilder`]) own the
/// label context, the constant pool, and the local slot allocator. Every other builder
/// (chained, blocks) wraps another builder and forwards context queries to it.
///
/// This trait is kept object safe: structured helpers taking closures live in
/// [`CodeBuilderExt`].
pub trait CodeBuilder {
    /// Accept the next element of the body
    fn with(&mut self, element: CodeElement) -> Result<(), Error>;

    fn new_label(&mut self) -> Label;

    /// Label bound to the start of the body (or block)
    fn start_label(&self) -> Label;

    /// Label bound to the end of the body (or block)
    fn end_label(&self) -> Label;

    /// Method whose body is being built
    fn method(&self) -> &MethodInfo;

    fn receiver_slot(&self) -> Result<u16, Error> {
        self.method().receiver_slot()
    }

    fn parameter_slot(&self, index: usize) -> Option<u16> {
        self.method().parameter_slot(index)
    }

    /// First local slot not yet allocated in this scope
    fn next_local_slot(&self) -> u16;

    /// Reserve a fresh local variable slot for a value of the given kind
    fn allocate_local(&mut self, kind: TypeKind) -> u16;

    fn constant_pool(&mut self) -> &mut ConstantPool;

    /// Offset of a label
    ///
    /// This is only available once the label is resolved: for parsed code right away, for code
    /// being built once it is finished.
    fn label_to_offset(&self, label: Label) -> Result<u32, Error>;

    fn as_dyn(&mut self) -> &mut dyn CodeBuilder;
}

/// Constant values that can be pushed with [`CodeBuilderExt::load_constant`]
#[derive(Clone, PartialEq, Debug)]
pub enum ConstantValue {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(RefType),
}

/// Convenience methods available on every code builder
pub trait CodeBuilderExt: CodeBuilder {
    fn instruction(&mut self, instruction: Instruction) -> Result<(), Error> {
        self.with(CodeElement::Instruction(instruction))
    }

    /// Load a local variable of the specified kind
    fn load(&mut self, kind: TypeKind, slot: u16) -> Result<(), Error> {
        let opcode = Opcode::load(kind, slot).ok_or(Error::InvalidOperand {
            opcode: Opcode::ILOAD,
            reason: "no load instruction for this kind of value",
        })?;
        self.instruction(Instruction::Load { opcode, slot })
    }

    /// Store into a local variable of the specified kind
    fn store(&mut self, kind: TypeKind, slot: u16) -> Result<(), Error> {
        let opcode = Opcode::store(kind, slot).ok_or(Error::InvalidOperand {
            opcode: Opcode::ISTORE,
            reason: "no store instruction for this kind of value",
        })?;
        self.instruction(Instruction::Store { opcode, slot })
    }

    /// Return a value of the specified kind (`Void` for a plain `return`)
    fn return_(&mut self, kind: TypeKind) -> Result<(), Error> {
        self.instruction(Instruction::Return(Opcode::return_(kind)))
    }

    fn branch(&mut self, opcode: Opcode, target: Label) -> Result<(), Error> {
        self.instruction(Instruction::Branch { opcode, target })
    }

    fn goto_(&mut self, target: Label) -> Result<(), Error> {
        self.branch(Opcode::GOTO, target)
    }

    /// Bind a label to the current position
    fn label_binding(&mut self, label: Label) -> Result<(), Error> {
        self.with(CodeElement::Label(label))
    }

    /// Push a constant, using the shortest instruction available
    fn load_constant(&mut self, value: ConstantValue) -> Result<(), Error> {
        let instruction = match value {
            ConstantValue::Null => Instruction::ConstantIntrinsic(Opcode::ACONST_NULL),
            ConstantValue::Int(int @ -1..=5) => {
                Instruction::ConstantIntrinsic(match int {
                    -1 => Opcode::ICONST_M1,
                    0 => Opcode::ICONST_0,
                    1 => Opcode::ICONST_1,
                    2 => Opcode::ICONST_2,
                    3 => Opcode::ICONST_3,
                    4 => Opcode::ICONST_4,
                    _ => Opcode::ICONST_5,
                })
            }
            ConstantValue::Int(int) if i8::try_from(int).is_ok() => Instruction::ConstantArgument {
                opcode: Opcode::BIPUSH,
                value: int as i16,
            },
            ConstantValue::Int(int) if i16::try_from(int).is_ok() => {
                Instruction::ConstantArgument {
                    opcode: Opcode::SIPUSH,
                    value: int as i16,
                }
            }
            ConstantValue::Int(int) => Instruction::ConstantLoad {
                opcode: Opcode::LDC,
                constant: self.constant_pool().integer(int)?,
            },
            ConstantValue::Long(0) => Instruction::ConstantIntrinsic(Opcode::LCONST_0),
            ConstantValue::Long(1) => Instruction::ConstantIntrinsic(Opcode::LCONST_1),
            ConstantValue::Long(long) => Instruction::ConstantLoad {
                opcode: Opcode::LDC2_W,
                constant: self.constant_pool().long(long)?,
            },

            // Compare bits, so that `-0.0` doesn't become `fconst_0`
            ConstantValue::Float(float) if float.to_bits() == 0.0f32.to_bits() => {
                Instruction::ConstantIntrinsic(Opcode::FCONST_0)
            }
            ConstantValue::Float(float) if float == 1.0 => {
                Instruction::ConstantIntrinsic(Opcode::FCONST_1)
            }
            ConstantValue::Float(float) if float == 2.0 => {
                Instruction::ConstantIntrinsic(Opcode::FCONST_2)
            }
            ConstantValue::Float(float) => Instruction::ConstantLoad {
                opcode: Opcode::LDC,
                constant: self.constant_pool().float(float)?,
            },
            ConstantValue::Double(double) if double.to_bits() == 0.0f64.to_bits() => {
                Instruction::ConstantIntrinsic(Opcode::DCONST_0)
            }
            ConstantValue::Double(double) if double == 1.0 => {
                Instruction::ConstantIntrinsic(Opcode::DCONST_1)
            }
            ConstantValue::Double(double) => Instruction::ConstantLoad {
                opcode: Opcode::LDC2_W,
                constant: self.constant_pool().double(double)?,
            },
            ConstantValue::String(string) => Instruction::ConstantLoad {
                opcode: Opcode::LDC,
                constant: self.constant_pool().string(&string)?.into(),
            },
            ConstantValue::Class(class) => Instruction::ConstantLoad {
                opcode: Opcode::LDC,
                constant: self.constant_pool().ref_class(&class)?.into(),
            },
        };
        self.instruction(instruction)
    }

    /// `getstatic`, `putstatic`, `getfield`, or `putfield`
    fn field(
        &mut self,
        opcode: Opcode,
        owner: &BinaryName,
        name: &UnqualifiedName,
        field_type: &FieldType,
    ) -> Result<(), Error> {
        let field = self.constant_pool().field_ref(owner, name, field_type)?;
        self.instruction(Instruction::Field { opcode, field })
    }

    /// Any `invoke*` other than `invokedynamic`
    ///
    /// `invokeinterface` gets an interface method reference (so `owner` must be a class type),
    /// the others get a plain method reference.
    fn invoke(
        &mut self,
        opcode: Opcode,
        owner: &RefType,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
    ) -> Result<(), Error> {
        let method = match owner {
            RefType::Object(class) if opcode == Opcode::INVOKEINTERFACE => self
                .constant_pool()
                .interface_method_ref(class, name, descriptor)?,
            _ if opcode == Opcode::INVOKEINTERFACE => {
                return Err(Error::InvalidOperand {
                    opcode,
                    reason: "interface methods can only be found on classes",
                })
            }
            _ => self.constant_pool().method_ref(owner, name, descriptor)?,
        };
        self.instruction(Instruction::Invoke { opcode, method })
    }

    fn new_object(&mut self, class: &BinaryName) -> Result<(), Error> {
        let class = self.constant_pool().class(class)?;
        self.instruction(Instruction::NewObject(class))
    }

    fn checkcast(&mut self, class: &RefType) -> Result<(), Error> {
        let class = self.constant_pool().ref_class(class)?;
        self.instruction(Instruction::TypeCheck {
            opcode: Opcode::CHECKCAST,
            class,
        })
    }

    fn instanceof(&mut self, class: &RefType) -> Result<(), Error> {
        let class = self.constant_pool().ref_class(class)?;
        self.instruction(Instruction::TypeCheck {
            opcode: Opcode::INSTANCEOF,
            class,
        })
    }

    fn iinc(&mut self, slot: u16, delta: i16) -> Result<(), Error> {
        self.instruction(Instruction::Increment {
            opcode: Opcode::IINC,
            slot,
            delta,
        })
    }

    fn line_number(&mut self, line: u16) -> Result<(), Error> {
        self.with(CodeElement::LineNumber(line))
    }

    /// Exceptions of class `catch_type` (or all exceptions) thrown in `try_start..try_end` go to
    /// `handler`
    fn exception_catch(
        &mut self,
        handler: Label,
        try_start: Label,
        try_end: Label,
        catch_type: Option<&BinaryName>,
    ) -> Result<(), Error> {
        let catch_type = match catch_type {
            Some(class) => Some(self.constant_pool().class(class)?),
            None => None,
        };
        self.with(CodeElement::ExceptionCatch {
            handler,
            try_start,
            try_end,
            catch_type,
        })
    }

    fn local_variable(
        &mut self,
        slot: u16,
        name: &str,
        descriptor: &FieldType,
        start: Label,
        end: Label,
    ) -> Result<(), Error> {
        let name = self.constant_pool().utf8(name)?;
        let descriptor = self.constant_pool().utf8(&descriptor.render())?;
        self.with(CodeElement::LocalVariable(LocalVariable {
            slot,
            name,
            descriptor,
            start,
            end,
        }))
    }

    fn athrow(&mut self) -> Result<(), Error> {
        self.instruction(Instruction::Throw)
    }

    fn nop(&mut self) -> Result<(), Error> {
        self.instruction(Instruction::Nop)
    }

    /// Run `body` in a nested block, with its own local variable scope
    ///
    /// Locals allocated in the block are released when the block ends, so sibling blocks reuse
    /// the same slots.
    fn block(
        &mut self,
        body: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
    ) -> Result<(), Error> {
        build_block(self.as_dyn(), None, body).map(|_| ())
    }

    /// Run `then` only if the branch condition `opcode` holds
    fn if_then(
        &mut self,
        opcode: Opcode,
        then: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let skip = opcode.invert().ok_or(Error::InvalidOperand {
            opcode,
            reason: "only conditional branches can guard a block",
        })?;
        build_block(self.as_dyn(), None, |block| {
            let end = block.end_label();
            block.branch(skip, end)?;
            then(block)
        })
        .map(|_| ())
    }

    /// Run `then` if the branch condition `opcode` holds, and `otherwise` if it doesn't
    fn if_then_else(
        &mut self,
        opcode: Opcode,
        then: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
        otherwise: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
    ) -> Result<(), Error> {
        build_if_then_else(self.as_dyn(), opcode, then, otherwise)
    }

    /// Try/catch: `body` is protected by the handlers registered in `catches`
    fn trying(
        &mut self,
        body: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
        catches: impl FnOnce(&mut CatchBuilder) -> Result<(), Error>,
    ) -> Result<(), Error> {
        build_try(self.as_dyn(), body, catches)
    }

    /// Switch on the `int` on top of the stack
    fn switch_on<'c>(
        &mut self,
        encoding: SwitchEncoding,
        cases: impl FnOnce(&mut SwitchCases<'c>) -> Result<(), Error>,
    ) -> Result<(), Error> {
        build_switch(self.as_dyn(), encoding, cases)
    }

    /// Replay the body of `original` into this builder, through `transform`
    fn transforming(
        &mut self,
        original: &CodeModel,
        transform: impl CodeTransform,
    ) -> Result<(), Error> {
        let mut chained = ChainedCodeBuilder::new(self.as_dyn(), transform);
        original.write_to(&mut chained)?;
        chained.end()
    }
}

impl<B: CodeBuilder + ?Sized> CodeBuilderExt for B {}
