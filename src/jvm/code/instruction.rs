use super::{Label, Opcode};
use crate::jvm::class_file::{
    ClassIndex, ConstantIndex, FieldRefIndex, InvokeDynamicIndex, MethodRefIndex,
};
use crate::jvm::{Error, TypeKind};

/// Instructions, grouped by what they do
///
/// Operands are symbolic: branch targets are labels, pool operands are handles. Where several
/// opcodes share an operand shape, the variant carries the opcode (so `Load` covers `iload`,
/// `aload_2`, `wide dload`, ...). Encoding picks the size of index and slot operands, so eg. an
/// `ldc` whose constant ends up above index 255 is written as `ldc_w`.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-6.html#jvms-6.5
#[derive(Clone, PartialEq, Debug)]
pub enum Instruction {
    Nop,

    /// `aconst_null`, `iconst_<i>`, `lconst_<l>`, `fconst_<f>`, `dconst_<d>`
    ConstantIntrinsic(Opcode),

    /// `bipush` or `sipush`
    ConstantArgument { opcode: Opcode, value: i16 },

    /// `ldc`, `ldc_w`, or `ldc2_w`
    ConstantLoad {
        opcode: Opcode,
        constant: ConstantIndex,
    },

    Load { opcode: Opcode, slot: u16 },
    Store { opcode: Opcode, slot: u16 },
    Increment { opcode: Opcode, slot: u16, delta: i16 },

    /// Conditional branches, `goto`, `jsr`, and their wide forms
    Branch { opcode: Opcode, target: Label },

    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },

    LookupSwitch {
        default: Label,

        /// Sorted by key when encoded
        cases: Vec<(i32, Label)>,
    },

    Return(Opcode),
    Throw,

    /// `getstatic`, `putstatic`, `getfield`, `putfield`
    Field { opcode: Opcode, field: FieldRefIndex },

    /// `invokevirtual`, `invokespecial`, `invokestatic`, `invokeinterface`
    Invoke { opcode: Opcode, method: MethodRefIndex },

    InvokeDynamic(InvokeDynamicIndex),

    NewObject(ClassIndex),
    NewPrimitiveArray(TypeKind),
    NewReferenceArray(ClassIndex),
    NewMultiArray { class: ClassIndex, dimensions: u8 },

    ArrayLoad(Opcode),
    ArrayStore(Opcode),

    /// `checkcast` or `instanceof`
    TypeCheck { opcode: Opcode, class: ClassIndex },

    Convert(Opcode),

    /// Arithmetic, bitwise, comparisons, and `arraylength`
    Operator(Opcode),

    /// `pop`, `dup`, `swap`, and friends
    Stack(Opcode),

    Monitor(Opcode),

    /// `ret`, which is only legal in old class files
    Ret { opcode: Opcode, slot: u16 },
}

impl Instruction {
    /// Opcode of the instruction as it was constructed (before any resizing at encoding time)
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::NOP,
            Instruction::ConstantIntrinsic(opcode)
            | Instruction::Return(opcode)
            | Instruction::ArrayLoad(opcode)
            | Instruction::ArrayStore(opcode)
            | Instruction::Convert(opcode)
            | Instruction::Operator(opcode)
            | Instruction::Stack(opcode)
            | Instruction::Monitor(opcode)
            | Instruction::ConstantArgument { opcode, .. }
            | Instruction::ConstantLoad { opcode, .. }
            | Instruction::Load { opcode, .. }
            | Instruction::Store { opcode, .. }
            | Instruction::Increment { opcode, .. }
            | Instruction::Branch { opcode, .. }
            | Instruction::Field { opcode, .. }
            | Instruction::Invoke { opcode, .. }
            | Instruction::TypeCheck { opcode, .. }
            | Instruction::Ret { opcode, .. } => *opcode,
            Instruction::TableSwitch { .. } => Opcode::TABLESWITCH,
            Instruction::LookupSwitch { .. } => Opcode::LOOKUPSWITCH,
            Instruction::Throw => Opcode::ATHROW,
            Instruction::InvokeDynamic(_) => Opcode::INVOKEDYNAMIC,
            Instruction::NewObject(_) => Opcode::NEW,
            Instruction::NewPrimitiveArray(_) => Opcode::NEWARRAY,
            Instruction::NewReferenceArray(_) => Opcode::ANEWARRAY,
            Instruction::NewMultiArray { .. } => Opcode::MULTIANEWARRAY,
        }
    }

    /// Can control continue to the next instruction?
    pub fn falls_through(&self) -> bool {
        !self.opcode().is_unconditional()
    }

    /// Check that the opcode matches the variant it is in
    pub fn validate(&self) -> Result<(), Error> {
        use super::OpcodeKind as Kind;

        let opcode = self.opcode();
        let expected = match self {
            Instruction::Nop => Kind::Nop,
            Instruction::ConstantIntrinsic(_) => Kind::ConstantIntrinsic,
            Instruction::ConstantArgument { .. } => Kind::ConstantArgument,
            Instruction::ConstantLoad { .. } => Kind::ConstantLoad,
            Instruction::Load { .. } => Kind::Load,
            Instruction::Store { .. } => Kind::Store,
            Instruction::Increment { .. } => Kind::Increment,
            Instruction::Branch { .. } => Kind::Branch,
            Instruction::TableSwitch { .. } => Kind::TableSwitch,
            Instruction::LookupSwitch { .. } => Kind::LookupSwitch,
            Instruction::Return(_) => Kind::Return,
            Instruction::Throw => Kind::Throw,
            Instruction::Field { .. } => Kind::Field,
            Instruction::Invoke { .. } => Kind::Invoke,
            Instruction::InvokeDynamic(_) => Kind::InvokeDynamic,
            Instruction::NewObject(_) => Kind::NewObject,
            Instruction::NewPrimitiveArray(_) => Kind::NewPrimitiveArray,
            Instruction::NewReferenceArray(_) => Kind::NewReferenceArray,
            Instruction::NewMultiArray { .. } => Kind::NewMultiArray,
            Instruction::ArrayLoad(_) => Kind::ArrayLoad,
            Instruction::ArrayStore(_) => Kind::ArrayStore,
            Instruction::TypeCheck { .. } => Kind::TypeCheck,
            Instruction::Convert(_) => Kind::Convert,
            Instruction::Operator(_) => Kind::Operator,
            Instruction::Stack(_) => Kind::Stack,
            Instruction::Monitor(_) => Kind::Monitor,
            Instruction::Ret { .. } => Kind::DiscontinuedRet,
        };
        if opcode.kind() != expected {
            return Err(Error::InvalidOperand {
                opcode,
                reason: "opcode does not belong to this kind of instruction",
            });
        }

        match self {
            Instruction::ConstantArgument { opcode, value }
                if *opcode == Opcode::BIPUSH && i8::try_from(*value).is_err() =>
            {
                Err(Error::InvalidOperand {
                    opcode: *opcode,
                    reason: "bipush value does not fit in a byte",
                })
            }
            Instruction::TableSwitch {
                low, high, targets, ..
            } if *high < *low || (*high as i64 - *low as i64 + 1) as usize != targets.len() => {
                Err(Error::InvalidOperand {
                    opcode,
                    reason: "tableswitch bounds do not match its targets",
                })
            }
            Instruction::NewPrimitiveArray(kind) if kind.array_type_code().is_none() => {
                Err(Error::InvalidOperand {
                    opcode,
                    reason: "newarray needs a primitive element kind",
                })
            }
            Instruction::NewMultiArray { dimensions: 0, .. } => Err(Error::InvalidOperand {
                opcode,
                reason: "multianewarray needs at least one dimension",
            }),
            _ => Ok(()),
        }
    }

    /// Every label the instruction branches to
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Instruction::Branch { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Instruction::LookupSwitch { default, cases } => std::iter::once(*default)
                .chain(cases.iter().map(|(_, label)| *label))
                .collect(),
            _ => vec![],
        }
    }

    /// Rewrite every label in the instruction
    pub fn map_labels(
        self,
        mut map: impl FnMut(Label) -> Result<Label, Error>,
    ) -> Result<Instruction, Error> {
        Ok(match self {
            Instruction::Branch { opcode, target } => Instruction::Branch {
                opcode,
                target: map(target)?,
            },
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            } => Instruction::TableSwitch {
                low,
                high,
                default: map(default)?,
                targets: targets
                    .into_iter()
                    .map(&mut map)
                    .collect::<Result<_, _>>()?,
            },
            Instruction::LookupSwitch { default, cases } => Instruction::LookupSwitch {
                default: map(default)?,
                cases: cases
                    .into_iter()
                    .map(|(key, label)| Ok((key, map(label)?)))
                    .collect::<Result<_, Error>>()?,
            },
            other => other,
        })
    }
}
