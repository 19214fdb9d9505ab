use super::buffered::replay;
use super::{
    CodeBuilder, CodeElement, Instruction, Label, LabelContext, LocalVariable, MethodInfo,
    OpcodeKind, RawBytecode, RawInstruction, RawOperands,
};
use crate::jvm::class_file::{Attribute, ClassIndex, ConstantPool, ExceptionTableEntry};
use crate::jvm::verifier::{decode_stack_map_table, Frame, StackMapFrame, VerificationType};
use crate::jvm::{Error, RefType, TypeKind};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};

/// Parsed method body
///
/// Parsing resolves every offset mentioned by the body (branch targets, exception ranges, debug
/// tables, stack map frames) into a label, and turns the body into the same elements a builder
/// accepts. Those labels are bound from the start, so [`CodeModel::label_to_offset`] works right
/// away.
///
/// Handles in the elements point into the pool the body was parsed with, and stay valid as long
/// as that pool does.
#[derive(Debug)]
pub struct CodeModel<'a> {
    pool: &'a ConstantPool,
    method: MethodInfo,
    max_stack: u16,
    max_locals: u16,
    code: Vec<u8>,
    exception_table: Vec<ExceptionTableEntry>,
    stack_map_frames: Vec<StackMapFrame<ClassIndex, u16>>,
    frames: Vec<(u16, Frame<RefType, u32>)>,
    elements: Vec<CodeElement>,
    labels: LabelContext,
    start: Label,
    end: Label,

    /// Attributes of the `Code` attribute which don't turn into elements
    attributes: Vec<Attribute>,
}

struct RawLocalVariable {
    start_pc: u16,
    length: u16,
    name: u16,
    descriptor: u16,
    index: u16,
}

fn truncated(_: std::io::Error) -> Error {
    Error::MalformedClass("truncated Code attribute")
}

impl<'a> CodeModel<'a> {
    /// Parse the payload of a `Code` attribute (everything after the attribute length)
    pub fn parse(
        payload: &[u8],
        pool: &'a ConstantPool,
        method: MethodInfo,
    ) -> Result<CodeModel<'a>, Error> {
        let mut cursor = Cursor::new(payload);
        let max_stack = cursor.read_u16::<BigEndian>().map_err(truncated)?;
        let max_locals = cursor.read_u16::<BigEndian>().map_err(truncated)?;
        let code_length = cursor.read_u32::<BigEndian>().map_err(truncated)?;
        if code_length == 0 {
            return Err(Error::MalformedClass("empty code array"));
        }
        let mut code = vec![0; code_length as usize];
        cursor.read_exact(&mut code).map_err(truncated)?;

        let exception_count = cursor.read_u16::<BigEndian>().map_err(truncated)?;
        let mut exception_table = Vec::with_capacity(exception_count as usize);
        for _ in 0..exception_count {
            let start_pc = cursor.read_u16::<BigEndian>().map_err(truncated)?;
            let end_pc = cursor.read_u16::<BigEndian>().map_err(truncated)?;
            let handler_pc = cursor.read_u16::<BigEndian>().map_err(truncated)?;
            let catch_type = match cursor.read_u16::<BigEndian>().map_err(truncated)? {
                0 => None,
                index => Some(pool.index(index)?.as_class()),
            };
            exception_table.push(ExceptionTableEntry {
                start_pc,
                end_pc,
                handler_pc,
                catch_type,
            });
        }

        let mut stack_map_frames = vec![];
        let mut line_numbers: Vec<(u16, u16)> = vec![];
        let mut local_variables: Vec<RawLocalVariable> = vec![];
        let mut local_variable_types: Vec<RawLocalVariable> = vec![];
        let mut attributes = vec![];
        let attribute_count = cursor.read_u16::<BigEndian>().map_err(truncated)?;
        for _ in 0..attribute_count {
            let name_index = cursor.read_u16::<BigEndian>().map_err(truncated)?;
            let length = cursor.read_u32::<BigEndian>().map_err(truncated)?;
            let mut info = vec![0; length as usize];
            cursor.read_exact(&mut info).map_err(truncated)?;

            match pool.utf8_at(name_index)?.as_str() {
                "StackMapTable" => stack_map_frames = StackMapFrame::read_table(&info, pool)?,
                "LineNumberTable" => line_numbers.extend(read_line_numbers(&info)?),
                "LocalVariableTable" => local_variables.extend(read_local_variables(&info)?),
                "LocalVariableTypeTable" => {
                    local_variable_types.extend(read_local_variables(&info)?)
                }
                _ => attributes.push(Attribute {
                    name_index: pool.index(name_index)?.as_utf8(),
                    info,
                }),
            }
        }
        if cursor.position() as usize != payload.len() {
            return Err(Error::MalformedClass("trailing bytes in Code attribute"));
        }

        let instructions: Vec<RawInstruction> =
            RawBytecode::new(&code).collect::<Result<_, _>>()?;
        let frames = decode_frames(&stack_map_frames, pool, &method)?;

        // Every offset which needs a label, along with where it was mentioned
        let mut label_offsets: BTreeMap<u32, u32> = BTreeMap::new();
        for insn in &instructions {
            for target in insn.branch_targets() {
                let target = u32::try_from(target).map_err(|_| Error::IllegalBytecode {
                    offset: insn.offset,
                    reason: "branch target is before the start of the code",
                })?;
                label_offsets.insert(target, insn.offset);
            }
        }
        let mut mention = |offset: u32| {
            label_offsets.insert(offset, offset);
        };
        for entry in &exception_table {
            mention(entry.start_pc as u32);
            mention(entry.end_pc as u32);
            mention(entry.handler_pc as u32);
        }
        for variable in local_variables.iter().chain(&local_variable_types) {
            mention(variable.start_pc as u32);
            mention(variable.start_pc as u32 + variable.length as u32);
        }
        for (offset, frame) in &frames {
            mention(*offset as u32);
            for verification_type in frame.locals.values().chain(frame.stack.values()) {
                if let VerificationType::Uninitialized(new_offset) = verification_type {
                    mention(*new_offset);
                }
            }
        }

        let boundaries: BTreeSet<u32> = instructions.iter().map(|insn| insn.offset).collect();
        let mut labels = LabelContext::new();
        let start = labels.new_bound_label(0);
        let end = labels.new_bound_label(code_length);
        let mut label_at: BTreeMap<u32, Label> = BTreeMap::new();
        label_at.insert(0, start);
        label_at.insert(code_length, end);
        for (offset, mentioned_at) in label_offsets {
            if offset != code_length && !boundaries.contains(&offset) {
                return Err(Error::IllegalBytecode {
                    offset: mentioned_at,
                    reason: "offset is not the start of an instruction",
                });
            }
            label_at
                .entry(offset)
                .or_insert_with(|| labels.new_bound_label(offset));
        }
        let label = |offset: i64| -> Result<Label, Error> {
            u32::try_from(offset)
                .ok()
                .and_then(|offset| label_at.get(&offset).copied())
                .ok_or(Error::IllegalBytecode {
                    offset: offset as u32,
                    reason: "offset has no label",
                })
        };

        let mut elements = vec![];
        for entry in &exception_table {
            elements.push(CodeElement::ExceptionCatch {
                handler: label(entry.handler_pc as i64)?,
                try_start: label(entry.start_pc as i64)?,
                try_end: label(entry.end_pc as i64)?,
                catch_type: entry.catch_type,
            });
        }

        let frame_at: BTreeMap<u32, &Frame<RefType, u32>> = frames
            .iter()
            .map(|(offset, frame)| (*offset as u32, frame))
            .collect();
        for insn in &instructions {
            if let Some(bound) = label_at.get(&insn.offset) {
                elements.push(CodeElement::Label(*bound));
            }
            for (_, line) in line_numbers.iter().filter(|(pc, _)| *pc as u32 == insn.offset) {
                elements.push(CodeElement::LineNumber(*line));
            }
            if let Some(frame) = frame_at.get(&insn.offset) {
                match frame_element(frame, pool, &label) {
                    Ok(frame) => elements.push(CodeElement::Frame {
                        target: label(insn.offset as i64)?,
                        frame,
                    }),
                    Err(err) => log::debug!(
                        "Leaving out frame at {} of {:?}: {}",
                        insn.offset,
                        method.name,
                        err
                    ),
                }
            }
            elements.push(CodeElement::Instruction(raw_instruction(insn, pool, &label)?));
        }
        elements.push(CodeElement::Label(end));

        for (variables, is_type) in [(&local_variables, false), (&local_variable_types, true)] {
            for variable in variables {
                let variable = LocalVariable {
                    slot: variable.index,
                    name: pool.index(variable.name)?.as_utf8(),
                    descriptor: pool.index(variable.descriptor)?.as_utf8(),
                    start: label(variable.start_pc as i64)?,
                    end: label(variable.start_pc as i64 + variable.length as i64)?,
                };
                elements.push(if is_type {
                    CodeElement::LocalVariableType(variable)
                } else {
                    CodeElement::LocalVariable(variable)
                });
            }
        }

        Ok(CodeModel {
            pool,
            method,
            max_stack,
            max_locals,
            code,
            exception_table,
            stack_map_frames,
            frames,
            elements,
            labels,
            start,
            end,
            attributes,
        })
    }

    pub fn pool(&self) -> &'a ConstantPool {
        self.pool
    }

    pub fn method(&self) -> &MethodInfo {
        &self.method
    }

    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    /// Raw code array
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn exception_table(&self) -> &[ExceptionTableEntry] {
        &self.exception_table
    }

    /// Frames exactly as stored in the `StackMapTable`
    pub fn stack_map_frames(&self) -> &[StackMapFrame<ClassIndex, u16>] {
        &self.stack_map_frames
    }

    /// Full frames decoded from the `StackMapTable`, sorted by offset
    pub fn frames(&self) -> &[(u16, Frame<RefType, u32>)] {
        &self.frames
    }

    pub fn elements(&self) -> &[CodeElement] {
        &self.elements
    }

    pub fn start_label(&self) -> Label {
        self.start
    }

    pub fn end_label(&self) -> Label {
        self.end
    }

    pub fn label_to_offset(&self, label: Label) -> Result<u32, Error> {
        self.labels.offset(label)
    }

    /// Identifier of the label context of the parsed labels
    pub fn label_context(&self) -> u32 {
        self.labels.id()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Feed the body into a builder
    ///
    /// Builders accepting the labels of this body (such as a direct builder created with
    /// [`super::DirectCodeBuilder::transforming`]) get the elements as they are. Any other
    /// builder gets fresh labels of its own.
    pub fn write_to(&self, builder: &mut dyn CodeBuilder) -> Result<(), Error> {
        for _ in builder.next_local_slot()..self.max_locals {
            builder.allocate_local(TypeKind::Int);
        }
        match builder.label_to_offset(self.start) {
            Err(Error::ForeignLabel(_)) => replay(&self.elements, builder),
            _ => {
                for element in &self.elements {
                    builder.with(element.clone())?;
                }
                Ok(())
            }
        }
    }
}

fn read_line_numbers(info: &[u8]) -> Result<Vec<(u16, u16)>, Error> {
    let mut cursor = Cursor::new(info);
    let count = cursor.read_u16::<BigEndian>().map_err(truncated)?;
    (0..count)
        .map(|_| {
            let start_pc = cursor.read_u16::<BigEndian>().map_err(truncated)?;
            let line = cursor.read_u16::<BigEndian>().map_err(truncated)?;
            Ok((start_pc, line))
        })
        .collect()
}

fn read_local_variables(info: &[u8]) -> Result<Vec<RawLocalVariable>, Error> {
    let mut cursor = Cursor::new(info);
    let count = cursor.read_u16::<BigEndian>().map_err(truncated)?;
    (0..count)
        .map(|_| {
            Ok(RawLocalVariable {
                start_pc: cursor.read_u16::<BigEndian>().map_err(truncated)?,
                length: cursor.read_u16::<BigEndian>().map_err(truncated)?,
                name: cursor.read_u16::<BigEndian>().map_err(truncated)?,
                descriptor: cursor.read_u16::<BigEndian>().map_err(truncated)?,
                index: cursor.read_u16::<BigEndian>().map_err(truncated)?,
            })
        })
        .collect()
}

/// Full frames of a `StackMapTable`, with class names resolved
fn decode_frames(
    stack_map_frames: &[StackMapFrame<ClassIndex, u16>],
    pool: &ConstantPool,
    method: &MethodInfo,
) -> Result<Vec<(u16, Frame<RefType, u32>)>, Error> {
    let named = stack_map_frames
        .iter()
        .map(|frame| {
            frame.try_map(|verification_type| {
                verification_type.try_map(
                    |class| RefType::from_internal_name(&pool.class_name_at(class.index())?),
                    |offset| Ok(*offset as u32),
                )
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    decode_stack_map_table(&Frame::initial(method), &named)
}

/// Frame element for a decoded frame, provided every class in it has a pool entry
fn frame_element(
    frame: &Frame<RefType, u32>,
    pool: &ConstantPool,
    label: &impl Fn(i64) -> Result<Label, Error>,
) -> Result<Frame<ClassIndex, Label>, Error> {
    frame.try_map(|verification_type| {
        verification_type.try_map(
            |class| {
                pool.lookup_class(&class.internal_name())
                    .ok_or(Error::MalformedClass("frame type has no class entry"))
            },
            |offset| label(*offset as i64),
        )
    })
}

/// Instruction element for a raw instruction
fn raw_instruction(
    insn: &RawInstruction,
    pool: &ConstantPool,
    label: &impl Fn(i64) -> Result<Label, Error>,
) -> Result<Instruction, Error> {
    let opcode = insn.opcode;
    let relative = |relative: i32| label(insn.offset as i64 + relative as i64);

    Ok(match (opcode.kind(), &insn.operands) {
        (OpcodeKind::Nop, _) => Instruction::Nop,
        (OpcodeKind::ConstantIntrinsic, _) => Instruction::ConstantIntrinsic(opcode),
        (OpcodeKind::ConstantArgument, RawOperands::Value(value)) => {
            Instruction::ConstantArgument {
                opcode,
                value: *value as i16,
            }
        }
        (OpcodeKind::ConstantLoad, RawOperands::Index(index)) => Instruction::ConstantLoad {
            opcode,
            constant: pool.index(*index)?,
        },
        (OpcodeKind::Load, RawOperands::Local(slot)) => Instruction::Load {
            opcode,
            slot: *slot,
        },
        (OpcodeKind::Store, RawOperands::Local(slot)) => Instruction::Store {
            opcode,
            slot: *slot,
        },
        (OpcodeKind::Increment, RawOperands::Increment { slot, delta }) => {
            Instruction::Increment {
                opcode,
                slot: *slot,
                delta: *delta,
            }
        }
        (OpcodeKind::Branch, RawOperands::Branch(offset)) => Instruction::Branch {
            opcode,
            target: relative(*offset)?,
        },
        (
            OpcodeKind::TableSwitch,
            RawOperands::TableSwitch {
                default,
                low,
                high,
                offsets,
            },
        ) => Instruction::TableSwitch {
            low: *low,
            high: *high,
            default: relative(*default)?,
            targets: offsets
                .iter()
                .map(|offset| relative(*offset))
                .collect::<Result<_, _>>()?,
        },
        (OpcodeKind::LookupSwitch, RawOperands::LookupSwitch { default, pairs }) => {
            Instruction::LookupSwitch {
                default: relative(*default)?,
                cases: pairs
                    .iter()
                    .map(|(key, offset)| Ok((*key, relative(*offset)?)))
                    .collect::<Result<_, Error>>()?,
            }
        }
        (OpcodeKind::Return, _) => Instruction::Return(opcode),
        (OpcodeKind::Throw, _) => Instruction::Throw,
        (OpcodeKind::Field, RawOperands::Index(index)) => Instruction::Field {
            opcode,
            field: pool.index(*index)?.as_field_ref(),
        },
        (OpcodeKind::Invoke, RawOperands::Index(index))
        | (OpcodeKind::Invoke, RawOperands::InvokeInterface { index, .. }) => {
            Instruction::Invoke {
                opcode,
                method: pool.index(*index)?.as_method_ref(),
            }
        }
        (OpcodeKind::InvokeDynamic, RawOperands::Index(index)) => {
            Instruction::InvokeDynamic(pool.index(*index)?.as_invoke_dynamic())
        }
        (OpcodeKind::NewObject, RawOperands::Index(index)) => {
            Instruction::NewObject(pool.index(*index)?.as_class())
        }
        (OpcodeKind::NewPrimitiveArray, RawOperands::Value(code)) => {
            let kind = TypeKind::from_array_type_code(*code as u8).ok_or(Error::IllegalBytecode {
                offset: insn.offset,
                reason: "unknown newarray type code",
            })?;
            Instruction::NewPrimitiveArray(kind)
        }
        (OpcodeKind::NewReferenceArray, RawOperands::Index(index)) => {
            Instruction::NewReferenceArray(pool.index(*index)?.as_class())
        }
        (OpcodeKind::NewMultiArray, RawOperands::MultiArray { index, dimensions }) => {
            Instruction::NewMultiArray {
                class: pool.index(*index)?.as_class(),
                dimensions: *dimensions,
            }
        }
        (OpcodeKind::ArrayLoad, _) => Instruction::ArrayLoad(opcode),
        (OpcodeKind::ArrayStore, _) => Instruction::ArrayStore(opcode),
        (OpcodeKind::TypeCheck, RawOperands::Index(index)) => Instruction::TypeCheck {
            opcode,
            class: pool.index(*index)?.as_class(),
        },
        (OpcodeKind::Convert, _) => Instruction::Convert(opcode),
        (OpcodeKind::Operator, _) => Instruction::Operator(opcode),
        (OpcodeKind::Stack, _) => Instruction::Stack(opcode),
        (OpcodeKind::Monitor, _) => Instruction::Monitor(opcode),
        (OpcodeKind::DiscontinuedRet, RawOperands::Local(slot)) => Instruction::Ret {
            opcode,
            slot: *slot,
        },
        _ => {
            return Err(Error::IllegalBytecode {
                offset: insn.offset,
                reason: "operands do not match the opcode",
            })
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::BufWriter;
    use crate::jvm::code::Opcode;
    use crate::jvm::{
        BinaryName, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName,
    };

    fn method(descriptor: &str) -> MethodInfo {
        MethodInfo::new(
            BinaryName::from_str("me/Model").unwrap(),
            UnqualifiedName::from_str("run").unwrap(),
            MethodDescriptor::parse(descriptor).unwrap(),
            MethodAccessFlags::STATIC,
        )
    }

    /// `Code` payload with no exception table and no attributes
    fn payload(max_stack: u16, max_locals: u16, code: &[u8]) -> Vec<u8> {
        let mut writer = BufWriter::new();
        writer.write_u2(max_stack);
        writer.write_u2(max_locals);
        writer.write_u4(code.len() as u32);
        writer.write_bytes(code);
        writer.write_u2(0);
        writer.write_u2(0);
        writer.into_bytes()
    }

    #[test]
    fn labels_are_resolved() {
        let pool = ConstantPool::new();
        // 0: iload_0; 1: ifeq +5 (to 6); 4: iconst_1; 5: ireturn; 6: iconst_0; 7: ireturn
        let code = [0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac];
        let model = CodeModel::parse(&payload(1, 1, &code), &pool, method("(I)I")).unwrap();
        assert_eq!(model.max_stack(), 1);
        assert_eq!(model.code(), &code);

        let target = model
            .elements()
            .iter()
            .find_map(|element| match element {
                CodeElement::Instruction(Instruction::Branch { opcode, target })
                    if *opcode == Opcode::IFEQ =>
                {
                    Some(*target)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(model.label_to_offset(target).unwrap(), 6);
        assert_eq!(model.label_to_offset(model.end_label()).unwrap(), 8);
        assert_eq!(
            model
                .elements()
                .iter()
                .filter(|element| matches!(element, CodeElement::Instruction(_)))
                .count(),
            6
        );
    }

    #[test]
    fn branch_into_an_instruction() {
        let pool = ConstantPool::new();
        // goto +1 lands in the middle of the goto itself
        let code = [0xa7, 0x00, 0x01, 0xb1];
        let result = CodeModel::parse(&payload(0, 0, &code), &pool, method("()V"));
        assert!(matches!(result, Err(Error::IllegalBytecode { offset: 0, .. })));
    }

    #[test]
    fn truncated_payload() {
        let pool = ConstantPool::new();
        let mut bytes = payload(0, 0, &[0xb1]);
        bytes.pop();
        let result = CodeModel::parse(&bytes, &pool, method("()V"));
        assert!(matches!(result, Err(Error::MalformedClass(_))));
    }
}
