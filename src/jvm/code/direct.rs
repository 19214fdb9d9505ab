use super::jump_encoding::{
    widen_code, widen_oversized_jumps, Relocation, ShortJump, SIGNED_16BIT_JUMP_RANGE,
};
use super::builder::clamp_slot;
use super::{
    CodeBuilder, CodeElement, CodeModel, Instruction, Label, LabelContext, LocalVariable,
    MethodInfo, Opcode,
};
use crate::jvm::class_file::{
    Attribute, AttributeLike, BufWriter, ClassIndex, CodeAttribute, ConstantIndex, ConstantPool,
    ExceptionTableEntry, LineNumberEntry, LineNumberTable, LocalVariableEntry, LocalVariableTable,
    LocalVariableTypeTable, Utf8Index,
};
use crate::jvm::class_graph::ClassHierarchy;
use crate::jvm::options::{
    CodeOptions, DeadLabelsOption, DebugElementsOption, ShortJumpsOption, StackMapsOption,
};
use crate::jvm::verifier::{encode_stack_map_table, Frame, StackMapFrame, StackMapGenerator};
use crate::jvm::{Error, MethodDescriptor, ParseDescriptor, RefType, TypeKind};

/// Largest code array accepted by the JVM
const MAX_CODE_LENGTH: usize = 65535;

/// Prefix byte of `wide` local variable instructions
const WIDE: u8 = 0xc4;

/// Terminal builder which encodes instructions as they arrive
///
/// Branches are written with placeholder offsets and recorded as fixups. When the body is
/// finished, labels are all bound, so the fixups can be resolved: jumps that don't fit in 16 bits
/// get widened (see [`super::jump_encoding`]), offsets are patched, and finally the stack map
/// frames and maxima are computed on the final code.
///
/// Instructions keep the form they were given in whenever it is valid (a `ldc_w` with a small
/// index stays a `ldc_w`, a `wide iload` stays wide), so re-encoding parsed code yields the same
/// bytes.
pub struct DirectCodeBuilder<'p> {
    method: MethodInfo,
    options: CodeOptions,
    pool: &'p mut ConstantPool,

    /// Pool that handles from the original body belong to
    source_pool: Option<&'p ConstantPool>,
    original: Option<&'p CodeModel<'p>>,

    code: BufWriter<'static>,
    labels: LabelContext,
    start: Label,
    end: Label,

    fixups: Vec<Fixup>,
    catches: Vec<Catch>,
    line_numbers: Vec<(u32, u16)>,
    local_variables: Vec<LocalVariable>,
    local_variable_types: Vec<LocalVariable>,
    frames: Vec<(Label, Frame<ClassIndex, Label>)>,

    /// Past the last allocated slot (may run past `u16::MAX`, which `finish` rejects)
    next_local: u32,
}

/// Branch offset to be patched once labels are bound
#[derive(Copy, Clone, Debug)]
struct Fixup {
    /// Offset of the branching instruction (offsets are relative to it)
    instruction: u32,

    /// Offset of the offset field
    operand: u32,
    label: Label,

    /// Is the offset field 32 bits wide?
    wide: bool,
}

#[derive(Copy, Clone, Debug)]
struct Catch {
    handler: Label,
    try_start: Label,
    try_end: Label,
    catch_type: Option<ClassIndex>,
}

impl<'p> DirectCodeBuilder<'p> {
    pub fn new(
        method: MethodInfo,
        pool: &'p mut ConstantPool,
        options: CodeOptions,
    ) -> DirectCodeBuilder<'p> {
        DirectCodeBuilder::with_labels(method, pool, options, LabelContext::new())
    }

    /// Builder for a new version of a parsed body
    ///
    /// Labels of the original body are accepted as they are, and handles from its pool are
    /// cloned into `pool` when needed. The method may be renamed, but its static-ness and
    /// descriptor are fixed by the original body.
    pub fn transforming(
        original: &'p CodeModel<'p>,
        method: MethodInfo,
        pool: &'p mut ConstantPool,
        options: CodeOptions,
    ) -> Result<DirectCodeBuilder<'p>, Error> {
        if method.is_static() != original.method().is_static() {
            return Err(Error::ImmutableProperty("static"));
        }
        if method.descriptor != original.method().descriptor {
            return Err(Error::ImmutableProperty("descriptor"));
        }
        let labels = LabelContext::adopting(original.label_context());
        let mut builder = DirectCodeBuilder::with_labels(method, pool, options, labels);
        builder.source_pool = Some(original.pool());
        builder.original = Some(original);
        builder.next_local = builder.next_local.max(original.max_locals() as u32);
        Ok(builder)
    }

    fn with_labels(
        method: MethodInfo,
        pool: &'p mut ConstantPool,
        options: CodeOptions,
        mut labels: LabelContext,
    ) -> DirectCodeBuilder<'p> {
        let start = labels.new_bound_label(0);
        let end = labels.new_label();
        let next_local = method.parameter_slots() as u32;
        DirectCodeBuilder {
            method,
            options,
            pool,
            source_pool: None,
            original: None,
            code: BufWriter::new(),
            labels,
            start,
            end,
            fixups: vec![],
            catches: vec![],
            line_numbers: vec![],
            local_variables: vec![],
            local_variable_types: vec![],
            frames: vec![],
            next_local,
        }
    }

    /// Index of a handle in the destination pool
    fn resolve(&mut self, handle: impl Into<ConstantIndex>) -> Result<u16, Error> {
        self.pool.resolve(handle.into(), self.source_pool)
    }

    fn resolve_class(&mut self, class: ClassIndex) -> Result<ClassIndex, Error> {
        let index = self.resolve(class)?;
        Ok(self.pool.index(index)?.as_class())
    }

    fn resolve_utf8(&mut self, utf8: Utf8Index) -> Result<Utf8Index, Error> {
        let index = self.resolve(utf8)?;
        Ok(self.pool.index(index)?.as_utf8())
    }

    fn locals_used(&self) -> Result<u16, Error> {
        u16::try_from(self.next_local).map_err(|_| Error::MaxLocalsOverflow)
    }

    fn position(&self) -> u32 {
        self.code.size() as u32
    }

    fn branch_placeholder(&mut self, instruction: u32, label: Label, wide: bool) {
        let operand = if wide {
            self.code.skip(4)
        } else {
            self.code.skip(2)
        };
        self.fixups.push(Fixup {
            instruction,
            operand: operand as u32,
            label,
            wide,
        });
    }

    /// Switch operands start on a multiple of four, relative to the start of the code
    fn switch_padding(&mut self) {
        while self.code.size() % 4 != 0 {
            self.code.write_u1(0);
        }
    }

    fn encode_local(&mut self, opcode: Opcode, slot: u16) -> Result<(), Error> {
        if let Some(implicit) = opcode.implicit_slot() {
            if implicit != slot {
                return Err(Error::InvalidOperand {
                    opcode,
                    reason: "slot does not match the opcode's implicit slot",
                });
            }
            self.code.write_u1(opcode.byte());
        } else if opcode.is_wide() || slot > u8::MAX as u16 {
            let wide = opcode.widened().ok_or(Error::InvalidOperand {
                opcode,
                reason: "opcode has no wide form",
            })?;
            self.code.write_u1(WIDE);
            self.code.write_u1(wide.byte());
            self.code.write_u2(slot);
        } else {
            self.code.write_u1(opcode.byte());
            self.code.write_u1(slot as u8);
        }
        Ok(())
    }

    fn encode(&mut self, instruction: Instruction) -> Result<(), Error> {
        let position = self.position();
        match instruction {
            Instruction::Nop => self.code.write_u1(Opcode::NOP.byte()),
            Instruction::Throw => self.code.write_u1(Opcode::ATHROW.byte()),
            Instruction::ConstantIntrinsic(opcode)
            | Instruction::Return(opcode)
            | Instruction::ArrayLoad(opcode)
            | Instruction::ArrayStore(opcode)
            | Instruction::Convert(opcode)
            | Instruction::Operator(opcode)
            | Instruction::Stack(opcode)
            | Instruction::Monitor(opcode) => self.code.write_u1(opcode.byte()),
            Instruction::ConstantArgument { opcode, value } => {
                self.code.write_u1(opcode.byte());
                if opcode == Opcode::BIPUSH {
                    self.code.write_i1(value as i8);
                } else {
                    self.code.write_i2(value);
                }
            }
            Instruction::ConstantLoad { opcode, constant } => {
                let index = self.resolve(constant)?;
                if !self.pool.entry(index)?.is_loadable() {
                    return Err(Error::InvalidOperand {
                        opcode,
                        reason: "constant is not loadable",
                    });
                }
                if opcode == Opcode::LDC && index <= u8::MAX as u16 {
                    self.code.write_u1(Opcode::LDC.byte());
                    self.code.write_u1(index as u8);
                } else {
                    let opcode = if opcode == Opcode::LDC2_W {
                        Opcode::LDC2_W
                    } else {
                        Opcode::LDC_W
                    };
                    self.code.write_u1(opcode.byte());
                    self.code.write_u2(index);
                }
            }
            Instruction::Load { opcode, slot }
            | Instruction::Store { opcode, slot }
            | Instruction::Ret { opcode, slot } => self.encode_local(opcode, slot)?,
            Instruction::Increment {
                opcode,
                slot,
                delta,
            } => {
                if opcode.is_wide() || slot > u8::MAX as u16 || i8::try_from(delta).is_err() {
                    self.code.write_u1(WIDE);
                    self.code.write_u1(Opcode::IINC.byte());
                    self.code.write_u2(slot);
                    self.code.write_i2(delta);
                } else {
                    self.code.write_u1(Opcode::IINC.byte());
                    self.code.write_u1(slot as u8);
                    self.code.write_i1(delta as i8);
                }
            }
            Instruction::Branch { opcode, target } => {
                self.code.write_u1(opcode.byte());
                let wide = opcode == Opcode::GOTO_W || opcode == Opcode::JSR_W;
                self.branch_placeholder(position, target, wide);
            }
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                self.code.write_u1(Opcode::TABLESWITCH.byte());
                self.switch_padding();
                self.branch_placeholder(position, default, true);
                self.code.write_i4(low);
                self.code.write_i4(high);
                for target in targets {
                    self.branch_placeholder(position, target, true);
                }
            }
            Instruction::LookupSwitch { default, mut cases } => {
                cases.sort_by_key(|(key, _)| *key);
                if let Some(pair) = cases.windows(2).find(|pair| pair[0].0 == pair[1].0) {
                    return Err(Error::DuplicateSwitchCase(pair[0].0));
                }
                self.code.write_u1(Opcode::LOOKUPSWITCH.byte());
                self.switch_padding();
                self.branch_placeholder(position, default, true);
                self.code.write_u4(cases.len() as u32);
                for (key, target) in cases {
                    self.code.write_i4(key);
                    self.branch_placeholder(position, target, true);
                }
            }
            Instruction::Field { opcode, field } => {
                let index = self.resolve(field)?;
                self.code.write_u1(opcode.byte());
                self.code.write_u2(index);
            }
            Instruction::Invoke { opcode, method } => {
                let index = self.resolve(method)?;
                self.code.write_u1(opcode.byte());
                self.code.write_u2(index);
                if opcode == Opcode::INVOKEINTERFACE {
                    let member = self.pool.member_ref_at(index)?;
                    let descriptor = MethodDescriptor::parse(&member.descriptor)?;
                    let count = descriptor.parameter_length(true);
                    self.code.write_u1(count as u8);
                    self.code.write_u1(0);
                }
            }
            Instruction::InvokeDynamic(call_site) => {
                let index = self.resolve(call_site)?;
                self.code.write_u1(Opcode::INVOKEDYNAMIC.byte());
                self.code.write_u2(index);
                self.code.write_u2(0);
            }
            Instruction::NewObject(class) => {
                let index = self.resolve(class)?;
                self.code.write_u1(Opcode::NEW.byte());
                self.code.write_u2(index);
            }
            Instruction::NewPrimitiveArray(kind) => {
                let code = kind.array_type_code().ok_or(Error::InvalidOperand {
                    opcode: Opcode::NEWARRAY,
                    reason: "newarray needs a primitive element kind",
                })?;
                self.code.write_u1(Opcode::NEWARRAY.byte());
                self.code.write_u1(code);
            }
            Instruction::NewReferenceArray(class) => {
                let index = self.resolve(class)?;
                self.code.write_u1(Opcode::ANEWARRAY.byte());
                self.code.write_u2(index);
            }
            Instruction::NewMultiArray { class, dimensions } => {
                let index = self.resolve(class)?;
                self.code.write_u1(Opcode::MULTIANEWARRAY.byte());
                self.code.write_u2(index);
                self.code.write_u1(dimensions);
            }
            Instruction::TypeCheck { opcode, class } => {
                let index = self.resolve(class)?;
                self.code.write_u1(opcode.byte());
                self.code.write_u2(index);
            }
        }
        Ok(())
    }

    /// Resolve labels, widen jumps, compute frames, and produce the `Code` attribute
    pub fn finish(mut self) -> Result<CodeAttribute, Error> {
        let locals_used = self.locals_used()?;
        let end_offset = self.position();
        self.labels.bind(self.end, end_offset)?;
        let mut code = self.code.as_bytes().to_vec();

        // Short jumps which don't fit get widened
        let mut short_jumps: Vec<ShortJump> = vec![];
        let mut short_fixups: Vec<usize> = vec![];
        for (index, fixup) in self.fixups.iter().enumerate() {
            if !fixup.wide {
                short_jumps.push(ShortJump {
                    position: fixup.instruction,
                    target: self.labels.offset(fixup.label)?,
                    is_goto: {
                        let opcode = code[fixup.instruction as usize];
                        opcode == Opcode::GOTO.byte() || opcode == Opcode::JSR.byte()
                    },
                });
                short_fixups.push(index);
            }
        }
        let widened = match self.options.short_jumps {
            ShortJumpsOption::Fix => widen_oversized_jumps(&short_jumps, &SIGNED_16BIT_JUMP_RANGE),
            ShortJumpsOption::Fail => {
                let oversized = short_jumps.iter().find(|jump| {
                    let relative = jump.target as isize - jump.position as isize;
                    !SIGNED_16BIT_JUMP_RANGE.contains(&relative)
                });
                if let Some(jump) = oversized {
                    return Err(Error::BranchOffsetOverflow {
                        offset: jump.position,
                        target: jump.target,
                    });
                }
                vec![]
            }
        };
        let relocation = Relocation::new(&short_jumps, &widened);
        if !relocation.is_identity() {
            code = widen_code(&code, &short_jumps, &widened);
            self.labels.relocate(|offset| relocation.relocate(offset));
            for (pc, _) in &mut self.line_numbers {
                *pc = relocation.relocate(*pc);
            }
            for fixup in &mut self.fixups {
                let moved = relocation.relocate(fixup.instruction);
                fixup.operand = moved + (fixup.operand - fixup.instruction);
                fixup.instruction = moved;
            }
            for jump_index in &widened {
                let jump = &short_jumps[*jump_index];
                let fixup = &mut self.fixups[short_fixups[*jump_index]];
                fixup.instruction += jump.wide_branch_offset();
                fixup.operand = fixup.instruction + 1;
                fixup.wide = true;
            }
        }

        let mut patched = BufWriter::new();
        patched.write_bytes(&code);
        for fixup in &self.fixups {
            let target = self.labels.offset(fixup.label)?;
            let relative = target as i64 - fixup.instruction as i64;
            if fixup.wide {
                patched.patch_u4(fixup.operand as usize, relative as i32 as u32);
            } else {
                let relative = i16::try_from(relative).map_err(|_| Error::BranchOffsetOverflow {
                    offset: fixup.instruction,
                    target,
                })?;
                patched.patch_u2(fixup.operand as usize, relative as u16);
            }
        }
        let mut code = patched.into_bytes();
        if code.len() > MAX_CODE_LENGTH {
            return Err(Error::MethodCodeOverflow(code.len()));
        }

        let mut exception_table = Vec::with_capacity(self.catches.len());
        for catch in self.catches.clone() {
            exception_table.push(ExceptionTableEntry {
                start_pc: self.labels.offset(catch.try_start)? as u16,
                end_pc: self.labels.offset(catch.try_end)? as u16,
                handler_pc: self.labels.offset(catch.handler)? as u16,
                catch_type: match catch.catch_type {
                    Some(class) => Some(self.resolve_class(class)?),
                    None => None,
                },
            });
        }

        let unchanged = self.original.filter(|original| {
            self.pool.can_write_direct(original.pool().id())
                && original.code() == code.as_slice()
                && raw_exception_table(original.exception_table())
                    == raw_exception_table(&exception_table)
        });

        let (max_stack, max_locals, stack_map_frames, attributes) = match unchanged {
            Some(original) if self.options.stack_maps == StackMapsOption::Generate => {
                log::debug!(
                    "Code of {:?} is unchanged, reusing its stack map",
                    self.method.name
                );
                (
                    original.max_stack(),
                    original.max_locals().max(locals_used),
                    original.stack_map_frames().to_vec(),
                    original.attributes().to_vec(),
                )
            }
            _ => {
                let resolver = self.options.class_hierarchy.clone();
                let generated = StackMapGenerator::new(
                    &self.method,
                    &*self.pool,
                    ClassHierarchy::new(&*resolver),
                    self.options.dead_code,
                )
                .generate(&mut code, &mut exception_table)?;

                let frames = match self.options.stack_maps {
                    StackMapsOption::Generate => {
                        let frames = generated
                            .frames
                            .iter()
                            .map(|(offset, frame)| Ok((*offset, self.class_frame(frame)?)))
                            .collect::<Result<Vec<_>, Error>>()?;
                        let initial = self.class_frame(&Frame::initial(&self.method))?;
                        encode_stack_map_table(&initial, &frames)?
                    }
                    StackMapsOption::Drop => vec![],
                    StackMapsOption::Provided => {
                        if !relocation.is_identity() {
                            log::warn!(
                                "Jumps in {:?} were widened, provided stack map frames may be stale",
                                self.method.name
                            );
                        }
                        self.provided_frames()?
                    }
                };
                let max_locals = generated
                    .max_locals
                    .max(locals_used)
                    .max(self.method.parameter_slots());
                let attributes = match unchanged {
                    Some(original) => original.attributes().to_vec(),
                    None => vec![],
                };
                (generated.max_stack, max_locals, frames, attributes)
            }
        };

        let mut code_attribute = CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            stack_map_frames,
            attributes: vec![],
        };
        if self.options.debug_elements == DebugElementsOption::Pass {
            code_attribute.attributes = self.debug_attributes()?;
        }
        code_attribute.attributes.extend(attributes);
        Ok(code_attribute)
    }

    /// Generated frame in terms of the destination pool
    fn class_frame(&mut self, frame: &Frame<RefType, u32>) -> Result<Frame<ClassIndex, u16>, Error> {
        let pool = &mut *self.pool;
        frame.try_map(|verification_type| {
            verification_type.try_map(|class| pool.ref_class(class), |offset| Ok(*offset as u16))
        })
    }

    /// Frames passed in as elements, in terms of the destination pool
    fn provided_frames(&mut self) -> Result<Vec<StackMapFrame<ClassIndex, u16>>, Error> {
        let mut frames = Vec::with_capacity(self.frames.len());
        {
            let labels = &self.labels;
            let pool = &mut *self.pool;
            let source_pool = self.source_pool;
            for (target, frame) in &self.frames {
                let resolved = frame.try_map(|verification_type| {
                    verification_type.try_map(
                        |class| {
                            let index = pool.resolve((*class).into(), source_pool)?;
                            Ok::<_, Error>(pool.index(index)?.as_class())
                        },
                        |label| Ok::<_, Error>(labels.offset(*label)? as u16),
                    )
                })?;
                frames.push((labels.offset(*target)? as u16, resolved));
            }
        }
        frames.sort_by_key(|(offset, _)| *offset);
        let initial = self.class_frame(&Frame::initial(&self.method))?;
        encode_stack_map_table(&initial, &frames)
    }

    /// `LineNumberTable`, `LocalVariableTable`, and `LocalVariableTypeTable` attributes
    fn debug_attributes(&mut self) -> Result<Vec<Attribute>, Error> {
        let mut attributes = vec![];

        if !self.line_numbers.is_empty() {
            let table = LineNumberTable(
                self.line_numbers
                    .iter()
                    .map(|(pc, line)| LineNumberEntry {
                        start_pc: *pc as u16,
                        line_number: *line,
                    })
                    .collect(),
            );
            attributes.push(self.attribute(&table)?);
        }

        let variables = self.local_variable_entries(self.local_variables.clone())?;
        if !variables.is_empty() {
            attributes.push(self.attribute(&LocalVariableTable(variables))?);
        }
        let variable_types = self.local_variable_entries(self.local_variable_types.clone())?;
        if !variable_types.is_empty() {
            attributes.push(self.attribute(&LocalVariableTypeTable(variable_types))?);
        }
        Ok(attributes)
    }

    fn local_variable_entries(
        &mut self,
        variables: Vec<LocalVariable>,
    ) -> Result<Vec<LocalVariableEntry>, Error> {
        let mut entries = vec![];
        for variable in variables {
            let bounds = self
                .labels
                .offset(variable.start)
                .and_then(|start| Ok((start, self.labels.offset(variable.end)?)));
            let (start, end) = match (bounds, self.options.dead_labels) {
                (Ok(bounds), _) => bounds,
                (Err(Error::UnboundLabel(label)), DeadLabelsOption::Drop) => {
                    log::debug!("Dropping local variable with unbound label {:?}", label);
                    continue;
                }
                (Err(err), _) => return Err(err),
            };
            entries.push(LocalVariableEntry {
                start_pc: start as u16,
                length: end.saturating_sub(start) as u16,
                name: self.resolve_utf8(variable.name)?,
                descriptor: self.resolve_utf8(variable.descriptor)?,
                index: variable.slot,
            });
        }
        Ok(entries)
    }

    fn attribute<A: AttributeLike>(&mut self, attribute: &A) -> Result<Attribute, Error> {
        let name_index = self.pool.utf8(A::NAME)?;
        let mut writer = BufWriter::with_pool(self.pool);
        attribute.serialize(&mut writer)?;
        Ok(Attribute {
            name_index,
            info: writer.into_bytes(),
        })
    }
}

/// Exception table as raw indices, for comparing tables across pools
fn raw_exception_table(table: &[ExceptionTableEntry]) -> Vec<(u16, u16, u16, u16)> {
    table
        .iter()
        .map(|entry| {
            (
                entry.start_pc,
                entry.end_pc,
                entry.handler_pc,
                entry.catch_type.map_or(0, |class| class.index()),
            )
        })
        .collect()
}

impl<'p> CodeBuilder for DirectCodeBuilder<'p> {
    fn with(&mut self, element: CodeElement) -> Result<(), Error> {
        let labels = &mut self.labels;
        let element = element.map_labels(|label| labels.local(label))?;
        match element {
            CodeElement::Instruction(instruction) => {
                instruction.validate()?;
                self.encode(instruction)?;
            }
            CodeElement::Label(label) => {
                if label == self.end {
                    return Err(Error::LabelAlreadyBound(label));
                }
                let position = self.position();
                self.labels.bind(label, position)?;
            }
            CodeElement::LineNumber(line) => {
                if self.options.debug_elements == DebugElementsOption::Pass {
                    let position = self.position();
                    self.line_numbers.push((position, line));
                }
            }
            CodeElement::LocalVariable(variable) => {
                if self.options.debug_elements == DebugElementsOption::Pass {
                    self.local_variables.push(variable);
                }
            }
            CodeElement::LocalVariableType(variable) => {
                if self.options.debug_elements == DebugElementsOption::Pass {
                    self.local_variable_types.push(variable);
                }
            }
            CodeElement::ExceptionCatch {
                handler,
                try_start,
                try_end,
                catch_type,
            } => self.catches.push(Catch {
                handler,
                try_start,
                try_end,
                catch_type,
            }),
            CodeElement::Frame { target, frame } => {
                if self.options.stack_maps == StackMapsOption::Provided {
                    self.frames.push((target, frame));
                }
            }
        }
        Ok(())
    }

    fn new_label(&mut self) -> Label {
        self.labels.new_label()
    }

    fn start_label(&self) -> Label {
        self.start
    }

    fn end_label(&self) -> Label {
        self.end
    }

    fn method(&self) -> &MethodInfo {
        &self.method
    }

    fn next_local_slot(&self) -> u16 {
        clamp_slot(self.next_local)
    }

    fn allocate_local(&mut self, kind: TypeKind) -> u16 {
        let slot = clamp_slot(self.next_local);
        self.next_local += kind.slot_size() as u32;
        slot
    }

    fn constant_pool(&mut self) -> &mut ConstantPool {
        self.pool
    }

    /// Offset of a bound label (offsets move if jumps get widened when finishing)
    fn label_to_offset(&self, label: Label) -> Result<u32, Error> {
        match self.labels.offset(label) {
            Err(Error::UnboundLabel(label)) => Err(Error::LabelNotResolved(label)),
            other => other,
        }
    }

    fn as_dyn(&mut self) -> &mut dyn CodeBuilder {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::CodeBuilderExt;
    use crate::jvm::{BinaryName, MethodAccessFlags, Name, UnqualifiedName};

    fn method(descriptor: &str) -> MethodInfo {
        MethodInfo::new(
            BinaryName::from_str("me/Direct").unwrap(),
            UnqualifiedName::from_str("run").unwrap(),
            MethodDescriptor::parse(descriptor).unwrap(),
            MethodAccessFlags::STATIC,
        )
    }

    #[test]
    fn straight_line_code() {
        let mut pool = ConstantPool::new();
        let mut builder = DirectCodeBuilder::new(method("(II)I"), &mut pool, CodeOptions::default());
        builder.load(TypeKind::Int, 0).unwrap();
        builder.load(TypeKind::Int, 1).unwrap();
        builder.instruction(Instruction::Operator(Opcode::IADD)).unwrap();
        builder.return_(TypeKind::Int).unwrap();
        let code = builder.finish().unwrap();
        assert_eq!(code.code, vec![0x1a, 0x1b, 0x60, 0xac]);
        assert_eq!(code.max_stack, 2);
        assert_eq!(code.max_locals, 2);
        assert!(code.stack_map_frames.is_empty());
    }

    #[test]
    fn wide_local_access() {
        let mut pool = ConstantPool::new();
        let mut builder = DirectCodeBuilder::new(method("()V"), &mut pool, CodeOptions::default());
        builder.instruction(Instruction::ConstantIntrinsic(Opcode::ICONST_0)).unwrap();
        builder.store(TypeKind::Int, 300).unwrap();
        builder.iinc(300, 1).unwrap();
        builder.return_(TypeKind::Void).unwrap();
        let code = builder.finish().unwrap();
        assert_eq!(
            code.code,
            vec![0x03, 0xc4, 0x36, 0x01, 0x2c, 0xc4, 0x84, 0x01, 0x2c, 0x00, 0x01, 0xb1]
        );
        assert_eq!(code.max_locals, 301);
    }

    #[test]
    fn locals_past_last_slot() {
        let mut pool = ConstantPool::new();
        let mut builder = DirectCodeBuilder::new(method("()V"), &mut pool, CodeOptions::default());
        while builder.next_local_slot() < u16::MAX {
            builder.allocate_local(TypeKind::Int);
        }
        assert_eq!(builder.allocate_local(TypeKind::Long), u16::MAX);
        assert_eq!(builder.allocate_local(TypeKind::Int), u16::MAX);
        builder.return_(TypeKind::Void).unwrap();
        assert!(matches!(builder.finish(), Err(Error::MaxLocalsOverflow)));
    }

    #[test]
    fn branches_are_patched() {
        let mut pool = ConstantPool::new();
        let mut builder = DirectCodeBuilder::new(method("(I)I"), &mut pool, CodeOptions::default());
        let otherwise = builder.new_label();
        builder.load(TypeKind::Int, 0).unwrap();
        builder.branch(Opcode::IFEQ, otherwise).unwrap();
        builder.instruction(Instruction::ConstantIntrinsic(Opcode::ICONST_1)).unwrap();
        builder.return_(TypeKind::Int).unwrap();
        builder.label_binding(otherwise).unwrap();
        builder.instruction(Instruction::ConstantIntrinsic(Opcode::ICONST_0)).unwrap();
        builder.return_(TypeKind::Int).unwrap();
        let code = builder.finish().unwrap();
        assert_eq!(code.code, vec![0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac]);
        assert_eq!(code.stack_map_frames.len(), 1);
        assert_eq!(code.stack_map_frames[0].offset_delta(), 6);
    }

    #[test]
    fn unbound_branch_target() {
        let mut pool = ConstantPool::new();
        let mut builder = DirectCodeBuilder::new(method("()V"), &mut pool, CodeOptions::default());
        let nowhere = builder.new_label();
        builder.goto_(nowhere).unwrap();
        assert!(matches!(builder.finish(), Err(Error::UnboundLabel(_))));
    }

    #[test]
    fn oversized_jump_can_fail() {
        let mut pool = ConstantPool::new();
        let options = CodeOptions {
            short_jumps: ShortJumpsOption::Fail,
            ..CodeOptions::default()
        };
        let mut builder = DirectCodeBuilder::new(method("()V"), &mut pool, options);
        let end = builder.new_label();
        builder.goto_(end).unwrap();
        for _ in 0..40000 {
            builder.nop().unwrap();
        }
        builder.label_binding(end).unwrap();
        builder.return_(TypeKind::Void).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(Error::BranchOffsetOverflow { offset: 0, .. })
        ));
    }

    #[test]
    fn dead_debug_labels() {
        let make = |dead_labels| {
            let mut pool = ConstantPool::new();
            let name = pool.utf8("x").unwrap();
            let descriptor = pool.utf8("I").unwrap();
            let options = CodeOptions {
                dead_labels,
                ..CodeOptions::default()
            };
            let mut builder = DirectCodeBuilder::new(method("()V"), &mut pool, options);
            let start = builder.start_label();
            let never = builder.new_label();
            builder
                .with(CodeElement::LocalVariable(LocalVariable {
                    slot: 0,
                    name,
                    descriptor,
                    start,
                    end: never,
                }))
                .unwrap();
            builder.return_(TypeKind::Void).unwrap();
            builder.finish().map(|code| code.attributes.len())
        };
        assert!(matches!(make(DeadLabelsOption::Fail), Err(Error::UnboundLabel(_))));
        assert_eq!(make(DeadLabelsOption::Drop).unwrap(), 0);
    }

    #[test]
    fn ldc_index_upgrade() {
        let mut pool = ConstantPool::new();
        for i in 0..300 {
            pool.integer(100_000 + i).unwrap();
        }
        let mut builder = DirectCodeBuilder::new(method("()I"), &mut pool, CodeOptions::default());
        builder.load_constant(crate::jvm::code::ConstantValue::Int(100_299)).unwrap();
        builder.return_(TypeKind::Int).unwrap();
        let code = builder.finish().unwrap();
        assert_eq!(code.code[0], Opcode::LDC_W.byte());
        assert_eq!(code.code.len(), 4);
    }
}
