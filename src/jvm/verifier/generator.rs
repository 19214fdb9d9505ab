use super::{Frame, TypeStack, VerificationType};
use crate::jvm::class_file::{Constant, ConstantPool, ExceptionTableEntry};
use crate::jvm::class_graph::ClassHierarchy;
use crate::jvm::code::{MethodInfo, Opcode, OpcodeKind, RawBytecode, RawInstruction, RawOperands};
use crate::jvm::options::DeadCodeOption;
use crate::jvm::{
    BinaryName, Error, FieldType, MethodDescriptor, ParseDescriptor, RefType, TypeKind,
    VerifierErrorKind,
};
use crate::util::{OffsetVec, Width};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type VType = VerificationType<RefType, u32>;

/// Result of a stack map computation
#[derive(Debug)]
pub struct GeneratedFrames {
    /// Frames at every branch target and exception handler, sorted by offset
    pub frames: Vec<(u16, Frame<RefType, u32>)>,
    pub max_stack: u16,
    pub max_locals: u16,

    /// Offsets where unreachable code was replaced by `nop ... athrow`
    pub patched_dead_code: Vec<u32>,
}

/// Computes `StackMapTable` frames along with `max_stack` and `max_locals`
///
/// This is a plain worklist dataflow analysis over the final bytecode. Frame points (branch
/// targets and exception handlers) each get one entry state, which only ever moves up the type
/// lattice when new incoming states are merged in, so the fixpoint is always reached.
///
/// ### Dead code
///
/// Instructions never reached cannot get a meaningful frame. Depending on [`DeadCodeOption`],
/// they are either reported, or overwritten by
///
/// ```text
/// nop
/// ...
/// nop
/// athrow
/// ```
///
/// which is given a frame with no locals and just a `Throwable` on the stack. Exception table
/// entries covering dead code are trimmed accordingly.
pub struct StackMapGenerator<'a> {
    method: &'a MethodInfo,
    pool: &'a ConstantPool,
    hierarchy: ClassHierarchy<'a>,
    dead_code: DeadCodeOption,
}

/// Abstract state before an instruction
#[derive(Clone, Debug, PartialEq)]
struct State {
    /// One entry per slot (the second slot of a `long` or `double` is `Top`)
    locals: Vec<VType>,
    stack: TypeStack<VType>,
}

struct Handler {
    start: u32,
    end: u32,
    handler: u32,
    catch_type: VType,
}

impl<'a> StackMapGenerator<'a> {
    pub fn new(
        method: &'a MethodInfo,
        pool: &'a ConstantPool,
        hierarchy: ClassHierarchy<'a>,
        dead_code: DeadCodeOption,
    ) -> StackMapGenerator<'a> {
        StackMapGenerator {
            method,
            pool,
            hierarchy,
            dead_code,
        }
    }

    /// Analyze the code, patching dead code in place (the length of the code never changes)
    pub fn generate(
        &self,
        code: &mut [u8],
        exception_table: &mut Vec<ExceptionTableEntry>,
    ) -> Result<GeneratedFrames, Error> {
        let instructions: Vec<RawInstruction> = RawBytecode::new(code).collect::<Result<_, _>>()?;
        let code_len = code.len() as u32;
        let index_at: HashMap<u32, usize> = instructions
            .iter()
            .enumerate()
            .map(|(index, insn)| (insn.offset, index))
            .collect();

        let handlers = self.handlers(exception_table, &index_at, code_len)?;
        let mut frame_points: BTreeSet<u32> = handlers.iter().map(|h| h.handler).collect();
        for insn in &instructions {
            for target in insn.branch_targets() {
                if target < 0 || !index_at.contains_key(&(target as u32)) {
                    return Err(Error::IllegalBytecode {
                        offset: insn.offset,
                        reason: "branch target is not the start of an instruction",
                    });
                }
                frame_points.insert(target as u32);
            }
        }

        let initial = self.initial_state();
        let mut max_locals = initial.locals.len();
        let mut max_stack = 0;
        let mut visited = vec![false; instructions.len()];
        let mut entries: BTreeMap<u32, State> = BTreeMap::new();
        let mut worklist: BTreeSet<u32> = BTreeSet::new();
        if !instructions.is_empty() {
            entries.insert(0, initial);
            worklist.insert(0);
        }

        let mut iterations = 0;
        while let Some(start) = worklist.iter().next().copied() {
            worklist.remove(&start);
            iterations += 1;

            let mut state = match entries.get(&start) {
                Some(state) => state.clone(),
                None => continue,
            };
            let mut index = index_at[&start];
            loop {
                let insn = &instructions[index];
                if insn.offset != start && frame_points.contains(&insn.offset) {
                    self.merge_into(&mut entries, &mut worklist, insn.offset, &state)?;
                    break;
                }
                visited[index] = true;
                max_stack = max_stack.max(state.stack.slots());

                self.merge_handlers(&handlers, insn.offset, &state, &mut entries, &mut worklist)?;
                self.execute(insn, &mut state, code)?;
                max_stack = max_stack.max(state.stack.slots());
                max_locals = max_locals.max(state.locals.len());
                if matches!(
                    insn.opcode.kind(),
                    OpcodeKind::Store | OpcodeKind::Increment | OpcodeKind::Invoke
                ) {
                    self.merge_handlers(&handlers, insn.offset, &state, &mut entries, &mut worklist)?;
                }

                for target in insn.branch_targets() {
                    self.merge_into(&mut entries, &mut worklist, target as u32, &state)?;
                }
                if insn.opcode.is_unconditional() {
                    break;
                }
                index += 1;
                if index == instructions.len() {
                    return Err(Error::IllegalBytecode {
                        offset: insn.offset,
                        reason: "execution falls off the end of the code",
                    });
                }
            }
        }
        log::debug!(
            "Stack maps for {:?}.{:?} converged after {} iterations",
            self.method.class,
            self.method.name,
            iterations
        );

        let mut frames: Vec<(u16, Frame<RefType, u32>)> = frame_points
            .iter()
            .filter_map(|offset| entries.get(offset).map(|state| (*offset as u16, state.to_frame())))
            .collect();

        let dead_ranges = dead_ranges(&instructions, &visited, code_len);
        let mut patched_dead_code = vec![];
        if let Some((dead_start, _)) = dead_ranges.first() {
            if self.dead_code == DeadCodeOption::Fail {
                return Err(Error::DeadCode {
                    offset: *dead_start,
                });
            }
            for (dead_start, dead_end) in &dead_ranges {
                log::debug!(
                    "Patching unreachable code at [{}, {}) in {:?}",
                    dead_start,
                    dead_end,
                    self.method.name
                );
                for byte in &mut code[*dead_start as usize..*dead_end as usize - 1] {
                    *byte = Opcode::NOP.byte();
                }
                code[*dead_end as usize - 1] = Opcode::ATHROW.byte();
                frames.push((
                    *dead_start as u16,
                    Frame {
                        locals: OffsetVec::new(),
                        stack: OffsetVec::from([VerificationType::Object(RefType::Object(
                            BinaryName::THROWABLE,
                        ))]),
                    },
                ));
                patched_dead_code.push(*dead_start);
            }
            frames.sort_by_key(|(offset, _)| *offset);
            frames.dedup_by_key(|(offset, _)| *offset);
            max_stack = max_stack.max(1);
            trim_exception_table(exception_table, &dead_ranges);
        }

        Ok(GeneratedFrames {
            frames,
            max_stack: u16::try_from(max_stack).map_err(|_| Error::MaxStackOverflow)?,
            max_locals: u16::try_from(max_locals).map_err(|_| Error::MaxLocalsOverflow)?,
            patched_dead_code,
        })
    }

    fn initial_state(&self) -> State {
        let frame: Frame<RefType, u32> = Frame::initial(self.method);
        let mut locals = vec![];
        for local in frame.locals.values() {
            locals.push(local.clone());
            if local.width() == 2 {
                locals.push(VerificationType::Top);
            }
        }
        State {
            locals,
            stack: TypeStack::new(),
        }
    }

    fn handlers(
        &self,
        exception_table: &[ExceptionTableEntry],
        index_at: &HashMap<u32, usize>,
        code_len: u32,
    ) -> Result<Vec<Handler>, Error> {
        exception_table
            .iter()
            .map(|entry| {
                let start = entry.start_pc as u32;
                let end = entry.end_pc as u32;
                let handler = entry.handler_pc as u32;
                let on_boundary = |offset: u32| index_at.contains_key(&offset);
                if !on_boundary(start)
                    || !(on_boundary(end) || end == code_len)
                    || !on_boundary(handler)
                    || start >= end
                {
                    return Err(Error::IllegalBytecode {
                        offset: handler,
                        reason: "exception table entry does not line up with instructions",
                    });
                }
                let catch_type = match entry.catch_type {
                    None => RefType::Object(BinaryName::THROWABLE),
                    Some(class) => RefType::from_internal_name(&self.pool.class_name_at(class.index())?)?,
                };
                Ok(Handler {
                    start,
                    end,
                    handler,
                    catch_type: VerificationType::Object(catch_type),
                })
            })
            .collect()
    }

    /// Propagate the locals into every handler covering `offset`
    fn merge_handlers(
        &self,
        handlers: &[Handler],
        offset: u32,
        state: &State,
        entries: &mut BTreeMap<u32, State>,
        worklist: &mut BTreeSet<u32>,
    ) -> Result<(), Error> {
        for handler in handlers {
            if handler.start <= offset && offset < handler.end {
                let incoming = State {
                    locals: state.locals.clone(),
                    stack: TypeStack::new().push(handler.catch_type.clone()),
                };
                self.merge_into(entries, worklist, handler.handler, &incoming)?;
            }
        }
        Ok(())
    }

    fn merge_into(
        &self,
        entries: &mut BTreeMap<u32, State>,
        worklist: &mut BTreeSet<u32>,
        offset: u32,
        incoming: &State,
    ) -> Result<(), Error> {
        match entries.get_mut(&offset) {
            None => {
                entries.insert(offset, incoming.clone());
                worklist.insert(offset);
            }
            Some(existing) => {
                if let Some(merged) = self.merge_states(offset, existing, incoming)? {
                    *existing = merged;
                    worklist.insert(offset);
                }
            }
        }
        Ok(())
    }

    /// Least upper bound of two states, or `None` if `incoming` adds nothing to `existing`
    fn merge_states(
        &self,
        offset: u32,
        existing: &State,
        incoming: &State,
    ) -> Result<Option<State>, Error> {
        if existing.stack.len() != incoming.stack.len() {
            return Err(Error::IncompatibleFrames { offset });
        }

        let mut changed = false;
        let existing_stack = existing.stack.to_vec();
        let mut stack = TypeStack::new();
        for (old, new) in existing_stack.iter().zip(incoming.stack.to_vec()) {
            let merged = self
                .merge_types(old, &new)
                .ok_or(Error::IncompatibleFrames { offset })?;
            changed |= &merged != old;
            stack = stack.push(merged);
        }

        let len = existing.locals.len().min(incoming.locals.len());
        changed |= existing.locals.len() > len
            && existing.locals[len..]
                .iter()
                .any(|local| local != &VerificationType::Top);
        let mut locals = Vec::with_capacity(len);
        for (old, new) in existing.locals.iter().zip(&incoming.locals) {
            let merged = self.merge_types(old, new).unwrap_or(VerificationType::Top);
            changed |= &merged != old;
            locals.push(merged);
        }

        // The second half of a wide local is only meaningful next to the first half
        for slot in 0..locals.len() {
            if locals[slot].width() == 2
                && locals.get(slot + 1) != Some(&VerificationType::Top)
            {
                locals[slot] = VerificationType::Top;
                changed = true;
            }
        }

        if changed {
            Ok(Some(State { locals, stack }))
        } else {
            Ok(None)
        }
    }

    fn merge_types(&self, a: &VType, b: &VType) -> Option<VType> {
        if a == b {
            return Some(a.clone());
        }
        match (a, b) {
            (VerificationType::Null, VerificationType::Object(_)) => Some(b.clone()),
            (VerificationType::Object(_), VerificationType::Null) => Some(a.clone()),
            (VerificationType::Object(x), VerificationType::Object(y)) => {
                let merged = self.hierarchy.merge(x, y).unwrap_or_else(|| {
                    log::debug!(
                        "No common supertype known for {:?} and {:?}, using Object",
                        x,
                        y
                    );
                    RefType::OBJECT
                });
                Some(VerificationType::Object(merged))
            }
            _ => None,
        }
    }

    fn member_descriptor(&self, insn: &RawInstruction, index: u16) -> Result<(String, String), Error> {
        if insn.opcode == Opcode::INVOKEDYNAMIC {
            return self.pool.dynamic_at(index);
        }
        let member = self.pool.member_ref_at(index)?;
        Ok((member.name, member.descriptor))
    }

    fn class_at(&self, index: u16) -> Result<RefType, Error> {
        RefType::from_internal_name(&self.pool.class_name_at(index)?)
    }

    /// Apply the effect of one instruction to the state
    fn execute(&self, insn: &RawInstruction, state: &mut State, code: &[u8]) -> Result<(), Error> {
        let opcode = insn.opcode;
        let fail = |kind| Error::Verifier {
            offset: insn.offset,
            opcode,
            kind,
        };
        let byte = opcode.byte();

        match (opcode.kind(), &insn.operands) {
            (OpcodeKind::Nop, _) => (),
            (OpcodeKind::ConstantIntrinsic, _) => state.push(match byte {
                0x01 => VerificationType::Null,
                0x02..=0x08 => VerificationType::Integer,
                0x09 | 0x0a => VerificationType::Long,
                0x0b..=0x0d => VerificationType::Float,
                _ => VerificationType::Double,
            }),
            (OpcodeKind::ConstantArgument, _) => state.push(VerificationType::Integer),
            (OpcodeKind::ConstantLoad, RawOperands::Index(index)) => {
                let loaded = match self.pool.entry(*index)? {
                    Constant::Integer(_) => VerificationType::Integer,
                    Constant::Float(_) => VerificationType::Float,
                    Constant::Long(_) => VerificationType::Long,
                    Constant::Double(_) => VerificationType::Double,
                    Constant::String(_) => object(BinaryName::STRING),
                    Constant::Class(_) => object(BinaryName::CLASS),
                    Constant::MethodType(_) => object(BinaryName::METHODTYPE),
                    Constant::MethodHandle { .. } => object(BinaryName::METHODHANDLE),
                    Constant::Dynamic { .. } => {
                        let (_, descriptor) = self.pool.dynamic_at(*index)?;
                        VerificationType::from(FieldType::parse(&descriptor)?)
                    }
                    _ => return Err(fail(VerifierErrorKind::NotLoadableConstant)),
                };
                if (opcode == Opcode::LDC2_W) != (loaded.width() == 2) {
                    return Err(fail(VerifierErrorKind::InvalidWidth(loaded.width())));
                }
                state.push(loaded);
            }
            (OpcodeKind::Load, RawOperands::Local(slot)) => {
                let kind = opcode.type_kind().ok_or_else(|| fail(VerifierErrorKind::InvalidType))?;
                let local = state
                    .locals
                    .get(*slot as usize)
                    .cloned()
                    .ok_or_else(|| fail(VerifierErrorKind::InvalidIndex(*slot)))?;
                let loaded = match kind {
                    TypeKind::Reference => local,
                    other => primitive(other),
                };
                state.push(loaded);
            }
            (OpcodeKind::Store, RawOperands::Local(slot)) => {
                let kind = opcode.type_kind().ok_or_else(|| fail(VerifierErrorKind::InvalidType))?;
                let value = state.pop_value(&fail)?;
                let stored = match kind {
                    TypeKind::Reference => value,
                    other => primitive(other),
                };
                state.store(*slot as usize, stored);
            }
            (OpcodeKind::Increment, RawOperands::Increment { slot, .. }) => {
                if state.locals.get(*slot as usize).is_none() {
                    return Err(fail(VerifierErrorKind::InvalidIndex(*slot)));
                }
            }
            (OpcodeKind::Branch, _) => match byte {
                0x99..=0x9e | 0xc6 | 0xc7 => state.pop_n(1, &fail)?,
                0x9f..=0xa6 => state.pop_n(2, &fail)?,
                0xa7 | 0xc8 => (),
                _ => return Err(fail(VerifierErrorKind::Unsupported)),
            },
            (OpcodeKind::TableSwitch, _) | (OpcodeKind::LookupSwitch, _) => {
                state.pop_n(1, &fail)?
            }
            (OpcodeKind::Return, _) => {
                if opcode != Opcode::RETURN {
                    state.pop_n(1, &fail)?;
                }
            }
            (OpcodeKind::Throw, _) | (OpcodeKind::Monitor, _) => state.pop_n(1, &fail)?,
            (OpcodeKind::Field, RawOperands::Index(index)) => {
                let (_, descriptor) = self.member_descriptor(insn, *index)?;
                let field_type = FieldType::parse(&descriptor)?;
                match opcode {
                    Opcode::GETSTATIC => state.push(VerificationType::from(field_type)),
                    Opcode::PUTSTATIC => state.pop_n(1, &fail)?,
                    Opcode::GETFIELD => {
                        state.pop_n(1, &fail)?;
                        state.push(VerificationType::from(field_type));
                    }
                    _ => state.pop_n(2, &fail)?,
                }
            }
            (OpcodeKind::Invoke, RawOperands::Index(index))
            | (OpcodeKind::Invoke, RawOperands::InvokeInterface { index, .. })
            | (OpcodeKind::InvokeDynamic, RawOperands::Index(index)) => {
                let (name, descriptor) = self.member_descriptor(insn, *index)?;
                let descriptor = MethodDescriptor::parse(&descriptor)?;
                state.pop_n(descriptor.parameters.len(), &fail)?;
                if opcode != Opcode::INVOKESTATIC && opcode != Opcode::INVOKEDYNAMIC {
                    let receiver = state.pop_value(&fail)?;
                    if opcode == Opcode::INVOKESPECIAL && name == "<init>" {
                        let initialized = match &receiver {
                            VerificationType::UninitializedThis => {
                                Some(object(self.method.class.clone()))
                            }
                            VerificationType::Uninitialized(new_offset) => {
                                let at = *new_offset as usize;
                                let class_index = code
                                    .get(at + 1..at + 3)
                                    .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
                                    .ok_or_else(|| fail(VerifierErrorKind::InvalidType))?;
                                Some(VerificationType::Object(self.class_at(class_index)?))
                            }
                            _ => None,
                        };
                        if let Some(initialized) = initialized {
                            state.replace(&receiver, &initialized);
                        }
                    }
                }
                if let Some(return_type) = descriptor.return_type {
                    state.push(VerificationType::from(return_type));
                }
            }
            (OpcodeKind::NewObject, _) => state.push(VerificationType::Uninitialized(insn.offset)),
            (OpcodeKind::NewPrimitiveArray, RawOperands::Value(code)) => {
                state.pop_n(1, &fail)?;
                let base = TypeKind::from_array_type_code(*code as u8)
                    .and_then(|kind| kind.base_type())
                    .ok_or_else(|| fail(VerifierErrorKind::InvalidType))?;
                state.push(VerificationType::Object(RefType::array(FieldType::Base(base))));
            }
            (OpcodeKind::NewReferenceArray, RawOperands::Index(index)) => {
                state.pop_n(1, &fail)?;
                let element = self.class_at(*index)?;
                state.push(VerificationType::Object(RefType::array(FieldType::Ref(element))));
            }
            (OpcodeKind::NewMultiArray, RawOperands::MultiArray { index, dimensions }) => {
                state.pop_n(*dimensions as usize, &fail)?;
                state.push(VerificationType::Object(self.class_at(*index)?));
            }
            (OpcodeKind::ArrayLoad, _) => {
                state.pop_n(1, &fail)?;
                let array = state.pop_value(&fail)?;
                let kind = opcode.type_kind().ok_or_else(|| fail(VerifierErrorKind::InvalidType))?;
                let loaded = match (kind, array) {
                    (TypeKind::Reference, VerificationType::Object(array)) => {
                        match array.component_type() {
                            Some(FieldType::Ref(component)) => VerificationType::Object(component),
                            _ => object(BinaryName::OBJECT),
                        }
                    }
                    (TypeKind::Reference, VerificationType::Null) => VerificationType::Null,
                    (TypeKind::Reference, _) => return Err(fail(VerifierErrorKind::InvalidType)),
                    (other, _) => primitive(other),
                };
                state.push(loaded);
            }
            (OpcodeKind::ArrayStore, _) => state.pop_n(3, &fail)?,
            (OpcodeKind::TypeCheck, RawOperands::Index(index)) => {
                state.pop_n(1, &fail)?;
                if opcode == Opcode::CHECKCAST {
                    state.push(VerificationType::Object(self.class_at(*index)?));
                } else {
                    state.push(VerificationType::Integer);
                }
            }
            (OpcodeKind::Convert, _) => {
                state.pop_n(1, &fail)?;
                state.push(match byte {
                    0x85 | 0x8c | 0x8f => VerificationType::Long,
                    0x86 | 0x89 | 0x90 => VerificationType::Float,
                    0x87 | 0x8a | 0x8d => VerificationType::Double,
                    _ => VerificationType::Integer,
                });
            }
            (OpcodeKind::Operator, _) => {
                const KINDS: [VType; 4] = [
                    VerificationType::Integer,
                    VerificationType::Long,
                    VerificationType::Float,
                    VerificationType::Double,
                ];
                let (popped, result) = match byte {
                    0x60..=0x73 => (2, KINDS[(byte - 0x60) as usize % 4].clone()),
                    0x74..=0x77 => (1, KINDS[(byte - 0x74) as usize].clone()),
                    0x78..=0x83 if (byte - 0x78) % 2 == 0 => (2, VerificationType::Integer),
                    0x78..=0x83 => (2, VerificationType::Long),
                    0xbe => (1, VerificationType::Integer),
                    _ => (2, VerificationType::Integer),
                };
                state.pop_n(popped, &fail)?;
                state.push(result);
            }
            (OpcodeKind::Stack, _) => self.shuffle(byte, state, &fail)?,
            _ => return Err(fail(VerifierErrorKind::Unsupported)),
        }
        Ok(())
    }

    /// `pop`, `dup`, `swap`, and friends, which work on slots rather than values
    fn shuffle(
        &self,
        byte: u8,
        state: &mut State,
        fail: &impl Fn(VerifierErrorKind) -> Error,
    ) -> Result<(), Error> {
        match byte {
            // pop
            0x57 => {
                state.pop_slots(1, fail)?;
            }
            // pop2
            0x58 => {
                state.pop_slots(2, fail)?;
            }
            // dup
            0x59 => {
                let a = state.pop_slots(1, fail)?;
                state.push_all(&a);
                state.push_all(&a);
            }
            // dup_x1
            0x5a => {
                let a = state.pop_slots(1, fail)?;
                let b = state.pop_slots(1, fail)?;
                state.push_all(&a);
                state.push_all(&b);
                state.push_all(&a);
            }
            // dup_x2
            0x5b => {
                let a = state.pop_slots(1, fail)?;
                let b = state.pop_slots(2, fail)?;
                state.push_all(&a);
                state.push_all(&b);
                state.push_all(&a);
            }
            // dup2
            0x5c => {
                let a = state.pop_slots(2, fail)?;
                state.push_all(&a);
                state.push_all(&a);
            }
            // dup2_x1
            0x5d => {
                let a = state.pop_slots(2, fail)?;
                let b = state.pop_slots(1, fail)?;
                state.push_all(&a);
                state.push_all(&b);
                state.push_all(&a);
            }
            // dup2_x2
            0x5e => {
                let a = state.pop_slots(2, fail)?;
                let b = state.pop_slots(2, fail)?;
                state.push_all(&a);
                state.push_all(&b);
                state.push_all(&a);
            }
            // swap
            _ => {
                let a = state.pop_slots(1, fail)?;
                let b = state.pop_slots(1, fail)?;
                state.push_all(&a);
                state.push_all(&b);
            }
        }
        Ok(())
    }
}

fn object(class: BinaryName) -> VType {
    VerificationType::Object(RefType::Object(class))
}

fn primitive(kind: TypeKind) -> VType {
    match kind.as_computational() {
        TypeKind::Long => VerificationType::Long,
        TypeKind::Float => VerificationType::Float,
        TypeKind::Double => VerificationType::Double,
        _ => VerificationType::Integer,
    }
}

impl State {
    fn push(&mut self, value: VType) {
        self.stack = self.stack.push(value);
    }

    /// Push values given from the bottom up
    fn push_all(&mut self, values: &[VType]) {
        for value in values {
            self.push(value.clone());
        }
    }

    fn pop_value(&mut self, fail: &impl Fn(VerifierErrorKind) -> Error) -> Result<VType, Error> {
        let (value, rest) = self
            .stack
            .pop()
            .ok_or_else(|| fail(VerifierErrorKind::EmptyStack))?;
        self.stack = rest;
        Ok(value)
    }

    fn pop_n(&mut self, count: usize, fail: &impl Fn(VerifierErrorKind) -> Error) -> Result<(), Error> {
        for _ in 0..count {
            self.pop_value(fail)?;
        }
        Ok(())
    }

    /// Pop values adding up to exactly `slots` slots, returned from the bottom up
    fn pop_slots(
        &mut self,
        slots: usize,
        fail: &impl Fn(VerifierErrorKind) -> Error,
    ) -> Result<Vec<VType>, Error> {
        let mut popped = vec![];
        let mut total = 0;
        while total < slots {
            let value = self.pop_value(fail)?;
            total += value.width();
            popped.push(value);
        }
        if total != slots {
            return Err(fail(VerifierErrorKind::InvalidWidth(total)));
        }
        popped.reverse();
        Ok(popped)
    }

    fn store(&mut self, slot: usize, value: VType) {
        let width = value.width();
        if self.locals.len() < slot + width {
            self.locals.resize(slot + width, VerificationType::Top);
        }
        if slot > 0 && self.locals[slot - 1].width() == 2 {
            self.locals[slot - 1] = VerificationType::Top;
        }
        self.locals[slot] = value;
        if width == 2 {
            self.locals[slot + 1] = VerificationType::Top;
        }
    }

    /// Replace every occurrence of a type, in both locals and stack
    fn replace(&mut self, from: &VType, to: &VType) {
        for local in &mut self.locals {
            if local == from {
                *local = to.clone();
            }
        }
        let mut stack = TypeStack::new();
        for value in self.stack.to_vec() {
            stack = stack.push(if &value == from { to.clone() } else { value });
        }
        self.stack = stack;
    }

    /// Compact form: wide locals become single entries, trailing `Top`s are dropped
    fn to_frame(&self) -> Frame<RefType, u32> {
        let mut locals = vec![];
        let mut slot = 0;
        while slot < self.locals.len() {
            let local = &self.locals[slot];
            locals.push(local.clone());
            slot += local.width();
        }
        while locals.last() == Some(&VerificationType::Top) {
            locals.pop();
        }
        Frame {
            locals: locals.into_iter().collect(),
            stack: self.stack.to_vec().into_iter().collect(),
        }
    }
}

/// Maximal runs `[start, end)` of instructions never reached
fn dead_ranges(instructions: &[RawInstruction], visited: &[bool], code_len: u32) -> Vec<(u32, u32)> {
    let mut ranges: Vec<(u32, u32)> = vec![];
    for (insn, visited) in instructions.iter().zip(visited) {
        if *visited {
            continue;
        }
        match ranges.last_mut() {
            Some((_, end)) if *end == insn.offset => *end = insn.next_offset(),
            _ => ranges.push((insn.offset, insn.next_offset().min(code_len))),
        }
    }
    ranges
}

/// Remove dead ranges from exception table entries, splitting entries where needed
fn trim_exception_table(exception_table: &mut Vec<ExceptionTableEntry>, dead: &[(u32, u32)]) {
    let mut trimmed = vec![];
    for entry in exception_table.iter() {
        let mut pieces = vec![(entry.start_pc as u32, entry.end_pc as u32)];
        for (dead_start, dead_end) in dead {
            pieces = pieces
                .into_iter()
                .flat_map(|(start, end)| {
                    if *dead_end <= start || *dead_start >= end {
                        vec![(start, end)]
                    } else {
                        let mut kept = vec![];
                        if start < *dead_start {
                            kept.push((start, *dead_start));
                        }
                        if *dead_end < end {
                            kept.push((*dead_end, end));
                        }
                        kept
                    }
                })
                .collect();
        }
        for (start, end) in pieces {
            trimmed.push(ExceptionTableEntry {
                start_pc: start as u16,
                end_pc: end as u16,
                ..*entry
            });
        }
    }
    *exception_table = trimmed;
}
