use super::builder::clamp_slot;
use super::{CodeBuilder, CodeBuilderExt, CodeElement, Instruction, Label, MethodInfo, Opcode};
use crate::jvm::class_file::ConstantPool;
use crate::jvm::{BinaryName, Error, TypeKind};
use std::collections::BTreeMap;

/// Builder for a nested block of code
///
/// A block is bracketed by its own start and end labels, and has its own local variable scope:
/// slots allocated inside the block start at the enclosing scope's high-water mark and are
/// released when the block ends. Everything else is forwarded to the enclosing builder.
pub struct BlockCodeBuilder<'a> {
    parent: &'a mut dyn CodeBuilder,
    start: Label,
    end: Label,

    /// Where `break` jumps to (the end of the block, unless the block is a switch case)
    break_label: Label,
    next_local: u32,

    /// Can control reach the current position?
    reachable: bool,

    /// Has the block emitted any instruction yet?
    has_instructions: bool,
}

impl<'a> BlockCodeBuilder<'a> {
    fn new(parent: &'a mut dyn CodeBuilder, break_label: Option<Label>) -> BlockCodeBuilder<'a> {
        let start = parent.new_label();
        let end = parent.new_label();
        let next_local = parent.next_local_slot() as u32;
        BlockCodeBuilder {
            parent,
            start,
            end,
            break_label: break_label.unwrap_or(end),
            next_local,
            reachable: true,
            has_instructions: false,
        }
    }

    /// Label to jump to in order to leave the block
    pub fn break_label(&self) -> Label {
        self.break_label
    }

    /// Can control reach the current position (by falling through or via a bound label)?
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }
}

impl<'a> CodeBuilder for BlockCodeBuilder<'a> {
    fn with(&mut self, element: CodeElement) -> Result<(), Error> {
        match &element {
            CodeElement::Instruction(instruction) => {
                self.reachable = instruction.falls_through();
                self.has_instructions = true;
            }
            CodeElement::Label(_) => self.reachable = true,
            _ => (),
        }
        self.parent.with(element)
    }

    fn new_label(&mut self) -> Label {
        self.parent.new_label()
    }

    fn start_label(&self) -> Label {
        self.start
    }

    fn end_label(&self) -> Label {
        self.end
    }

    fn method(&self) -> &MethodInfo {
        self.parent.method()
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
        self.parent.constant_pool()
    }

    fn label_to_offset(&self, label: Label) -> Result<u32, Error> {
        self.parent.label_to_offset(label)
    }

    fn as_dyn(&mut self) -> &mut dyn CodeBuilder {
        self
    }
}

/// Emit a block, returning whether its end is reachable by falling through
pub(super) fn build_block(
    parent: &mut dyn CodeBuilder,
    break_label: Option<Label>,
    body: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
) -> Result<BlockOutcome, Error> {
    let mut block = BlockCodeBuilder::new(parent, break_label);
    let start = block.start;
    block.parent.with(CodeElement::Label(start))?;
    body(&mut block)?;
    let outcome = BlockOutcome {
        falls_through: block.reachable,
        has_instructions: block.has_instructions,
    };
    let end = block.end;
    block.parent.with(CodeElement::Label(end))?;
    Ok(outcome)
}

#[derive(Copy, Clone, Debug)]
pub(super) struct BlockOutcome {
    falls_through: bool,
    has_instructions: bool,
}

pub(super) fn build_if_then_else(
    parent: &mut dyn CodeBuilder,
    opcode: Opcode,
    then: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
    otherwise: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
) -> Result<(), Error> {
    let skip = opcode.invert().ok_or(Error::InvalidOperand {
        opcode,
        reason: "only conditional branches can guard a block",
    })?;
    let otherwise_label = parent.new_label();
    let end = parent.new_label();

    parent.branch(skip, otherwise_label)?;
    if build_block(parent, None, then)?.falls_through {
        parent.goto_(end)?;
    }
    parent.label_binding(otherwise_label)?;
    build_block(parent, None, otherwise)?;
    parent.label_binding(end)
}

/// Handlers of a try block, registered with [`CodeBuilderExt::trying`]
pub struct CatchBuilder<'a> {
    parent: &'a mut dyn CodeBuilder,
    try_start: Label,
    try_end: Label,

    /// Label after the whole try/catch
    after: Label,
}

impl<'a> CatchBuilder<'a> {
    /// Handle exceptions of class `class` (and its subclasses)
    ///
    /// The handler block starts with the exception on the stack.
    pub fn catching(
        &mut self,
        class: &BinaryName,
        handler: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.catching_impl(Some(class), handler)
    }

    /// Handle any exception (as in a `finally`)
    pub fn catching_all(
        &mut self,
        handler: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        self.catching_impl(None, handler)
    }

    fn catching_impl(
        &mut self,
        class: Option<&BinaryName>,
        handler: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
    ) -> Result<&mut Self, Error> {
        let handler_label = self.parent.new_label();
        self.parent
            .exception_catch(handler_label, self.try_start, self.try_end, class)?;
        self.parent.label_binding(handler_label)?;
        if build_block(self.parent, None, handler)?.falls_through {
            self.parent.goto_(self.after)?;
        }
        Ok(self)
    }
}

pub(super) fn build_try(
    parent: &mut dyn CodeBuilder,
    body: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error>,
    catches: impl FnOnce(&mut CatchBuilder) -> Result<(), Error>,
) -> Result<(), Error> {
    let try_start = parent.new_label();
    let try_end = parent.new_label();
    let after = parent.new_label();

    parent.label_binding(try_start)?;
    let outcome = build_block(parent, None, body)?;
    if !outcome.has_instructions {
        return Err(Error::EmptyTryBlock);
    }
    parent.label_binding(try_end)?;
    if outcome.falls_through {
        parent.goto_(after)?;
    }

    let mut catch_builder = CatchBuilder {
        parent: &mut *parent,
        try_start,
        try_end,
        after,
    };
    catches(&mut catch_builder)?;
    parent.label_binding(after)
}

/// How a switch gets encoded
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SwitchEncoding {
    /// `tableswitch`: jump table indexed by `key - low`, good for dense keys
    Table,

    /// `lookupswitch`: sorted keys, good for sparse keys
    Lookup,
}

type CaseBody<'c> = Box<dyn FnOnce(&mut BlockCodeBuilder) -> Result<(), Error> + 'c>;

/// Cases of a switch, registered with [`CodeBuilderExt::switch_on`]
///
/// Nothing is emitted until every case is registered. Case bodies are laid out in the order
/// they were registered and fall through into the next one unless they jump to
/// [`BlockCodeBuilder::break_label`]. When there is no default case, unmatched keys go straight
/// to the end of the switch.
pub struct SwitchCases<'c> {
    cases: Vec<(i32, CaseBody<'c>)>,
    default: Option<CaseBody<'c>>,
}

impl<'c> SwitchCases<'c> {
    pub fn case(
        &mut self,
        key: i32,
        body: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error> + 'c,
    ) -> &mut Self {
        self.cases.push((key, Box::new(body)));
        self
    }

    pub fn default(
        &mut self,
        body: impl FnOnce(&mut BlockCodeBuilder) -> Result<(), Error> + 'c,
    ) -> &mut Self {
        self.default = Some(Box::new(body));
        self
    }
}

/// Most jump offsets a `tableswitch` can hold and still fit in a code array
const MAX_TABLE_SWITCH_ENTRIES: i64 = 65535 / 4;

pub(super) fn build_switch<'c>(
    parent: &mut dyn CodeBuilder,
    encoding: SwitchEncoding,
    register: impl FnOnce(&mut SwitchCases<'c>) -> Result<(), Error>,
) -> Result<(), Error> {
    let mut cases = SwitchCases {
        cases: vec![],
        default: None,
    };
    register(&mut cases)?;

    let end = parent.new_label();
    let mut targets: BTreeMap<i32, Label> = BTreeMap::new();
    let mut bodies: Vec<(Label, CaseBody<'c>)> = Vec::with_capacity(cases.cases.len() + 1);
    for (key, body) in cases.cases {
        let label = parent.new_label();
        if targets.insert(key, label).is_some() {
            return Err(Error::DuplicateSwitchCase(key));
        }
        bodies.push((label, body));
    }
    let default = match cases.default {
        Some(body) => {
            let label = parent.new_label();
            bodies.push((label, body));
            label
        }
        None => end,
    };

    let switch = match (encoding, targets.keys().next(), targets.keys().next_back()) {
        (SwitchEncoding::Table, Some(low), Some(high)) => {
            let (low, high) = (*low, *high);
            let entries = high as i64 - low as i64 + 1;
            if entries > MAX_TABLE_SWITCH_ENTRIES {
                return Err(Error::MethodCodeOverflow(16 + 4 * entries as usize));
            }
            let targets = (low..=high)
                .map(|key| targets.get(&key).copied().unwrap_or(default))
                .collect();
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            }
        }
        _ => Instruction::LookupSwitch {
            default,
            cases: targets.into_iter().collect(),
        },
    };
    parent.instruction(switch)?;

    for (label, body) in bodies {
        parent.label_binding(label)?;
        build_block(parent, Some(end), body)?;
    }
    parent.label_binding(end)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BufferedCodeBuilder, MethodInfo};
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, Name, UnqualifiedName};

    fn method() -> MethodInfo {
        MethodInfo::new(
            BinaryName::from_str("me/Blocks").unwrap(),
            UnqualifiedName::from_str("run").unwrap(),
            MethodDescriptor {
                parameters: vec![crate::jvm::FieldType::int()],
                return_type: None,
            },
            MethodAccessFlags::STATIC,
        )
    }

    #[test]
    fn sibling_blocks_reuse_slots() {
        let mut pool = ConstantPool::new();
        let mut builder = BufferedCodeBuilder::new(method(), &mut pool);
        builder.allocate_local(TypeKind::Int);
        assert_eq!(builder.next_local_slot(), 2);

        let mut slots = vec![];
        builder
            .block(|block| {
                slots.push(block.allocate_local(TypeKind::Int));
                Ok(())
            })
            .unwrap();
        builder
            .block(|block| {
                slots.push(block.allocate_local(TypeKind::Long));
                slots.push(block.allocate_local(TypeKind::Int));
                Ok(())
            })
            .unwrap();
        assert_eq!(slots, vec![2, 2, 4]);
        assert_eq!(builder.next_local_slot(), 2);
    }

    #[test]
    fn empty_try_block() {
        let mut pool = ConstantPool::new();
        let mut builder = BufferedCodeBuilder::new(method(), &mut pool);
        let result = builder.trying(|_| Ok(()), |catches| {
            catches.catching_all(|handler| handler.athrow())?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::EmptyTryBlock)));
    }

    #[test]
    fn duplicate_switch_case() {
        let mut pool = ConstantPool::new();
        let mut builder = BufferedCodeBuilder::new(method(), &mut pool);
        builder.load(TypeKind::Int, 0).unwrap();
        let result = builder.switch_on(SwitchEncoding::Lookup, |cases| {
            cases.case(1, |block| block.nop()).case(1, |block| block.nop());
            Ok(())
        });
        assert!(matches!(result, Err(Error::DuplicateSwitchCase(1))));
    }

    #[test]
    fn sparse_table_switch_overflows() {
        let mut pool = ConstantPool::new();
        let mut builder = BufferedCodeBuilder::new(method(), &mut pool);
        builder.load(TypeKind::Int, 0).unwrap();
        let result = builder.switch_on(SwitchEncoding::Table, |cases| {
            cases
                .case(0, |block| block.nop())
                .case(200_000_000, |block| block.nop());
            Ok(())
        });
        assert!(matches!(result, Err(Error::MethodCodeOverflow(_))));

        // Same keys are fine as a lookup switch
        let result = builder.switch_on(SwitchEncoding::Lookup, |cases| {
            cases
                .case(0, |block| block.nop())
                .case(200_000_000, |block| block.nop());
            Ok(())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn dense_switch_fills_gaps_with_default() {
        let mut pool = ConstantPool::new();
        let mut builder = BufferedCodeBuilder::new(method(), &mut pool);
        builder.load(TypeKind::Int, 0).unwrap();
        builder
            .switch_on(SwitchEncoding::Table, |cases| {
                cases
                    .case(3, |block| block.nop())
                    .case(1, |block| block.nop());
                Ok(())
            })
            .unwrap();
        builder.return_(TypeKind::Void).unwrap();
        let code = builder.build().unwrap();

        let switch = code
            .elements()
            .iter()
            .find_map(|element| match element {
                CodeElement::Instruction(Instruction::TableSwitch {
                    low,
                    high,
                    default,
                    targets,
                }) => Some((*low, *high, *default, targets.clone())),
                _ => None,
            })
            .expect("tableswitch should be emitted");
        let (low, high, default, targets) = switch;
        assert_eq!((low, high), (1, 3));
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[1], default, "missing key 2 should go to the default");
        assert_ne!(targets[0], targets[2]);
    }
}
