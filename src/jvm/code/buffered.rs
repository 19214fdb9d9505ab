use super::builder::clamp_slot;
use super::{CodeBuilder, CodeElement, Label, LabelContext, MethodInfo};
use crate::jvm::class_file::ConstantPool;
use crate::jvm::{Error, TypeKind};
use std::collections::{HashMap, HashSet};

/// Terminal builder that only records elements
///
/// Nothing is resolved until the recorded [`BufferedCode`] is replayed into another builder
/// (usually a [`super::DirectCodeBuilder`]), which can be done any number of times. Constant
/// pool handles are created in the pool passed in here, so replaying into a builder with a
/// different pool clones them on the way out.
pub struct BufferedCodeBuilder<'p> {
    method: MethodInfo,
    pool: &'p mut ConstantPool,
    labels: LabelContext,
    start: Label,
    end: Label,

    /// Labels bound so far (to catch labels bound twice)
    bound: HashSet<Label>,
    elements: Vec<CodeElement>,
    next_local: u32,
    finished: bool,
}

impl<'p> BufferedCodeBuilder<'p> {
    pub fn new(method: MethodInfo, pool: &'p mut ConstantPool) -> BufferedCodeBuilder<'p> {
        let mut labels = LabelContext::new();
        let start = labels.new_label();
        let end = labels.new_label();
        let next_local = method.parameter_slots() as u32;
        BufferedCodeBuilder {
            method,
            pool,
            labels,
            start,
            end,
            bound: HashSet::new(),
            elements: vec![],
            next_local,
            finished: false,
        }
    }

    /// Stop accepting elements and hand out what was recorded
    pub fn build(&mut self) -> Result<BufferedCode, Error> {
        if self.finished {
            return Err(Error::BuilderFinished);
        }
        self.finished = true;
        let max_locals = u16::try_from(self.next_local).map_err(|_| Error::MaxLocalsOverflow)?;

        let mut elements = Vec::with_capacity(self.elements.len() + 2);
        elements.push(CodeElement::Label(self.start));
        elements.append(&mut self.elements);
        elements.push(CodeElement::Label(self.end));
        Ok(BufferedCode {
            method: self.method.clone(),
            elements,
            max_locals,
        })
    }
}

impl<'p> CodeBuilder for BufferedCodeBuilder<'p> {
    fn with(&mut self, element: CodeElement) -> Result<(), Error> {
        if self.finished {
            return Err(Error::BuilderFinished);
        }
        match &element {
            CodeElement::Instruction(instruction) => instruction.validate()?,
            CodeElement::Label(label) => {
                self.labels.local(*label)?;
                if *label == self.start || *label == self.end || !self.bound.insert(*label) {
                    return Err(Error::LabelAlreadyBound(*label));
                }
            }
            _ => (),
        }
        self.elements.push(element);
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

    fn label_to_offset(&self, label: Label) -> Result<u32, Error> {
        match self.labels.offset(label) {
            Err(Error::ForeignLabel(label)) => Err(Error::ForeignLabel(label)),
            _ => Err(Error::LabelNotResolved(label)),
        }
    }

    fn as_dyn(&mut self) -> &mut dyn CodeBuilder {
        self
    }
}

/// Body recorded by a [`BufferedCodeBuilder`]
#[derive(Clone, Debug)]
pub struct BufferedCode {
    method: MethodInfo,

    /// Elements, starting with the binding of the start label and ending with the binding of
    /// the end label
    elements: Vec<CodeElement>,

    /// Local slots allocated while building
    max_locals: u16,
}

impl BufferedCode {
    pub fn method(&self) -> &MethodInfo {
        &self.method
    }

    pub fn elements(&self) -> &[CodeElement] {
        &self.elements
    }

    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    pub fn for_each(&self, mut consumer: impl FnMut(&CodeElement)) {
        for element in &self.elements {
            consumer(element);
        }
    }

    /// Replay the body into another builder
    ///
    /// Every label gets a fresh equivalent in the target builder, so the same body can be
    /// replayed several times (even into the same builder).
    pub fn write_to(&self, builder: &mut dyn CodeBuilder) -> Result<(), Error> {
        for _ in builder.next_local_slot()..self.max_locals {
            builder.allocate_local(TypeKind::Int);
        }
        replay(&self.elements, builder)
    }
}

/// Feed elements into a builder, mapping each label to a fresh label of that builder
pub(super) fn replay(elements: &[CodeElement], builder: &mut dyn CodeBuilder) -> Result<(), Error> {
    let mut mapping: HashMap<Label, Label> = HashMap::new();
    for element in elements {
        let element = element
            .clone()
            .map_labels(|label| Ok(*mapping.entry(label).or_insert_with(|| builder.new_label())))?;
        builder.with(element)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{CodeBuilderExt, Instruction, Opcode};
    use crate::jvm::{BinaryName, MethodAccessFlags, MethodDescriptor, Name, UnqualifiedName};

    fn method() -> MethodInfo {
        MethodInfo::new(
            BinaryName::from_str("me/Buffers").unwrap(),
            UnqualifiedName::from_str("run").unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            MethodAccessFlags::STATIC,
        )
    }

    #[test]
    fn finished_builder_rejects_elements() {
        let mut pool = ConstantPool::new();
        let mut builder = BufferedCodeBuilder::new(method(), &mut pool);
        builder.return_(TypeKind::Void).unwrap();
        builder.build().unwrap();
        assert!(matches!(builder.nop(), Err(Error::BuilderFinished)));
        assert!(matches!(builder.build(), Err(Error::BuilderFinished)));
    }

    #[test]
    fn labels_bound_twice() {
        let mut pool = ConstantPool::new();
        let mut builder = BufferedCodeBuilder::new(method(), &mut pool);
        let label = builder.new_label();
        builder.label_binding(label).unwrap();
        assert!(matches!(
            builder.label_binding(label),
            Err(Error::LabelAlreadyBound(_))
        ));
        let start = builder.start_label();
        assert!(matches!(
            builder.label_binding(start),
            Err(Error::LabelAlreadyBound(_))
        ));
        assert!(matches!(
            builder.label_to_offset(label),
            Err(Error::LabelNotResolved(_))
        ));
    }

    #[test]
    fn replay_uses_fresh_labels() {
        let mut pool = ConstantPool::new();
        let mut builder = BufferedCodeBuilder::new(method(), &mut pool);
        let top = builder.new_label();
        builder.label_binding(top).unwrap();
        builder.goto_(top).unwrap();
        let code = builder.build().unwrap();

        let mut pool = ConstantPool::new();
        let mut target = BufferedCodeBuilder::new(method(), &mut pool);
        code.write_to(&mut target).unwrap();
        code.write_to(&mut target).unwrap();
        let replayed = target.build().unwrap();

        let gotos: Vec<Label> = replayed
            .elements()
            .iter()
            .filter_map(|element| match element {
                CodeElement::Instruction(Instruction::Branch {
                    opcode: Opcode::GOTO,
                    target,
                }) => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(gotos.len(), 2);
        assert_ne!(gotos[0], gotos[1], "each replay gets its own labels");
        assert_ne!(gotos[0], top);
    }
}
