use super::{CodeBuilder, CodeElement, Label, MethodInfo};
use crate::jvm::class_file::ConstantPool;
use crate::jvm::{Error, TypeKind};

/// Rewrites elements on their way to a downstream builder
///
/// A transform may drop an element, pass it on as is, or emit any number of elements in its
/// place (including brand new labels and locals, obtained from the builder it is handed).
pub trait CodeTransform {
    fn accept(&mut self, builder: &mut dyn CodeBuilder, element: CodeElement) -> Result<(), Error>;

    /// Called once after the last element
    fn at_end(&mut self, _builder: &mut dyn CodeBuilder) -> Result<(), Error> {
        Ok(())
    }

    /// Transform that runs `self` first, then feeds its output through `next`
    fn and_then<T: CodeTransform>(self, next: T) -> AndThen<Self, T>
    where
        Self: Sized,
    {
        AndThen { first: self, next }
    }
}

impl<F> CodeTransform for F
where
    F: FnMut(&mut dyn CodeBuilder, CodeElement) -> Result<(), Error>,
{
    fn accept(&mut self, builder: &mut dyn CodeBuilder, element: CodeElement) -> Result<(), Error> {
        self(builder, element)
    }
}

/// Two transforms stacked (see [`CodeTransform::and_then`])
pub struct AndThen<A, B> {
    first: A,
    next: B,
}

impl<A: CodeTransform, B: CodeTransform> CodeTransform for AndThen<A, B> {
    fn accept(&mut self, builder: &mut dyn CodeBuilder, element: CodeElement) -> Result<(), Error> {
        let mut downstream = ChainedCodeBuilder::new(builder, Forward(&mut self.next));
        self.first.accept(&mut downstream, element)
    }

    fn at_end(&mut self, builder: &mut dyn CodeBuilder) -> Result<(), Error> {
        let mut downstream = ChainedCodeBuilder::new(builder, Forward(&mut self.next));
        self.first.at_end(&mut downstream)?;
        self.next.at_end(builder)
    }
}

/// Borrowed transform
struct Forward<'t>(&'t mut dyn CodeTransform);

impl<'t> CodeTransform for Forward<'t> {
    fn accept(&mut self, builder: &mut dyn CodeBuilder, element: CodeElement) -> Result<(), Error> {
        self.0.accept(builder, element)
    }
}

/// Non-terminal builder: every element goes through a transform before reaching the downstream
/// builder
///
/// Chains can be stacked arbitrarily deep. Labels, locals, the constant pool, and the method
/// always come from the downstream builder, so the terminal builder at the bottom of the chain
/// is the only one that owns any state.
pub struct ChainedCodeBuilder<'a, T> {
    downstream: &'a mut dyn CodeBuilder,
    transform: T,
}

impl<'a, T: CodeTransform> ChainedCodeBuilder<'a, T> {
    pub fn new(downstream: &'a mut dyn CodeBuilder, transform: T) -> ChainedCodeBuilder<'a, T> {
        ChainedCodeBuilder {
            downstream,
            transform,
        }
    }

    /// Signal the end of the elements to the transform
    pub fn end(mut self) -> Result<(), Error> {
        self.transform.at_end(self.downstream)
    }
}

impl<'a, T: CodeTransform> CodeBuilder for ChainedCodeBuilder<'a, T> {
    fn with(&mut self, element: CodeElement) -> Result<(), Error> {
        self.transform.accept(self.downstream, element)
    }

    fn new_label(&mut self) -> Label {
        self.downstream.new_label()
    }

    fn start_label(&self) -> Label {
        self.downstream.start_label()
    }

    fn end_label(&self) -> Label {
        self.downstream.end_label()
    }

    fn method(&self) -> &MethodInfo {
        self.downstream.method()
    }

    fn next_local_slot(&self) -> u16 {
        self.downstream.next_local_slot()
    }

    fn allocate_local(&mut self, kind: TypeKind) -> u16 {
        self.downstream.allocate_local(kind)
    }

    fn constant_pool(&mut self) -> &mut ConstantPool {
        self.downstream.constant_pool()
    }

    fn label_to_offset(&self, label: Label) -> Result<u32, Error> {
        self.downstream.label_to_offset(label)
    }

    fn as_dyn(&mut self) -> &mut dyn CodeBuilder {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BufferedCodeBuilder, CodeBuilderExt, Instruction, Opcode};
    use crate::jvm::{BinaryName, MethodAccessFlags, MethodDescriptor, Name, UnqualifiedName};

    fn method() -> MethodInfo {
        MethodInfo::new(
            BinaryName::from_str("me/Chains").unwrap(),
            UnqualifiedName::from_str("run").unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            MethodAccessFlags::STATIC,
        )
    }

    fn instructions(elements: &[CodeElement]) -> Vec<Instruction> {
        elements
            .iter()
            .filter_map(|element| match element {
                CodeElement::Instruction(instruction) => Some(instruction.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn stacked_transforms() {
        let mut pool = ConstantPool::new();
        let mut terminal = BufferedCodeBuilder::new(method(), &mut pool);

        // Drop every `nop`, then double every remaining instruction
        let drop_nops = |builder: &mut dyn CodeBuilder, element: CodeElement| match element {
            CodeElement::Instruction(Instruction::Nop) => Ok(()),
            other => builder.with(other),
        };
        let double = |builder: &mut dyn CodeBuilder, element: CodeElement| {
            if let CodeElement::Instruction(_) = &element {
                builder.with(element.clone())?;
            }
            builder.with(element)
        };

        let mut chained = ChainedCodeBuilder::new(&mut terminal, drop_nops.and_then(double));
        chained.nop().unwrap();
        chained.instruction(Instruction::Operator(Opcode::IADD)).unwrap();
        chained.nop().unwrap();
        chained.return_(TypeKind::Void).unwrap();
        chained.end().unwrap();

        let code = terminal.build().unwrap();
        assert_eq!(
            instructions(code.elements()),
            vec![
                Instruction::Operator(Opcode::IADD),
                Instruction::Operator(Opcode::IADD),
                Instruction::Return(Opcode::RETURN),
                Instruction::Return(Opcode::RETURN),
            ]
        );
    }

    #[test]
    fn context_comes_from_terminal() {
        let mut pool = ConstantPool::new();
        let mut terminal = BufferedCodeBuilder::new(method(), &mut pool);
        let start = terminal.start_label();
        let mut chained = ChainedCodeBuilder::new(&mut terminal, |builder: &mut dyn CodeBuilder, element| {
            builder.with(element)
        });
        assert_eq!(chained.start_label(), start);
        assert_eq!(chained.allocate_local(TypeKind::Long), 0);
        assert_eq!(chained.next_local_slot(), 2);
        let label = chained.new_label();
        assert_eq!(label.context(), start.context());
    }
}
