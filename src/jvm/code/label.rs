use crate::jvm::Error;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_CONTEXT: AtomicU32 = AtomicU32::new(1);

/// Symbolic branch target in one method body
///
/// Labels are plain values: an index into the arena of the context that created them. Using a
/// label with a context other than its own is an error (unless that context adopted the label's
/// context, see [`LabelContext::adopting`]).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    context: u32,
    id: u32,
}

impl Label {
    /// Identifier of the context that created the label
    pub fn context(&self) -> u32 {
        self.context
    }
}

impl Debug for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "L{}.{}", self.context, self.id)
    }
}

/// Arena of labels for one method body, mapping each label to its offset once bound
#[derive(Debug)]
pub struct LabelContext {
    id: u32,
    offsets: Vec<Option<u32>>,

    /// Context whose labels are also accepted, along with the local label for each of them
    adopted: Option<(u32, HashMap<u32, u32>)>,
}

impl LabelContext {
    pub fn new() -> LabelContext {
        LabelContext {
            id: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
            offsets: vec![],
            adopted: None,
        }
    }

    /// New context which also accepts the labels of `source` (each gets a local equivalent the
    /// first time it is seen)
    pub fn adopting(source: u32) -> LabelContext {
        let mut context = LabelContext::new();
        context.adopted = Some((source, HashMap::new()));
        context
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn new_label(&mut self) -> Label {
        let id = self.offsets.len() as u32;
        self.offsets.push(None);
        Label {
            context: self.id,
            id,
        }
    }

    /// New label which is already bound
    pub fn new_bound_label(&mut self, offset: u32) -> Label {
        let label = self.new_label();
        self.offsets[label.id as usize] = Some(offset);
        label
    }

    /// Local label equivalent to `label`
    pub fn local(&mut self, label: Label) -> Result<Label, Error> {
        if label.context == self.id {
            return Ok(label);
        }
        let next_id = self.offsets.len() as u32;
        match &mut self.adopted {
            Some((source, mapping)) if *source == label.context => {
                let id = *mapping.entry(label.id).or_insert(next_id);
                if id == next_id {
                    self.offsets.push(None);
                }
                Ok(Label {
                    context: self.id,
                    id,
                })
            }
            _ => Err(Error::ForeignLabel(label)),
        }
    }

    fn lookup(&self, label: Label) -> Result<Option<u32>, Error> {
        let id = if label.context == self.id {
            Some(label.id)
        } else {
            match &self.adopted {
                Some((source, mapping)) if *source == label.context => {
                    mapping.get(&label.id).copied()
                }
                _ => return Err(Error::ForeignLabel(label)),
            }
        };
        Ok(id
            .and_then(|id| self.offsets.get(id as usize).copied())
            .flatten())
    }

    /// Bind a label to an offset
    pub fn bind(&mut self, label: Label, offset: u32) -> Result<(), Error> {
        let local = self.local(label)?;
        let slot = &mut self.offsets[local.id as usize];
        if slot.is_some() {
            return Err(Error::LabelAlreadyBound(label));
        }
        *slot = Some(offset);
        Ok(())
    }

    /// Offset a label is bound to
    pub fn offset(&self, label: Label) -> Result<u32, Error> {
        self.lookup(label)?.ok_or(Error::UnboundLabel(label))
    }

    pub fn is_bound(&self, label: Label) -> bool {
        matches!(self.lookup(label), Ok(Some(_)))
    }

    /// Move every bound label
    pub fn relocate(&mut self, relocate: impl Fn(u32) -> u32) {
        for offset in self.offsets.iter_mut().flatten() {
            *offset = relocate(*offset);
        }
    }
}

impl Default for LabelContext {
    fn default() -> Self {
        LabelContext::new()
    }
}
