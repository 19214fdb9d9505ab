use crate::jvm::class_file::{BufWriter, ClassIndex, Serialize, Utf8Index};
use crate::jvm::verifier::StackMapFrame;
use crate::jvm::Error;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// This is the opaque form, used for attributes which are carried along without being
/// interpreted.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.7
#[derive(Clone, Debug)]
pub struct Attribute {
    pub name_index: Utf8Index,
    pub info: Vec<u8>,
}

impl Serialize for Attribute {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_index(self.name_index)?;

        // Attribute info length is 4 bytes
        writer.write_u4(self.info.len() as u32);
        writer.write_bytes(&self.info);
        Ok(())
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally they represent
/// very different things. This trait is implemented by things which can be turned into
/// attributes.
pub trait AttributeLike: Serialize {
    /// Name of the attribute
    const NAME: &'static str;
}

impl<'p> BufWriter<'p> {
    /// Write an attribute, including its name and its length
    pub fn write_attribute<A: AttributeLike>(&mut self, attribute: &A) -> Result<(), Error> {
        let name = self.constant_pool()?.utf8(A::NAME)?;
        self.write_index(name)?;
        self.write_length_prefixed(|writer| attribute.serialize(writer))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.7.3
#[derive(Clone, Debug)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,

    /// Frames for the `StackMapTable` attribute (omitted when empty)
    pub stack_map_frames: Vec<StackMapFrame<ClassIndex, u16>>,

    /// Other attributes (line numbers, local variables, and unknown attributes)
    pub attributes: Vec<Attribute>,
}

impl Serialize for CodeAttribute {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_u2(self.max_stack);
        writer.write_u2(self.max_locals);
        writer.write_u4(self.code.len() as u32);
        writer.write_bytes(&self.code);
        self.exception_table.serialize(writer)?;

        let has_stack_map = !self.stack_map_frames.is_empty();
        let attribute_count = self.attributes.len() + has_stack_map as usize;
        writer.write_u2(attribute_count as u16);
        if has_stack_map {
            writer.write_attribute(&StackMapTable(self.stack_map_frames.clone()))?;
        }
        for attribute in &self.attributes {
            attribute.serialize(writer)?;
        }
        Ok(())
    }
}

impl AttributeLike for CodeAttribute {
    const NAME: &'static str = "Code";
}

impl CodeAttribute {
    /// Write the complete `Code` attribute, including its name and length
    pub fn write_to(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_attribute(self)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ExceptionTableEntry {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Class of exceptions caught (`None` catches everything)
    pub catch_type: Option<ClassIndex>,
}

impl Serialize for ExceptionTableEntry {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_u2(self.start_pc);
        writer.write_u2(self.end_pc);
        writer.write_u2(self.handler_pc);
        writer.write_index_or_zero(self.catch_type)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.7.4
#[derive(Clone, Debug)]
pub struct StackMapTable(pub Vec<StackMapFrame<ClassIndex, u16>>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        self.0.serialize(writer)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.7.12
#[derive(Clone, Debug)]
pub struct LineNumberTable(pub Vec<LineNumberEntry>);

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";
}

impl Serialize for LineNumberTable {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        self.0.serialize(writer)
    }
}

impl Serialize for LineNumberEntry {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_u2(self.start_pc);
        writer.write_u2(self.line_number);
        Ok(())
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.7.13
#[derive(Clone, Debug)]
pub struct LocalVariableTable(pub Vec<LocalVariableEntry>);

/// Same layout as `LocalVariableTable`, but `descriptor` points to a generic signature
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.7.14
#[derive(Clone, Debug)]
pub struct LocalVariableTypeTable(pub Vec<LocalVariableEntry>);

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name: Utf8Index,
    pub descriptor: Utf8Index,
    pub index: u16,
}

impl AttributeLike for LocalVariableTable {
    const NAME: &'static str = "LocalVariableTable";
}

impl AttributeLike for LocalVariableTypeTable {
    const NAME: &'static str = "LocalVariableTypeTable";
}

impl Serialize for LocalVariableTable {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        self.0.serialize(writer)
    }
}

impl Serialize for LocalVariableTypeTable {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        self.0.serialize(writer)
    }
}

impl Serialize for LocalVariableEntry {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_u2(self.start_pc);
        writer.write_u2(self.length);
        writer.write_index(self.name)?;
        writer.write_index(self.descriptor)?;
        writer.write_u2(self.index);
        Ok(())
    }
}
