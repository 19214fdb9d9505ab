use super::{BinaryName, Error, Name};
use crate::util::Width;
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self, Error> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => Err(Error::BadDescriptor(format!(
                "Unexpected leftover input '{}' in '{}'",
                c, source
            ))),
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                let msg = format!("Invalid base type character '{}'", c);
                return Err(Error::BadDescriptor(msg));
            }
            None => {
                let msg = String::from("Missing base type character");
                return Err(Error::BadDescriptor(msg));
            }
        };
        Ok(typ)
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    ObjectArray(ArrayType<BinaryName>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Generic array type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T> ArrayType<T> {
    /// Total number of dimensions in the array type
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error> {
        if source.next() != Some('L') {
            let msg = String::from("Expected object type to start with `L`");
            return Err(Error::BadDescriptor(msg));
        }

        let mut class_name = String::new();
        loop {
            match source.next() {
                Some(';') => return BinaryName::from_string(class_name).map_err(Error::BadDescriptor),
                Some(c) => class_name.push(c),
                None => {
                    let msg = format!("Missing terminator for 'L{}'", class_name);
                    return Err(Error::BadDescriptor(msg));
                }
            }
        }
    }
}

impl RenderDescriptor for RefType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
        }
    }
}

impl ParseDescriptor for RefType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error> {
        Ok(match source.peek().copied() {
            Some('L') => RefType::Object(BinaryName::parse_from(source)?),
            Some('[') => {
                let mut additional_dimensions = 0;
                source.next();
                while source.next_if_eq(&'[').is_some() {
                    additional_dimensions += 1;
                }
                if let Some('L') = source.peek().copied() {
                    RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: BinaryName::parse_from(source)?,
                    })
                } else {
                    RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::parse_from(source)?,
                    })
                }
            }
            Some(c) => {
                let msg = format!("Invalid reference type character '{}'", c);
                return Err(Error::BadDescriptor(msg));
            }
            None => return Err(Error::BadDescriptor(String::from("Missing field type"))),
        })
    }
}

impl RefType {
    pub const OBJECT: RefType = RefType::Object(BinaryName::OBJECT);

    pub fn array(field_type: FieldType) -> RefType {
        match field_type {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
        }
    }

    /// Type of the elements of an array type (`None` for non-array types)
    pub fn component_type(&self) -> Option<FieldType> {
        match self {
            RefType::Object(_) => None,
            RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }) => Some(FieldType::Base(*element_type)),
            RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }) => Some(FieldType::object(element_type.clone())),
            RefType::PrimitiveArray(arr) => Some(FieldType::Ref(RefType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions - 1,
                element_type: arr.element_type,
            }))),
            RefType::ObjectArray(arr) => Some(FieldType::Ref(RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions - 1,
                element_type: arr.element_type.clone(),
            }))),
        }
    }

    pub fn is_array(&self) -> bool {
        !matches!(self, RefType::Object(_))
    }

    /// Name used for this type inside a `CONSTANT_Class_info`
    ///
    /// Classes use their binary name, while arrays use their full descriptor.
    pub fn internal_name(&self) -> String {
        match self {
            RefType::Object(name) => name.as_str().to_owned(),
            _ => self.render(),
        }
    }

    /// Inverse of [`Self::internal_name`]
    pub fn from_internal_name(name: &str) -> Result<RefType, Error> {
        if name.starts_with('[') {
            RefType::parse(name)
        } else {
            BinaryName::from_str(name)
                .map(RefType::Object)
                .map_err(Error::BadDescriptor)
        }
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl FieldType {
    pub fn array(field_type: FieldType) -> FieldType {
        FieldType::Ref(RefType::array(field_type))
    }

    pub const fn object(class_name: BinaryName) -> FieldType {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType {
        FieldType::Base(BaseType::Double)
    }

    pub const fn boolean() -> FieldType {
        FieldType::Base(BaseType::Boolean)
    }

    /// Computational kind of a value of this type
    pub fn type_kind(&self) -> TypeKind {
        match self {
            FieldType::Base(BaseType::Byte) => TypeKind::Byte,
            FieldType::Base(BaseType::Char) => TypeKind::Char,
            FieldType::Base(BaseType::Double) => TypeKind::Double,
            FieldType::Base(BaseType::Float) => TypeKind::Float,
            FieldType::Base(BaseType::Int) => TypeKind::Int,
            FieldType::Base(BaseType::Long) => TypeKind::Long,
            FieldType::Base(BaseType::Short) => TypeKind::Short,
            FieldType::Base(BaseType::Boolean) => TypeKind::Boolean,
            FieldType::Ref(_) => TypeKind::Reference,
        }
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error> {
        match source.peek().copied() {
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) => Err(Error::BadDescriptor(format!(
                "Invalid field type character '{}'",
                c
            ))),
            None => Err(Error::BadDescriptor(String::from("Missing field type"))),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,

    /// `None` is for `void` (ie. no return)
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// Total slot length of parameters (not the same as the length of the vector), which must be
    /// 255 or less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len + self.parameters.iter().map(Width::width).sum::<usize>()
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error> {
        if source.next() != Some('(') {
            return Err(Error::BadDescriptor(String::from("Expected '(' for method")));
        }

        let mut parameters = vec![];
        while source.next_if_eq(&')').is_none() {
            parameters.push(FieldType::parse_from(source)?);
        }

        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

/// Computational kinds of values, as far as instruction selection cares
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind {
    Byte,
    Short,
    Int,
    Float,
    Long,
    Double,
    Reference,
    Char,
    Boolean,
    Void,
}

impl TypeKind {
    /// Number of local variable (or operand stack) slots taken up by this kind
    pub fn slot_size(&self) -> u16 {
        match self {
            TypeKind::Void => 0,
            TypeKind::Long | TypeKind::Double => 2,
            _ => 1,
        }
    }

    /// Collapse sub-int kinds into `Int`, which is how loads and stores see them
    pub fn as_computational(&self) -> TypeKind {
        match self {
            TypeKind::Byte | TypeKind::Short | TypeKind::Char | TypeKind::Boolean => TypeKind::Int,
            other => *other,
        }
    }

    /// Operand of `newarray` for primitive arrays of this kind
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-6.html#jvms-6.5.newarray
    pub fn array_type_code(&self) -> Option<u8> {
        match self {
            TypeKind::Boolean => Some(4),
            TypeKind::Char => Some(5),
            TypeKind::Float => Some(6),
            TypeKind::Double => Some(7),
            TypeKind::Byte => Some(8),
            TypeKind::Short => Some(9),
            TypeKind::Int => Some(10),
            TypeKind::Long => Some(11),
            TypeKind::Reference | TypeKind::Void => None,
        }
    }

    /// Inverse of [`Self::array_type_code`]
    pub fn from_array_type_code(code: u8) -> Option<TypeKind> {
        match code {
            4 => Some(TypeKind::Boolean),
            5 => Some(TypeKind::Char),
            6 => Some(TypeKind::Float),
            7 => Some(TypeKind::Double),
            8 => Some(TypeKind::Byte),
            9 => Some(TypeKind::Short),
            10 => Some(TypeKind::Int),
            11 => Some(TypeKind::Long),
            _ => None,
        }
    }

    /// Base type of primitive kinds
    pub fn base_type(&self) -> Option<BaseType> {
        match self {
            TypeKind::Byte => Some(BaseType::Byte),
            TypeKind::Short => Some(BaseType::Short),
            TypeKind::Int => Some(BaseType::Int),
            TypeKind::Float => Some(BaseType::Float),
            TypeKind::Long => Some(BaseType::Long),
            TypeKind::Double => Some(BaseType::Double),
            TypeKind::Char => Some(BaseType::Char),
            TypeKind::Boolean => Some(BaseType::Boolean),
            TypeKind::Reference | TypeKind::Void => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fmt::Debug;

    fn round_trip<T: RenderDescriptor + ParseDescriptor + Debug + Eq>(rendered: &str, parsed: T) {
        assert_eq!(rendered, parsed.render(), "rendering {:?}", parsed);
        assert_eq!(T::parse(rendered).unwrap(), parsed, "parsing {}", rendered);
    }

    const INT: FieldType = FieldType::Base(BaseType::Int);
    const DOUBLE: FieldType = FieldType::Base(BaseType::Double);
    const OBJECT: FieldType = FieldType::object(BinaryName::OBJECT);
    const STRING: FieldType = FieldType::object(BinaryName::STRING);

    #[test]
    fn field_types() {
        round_trip("I", INT);
        round_trip("Ljava/lang/Object;", OBJECT);
        round_trip(
            "[[[D",
            FieldType::array(FieldType::array(FieldType::array(DOUBLE))),
        );
        round_trip("[Ljava/lang/String;", FieldType::array(STRING));
        assert!(FieldType::parse("Ljava/lang/Object").is_err(), "missing terminator");
        assert!(FieldType::parse("II").is_err(), "leftover input");
    }

    #[test]
    fn method_descriptors() {
        let descriptor = MethodDescriptor {
            parameters: vec![INT, DOUBLE, STRING],
            return_type: Some(OBJECT),
        };
        round_trip("(IDLjava/lang/String;)Ljava/lang/Object;", descriptor.clone());
        assert_eq!(descriptor.parameter_length(true), 5, "this + int + double (2) + string");
        round_trip(
            "()V",
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        );
    }

    #[test]
    fn internal_names() {
        let string_array = RefType::array(STRING);
        assert_eq!(string_array.internal_name(), "[Ljava/lang/String;");
        assert_eq!(
            RefType::from_internal_name("java/lang/String").unwrap(),
            RefType::Object(BinaryName::STRING)
        );
        assert_eq!(
            RefType::from_internal_name("[[I")
                .unwrap()
                .component_type()
                .map(|t| t.render()),
            Some(String::from("[I"))
        );
    }
}
