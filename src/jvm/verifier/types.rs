use crate::jvm::class_file::{BufWriter, ClassIndex, ConstantPool, Serialize};
use crate::jvm::{BaseType, Error, FieldType, RefType};
use crate::util::Width;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

/// These types are from [this hierarchy][0]
///
/// `Cls` is how object types are represented (a pool index once serialized, a full `RefType`
/// while synthesizing), `U` is how the allocation site of uninitialized objects is represented
/// (a bytecode offset once serialized, a label while building).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable slot (an uninitialized local, or the second half of a `long`/`double`)
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called
    Uninitialized(U),
}

impl<Cls, U> VerificationType<Cls, U> {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    pub fn map<C2, U2>(
        &self,
        map_class: impl FnOnce(&Cls) -> C2,
        map_uninitialized: impl FnOnce(&U) -> U2,
    ) -> VerificationType<C2, U2> {
        match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit))
            }
        }
    }

    /// Same as [`Self::map`], but for fallible conversions
    pub fn try_map<C2, U2, E>(
        &self,
        map_class: impl FnOnce(&Cls) -> Result<C2, E>,
        map_uninitialized: impl FnOnce(&U) -> Result<U2, E>,
    ) -> Result<VerificationType<C2, U2>, E> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)?),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit)?)
            }
        })
    }

    fn tag(&self) -> u8 {
        match self {
            VerificationType::Top => 0,
            VerificationType::Integer => 1,
            VerificationType::Float => 2,
            VerificationType::Double => 3,
            VerificationType::Long => 4,
            VerificationType::Null => 5,
            VerificationType::UninitializedThis => 6,
            VerificationType::Object(_) => 7,
            VerificationType::Uninitialized(_) => 8,
        }
    }
}

impl<U> From<FieldType> for VerificationType<RefType, U> {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl<Cls, A> Width for VerificationType<Cls, A> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

impl Serialize for VerificationType<ClassIndex, u16> {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_u1(self.tag());
        match self {
            VerificationType::Object(cls) => writer.write_index(*cls)?,
            VerificationType::Uninitialized(offset) => writer.write_u2(*offset),
            _ => (),
        };
        Ok(())
    }
}

impl VerificationType<ClassIndex, u16> {
    /// Read one `verification_type_info`, resolving class indices against `pool`
    pub fn read(
        cursor: &mut Cursor<&[u8]>,
        pool: &ConstantPool,
    ) -> Result<VerificationType<ClassIndex, u16>, Error> {
        let truncated = |_| Error::MalformedClass("truncated verification type");
        Ok(match cursor.read_u8().map_err(truncated)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => {
                let index = cursor.read_u16::<BigEndian>().map_err(truncated)?;
                pool.class_name_at(index)?;
                VerificationType::Object(pool.index(index)?.as_class())
            }
            8 => VerificationType::Uninitialized(
                cursor.read_u16::<BigEndian>().map_err(truncated)?,
            ),
            _ => return Err(Error::MalformedClass("invalid verification type tag")),
        })
    }
}
