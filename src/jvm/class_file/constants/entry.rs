use crate::jvm::class_file::BufWriter;
use crate::util::Width;
use std::sync::atomic::{AtomicU32, Ordering};

/// Constants as in the constant pool
///
/// Composite constants refer to their components by raw pool index, so two composite entries
/// are equal exactly when they were built from the same interned components.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.4
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Constant {
    /// Raw modified UTF-8 bytes (see [`super::encode_modified_utf8`])
    Utf8(Vec<u8>),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Bits of a constant primitive of type `float`
    Float(u32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Bits of a constant primitive of type `double`
    Double(u64),

    /// Class, interface, or array type (points to the internal name)
    Class(u16),

    /// Constant object of type `java.lang.String`
    String(u16),

    FieldRef {
        class: u16,
        name_and_type: u16,
    },

    MethodRef {
        class: u16,
        name_and_type: u16,
    },

    InterfaceMethodRef {
        class: u16,
        name_and_type: u16,
    },

    NameAndType {
        name: u16,
        descriptor: u16,
    },

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        kind: HandleKind,
        member: u16,
    },

    MethodType(u16),

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: u16,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: u16,
    },

    Module(u16),
    Package(u16),
}

impl Constant {
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef { .. } => 9,
            Constant::MethodRef { .. } => 10,
            Constant::InterfaceMethodRef { .. } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType(_) => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module(_) => 19,
            Constant::Package(_) => 20,
        }
    }

    /// Can this constant be pushed with `ldc`, `ldc_w`, or `ldc2_w`?
    pub fn is_loadable(&self) -> bool {
        matches!(
            self,
            Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::Class(_)
                | Constant::String(_)
                | Constant::MethodHandle { .. }
                | Constant::MethodType(_)
                | Constant::Dynamic { .. }
        )
    }

    pub fn serialize(&self, writer: &mut BufWriter) {
        writer.write_u1(self.tag());
        match self {
            Constant::Utf8(bytes) => {
                writer.write_u2(bytes.len() as u16);
                writer.write_bytes(bytes);
            }
            Constant::Integer(integer) => writer.write_i4(*integer),
            Constant::Float(bits) => writer.write_u4(*bits),
            Constant::Long(long) => writer.write_i8(*long),
            Constant::Double(bits) => writer.write_u8(*bits),
            Constant::Class(idx)
            | Constant::String(idx)
            | Constant::MethodType(idx)
            | Constant::Module(idx)
            | Constant::Package(idx) => writer.write_u2(*idx),
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                writer.write_u2(*class);
                writer.write_u2(*name_and_type);
            }
            Constant::NameAndType { name, descriptor } => {
                writer.write_u2(*name);
                writer.write_u2(*descriptor);
            }
            Constant::MethodHandle { kind, member } => {
                writer.write_u1(*kind as u8);
                writer.write_u2(*member);
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                writer.write_u2(*bootstrap_method);
                writer.write_u2(*name_and_type);
            }
        }
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
/// >
/// > In retrospect, making 8-byte constants take two constant pool entries was a poor choice.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[repr(u8)]
pub enum HandleKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl HandleKind {
    pub fn from_u8(kind: u8) -> Option<HandleKind> {
        Some(match kind {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        })
    }
}

/// Identity of one constant pool instance
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct PoolId(u32);

impl PoolId {
    pub(super) fn fresh() -> PoolId {
        static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(0);
        PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Index into a specific constant pool
///
/// The index is only meaningful for the pool it came from (or pools extending that pool). Writing
/// it elsewhere goes through [`super::ConstantPool::resolve`], which clones the entry when the
/// source pool is available.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex {
    pub pool: PoolId,
    pub index: u16,
}

macro_rules! typed_indices {
    ($($(#[$meta:meta])* $name:ident,)*) => {
        $(
            $(#[$meta])*
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
            pub struct $name(pub(super) ConstantIndex);

            impl $name {
                /// Raw index in the owning pool
                pub fn index(&self) -> u16 {
                    self.0.index
                }

                pub fn pool(&self) -> PoolId {
                    self.0.pool
                }
            }

            impl From<$name> for ConstantIndex {
                fn from(typed: $name) -> ConstantIndex {
                    typed.0
                }
            }
        )*
    };
}

typed_indices! {
    /// Index of a `CONSTANT_Utf8_info`
    Utf8Index,
    /// Index of a `CONSTANT_Class_info`
    ClassIndex,
    /// Index of a `CONSTANT_String_info`
    StringIndex,
    /// Index of a `CONSTANT_NameAndType_info`
    NameAndTypeIndex,
    /// Index of a `CONSTANT_Fieldref_info`
    FieldRefIndex,
    /// Index of a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    MethodRefIndex,
    /// Index of a `CONSTANT_MethodHandle_info`
    MethodHandleIndex,
    /// Index of a `CONSTANT_MethodType_info`
    MethodTypeIndex,
    /// Index of a `CONSTANT_Dynamic_info`
    DynamicIndex,
    /// Index of a `CONSTANT_InvokeDynamic_info`
    InvokeDynamicIndex,
    /// Index of a `CONSTANT_Module_info`
    ModuleIndex,
    /// Index of a `CONSTANT_Package_info`
    PackageIndex,
}

impl ConstantIndex {
    /// Reinterpret as a typed index, without checking the entry kind
    pub fn as_utf8(self) -> Utf8Index {
        Utf8Index(self)
    }

    pub fn as_class(self) -> ClassIndex {
        ClassIndex(self)
    }

    pub fn as_field_ref(self) -> FieldRefIndex {
        FieldRefIndex(self)
    }

    pub fn as_method_ref(self) -> MethodRefIndex {
        MethodRefIndex(self)
    }

    pub fn as_invoke_dynamic(self) -> InvokeDynamicIndex {
        InvokeDynamicIndex(self)
    }
}
