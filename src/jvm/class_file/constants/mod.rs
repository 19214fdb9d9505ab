mod bootstrap;
mod entry;
mod entry_map;
mod utf8;

pub use bootstrap::*;
pub use entry::*;
pub use entry_map::EntryMap;
pub use utf8::*;

use crate::jvm::class_file::BufWriter;
use crate::jvm::{
    BinaryName, Error, FieldType, MethodDescriptor, Name, RefType, RenderDescriptor,
    UnqualifiedName,
};
use crate::util::{Offset, OffsetResult, OffsetVec, Width};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Cursor;

/// Class file constants pool
///
/// The pool is append only: once an entry is interned, its index is stable for the lifetime of
/// the pool. Entries are deduplicated by value, and since composite entries point to their
/// components by index, components always get interned before the entries built from them.
///
/// Bootstrap methods live in a separate zero-based table next to the pool, which ends up in the
/// `BootstrapMethods` class attribute.
#[derive(Clone, Debug)]
pub struct ConstantPool {
    id: PoolId,

    /// Pools whose indices are all valid in this pool, along with how many slots they had when
    /// this pool was created from them
    ancestors: Vec<(PoolId, u16)>,

    constants: OffsetVec<Constant>,
    lookup: EntryMap,
    bootstrap_methods: BootstrapMethods,
}

/// Resolved field or method reference
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

impl ConstantPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            id: PoolId::fresh(),
            ancestors: vec![],
            constants: OffsetVec::new_starting_at(Offset(1)),
            lookup: EntryMap::new(),
            bootstrap_methods: BootstrapMethods::default(),
        }
    }

    /// New pool starting out with every entry of `parent`, at the same indices
    ///
    /// Handles from `parent` can be written directly into the new pool, which is what makes
    /// re-emitting a parsed class cheap.
    pub fn extending(parent: &ConstantPool) -> ConstantPool {
        let mut ancestors = parent.ancestors.clone();
        ancestors.push((parent.id, parent.constants.offset_len().0 as u16));
        ConstantPool {
            id: PoolId::fresh(),
            ancestors,
            constants: parent.constants.clone(),
            lookup: parent.lookup.clone(),
            bootstrap_methods: parent.bootstrap_methods.clone(),
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Value of `constant_pool_count` (one more than the largest index)
    pub fn size(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    /// Number of entries (long and double entries count once)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn bootstrap_methods(&self) -> &BootstrapMethods {
        &self.bootstrap_methods
    }

    /// Can handles from the specified pool be written into this pool as they are?
    pub fn can_write_direct(&self, pool: PoolId) -> bool {
        pool == self.id || self.ancestors.iter().any(|(ancestor, _)| *ancestor == pool)
    }

    fn is_direct(&self, handle: ConstantIndex) -> bool {
        handle.pool == self.id
            || self
                .ancestors
                .iter()
                .any(|(ancestor, size)| *ancestor == handle.pool && handle.index < *size)
    }

    fn handle(&self, index: u16) -> ConstantIndex {
        ConstantIndex {
            pool: self.id,
            index,
        }
    }

    /// Entry at a raw index
    pub fn entry(&self, index: u16) -> Result<&Constant, Error> {
        match self.constants.get_offset(Offset(index as usize)) {
            OffsetResult::Ok(_, constant) => Ok(constant),
            _ => Err(Error::InvalidConstantIndex(index)),
        }
    }

    /// Checked handle for a raw index in this pool
    pub fn index(&self, index: u16) -> Result<ConstantIndex, Error> {
        self.entry(index)?;
        Ok(self.handle(index))
    }

    /// Iterate over raw indices and entries
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, _, constant)| (offset.0 as u16, constant))
    }

    fn key(constant: &Constant) -> u32 {
        let mut hasher = DefaultHasher::new();
        constant.hash(&mut hasher);
        EntryMap::key(hasher.finish())
    }

    fn find(&self, key: u32, constant: &Constant) -> Option<u16> {
        self.lookup
            .get(key)
            .map(|idx| idx as u16)
            .find(|idx| self.entry(*idx).map_or(false, |found| found == constant))
    }

    /// Get or insert a constant
    ///
    /// Note: the largest valid index is 65534, indexing starts at 1, and some constants take two
    /// slots.
    pub fn intern(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let key = Self::key(&constant);
        if let Some(idx) = self.find(key, &constant) {
            return Ok(self.handle(idx));
        }

        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow);
        }
        self.constants.push(constant);
        self.lookup.insert(key, offset as u32);
        Ok(self.handle(offset as u16))
    }

    /// Index usable in this pool for a handle, cloning the entry from `source` if needed
    pub fn resolve(
        &mut self,
        handle: ConstantIndex,
        source: Option<&ConstantPool>,
    ) -> Result<u16, Error> {
        if self.is_direct(handle) {
            self.entry(handle.index)?;
            return Ok(handle.index);
        }
        match source {
            Some(source) if source.is_direct(handle) => self.clone_entry(source, handle.index),
            _ => Err(Error::ForeignConstant),
        }
    }

    /// Same as `resolve`, but only handles writable directly are allowed
    pub fn local(&self, handle: impl Into<ConstantIndex>) -> Result<u16, Error> {
        let handle = handle.into();
        if self.is_direct(handle) {
            self.entry(handle.index)?;
            Ok(handle.index)
        } else {
            Err(Error::ForeignConstant)
        }
    }

    /// Re-intern an entry from another pool (along with all its components)
    pub fn clone_entry(&mut self, source: &ConstantPool, index: u16) -> Result<u16, Error> {
        let cloned = match source.entry(index)? {
            constant @ (Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_)) => constant.clone(),
            Constant::Class(name) => Constant::Class(self.clone_entry(source, *name)?),
            Constant::String(utf8) => Constant::String(self.clone_entry(source, *utf8)?),
            Constant::MethodType(desc) => Constant::MethodType(self.clone_entry(source, *desc)?),
            Constant::Module(name) => Constant::Module(self.clone_entry(source, *name)?),
            Constant::Package(name) => Constant::Package(self.clone_entry(source, *name)?),
            Constant::FieldRef {
                class,
                name_and_type,
            } => Constant::FieldRef {
                class: self.clone_entry(source, *class)?,
                name_and_type: self.clone_entry(source, *name_and_type)?,
            },
            Constant::MethodRef {
                class,
                name_and_type,
            } => Constant::MethodRef {
                class: self.clone_entry(source, *class)?,
                name_and_type: self.clone_entry(source, *name_and_type)?,
            },
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => Constant::InterfaceMethodRef {
                class: self.clone_entry(source, *class)?,
                name_and_type: self.clone_entry(source, *name_and_type)?,
            },
            Constant::NameAndType { name, descriptor } => Constant::NameAndType {
                name: self.clone_entry(source, *name)?,
                descriptor: self.clone_entry(source, *descriptor)?,
            },
            Constant::MethodHandle { kind, member } => Constant::MethodHandle {
                kind: *kind,
                member: self.clone_entry(source, *member)?,
            },
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => Constant::Dynamic {
                bootstrap_method: self.clone_bootstrap_method(source, *bootstrap_method)?,
                name_and_type: self.clone_entry(source, *name_and_type)?,
            },
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => Constant::InvokeDynamic {
                bootstrap_method: self.clone_bootstrap_method(source, *bootstrap_method)?,
                name_and_type: self.clone_entry(source, *name_and_type)?,
            },
        };
        Ok(self.intern(cloned)?.index)
    }

    fn clone_bootstrap_method(&mut self, source: &ConstantPool, index: u16) -> Result<u16, Error> {
        let method = source
            .bootstrap_methods
            .get(index)
            .ok_or(Error::MalformedClass("missing bootstrap method"))?;
        let cloned = BootstrapMethod {
            method: self.clone_entry(source, method.method)?,
            arguments: method
                .arguments
                .iter()
                .map(|argument| self.clone_entry(source, *argument))
                .collect::<Result<_, _>>()?,
        };
        self.intern_bootstrap_method(cloned)
    }

    fn intern_bootstrap_method(&mut self, method: BootstrapMethod) -> Result<u16, Error> {
        if self.bootstrap_methods.len() >= u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow);
        }
        Ok(self.bootstrap_methods.intern(method))
    }

    pub fn utf8(&mut self, string: &str) -> Result<Utf8Index, Error> {
        let bytes = encode_modified_utf8(string);
        if bytes.len() > u16::MAX as usize {
            return Err(Error::Utf8TooLong(bytes.len()));
        }
        self.intern(Constant::Utf8(bytes)).map(Utf8Index)
    }

    pub fn integer(&mut self, integer: i32) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Integer(integer))
    }

    pub fn float(&mut self, float: f32) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Float(float.to_bits()))
    }

    pub fn long(&mut self, long: i64) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Long(long))
    }

    pub fn double(&mut self, double: f64) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Double(double.to_bits()))
    }

    /// Class constant from an internal name (binary name for classes, descriptor for arrays)
    pub fn class_named(&mut self, internal_name: &str) -> Result<ClassIndex, Error> {
        let name = self.utf8(internal_name)?.index();
        self.intern(Constant::Class(name)).map(ClassIndex)
    }

    pub fn class(&mut self, name: &BinaryName) -> Result<ClassIndex, Error> {
        self.class_named(name.as_str())
    }

    /// When making a `CONSTANT_Class_info`, reference types are almost always objects. However,
    /// there are a handful of places where an array type needs to be fit in (eg. for a
    /// `checkcast` to an array type).
    pub fn ref_class(&mut self, ref_type: &RefType) -> Result<ClassIndex, Error> {
        self.class_named(&ref_type.internal_name())
    }

    pub fn string(&mut self, string: &str) -> Result<StringIndex, Error> {
        let utf8 = self.utf8(string)?.index();
        self.intern(Constant::String(utf8)).map(StringIndex)
    }

    pub fn name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeIndex, Error> {
        let name = self.utf8(name)?.index();
        let descriptor = self.utf8(descriptor)?.index();
        self.intern(Constant::NameAndType { name, descriptor })
            .map(NameAndTypeIndex)
    }

    pub fn field_ref(
        &mut self,
        owner: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &FieldType,
    ) -> Result<FieldRefIndex, Error> {
        let class = self.class(owner)?.index();
        let name_and_type = self
            .name_and_type(name.as_str(), &descriptor.render())?
            .index();
        self.intern(Constant::FieldRef {
            class,
            name_and_type,
        })
        .map(FieldRefIndex)
    }

    pub fn method_ref(
        &mut self,
        owner: &RefType,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
    ) -> Result<MethodRefIndex, Error> {
        let class = self.ref_class(owner)?.index();
        let name_and_type = self
            .name_and_type(name.as_str(), &descriptor.render())?
            .index();
        self.intern(Constant::MethodRef {
            class,
            name_and_type,
        })
        .map(MethodRefIndex)
    }

    pub fn interface_method_ref(
        &mut self,
        owner: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
    ) -> Result<MethodRefIndex, Error> {
        let class = self.class(owner)?.index();
        let name_and_type = self
            .name_and_type(name.as_str(), &descriptor.render())?
            .index();
        self.intern(Constant::InterfaceMethodRef {
            class,
            name_and_type,
        })
        .map(MethodRefIndex)
    }

    pub fn method_handle(
        &mut self,
        kind: HandleKind,
        member: impl Into<ConstantIndex>,
    ) -> Result<MethodHandleIndex, Error> {
        let member = self.local(member)?;
        self.intern(Constant::MethodHandle { kind, member })
            .map(MethodHandleIndex)
    }

    pub fn method_type(&mut self, descriptor: &MethodDescriptor) -> Result<MethodTypeIndex, Error> {
        let descriptor = self.utf8(&descriptor.render())?.index();
        self.intern(Constant::MethodType(descriptor))
            .map(MethodTypeIndex)
    }

    /// Get or insert a bootstrap method, returning its index in the `BootstrapMethods` table
    pub fn bootstrap_method(
        &mut self,
        method: MethodHandleIndex,
        arguments: &[ConstantIndex],
    ) -> Result<u16, Error> {
        let method = self.local(method)?;
        let arguments = arguments
            .iter()
            .map(|argument| self.local(*argument))
            .collect::<Result<_, _>>()?;
        self.intern_bootstrap_method(BootstrapMethod { method, arguments })
    }

    pub fn constant_dynamic(
        &mut self,
        bootstrap_method: u16,
        name: &UnqualifiedName,
        field_type: &FieldType,
    ) -> Result<DynamicIndex, Error> {
        let name_and_type = self
            .name_and_type(name.as_str(), &field_type.render())?
            .index();
        self.intern(Constant::Dynamic {
            bootstrap_method,
            name_and_type,
        })
        .map(DynamicIndex)
    }

    pub fn invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
    ) -> Result<InvokeDynamicIndex, Error> {
        let name_and_type = self
            .name_and_type(name.as_str(), &descriptor.render())?
            .index();
        self.intern(Constant::InvokeDynamic {
            bootstrap_method,
            name_and_type,
        })
        .map(InvokeDynamicIndex)
    }

    pub fn module(&mut self, name: &str) -> Result<ModuleIndex, Error> {
        let name = self.utf8(name)?.index();
        self.intern(Constant::Module(name)).map(ModuleIndex)
    }

    pub fn package(&mut self, name: &str) -> Result<PackageIndex, Error> {
        let name = self.utf8(name)?.index();
        self.intern(Constant::Package(name)).map(PackageIndex)
    }

    /// Find an existing class constant without inserting anything
    pub fn lookup_class(&self, internal_name: &str) -> Option<ClassIndex> {
        let utf8 = Constant::Utf8(encode_modified_utf8(internal_name));
        let name = self.find(Self::key(&utf8), &utf8)?;
        let class = Constant::Class(name);
        self.find(Self::key(&class), &class)
            .map(|idx| ClassIndex(self.handle(idx)))
    }

    pub fn utf8_at(&self, index: u16) -> Result<String, Error> {
        match self.entry(index)? {
            Constant::Utf8(bytes) => decode_modified_utf8(bytes),
            _ => Err(Error::MalformedClass("expected a UTF-8 constant")),
        }
    }

    /// Internal name of a class constant
    pub fn class_name_at(&self, index: u16) -> Result<String, Error> {
        match self.entry(index)? {
            Constant::Class(name) => self.utf8_at(*name),
            _ => Err(Error::MalformedClass("expected a class constant")),
        }
    }

    /// Name and descriptor of a name and type constant
    pub fn name_and_type_at(&self, index: u16) -> Result<(String, String), Error> {
        match self.entry(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8_at(*name)?, self.utf8_at(*descriptor)?))
            }
            _ => Err(Error::MalformedClass("expected a name and type constant")),
        }
    }

    pub fn member_ref_at(&self, index: u16) -> Result<MemberRef, Error> {
        let (class, name_and_type, is_interface) = match self.entry(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            _ => return Err(Error::MalformedClass("expected a member reference")),
        };
        let (name, descriptor) = self.name_and_type_at(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name_at(class)?,
            name,
            descriptor,
            is_interface,
        })
    }

    /// Name and type of a dynamic constant or call site
    pub fn dynamic_at(&self, index: u16) -> Result<(String, String), Error> {
        match self.entry(index)? {
            Constant::Dynamic { name_and_type, .. }
            | Constant::InvokeDynamic { name_and_type, .. } => {
                self.name_and_type_at(*name_and_type)
            }
            _ => Err(Error::MalformedClass("expected a dynamic constant")),
        }
    }

    /// Read a raw constant pool (starting at `constant_pool_count`)
    ///
    /// Returns the pool along with the number of bytes consumed. Indices in the pool are exactly
    /// those of the input, and duplicate entries are kept as they are.
    pub fn parse(bytes: &[u8]) -> Result<(ConstantPool, usize), Error> {
        let truncated = |_| Error::MalformedClass("truncated constant pool");
        let mut cursor = Cursor::new(bytes);
        let count = cursor.read_u16::<BigEndian>().map_err(truncated)?;

        let mut pool = ConstantPool::new();
        while pool.constants.offset_len().0 < count as usize {
            let constant = Self::read_constant(&mut cursor).map_err(truncated)??;
            let key = Self::key(&constant);
            let offset = pool.constants.push(constant);
            pool.lookup.insert(key, offset.0 as u32);
        }
        if pool.constants.offset_len().0 != count as usize {
            return Err(Error::MalformedClass("wide constant at the end of the pool"));
        }

        Ok((pool, cursor.position() as usize))
    }

    fn read_constant(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Result<Constant, Error>> {
        let u2 = |cursor: &mut Cursor<&[u8]>| cursor.read_u16::<BigEndian>();
        let constant = match cursor.read_u8()? {
            1 => {
                let len = u2(cursor)? as usize;
                let start = cursor.position() as usize;
                let bytes = cursor.get_ref().get(start..start + len).ok_or_else(|| {
                    std::io::Error::from(std::io::ErrorKind::UnexpectedEof)
                })?;
                let bytes = bytes.to_vec();
                cursor.set_position((start + len) as u64);
                Constant::Utf8(bytes)
            }
            3 => Constant::Integer(cursor.read_i32::<BigEndian>()?),
            4 => Constant::Float(cursor.read_u32::<BigEndian>()?),
            5 => Constant::Long(cursor.read_i64::<BigEndian>()?),
            6 => Constant::Double(cursor.read_u64::<BigEndian>()?),
            7 => Constant::Class(u2(cursor)?),
            8 => Constant::String(u2(cursor)?),
            9 => Constant::FieldRef {
                class: u2(cursor)?,
                name_and_type: u2(cursor)?,
            },
            10 => Constant::MethodRef {
                class: u2(cursor)?,
                name_and_type: u2(cursor)?,
            },
            11 => Constant::InterfaceMethodRef {
                class: u2(cursor)?,
                name_and_type: u2(cursor)?,
            },
            12 => Constant::NameAndType {
                name: u2(cursor)?,
                descriptor: u2(cursor)?,
            },
            15 => {
                let kind = match HandleKind::from_u8(cursor.read_u8()?) {
                    Some(kind) => kind,
                    None => return Ok(Err(Error::MalformedClass("invalid method handle kind"))),
                };
                Constant::MethodHandle {
                    kind,
                    member: u2(cursor)?,
                }
            }
            16 => Constant::MethodType(u2(cursor)?),
            17 => Constant::Dynamic {
                bootstrap_method: u2(cursor)?,
                name_and_type: u2(cursor)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u2(cursor)?,
                name_and_type: u2(cursor)?,
            },
            19 => Constant::Module(u2(cursor)?),
            20 => Constant::Package(u2(cursor)?),
            _ => return Ok(Err(Error::MalformedClass("invalid constant tag"))),
        };
        Ok(Ok(constant))
    }

    /// Load the payload of a `BootstrapMethods` attribute, keeping its indices
    pub fn load_bootstrap_methods(&mut self, payload: &[u8]) -> Result<(), Error> {
        let truncated = |_| Error::MalformedClass("truncated BootstrapMethods attribute");
        let mut cursor = Cursor::new(payload);
        let count = cursor.read_u16::<BigEndian>().map_err(truncated)?;
        for _ in 0..count {
            let method = cursor.read_u16::<BigEndian>().map_err(truncated)?;
            let argument_count = cursor.read_u16::<BigEndian>().map_err(truncated)?;
            let arguments = (0..argument_count)
                .map(|_| cursor.read_u16::<BigEndian>())
                .collect::<Result<_, _>>()
                .map_err(truncated)?;
            self.bootstrap_methods
                .push_raw(BootstrapMethod { method, arguments });
        }
        Ok(())
    }

    /// Write `constant_pool_count` followed by every entry
    pub fn write_to(&self, writer: &mut BufWriter) {
        writer.write_u2(self.size());
        for constant in self.constants.values() {
            constant.serialize(writer);
        }
    }

    /// Write the payload of the `BootstrapMethods` attribute
    pub fn write_bootstrap_methods(&self, writer: &mut BufWriter) {
        self.bootstrap_methods.serialize(writer);
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deduplication() {
        let mut pool = ConstantPool::new();
        let indices: Vec<Utf8Index> = (0..10).map(|_| pool.utf8("hello").unwrap()).collect();
        assert!(indices.iter().all(|idx| *idx == indices[0]), "same index every time");
        assert_eq!(pool.len(), 1, "exactly one entry");

        let first = pool.string("hello").unwrap();
        let second = pool.string("hello").unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.len(), 2, "string reuses the utf8 entry");
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.long(1).unwrap().index, 1);
        assert_eq!(pool.integer(1).unwrap().index, 3);
        assert_eq!(pool.double(0.5).unwrap().index, 4);
        assert_eq!(pool.size(), 6);
        assert!(pool.entry(2).is_err(), "second half of a long");
    }

    #[test]
    fn composite_entries_are_interned_after_components() {
        let mut pool = ConstantPool::new();
        let field = pool
            .field_ref(
                &BinaryName::from_str("me/Point").unwrap(),
                &UnqualifiedName::from_str("x").unwrap(),
                &FieldType::int(),
            )
            .unwrap();
        let member = pool.member_ref_at(field.index()).unwrap();
        assert_eq!(member.owner, "me/Point");
        assert_eq!(member.name, "x");
        assert_eq!(member.descriptor, "I");
        assert!(
            pool.iter().all(|(idx, _)| idx <= field.index()),
            "field ref is the last entry"
        );
    }

    #[test]
    fn parse_round_trip() {
        let mut pool = ConstantPool::new();
        pool.class(&BinaryName::OBJECT).unwrap();
        pool.long(-7).unwrap();
        pool.string("a\u{0}b").unwrap();
        let object_init = pool
            .method_ref(
                &RefType::OBJECT,
                &UnqualifiedName::INIT,
                &MethodDescriptor {
                    parameters: vec![],
                    return_type: None,
                },
            )
            .unwrap();

        let mut writer = BufWriter::new();
        pool.write_to(&mut writer);
        let bytes = writer.into_bytes();

        let (parsed, consumed) = ConstantPool::parse(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed.size(), pool.size());
        assert_eq!(
            parsed.member_ref_at(object_init.index()).unwrap().name,
            "<init>"
        );
        assert_eq!(
            parsed.lookup_class("java/lang/Object").map(|c| c.index()),
            Some(1)
        );
        assert!(parsed.lookup_class("java/lang/String").is_none());
    }

    #[test]
    fn cloning_between_pools() {
        let mut source = ConstantPool::new();
        source.utf8("padding").unwrap();
        let string = source.string("moved").unwrap();

        let mut target = ConstantPool::new();
        assert!(!target.can_write_direct(source.id()));
        assert!(matches!(
            target.resolve(string.into(), None),
            Err(Error::ForeignConstant)
        ));
        let cloned = target.resolve(string.into(), Some(&source)).unwrap();
        assert_eq!(cloned, 2, "utf8 then string");
        assert_eq!(target.entry(cloned).unwrap(), &Constant::String(1));
    }

    #[test]
    fn extending_keeps_indices() {
        let mut parent = ConstantPool::new();
        let class = parent.class(&BinaryName::STRING).unwrap();
        let mut child = ConstantPool::extending(&parent);
        assert!(child.can_write_direct(parent.id()));
        assert_eq!(child.resolve(class.into(), None).unwrap(), class.index());

        // Entries added to the parent afterwards are not shared
        let later = parent.utf8("later").unwrap();
        assert!(child.resolve(later.into(), None).is_err());
        assert_eq!(child.resolve(later.into(), Some(&parent)).unwrap(), 3);
    }

    #[test]
    fn bootstrap_methods_are_deduplicated() {
        let mut pool = ConstantPool::new();
        let target = pool
            .method_ref(
                &RefType::Object(BinaryName::from_str("me/Boot").unwrap()),
                &UnqualifiedName::from_str("bsm").unwrap(),
                &MethodDescriptor {
                    parameters: vec![],
                    return_type: None,
                },
            )
            .unwrap();
        let handle = pool.method_handle(HandleKind::InvokeStatic, target).unwrap();
        let arg = pool.integer(3).unwrap();
        let first = pool.bootstrap_method(handle, &[arg]).unwrap();
        let second = pool.bootstrap_method(handle, &[arg]).unwrap();
        let third = pool.bootstrap_method(handle, &[]).unwrap();
        assert_eq!((first, second, third), (0, 0, 1));

        let mut writer = BufWriter::new();
        pool.write_bootstrap_methods(&mut writer);
        let mut reloaded = ConstantPool::extending(&pool);
        reloaded.bootstrap_methods = BootstrapMethods::default();
        reloaded.load_bootstrap_methods(writer.as_bytes()).unwrap();
        assert_eq!(reloaded.bootstrap_methods().len(), 2);
    }

    #[test]
    fn long_strings_are_rejected() {
        let mut pool = ConstantPool::new();
        let long = "x".repeat(70_000);
        assert!(matches!(pool.utf8(&long), Err(Error::Utf8TooLong(70_000))));
    }
}
