use crate::jvm::class_file::{BufWriter, CodeAttribute, ConstantPool, Serialize, Version};
use crate::jvm::code::MethodInfo;
use crate::jvm::{BinaryName, ClassAccessFlags, Error, Name, RenderDescriptor};

/// Minimal class file assembler around generated method bodies
///
/// Only what is needed to get a loadable class is supported: the class header, and methods with
/// an optional `Code` attribute. The `BootstrapMethods` attribute is appended when the pool ended
/// up with bootstrap methods.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFileBuilder {
    pub version: Version,
    pub access_flags: ClassAccessFlags,
    pub this_class: BinaryName,
    pub super_class: Option<BinaryName>,
    pub interfaces: Vec<BinaryName>,
    methods: Vec<(MethodInfo, Option<CodeAttribute>)>,
}

impl ClassFileBuilder {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    pub fn new(
        version: Version,
        access_flags: ClassAccessFlags,
        this_class: BinaryName,
        super_class: Option<BinaryName>,
    ) -> ClassFileBuilder {
        ClassFileBuilder {
            version,
            access_flags,
            this_class,
            super_class,
            interfaces: vec![],
            methods: vec![],
        }
    }

    pub fn add_interface(&mut self, interface: BinaryName) {
        self.interfaces.push(interface);
    }

    /// Add a method (abstract and native methods have no code)
    pub fn add_method(&mut self, method: MethodInfo, code: Option<CodeAttribute>) {
        self.methods.push((method, code));
    }

    /// Serialize the class, using (and extending) the pool the method bodies were built against
    pub fn build(&self, pool: &mut ConstantPool) -> Result<Vec<u8>, Error> {
        // Tail first, since it can still add entries to the pool
        let mut tail = BufWriter::with_pool(pool);
        self.access_flags.serialize(&mut tail)?;
        let this_class = tail.constant_pool()?.class(&self.this_class)?;
        tail.write_index(this_class)?;
        let super_class = match &self.super_class {
            Some(super_class) => Some(tail.constant_pool()?.class(super_class)?),
            None => None,
        };
        tail.write_index_or_zero(super_class)?;
        tail.write_u2(self.interfaces.len() as u16);
        for interface in &self.interfaces {
            let interface = tail.constant_pool()?.class(interface)?;
            tail.write_index(interface)?;
        }

        // Fields
        tail.write_u2(0);

        tail.write_u2(self.methods.len() as u16);
        for (method, code) in &self.methods {
            method.access_flags.serialize(&mut tail)?;
            let name = tail.constant_pool()?.utf8(method.name.as_str())?;
            tail.write_index(name)?;
            let descriptor = tail.constant_pool()?.utf8(&method.descriptor.render())?;
            tail.write_index(descriptor)?;
            match code {
                None => tail.write_u2(0),
                Some(code) => {
                    tail.write_u2(1);
                    tail.write_attribute(code)?;
                }
            }
        }

        // Bootstrap methods are only known once everything else is written
        let tail_pool = tail.constant_pool()?;
        if tail_pool.bootstrap_methods().is_empty() {
            tail.write_u2(0);
        } else {
            let name = tail_pool.utf8("BootstrapMethods")?;
            let mut payload = BufWriter::new();
            tail_pool.write_bootstrap_methods(&mut payload);
            tail.write_u2(1);
            tail.write_index(name)?;
            tail.write_length_prefixed(|writer| {
                writer.write_bytes(payload.as_bytes());
                Ok(())
            })?;
        }
        let tail = tail.into_bytes();

        let mut head = BufWriter::new();
        head.write_bytes(&ClassFileBuilder::MAGIC);
        self.version.serialize(&mut head)?;
        pool.write_to(&mut head);
        head.reserve_space(tail.len());
        head.write_bytes(&tail);
        Ok(head.into_bytes())
    }
}
