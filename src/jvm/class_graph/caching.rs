use super::{ClassHierarchyInfo, ClassHierarchyResolver};
use crate::jvm::class_file::decode_modified_utf8;
use crate::jvm::{BinaryName, ClassAccessFlags, Error, Name};
use byteorder::{BigEndian, ReadBytesExt};
use dashmap::DashMap;
use std::collections::HashMap;
use std::io::{self, Cursor, Read};

/// Source of raw class file bytes, looked up by class name
pub trait ClassBytesProvider: Send + Sync {
    /// Open a stream positioned at the start of the class file (`None` if the class is unknown)
    fn class_bytes<'a>(&'a self, class: &BinaryName) -> Option<Box<dyn Read + 'a>>;
}

impl ClassBytesProvider for HashMap<BinaryName, Vec<u8>> {
    fn class_bytes<'a>(&'a self, class: &BinaryName) -> Option<Box<dyn Read + 'a>> {
        self.get(class)
            .map(|bytes| Box::new(bytes.as_slice()) as Box<dyn Read + 'a>)
    }
}

impl<F> ClassBytesProvider for F
where
    F: Fn(&BinaryName) -> Option<Vec<u8>> + Send + Sync,
{
    fn class_bytes<'a>(&'a self, class: &BinaryName) -> Option<Box<dyn Read + 'a>> {
        self(class).map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + 'a>)
    }
}

/// Resolver that reads class headers on demand and remembers the answers
///
/// Both hits and misses are cached for the lifetime of the resolver, and classes whose bytes
/// cannot be scanned are cached as misses (they are never retried). The cache is a concurrent
/// map, so one resolver can be shared by builds running on several threads.
pub struct CachingHierarchyResolver<P: ClassBytesProvider> {
    provider: P,
    cache: DashMap<BinaryName, Option<ClassHierarchyInfo>>,
}

impl<P: ClassBytesProvider> CachingHierarchyResolver<P> {
    pub fn new(provider: P) -> CachingHierarchyResolver<P> {
        CachingHierarchyResolver {
            provider,
            cache: DashMap::new(),
        }
    }

    /// Cached answer for a class, without triggering a lookup
    ///
    /// The outer `Option` is whether anything is cached, the inner one is the cached answer.
    pub fn cached(&self, class: &BinaryName) -> Option<Option<ClassHierarchyInfo>> {
        self.cache.get(class).map(|entry| entry.value().clone())
    }

    /// Number of cached answers (misses included)
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn load(&self, class: &BinaryName) -> Option<ClassHierarchyInfo> {
        let reader = match self.provider.class_bytes(class) {
            Some(reader) => reader,
            None => {
                log::debug!("No class bytes for {}", class);
                return None;
            }
        };
        let scanned = match scan_hierarchy_info(reader) {
            Ok(scanned) => scanned,
            Err(err) => {
                log::warn!("Unreadable class bytes for {}: {}", class, err);
                return None;
            }
        };
        if &scanned.name != class {
            log::warn!("Class bytes for {} declare {}", class, scanned.name);
        }

        // Every interface in the list is an interface, which we learn for free
        for interface in scanned.interfaces {
            self.cache
                .entry(interface)
                .or_insert_with(|| Some(ClassHierarchyInfo::interface()));
        }
        Some(scanned.info)
    }
}

impl<P: ClassBytesProvider> ClassHierarchyResolver for CachingHierarchyResolver<P> {
    fn info(&self, class: &BinaryName) -> Option<ClassHierarchyInfo> {
        if let Some(cached) = self.cache.get(class) {
            return cached.value().clone();
        }

        // No lock is held while the provider does its IO
        let loaded = self.load(class);
        self.cache
            .entry(class.clone())
            .or_insert(loaded)
            .value()
            .clone()
    }
}

/// Result of scanning the header of a class file
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ScannedClass {
    pub name: BinaryName,
    pub info: ClassHierarchyInfo,
    pub interfaces: Vec<BinaryName>,
}

/// Read just enough of a class file to learn its name, kind, superclass, and interfaces
///
/// Reading stops right after the interface list. Only `CONSTANT_Utf8_info` and
/// `CONSTANT_Class_info` entries are retained from the pool; everything else is skipped.
pub fn scan_hierarchy_info(mut reader: impl Read) -> Result<ScannedClass, Error> {
    if reader.read_u32::<BigEndian>()? != 0xCAFE_BABE {
        return Err(Error::MalformedClass("bad magic number"));
    }
    let _minor = reader.read_u16::<BigEndian>()?;
    let _major = reader.read_u16::<BigEndian>()?;

    let count = reader.read_u16::<BigEndian>()?;
    let mut utf8s: HashMap<u16, Vec<u8>> = HashMap::new();
    let mut classes: HashMap<u16, u16> = HashMap::new();
    let mut index = 1;
    while index < count {
        let tag = reader.read_u8()?;
        match tag {
            1 => {
                let len = reader.read_u16::<BigEndian>()?;
                let mut bytes = vec![0; len as usize];
                reader.read_exact(&mut bytes)?;
                utf8s.insert(index, bytes);
            }
            7 => {
                classes.insert(index, reader.read_u16::<BigEndian>()?);
            }
            3 | 4 => skip(&mut reader, 4)?,
            5 | 6 => {
                skip(&mut reader, 8)?;
                index += 1;
            }
            8 | 16 | 19 | 20 => skip(&mut reader, 2)?,
            9 | 10 | 11 | 12 | 17 | 18 => skip(&mut reader, 4)?,
            15 => skip(&mut reader, 3)?,
            _ => return Err(Error::MalformedClass("invalid constant tag")),
        }
        index += 1;
    }

    let class_name = |index: u16| -> Result<BinaryName, Error> {
        let name_index = classes
            .get(&index)
            .ok_or(Error::MalformedClass("expected a class constant"))?;
        let bytes = utf8s
            .get(name_index)
            .ok_or(Error::MalformedClass("expected a UTF-8 constant"))?;
        BinaryName::from_string(decode_modified_utf8(bytes)?).map_err(Error::BadDescriptor)
    };

    let access_flags = ClassAccessFlags::from_bits_truncate(reader.read_u16::<BigEndian>()?);
    let name = class_name(reader.read_u16::<BigEndian>()?)?;
    let superclass = match reader.read_u16::<BigEndian>()? {
        0 => None,
        index => Some(class_name(index)?),
    };
    let interface_count = reader.read_u16::<BigEndian>()?;
    let interfaces = (0..interface_count)
        .map(|_| class_name(reader.read_u16::<BigEndian>()?))
        .collect::<Result<Vec<_>, Error>>()?;

    let is_interface = access_flags.contains(ClassAccessFlags::INTERFACE);
    let info = ClassHierarchyInfo {
        is_interface,
        superclass: if is_interface { None } else { superclass },
    };
    Ok(ScannedClass {
        name,
        info,
        interfaces,
    })
}

fn skip(reader: &mut impl Read, n: u64) -> io::Result<()> {
    let skipped = io::copy(&mut reader.by_ref().take(n), &mut io::sink())?;
    if skipped < n {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ClassFileBuilder, ConstantPool, Version};
    use crate::jvm::class_graph::ClassHierarchy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn name(s: &str) -> BinaryName {
        BinaryName::from_str(s).unwrap()
    }

    fn class_bytes(
        class: &str,
        superclass: &str,
        interfaces: &[&str],
        flags: ClassAccessFlags,
    ) -> Vec<u8> {
        let mut builder =
            ClassFileBuilder::new(Version::JAVA8, flags, name(class), Some(name(superclass)));
        for interface in interfaces {
            builder.add_interface(name(interface));
        }
        let mut pool = ConstantPool::new();
        // Wide entries shift every later index
        pool.long(42).unwrap();
        pool.double(1.5).unwrap();
        builder.build(&mut pool).unwrap()
    }

    fn library() -> HashMap<BinaryName, Vec<u8>> {
        let mut classes = HashMap::new();
        classes.insert(
            name("me/Animal"),
            class_bytes("me/Animal", "java/lang/Object", &["me/Named"], ClassAccessFlags::PUBLIC),
        );
        classes.insert(
            name("me/Dog"),
            class_bytes("me/Dog", "me/Animal", &[], ClassAccessFlags::PUBLIC),
        );
        classes.insert(
            name("me/Cat"),
            class_bytes("me/Cat", "me/Animal", &[], ClassAccessFlags::PUBLIC),
        );
        classes.insert(name("me/Broken"), vec![0xCA, 0xFE, 0xBA]);
        classes
    }

    #[test]
    fn scanning_headers() {
        let bytes = class_bytes(
            "me/Dog",
            "me/Animal",
            &["java/lang/Runnable", "me/Named"],
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        );
        let scanned = scan_hierarchy_info(bytes.as_slice()).unwrap();
        assert_eq!(scanned.name, name("me/Dog"));
        assert_eq!(scanned.info, ClassHierarchyInfo::class(Some(name("me/Animal"))));
        assert_eq!(scanned.interfaces, vec![BinaryName::RUNNABLE, name("me/Named")]);

        assert!(matches!(
            scan_hierarchy_info(&[0xCA, 0xFE, 0xBA, 0xBF][..]),
            Err(Error::MalformedClass(_))
        ));
        assert!(matches!(
            scan_hierarchy_info(&bytes[..bytes.len() / 2]),
            Err(Error::IoError(_))
        ));
    }

    #[test]
    fn common_ancestor_from_class_bytes() {
        let resolver = CachingHierarchyResolver::new(library());
        let hierarchy = ClassHierarchy::new(&resolver);
        assert_eq!(
            hierarchy.common_ancestor(&name("me/Dog"), &name("me/Cat")),
            Some(name("me/Animal"))
        );
        assert_eq!(
            resolver.cached(&name("me/Named")),
            Some(Some(ClassHierarchyInfo::interface())),
            "interface learnt from the interface list of me/Animal"
        );
    }

    #[test]
    fn misses_are_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let classes = library();
        let resolver = CachingHierarchyResolver::new(move |class: &BinaryName| {
            counter.fetch_add(1, Ordering::SeqCst);
            classes.get(class).cloned()
        });

        assert_eq!(resolver.info(&name("me/Missing")), None);
        assert_eq!(resolver.info(&name("me/Missing")), None);
        assert_eq!(resolver.info(&name("me/Broken")), None);
        assert_eq!(resolver.info(&name("me/Broken")), None);
        assert_eq!(calls.load(Ordering::SeqCst), 2, "one provider call per class");
        assert_eq!(resolver.cached(&name("me/Broken")), Some(None));
    }

    #[test]
    fn shared_between_threads() {
        let resolver = Arc::new(CachingHierarchyResolver::new(library()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let resolver = resolver.clone();
                std::thread::spawn(move || {
                    let hierarchy = ClassHierarchy::new(&*resolver);
                    hierarchy.superclass_chain(&name("me/Dog"))
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(
                handle.join().unwrap(),
                Some(vec![name("me/Dog"), name("me/Animal"), BinaryName::OBJECT])
            );
        }
    }
}
