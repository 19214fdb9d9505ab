use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, in internal form (`java/lang/Object`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extract the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extract the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;

    /// Try to construct a name from a string slice
    fn from_str(name: &str) -> Result<Self, String> {
        Self::from_string(name.to_owned())
    }
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(String::from("Unqualified name is empty"))
        } else if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!("Unqualified name '{}' contains an illegal character", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(String::from("Binary name is empty"))
        } else {
            name.split('/').try_for_each(UnqualifiedName::check_valid)
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    /// Is this the name of an instance initializer?
    pub fn is_init(&self) -> bool {
        self.as_str() == "<init>"
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");
}

impl BinaryName {
    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    pub const ARITHMETICEXCEPTION: Self = Self::name("java/lang/ArithmeticException");
    pub const ASSERTIONERROR: Self = Self::name("java/lang/AssertionError");
    pub const AUTOCLOSEABLE: Self = Self::name("java/lang/AutoCloseable");
    pub const BOOLEAN: Self = Self::name("java/lang/Boolean");
    pub const BYTE: Self = Self::name("java/lang/Byte");
    pub const CALLSITE: Self = Self::name("java/lang/invoke/CallSite");
    pub const CHARACTER: Self = Self::name("java/lang/Character");
    pub const CHARSEQUENCE: Self = Self::name("java/lang/CharSequence");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const CLASSCASTEXCEPTION: Self = Self::name("java/lang/ClassCastException");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const COMPARABLE: Self = Self::name("java/lang/Comparable");
    pub const DOUBLE: Self = Self::name("java/lang/Double");
    pub const ENUM: Self = Self::name("java/lang/Enum");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const ILLEGALARGUMENTEXCEPTION: Self = Self::name("java/lang/IllegalArgumentException");
    pub const ILLEGALSTATEEXCEPTION: Self = Self::name("java/lang/IllegalStateException");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const ITERABLE: Self = Self::name("java/lang/Iterable");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const MATH: Self = Self::name("java/lang/Math");
    pub const METHODHANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::name("java/lang/invoke/MethodType");
    pub const NULLPOINTEREXCEPTION: Self = Self::name("java/lang/NullPointerException");
    pub const NUMBER: Self = Self::name("java/lang/Number");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const RUNNABLE: Self = Self::name("java/lang/Runnable");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const SHORT: Self = Self::name("java/lang/Short");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const STRINGBUILDER: Self = Self::name("java/lang/StringBuilder");
    pub const SYSTEM: Self = Self::name("java/lang/System");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
    pub const VOID: Self = Self::name("java/lang/Void");

    pub const ARRAYLIST: Self = Self::name("java/util/ArrayList");
    pub const COLLECTION: Self = Self::name("java/util/Collection");
    pub const HASHMAP: Self = Self::name("java/util/HashMap");
    pub const LIST: Self = Self::name("java/util/List");
    pub const MAP: Self = Self::name("java/util/Map");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn binary_name_validation() {
        assert!(BinaryName::from_str("java/lang/Object").is_ok());
        assert!(BinaryName::from_str("Foo$Bar").is_ok());
        assert!(BinaryName::from_str("").is_err(), "empty name");
        assert!(BinaryName::from_str("java//Object").is_err(), "empty segment");
        assert!(BinaryName::from_str("[I").is_err(), "array descriptors are not class names");
        assert!(BinaryName::from_str("java.lang.Object").is_err(), "dotted names");
    }

    #[test]
    fn unqualified_name_validation() {
        assert!(UnqualifiedName::from_str("run").is_ok());
        assert!(UnqualifiedName::INIT.is_init());
        assert!(UnqualifiedName::from_str("a/b").is_err());
    }
}
