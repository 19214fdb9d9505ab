use crate::jvm::class_file::{BufWriter, Serialize};
use crate::jvm::Error;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 6, the last one without mandatory stack
    /// map frames
    pub const JAVA6: Version = Version {
        major_version: 50,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        major_version: 52,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 11 (released September 2018)
    pub const JAVA11: Version = Version {
        major_version: 55,
        minor_version: 0,
    };

    /// Does the JVM require a `StackMapTable` on every method with branches?
    pub fn requires_stack_maps(&self) -> bool {
        self.major_version > Version::JAVA6.major_version
    }
}

impl Serialize for Version {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_u2(self.minor_version);
        writer.write_u2(self.major_version);
        Ok(())
    }
}
